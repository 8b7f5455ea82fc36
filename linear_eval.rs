// linear_eval.rs
// Linear evaluation of a pretrained ResNet-50 backbone on CPU.
// Expected files:
//   ./models/<model>.safetensors      (torchvision state-dict names, no `fc.*`)
//   ./data/<dataset>/...              (CIFAR binaries or `train.csv` / `test.csv` manifests)
//
// Output:
//   - logs/linear_<model>_<dataset>.log
//   - prints the final accuracy and the hyperparameter C it was obtained with

use clap::Parser;
use linear_eval::backbone::{ResNetBackbone, ResNetConfig};
use linear_eval::config::{read_config, validate_config, EvalConfig};
use linear_eval::data::{self, prepare_data};
use linear_eval::error::Result;
use linear_eval::evaluation::{final_report_line, wd_range, EvaluationResult, LinearTester};
use linear_eval::utils::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Evaluate pretrained self-supervised model via logistic regression.
#[derive(Debug, Parser)]
#[command(name = "linear_eval", version)]
struct Cli {
    /// Name of the pretrained model to load and evaluate [default: byol]
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Name of the dataset to evaluate on [default: cifar10]
    #[arg(short = 'd', long)]
    dataset: Option<String>,

    /// The size of the mini-batches when inferring features [default: 64]
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,

    /// The size of the input images [default: 224]
    #[arg(short = 'i', long)]
    image_size: Option<u32>,

    /// The number of weight decay values to validate [default: 10]
    #[arg(short = 'w', long)]
    wd_values: Option<usize>,

    /// C value (1 / weight_decay), if not tuning on the validation set
    #[arg(short = 'c', long = "C")]
    c: Option<f64>,

    /// Turn off data normalisation (based on ImageNet values)
    #[arg(short = 'n', long)]
    no_norm: bool,

    /// Compute device [default: cpu]
    #[arg(long)]
    device: Option<String>,

    /// JSON configuration file; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset root, overriding the registry location
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding `<model>.safetensors` [default: models]
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Threads decoding images per batch [default: 1]
    #[arg(long)]
    num_workers: Option<usize>,
}

impl Cli {
    fn into_config(self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => EvalConfig::default(),
        };

        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(image_size) = self.image_size {
            config.image_size = image_size;
        }
        if let Some(wd_values) = self.wd_values {
            config.wd_values = wd_values;
        }
        if self.c.is_some() {
            config.c = self.c;
        }
        if self.no_norm {
            config.normalise = false;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.data_dir.is_some() {
            config.data_dir = self.data_dir;
        }
        if let Some(models_dir) = self.models_dir {
            config.models_dir = models_dir;
        }
        if let Some(num_workers) = self.num_workers {
            config.num_workers = num_workers;
        }

        validate_config(&config)?;
        Ok(config)
    }
}

fn run(config: &EvalConfig) -> Result<EvaluationResult> {
    let spec = data::lookup(&config.dataset)?;
    spec.metric()?;
    let wd_values = wd_range(config.wd_values)?;

    let loaders = prepare_data(spec, config.data_dir.as_deref(), &config.data_options())?;
    let backbone = ResNetBackbone::from_checkpoint(
        &config.models_dir,
        &config.model,
        ResNetConfig::resnet50(),
        config.image_size as usize,
    )?;

    let mut tester = LinearTester::new(backbone, loaders, spec.num_classes, spec.metric, wd_values)?;
    match config.c {
        None => {
            tester.validate()?;
        }
        Some(c) => tester.use_fixed_c(c)?,
    }
    tester.evaluate()
}

fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.log_path()) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    info!(?config, "Starting linear evaluation");

    match run(&config) {
        Ok(result) => {
            let line = final_report_line(&config.model, &config.dataset, &result);
            println!("{}", line);
            info!("{}", line);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
