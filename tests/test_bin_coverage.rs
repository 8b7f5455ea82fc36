use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp config");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

#[allow(dead_code)]
mod linear_eval_bin {
    include!("../linear_eval.rs");

    #[cfg(test)]
    mod coverage_tests {
        use super::*;
        use linear_eval::EvalError;
        use std::fs;
        use std::path::Path;
        use tempfile::tempdir;

        fn parse(args: &[&str]) -> Cli {
            Cli::try_parse_from(args).expect("arguments should parse")
        }

        /// Minimal CIFAR-10 layout: one record per training batch, one test record.
        fn write_cifar10(root: &Path) {
            let dir = root.join("cifar-10-batches-bin");
            fs::create_dir_all(&dir).unwrap();
            let record = |label: u8| {
                let mut bytes = vec![label];
                bytes.extend(std::iter::repeat(label * 20).take(3072));
                bytes
            };
            for i in 1..=5u8 {
                fs::write(dir.join(format!("data_batch_{}.bin", i)), record(i)).unwrap();
            }
            fs::write(dir.join("test_batch.bin"), record(0)).unwrap();
        }

        #[test]
        fn test_defaults_without_arguments() {
            let config = parse(&["linear_eval"]).into_config().unwrap();
            assert_eq!(config, EvalConfig::default());
        }

        #[test]
        fn test_short_flags() {
            let config = parse(&[
                "linear_eval", "-m", "simclr", "-d", "cifar100", "-b", "16", "-i", "96", "-w",
                "4", "-c", "0.5", "-n",
            ])
            .into_config()
            .unwrap();

            assert_eq!(config.model, "simclr");
            assert_eq!(config.dataset, "cifar100");
            assert_eq!(config.batch_size, 16);
            assert_eq!(config.image_size, 96);
            assert_eq!(config.wd_values, 4);
            assert_eq!(config.c, Some(0.5));
            assert!(!config.normalise);
        }

        #[test]
        fn test_long_c_flag() {
            let config = parse(&["linear_eval", "--C", "2.0"]).into_config().unwrap();
            assert_eq!(config.c, Some(2.0));
        }

        #[test]
        fn test_command_line_overrides_config_file() {
            let temp = crate::write_temp_config(
                r#"{"model": "moco", "dataset": "shenzhen_cxr", "batch_size": 8}"#,
            );
            let config = parse(&[
                "linear_eval",
                "--config",
                temp.path().to_str().unwrap(),
                "--batch-size",
                "32",
                "--num-workers",
                "2",
            ])
            .into_config()
            .unwrap();

            assert_eq!(config.model, "moco");
            assert_eq!(config.dataset, "shenzhen_cxr");
            assert_eq!(config.batch_size, 32);
            assert_eq!(config.num_workers, 2);
        }

        #[test]
        fn test_command_line_repairs_invalid_config_file() {
            let temp = crate::write_temp_config(r#"{"device": "cuda", "dataset": "imagenet"}"#);
            let path = temp.path().to_str().unwrap();

            let err = parse(&["linear_eval", "--config", path]).into_config().unwrap_err();
            assert!(err.is_configuration());

            let config = parse(&[
                "linear_eval", "--config", path, "--device", "cpu", "-d", "cifar100",
            ])
            .into_config()
            .unwrap();
            assert_eq!(config.device, "cpu");
            assert_eq!(config.dataset, "cifar100");
        }

        #[test]
        fn test_invalid_values_are_configuration_errors() {
            for args in [
                &["linear_eval", "-d", "imagenet"][..],
                &["linear_eval", "--device", "cuda"][..],
                &["linear_eval", "-c", "0"][..],
                &["linear_eval", "-w", "0"][..],
            ] {
                let err = parse(args).into_config().unwrap_err();
                assert!(err.is_configuration(), "{:?}: {}", args, err);
            }
        }

        #[test]
        fn test_unknown_flag_is_rejected() {
            assert!(Cli::try_parse_from(["linear_eval", "--learning-rate", "1"]).is_err());
        }

        #[test]
        fn test_run_missing_dataset() {
            let dir = tempdir().unwrap();
            let config = EvalConfig {
                data_dir: Some(dir.path().to_path_buf()),
                ..EvalConfig::default()
            };
            assert!(matches!(run(&config), Err(EvalError::DataAccess { .. })));
        }

        #[test]
        fn test_run_missing_checkpoint() {
            let data = tempdir().unwrap();
            let models = tempdir().unwrap();
            write_cifar10(data.path());

            let config = EvalConfig {
                model: "absent".into(),
                image_size: 32,
                data_dir: Some(data.path().to_path_buf()),
                models_dir: models.path().to_path_buf(),
                ..EvalConfig::default()
            };
            let err = run(&config).unwrap_err();
            assert!(matches!(err, EvalError::Checkpoint { .. }));
            assert!(err.to_string().contains("absent.safetensors"));
        }
    }
}
