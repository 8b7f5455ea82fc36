//! ResNet trunk used as the frozen feature extractor
//!
//! The layout follows the torchvision ResNet (v1.5) with the classification head removed:
//!
//! ```text
//! conv1 7x7/2 -> bn1 -> relu -> maxpool 3x3/2
//!   -> layer1 .. layer4 (bottleneck stages, stride 2 from layer2 on)
//!   -> global average pool -> flatten
//! ```
//!
//! Layer names match torchvision state-dict keys so a converted checkpoint loads without
//! remapping. `ResNetConfig::resnet50()` yields the 2048-dimensional production trunk.

use crate::backbone::checkpoint::Checkpoint;
use crate::backbone::FeatureExtractor;
use crate::error::{EvalError, Result};
use crate::layers::batchnorm::DEFAULT_EPSILON;
use crate::layers::{BatchNorm2DLayer, Conv2DLayer, GlobalAvgPool, Layer, MaxPool2DLayer};
use crate::utils::relu_inplace;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Channel expansion of the last 1x1 convolution in every bottleneck.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// Shape of a bottleneck ResNet.
///
/// * `block_depths` - Number of bottleneck blocks per stage
/// * `base_width` - Stem width; stage `i` uses `base_width * 2^i` inner channels
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResNetConfig {
    pub block_depths: Vec<usize>,
    pub base_width: usize,
}

impl ResNetConfig {
    /// ResNet-50: depths [3, 4, 6, 3], width 64, 2048 output features.
    pub fn resnet50() -> Self {
        Self {
            block_depths: vec![3, 4, 6, 3],
            base_width: 64,
        }
    }

    /// Dimension of the pooled feature vector.
    pub fn feature_dim(&self) -> usize {
        let stages = self.block_depths.len();
        if stages == 0 {
            return self.base_width;
        }
        self.base_width * (1 << (stages - 1)) * BOTTLENECK_EXPANSION
    }

    fn validate(&self) -> Result<()> {
        if self.base_width == 0 {
            return Err(EvalError::config("ResNet base_width must be positive"));
        }
        if self.block_depths.is_empty() || self.block_depths.contains(&0) {
            return Err(EvalError::config(
                "ResNet needs at least one stage and every stage needs at least one block",
            ));
        }
        Ok(())
    }
}

fn run_layer(layer: &dyn Layer, input: &[f32], batch_size: usize) -> Vec<f32> {
    let mut output = vec![0.0f32; batch_size * layer.output_size()];
    layer.forward(input, &mut output, batch_size);
    output
}

/// conv1x1 -> bn -> relu -> conv3x3 (stride) -> bn -> relu -> conv1x1 -> bn, plus shortcut.
struct Bottleneck {
    conv1: Conv2DLayer,
    bn1: BatchNorm2DLayer,
    conv2: Conv2DLayer,
    bn2: BatchNorm2DLayer,
    conv3: Conv2DLayer,
    bn3: BatchNorm2DLayer,
    downsample: Option<(Conv2DLayer, BatchNorm2DLayer)>,
    out_hw: (usize, usize),
}

impl Bottleneck {
    fn new(in_channels: usize, planes: usize, stride: usize, height: usize, width: usize) -> Self {
        let out_channels = planes * BOTTLENECK_EXPANSION;

        let conv1 = Conv2DLayer::new(in_channels, planes, 1, 0, 1, height, width, false);
        let bn1 = BatchNorm2DLayer::new(planes, height, width, DEFAULT_EPSILON);
        let conv2 = Conv2DLayer::new(planes, planes, 3, 1, stride, height, width, false);
        let (out_h, out_w) = (conv2.output_height(), conv2.output_width());
        let bn2 = BatchNorm2DLayer::new(planes, out_h, out_w, DEFAULT_EPSILON);
        let conv3 = Conv2DLayer::new(planes, out_channels, 1, 0, 1, out_h, out_w, false);
        let bn3 = BatchNorm2DLayer::new(out_channels, out_h, out_w, DEFAULT_EPSILON);

        let downsample = (stride != 1 || in_channels != out_channels).then(|| {
            let conv = Conv2DLayer::new(in_channels, out_channels, 1, 0, stride, height, width, false);
            let bn = BatchNorm2DLayer::new(out_channels, out_h, out_w, DEFAULT_EPSILON);
            (conv, bn)
        });

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
            out_hw: (out_h, out_w),
        }
    }

    fn forward(&self, input: &[f32], batch_size: usize) -> Vec<f32> {
        let mut x = run_layer(&self.bn1, &run_layer(&self.conv1, input, batch_size), batch_size);
        relu_inplace(&mut x);
        let mut x = run_layer(&self.bn2, &run_layer(&self.conv2, &x, batch_size), batch_size);
        relu_inplace(&mut x);
        let mut out = run_layer(&self.bn3, &run_layer(&self.conv3, &x, batch_size), batch_size);

        match &self.downsample {
            Some((conv, bn)) => {
                let identity = run_layer(bn, &run_layer(conv, input, batch_size), batch_size);
                for (o, i) in out.iter_mut().zip(&identity) {
                    *o += i;
                }
            }
            None => {
                for (o, i) in out.iter_mut().zip(input) {
                    *o += i;
                }
            }
        }
        relu_inplace(&mut out);
        out
    }

    fn collect_layers<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a dyn Layer)>) {
        out.push((format!("{}.conv1", prefix), &self.conv1));
        out.push((format!("{}.bn1", prefix), &self.bn1));
        out.push((format!("{}.conv2", prefix), &self.conv2));
        out.push((format!("{}.bn2", prefix), &self.bn2));
        out.push((format!("{}.conv3", prefix), &self.conv3));
        out.push((format!("{}.bn3", prefix), &self.bn3));
        if let Some((conv, bn)) = &self.downsample {
            out.push((format!("{}.downsample.0", prefix), conv));
            out.push((format!("{}.downsample.1", prefix), bn));
        }
    }

    fn collect_layers_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, &'a mut dyn Layer)>,
    ) {
        out.push((format!("{}.conv1", prefix), &mut self.conv1));
        out.push((format!("{}.bn1", prefix), &mut self.bn1));
        out.push((format!("{}.conv2", prefix), &mut self.conv2));
        out.push((format!("{}.bn2", prefix), &mut self.bn2));
        out.push((format!("{}.conv3", prefix), &mut self.conv3));
        out.push((format!("{}.bn3", prefix), &mut self.bn3));
        if let Some((conv, bn)) = self.downsample.as_mut() {
            out.push((format!("{}.downsample.0", prefix), conv));
            out.push((format!("{}.downsample.1", prefix), bn));
        }
    }
}

/// Frozen ResNet trunk mapping (batch × 3 × image_size²) images to pooled features.
///
/// There is no training mode: batch normalization always uses running statistics and
/// nothing mutates parameters once they are loaded.
pub struct ResNetBackbone {
    config: ResNetConfig,
    image_size: usize,
    conv1: Conv2DLayer,
    bn1: BatchNorm2DLayer,
    maxpool: MaxPool2DLayer,
    stages: Vec<Vec<Bottleneck>>,
    avgpool: GlobalAvgPool,
}

impl ResNetBackbone {
    /// Builds the architecture for square `image_size` inputs with identity-initialised
    /// normalization and zero convolution weights.
    pub fn new(config: ResNetConfig, image_size: usize) -> Result<Self> {
        config.validate()?;
        if image_size == 0 {
            return Err(EvalError::config("image_size must be positive"));
        }

        let width = config.base_width;
        let conv1 = Conv2DLayer::new(3, width, 7, 3, 2, image_size, image_size, false);
        let (h, w) = (conv1.output_height(), conv1.output_width());
        let bn1 = BatchNorm2DLayer::new(width, h, w, DEFAULT_EPSILON);
        let maxpool = MaxPool2DLayer::new(width, h, w, 3, 2, 1);

        let mut hw = (maxpool.output_height(), maxpool.output_width());
        let mut in_channels = width;
        let mut stages = Vec::with_capacity(config.block_depths.len());
        for (stage_idx, &depth) in config.block_depths.iter().enumerate() {
            let planes = width << stage_idx;
            let mut blocks = Vec::with_capacity(depth);
            for block_idx in 0..depth {
                let stride = if stage_idx > 0 && block_idx == 0 { 2 } else { 1 };
                let block = Bottleneck::new(in_channels, planes, stride, hw.0, hw.1);
                hw = block.out_hw;
                in_channels = planes * BOTTLENECK_EXPANSION;
                blocks.push(block);
            }
            stages.push(blocks);
        }
        let avgpool = GlobalAvgPool::new(in_channels, hw.0, hw.1);

        Ok(Self {
            config,
            image_size,
            conv1,
            bn1,
            maxpool,
            stages,
            avgpool,
        })
    }

    /// Builds the architecture and loads `<models_dir>/<model_name>.safetensors`.
    ///
    /// # Errors
    ///
    /// `EvalError::Checkpoint` if the file is missing or its keys/shapes do not match.
    pub fn from_checkpoint(
        models_dir: &Path,
        model_name: &str,
        config: ResNetConfig,
        image_size: usize,
    ) -> Result<Self> {
        let mut backbone = Self::new(config, image_size)?;
        let path = Checkpoint::path_for(models_dir, model_name);
        if !path.is_file() {
            return Err(EvalError::checkpoint(&path, "checkpoint file not found"));
        }
        let checkpoint = Checkpoint::load(&path)?;
        backbone.load_checkpoint(&checkpoint, &path)?;

        info!(
            model = model_name,
            parameters = backbone.parameter_count(),
            "Loaded pretrained backbone"
        );
        Ok(backbone)
    }

    /// Copies every state tensor from `checkpoint` into the architecture.
    ///
    /// Loading is strict: missing keys, unexpected keys and shape mismatches are all
    /// reported together and nothing is applied in that case.
    pub fn load_checkpoint(&mut self, checkpoint: &Checkpoint, source: &Path) -> Result<()> {
        let expected = self.expected_state();

        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        for (name, shape) in &expected {
            match checkpoint.get(name) {
                None => missing.push(name.clone()),
                Some(tensor) if &tensor.shape != shape => mismatched.push(format!(
                    "{} (checkpoint {:?}, model {:?})",
                    name, tensor.shape, shape
                )),
                Some(_) => {}
            }
        }
        let known: BTreeSet<&str> = expected.iter().map(|(name, _)| name.as_str()).collect();
        let unexpected: Vec<&str> = checkpoint.names().filter(|n| !known.contains(n)).collect();

        if !missing.is_empty() || !unexpected.is_empty() || !mismatched.is_empty() {
            let mut reasons = Vec::new();
            if !missing.is_empty() {
                reasons.push(format!("missing keys: {}", missing.join(", ")));
            }
            if !unexpected.is_empty() {
                reasons.push(format!("unexpected keys: {}", unexpected.join(", ")));
            }
            if !mismatched.is_empty() {
                reasons.push(format!("shape mismatch: {}", mismatched.join(", ")));
            }
            return Err(EvalError::checkpoint(source, reasons.join("; ")));
        }

        for (prefix, layer) in self.named_layers_mut() {
            for (name, values) in layer.state_mut() {
                let key = format!("{}.{}", prefix, name);
                if let Some(tensor) = checkpoint.get(&key) {
                    values.copy_from_slice(&tensor.values);
                }
            }
        }
        Ok(())
    }

    /// Every state tensor name (torchvision convention) with its shape.
    pub fn expected_state(&self) -> Vec<(String, Vec<usize>)> {
        self.named_layers()
            .into_iter()
            .flat_map(|(prefix, layer)| {
                layer
                    .state_shapes()
                    .into_iter()
                    .map(move |(name, shape)| (format!("{}.{}", prefix, name), shape))
            })
            .collect()
    }

    /// Learnable parameter count (running statistics excluded).
    pub fn parameter_count(&self) -> usize {
        self.named_layers()
            .iter()
            .map(|(_, layer)| layer.parameter_count())
            .sum()
    }

    pub fn config(&self) -> &ResNetConfig {
        &self.config
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    fn named_layers(&self) -> Vec<(String, &dyn Layer)> {
        let mut layers: Vec<(String, &dyn Layer)> = Vec::new();
        layers.push(("conv1".to_string(), &self.conv1));
        layers.push(("bn1".to_string(), &self.bn1));
        for (stage_idx, stage) in self.stages.iter().enumerate() {
            for (block_idx, block) in stage.iter().enumerate() {
                block.collect_layers(&format!("layer{}.{}", stage_idx + 1, block_idx), &mut layers);
            }
        }
        layers
    }

    fn named_layers_mut(&mut self) -> Vec<(String, &mut dyn Layer)> {
        let mut layers: Vec<(String, &mut dyn Layer)> = Vec::new();
        layers.push(("conv1".to_string(), &mut self.conv1));
        layers.push(("bn1".to_string(), &mut self.bn1));
        for (stage_idx, stage) in self.stages.iter_mut().enumerate() {
            for (block_idx, block) in stage.iter_mut().enumerate() {
                block.collect_layers_mut(
                    &format!("layer{}.{}", stage_idx + 1, block_idx),
                    &mut layers,
                );
            }
        }
        layers
    }
}

impl FeatureExtractor for ResNetBackbone {
    fn feature_dim(&self) -> usize {
        self.avgpool.output_size()
    }

    fn sample_len(&self) -> usize {
        self.conv1.input_size()
    }

    fn extract(&self, images: &[f32], batch_size: usize) -> Result<Vec<f32>> {
        let expected = batch_size * self.sample_len();
        if images.len() != expected {
            return Err(EvalError::Shape(format!(
                "backbone expects {} values for a batch of {} images of size {}, got {}",
                expected,
                batch_size,
                self.image_size,
                images.len()
            )));
        }
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let mut x = run_layer(&self.bn1, &run_layer(&self.conv1, images, batch_size), batch_size);
        relu_inplace(&mut x);
        let mut x = run_layer(&self.maxpool, &x, batch_size);
        for block in self.stages.iter().flatten() {
            x = block.forward(&x, batch_size);
        }
        Ok(run_layer(&self.avgpool, &x, batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> ResNetConfig {
        ResNetConfig {
            block_depths: vec![1, 1],
            base_width: 2,
        }
    }

    #[test]
    fn test_resnet50_feature_dim() {
        assert_eq!(ResNetConfig::resnet50().feature_dim(), 2048);
    }

    #[test]
    fn test_resnet50_state_names() {
        let backbone = ResNetBackbone::new(ResNetConfig::resnet50(), 32).unwrap();
        let state = backbone.expected_state();
        let names: Vec<&str> = state.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"conv1.weight"));
        assert!(names.contains(&"bn1.running_var"));
        assert!(names.contains(&"layer1.0.downsample.0.weight"));
        assert!(names.contains(&"layer4.2.bn3.bias"));
        assert!(!names.contains(&"layer1.1.downsample.0.weight"));
        assert!(!names.iter().any(|n| n.starts_with("fc.")));

        // torchvision resnet50 without fc: 25,557,032 - 2,049,000
        assert_eq!(backbone.parameter_count(), 23_508_032);
    }

    #[test]
    fn test_tiny_backbone_geometry() {
        let backbone = ResNetBackbone::new(tiny_config(), 16).unwrap();
        assert_eq!(backbone.feature_dim(), 16);
        assert_eq!(backbone.sample_len(), 3 * 16 * 16);
    }

    #[test]
    fn test_zero_weights_give_zero_features() {
        let backbone = ResNetBackbone::new(tiny_config(), 8).unwrap();
        let images = vec![0.7f32; 2 * backbone.sample_len()];
        let features = backbone.extract(&images, 2).unwrap();
        assert_eq!(features.len(), 2 * 16);
        assert!(features.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extract_rejects_wrong_length() {
        let backbone = ResNetBackbone::new(tiny_config(), 8).unwrap();
        let err = backbone.extract(&[0.0; 5], 1).unwrap_err();
        assert!(matches!(err, EvalError::Shape(_)));
    }

    #[test]
    fn test_invalid_config() {
        let config = ResNetConfig {
            block_depths: vec![],
            base_width: 8,
        };
        assert!(matches!(ResNetBackbone::new(config, 32), Err(e) if e.is_configuration()));
    }
}
