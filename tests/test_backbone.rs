//! Tests for the frozen ResNet backbone and its checkpoints
//!
//! This file covers:
//! - Loading a checkpoint by model name from a models directory
//! - Strict key and shape matching
//! - Inference behaviour (per-sample independence, determinism, non-negative features)

use linear_eval::backbone::{Checkpoint, FeatureExtractor, ResNetBackbone, ResNetConfig};
use linear_eval::utils::SimpleRng;
use linear_eval::EvalError;
use std::path::Path;
use tempfile::tempdir;

const IMAGE_SIZE: usize = 8;

/// Uniform sample in [0, 1).
fn uniform(rng: &mut SimpleRng) -> f32 {
    rng.next_u32() as f32 / (u32::MAX as f32 + 1.0)
}

fn tiny_config() -> ResNetConfig {
    ResNetConfig {
        block_depths: vec![2, 1],
        base_width: 2,
    }
}

/// Random weights for every tensor the architecture expects.
fn random_checkpoint(backbone: &ResNetBackbone, seed: u64) -> Checkpoint {
    let mut rng = SimpleRng::new(seed);
    let mut checkpoint = Checkpoint::new();
    for (name, shape) in backbone.expected_state() {
        let count: usize = shape.iter().product();
        let values: Vec<f32> = (0..count)
            .map(|_| {
                let u = uniform(&mut rng);
                if name.ends_with("running_var") {
                    0.5 + u
                } else if name.ends_with("bn1.weight")
                    || name.ends_with("bn2.weight")
                    || name.ends_with("bn3.weight")
                {
                    0.5 + u
                } else {
                    u - 0.5
                }
            })
            .collect();
        checkpoint.insert(name, shape, values).unwrap();
    }
    checkpoint
}

fn random_images(batch: usize, seed: u64) -> Vec<f32> {
    let mut rng = SimpleRng::new(seed);
    (0..batch * 3 * IMAGE_SIZE * IMAGE_SIZE)
        .map(|_| uniform(&mut rng) * 2.0 - 1.0)
        .collect()
}

fn save_model(dir: &Path, name: &str, checkpoint: &Checkpoint) {
    checkpoint
        .save(&Checkpoint::path_for(dir, name))
        .expect("failed to write checkpoint");
}

// ============================================================================
// Checkpoint Loading Tests
// ============================================================================

mod loading_tests {
    use super::*;

    #[test]
    fn test_state_names_follow_torchvision() {
        let backbone = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let names: Vec<String> = backbone.expected_state().into_iter().map(|(n, _)| n).collect();

        assert!(names.contains(&"layer1.0.downsample.0.weight".to_string()));
        assert!(names.contains(&"layer1.0.downsample.1.running_mean".to_string()));
        assert!(!names.contains(&"layer1.1.downsample.0.weight".to_string()));
        assert!(names.contains(&"layer2.0.downsample.0.weight".to_string()));
        assert!(names.contains(&"layer1.1.conv2.weight".to_string()));
    }

    #[test]
    fn test_from_checkpoint_matches_direct_load() {
        let dir = tempdir().unwrap();
        let template = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let checkpoint = random_checkpoint(&template, 3);
        save_model(dir.path(), "tiny", &checkpoint);

        let loaded =
            ResNetBackbone::from_checkpoint(dir.path(), "tiny", tiny_config(), IMAGE_SIZE).unwrap();
        let mut direct = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        direct
            .load_checkpoint(&checkpoint, Path::new("in-memory"))
            .unwrap();

        let images = random_images(2, 9);
        let a = loaded.extract(&images, 2).unwrap();
        let b = direct.extract(&images, 2).unwrap();
        assert_eq!(a.len(), 2 * tiny_config().feature_dim());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!(a.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_missing_checkpoint_file() {
        let dir = tempdir().unwrap();
        let err = ResNetBackbone::from_checkpoint(dir.path(), "absent", tiny_config(), IMAGE_SIZE)
            .err()
            .unwrap();
        assert!(matches!(err, EvalError::Checkpoint { .. }));
        assert!(err.to_string().contains("absent.safetensors"));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let mut backbone = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let full = random_checkpoint(&backbone, 1);

        let mut partial = Checkpoint::new();
        for name in full.names().filter(|n| *n != "layer2.0.bn3.running_var") {
            let tensor = full.get(name).unwrap();
            partial
                .insert(name, tensor.shape.clone(), tensor.values.clone())
                .unwrap();
        }

        let err = backbone
            .load_checkpoint(&partial, Path::new("partial.safetensors"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing keys"));
        assert!(message.contains("layer2.0.bn3.running_var"));
    }

    #[test]
    fn test_classification_head_is_unexpected() {
        let mut backbone = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let mut checkpoint = random_checkpoint(&backbone, 2);
        checkpoint
            .insert("fc.weight", vec![10, 32], vec![0.0; 320])
            .unwrap();

        let err = backbone
            .load_checkpoint(&checkpoint, Path::new("with_fc.safetensors"))
            .unwrap_err();
        assert!(err.to_string().contains("unexpected keys: fc.weight"));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut backbone = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let mut checkpoint = random_checkpoint(&backbone, 4);
        checkpoint
            .insert("conv1.weight", vec![2, 3, 3, 3], vec![0.0; 54])
            .unwrap();

        let err = backbone
            .load_checkpoint(&checkpoint, Path::new("bad_shape.safetensors"))
            .unwrap_err();
        assert!(matches!(err, EvalError::Checkpoint { .. }));
        assert!(err.to_string().contains("shape mismatch: conv1.weight"));
    }

    #[test]
    fn test_batch_counters_are_ignored() {
        let dir = tempdir().unwrap();
        let template = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let mut checkpoint = random_checkpoint(&template, 5);
        checkpoint
            .insert("bn1.num_batches_tracked", vec![], vec![100.0])
            .unwrap();
        save_model(dir.path(), "counters", &checkpoint);

        assert!(
            ResNetBackbone::from_checkpoint(dir.path(), "counters", tiny_config(), IMAGE_SIZE)
                .is_ok()
        );
    }
}

// ============================================================================
// Inference Tests
// ============================================================================

mod inference_tests {
    use super::*;

    fn loaded_backbone(seed: u64) -> ResNetBackbone {
        let mut backbone = ResNetBackbone::new(tiny_config(), IMAGE_SIZE).unwrap();
        let checkpoint = random_checkpoint(&backbone, seed);
        backbone
            .load_checkpoint(&checkpoint, Path::new("random"))
            .unwrap();
        backbone
    }

    #[test]
    fn test_samples_are_independent() {
        let backbone = loaded_backbone(11);
        let images = random_images(3, 12);
        let batched = backbone.extract(&images, 3).unwrap();

        let len = backbone.sample_len();
        let dim = backbone.feature_dim();
        for i in 0..3 {
            let single = backbone
                .extract(&images[i * len..(i + 1) * len], 1)
                .unwrap();
            for (a, b) in single.iter().zip(&batched[i * dim..(i + 1) * dim]) {
                assert!((a - b).abs() < 1e-5, "sample {}: {} vs {}", i, a, b);
            }
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let backbone = loaded_backbone(13);
        let images = random_images(2, 14);
        assert_eq!(
            backbone.extract(&images, 2).unwrap(),
            backbone.extract(&images, 2).unwrap()
        );
    }

    #[test]
    fn test_features_are_non_negative() {
        let backbone = loaded_backbone(15);
        let features = backbone.extract(&random_images(4, 16), 4).unwrap();
        assert!(features.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_empty_batch() {
        let backbone = loaded_backbone(17);
        assert!(backbone.extract(&[], 0).unwrap().is_empty());
    }
}
