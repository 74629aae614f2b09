//! Application configuration loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `RAASID_CONFIG` environment variable (path to TOML file)
//! 2. `raasid.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Every section and field carries `#[serde(default)]`, so a partial file
//! only overrides what it names. There is no global config singleton: the
//! loaded `AppConfig` is owned by the pipeline context and passed down
//! explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a pipeline deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub fusion: FusionConfig,
    pub analyzers: AnalyzerConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub distribution: DistributionConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RAASID_CONFIG` environment variable
    /// 2. `./raasid.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("RAASID_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from RAASID_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from RAASID_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "RAASID_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("raasid.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!("Loaded config from ./raasid.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./raasid.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot express.
    ///
    /// Warnings never break startup; callers decide whether to log or abort.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (category, weights) in [
            ("fusion.pose_weights", self.fusion.pose_weights.as_array()),
            ("fusion.contact_weights", self.fusion.contact_weights.as_array()),
            ("fusion.context_weights", self.fusion.context_weights.as_array()),
        ] {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > 1e-6 {
                warnings.push(format!(
                    "{category} sum to {sum:.4}, expected 1.0 — category scores will be skewed"
                ));
            }
            if weights.iter().any(|w| *w < 0.0) {
                warnings.push(format!("{category} contain a negative weight"));
            }
        }

        if !(0.0..=100.0).contains(&self.fusion.review_threshold) {
            warnings.push(format!(
                "fusion.review_threshold {} is outside [0, 100]",
                self.fusion.review_threshold
            ));
        }

        if self.pipeline.batch_size == 0 {
            warnings.push("pipeline.batch_size must be at least 1".to_string());
        }
        if self.pipeline.skip_stride == 0 {
            warnings.push("pipeline.skip_stride must be at least 1".to_string());
        }

        if self.distribution.targets.is_empty() {
            warnings.push(
                "distribution.targets is empty — decisions will only reach the local archive"
                    .to_string(),
            );
        }

        warnings
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Frame loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames processed concurrently per batch.
    pub batch_size: usize,
    /// Keep 1 out of every `skip_stride` source frames.
    pub skip_stride: u64,
    /// Stop after this many accepted frames (0 = unlimited).
    pub max_frames: u64,
    /// Flush metrics every N processed frames.
    pub metrics_flush_interval: u64,
    /// How long in-flight frames may finish after cancellation.
    pub cancel_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            skip_stride: 5,
            max_frames: 500,
            metrics_flush_interval: 100,
            cancel_grace_secs: 5,
        }
    }
}

/// Pose sub-score weights. Must sum to 1.0 (validated at load).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseWeights {
    pub hand_position: f64,
    pub body_position: f64,
    pub movement: f64,
}

impl PoseWeights {
    pub fn as_array(&self) -> [f64; 3] {
        [self.hand_position, self.body_position, self.movement]
    }
}

impl Default for PoseWeights {
    fn default() -> Self {
        Self {
            hand_position: 0.4,
            body_position: 0.3,
            movement: 0.3,
        }
    }
}

/// Contact sub-score weights. Must sum to 1.0 (validated at load).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactWeights {
    pub contact_probability: f64,
    pub contact_location: f64,
    pub contact_force: f64,
}

impl ContactWeights {
    pub fn as_array(&self) -> [f64; 3] {
        [
            self.contact_probability,
            self.contact_location,
            self.contact_force,
        ]
    }
}

impl Default for ContactWeights {
    fn default() -> Self {
        Self {
            contact_probability: 0.5,
            contact_location: 0.3,
            contact_force: 0.2,
        }
    }
}

/// Context sub-score weights. Must sum to 1.0 (validated at load).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWeights {
    pub game_situation: f64,
    pub player_intent: f64,
    pub play_context: f64,
}

impl ContextWeights {
    pub fn as_array(&self) -> [f64; 3] {
        [self.game_situation, self.player_intent, self.play_context]
    }
}

impl Default for ContextWeights {
    fn default() -> Self {
        Self {
            game_situation: 0.4,
            player_intent: 0.3,
            play_context: 0.3,
        }
    }
}

/// Fusion engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Certainty (0–100) below which VAR review is required.
    pub review_threshold: f64,
    /// Category-score cut (0–1) separating violation from no-violation.
    pub violation_cut: f64,
    pub pose_weights: PoseWeights,
    pub contact_weights: ContactWeights,
    pub context_weights: ContextWeights,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            review_threshold: 95.0,
            violation_cut: 0.5,
            pose_weights: PoseWeights::default(),
            contact_weights: ContactWeights::default(),
            context_weights: ContextWeights::default(),
        }
    }
}

/// External analyzer endpoints and call timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub pose_url: String,
    pub contact_url: String,
    pub context_url: String,
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            pose_url: "http://127.0.0.1:8000/pose_estimation".to_string(),
            contact_url: "http://127.0.0.1:8000/ball_contact_ai".to_string(),
            context_url: "http://127.0.0.1:8000/event_context_ai".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Cache tier settings (in-process + shared remote).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_ttl_secs: u64,
    /// Base URL of the shared key-value cache; None disables the tier.
    pub remote_url: Option<String>,
    pub remote_ttl_secs: u64,
    /// Consecutive failures before the remote tier is marked unavailable.
    pub max_consecutive_failures: u32,
    pub remote_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 3600,
            remote_url: None,
            remote_ttl_secs: 3600,
            max_consecutive_failures: 3,
            remote_timeout_secs: 5,
        }
    }
}

/// Durable tier settings (object store + local file fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Object store endpoint; None means local files only.
    pub endpoint: Option<String>,
    pub bucket: String,
    /// Directory for the local-file fallback.
    pub data_dir: PathBuf,
    /// Key the ordered decision log is persisted under.
    pub log_key: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "raasid-decision-logs-bucket".to_string(),
            data_dir: PathBuf::from("data"),
            log_key: "decision_logs".to_string(),
            timeout_secs: 10,
        }
    }
}

/// One downstream consumer of finalized decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
}

/// Distribution targets and local audit archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub audit_dir: PathBuf,
    pub timeout_secs: u64,
    /// Open list — add or remove consumers without code changes.
    pub targets: Vec<TargetConfig>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            audit_dir: PathBuf::from("logs/decisions"),
            timeout_secs: 10,
            targets: vec![
                TargetConfig {
                    name: "referee_smartwatch".to_string(),
                    url: "http://127.0.0.1:8000/referee_smartwatch".to_string(),
                },
                TargetConfig {
                    name: "tv_broadcast".to_string(),
                    url: "http://127.0.0.1:8000/tv_broadcast".to_string(),
                },
                TargetConfig {
                    name: "cloud_storage".to_string(),
                    url: "http://127.0.0.1:8000/cloud_storage".to_string(),
                },
            ],
        }
    }
}

/// Metrics accumulator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml_str = r#"
            [pipeline]
            batch_size = 4

            [fusion]
            review_threshold = 90.0
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.batch_size, 4);
        assert_eq!(config.pipeline.skip_stride, 5); // default untouched
        assert_eq!(config.fusion.review_threshold, 90.0);
        assert_eq!(config.fusion.contact_weights.contact_probability, 0.5);
    }

    #[test]
    fn non_unit_weights_flagged() {
        let mut config = AppConfig::default();
        config.fusion.pose_weights.hand_position = 0.9;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("pose_weights")));
    }

    #[test]
    fn zero_batch_size_flagged() {
        let mut config = AppConfig::default();
        config.pipeline.batch_size = 0;
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn targets_parse_from_toml() {
        let toml_str = r#"
            [distribution]
            audit_dir = "out/audit"

            [[distribution.targets]]
            name = "var_replay"
            url = "http://127.0.0.1:9000/var_replay"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.distribution.targets.len(), 1);
        assert_eq!(config.distribution.targets[0].name, "var_replay");
    }
}
