//! Face swap service configuration

use serde::Deserialize;
use std::path::PathBuf;

use crate::service::OutputKeyPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// OpenVINO device name ("CPU", "GPU", ...)
    pub device: String,
    /// Load models at startup instead of on the first request
    pub preload: bool,
    /// Detector input resolution (width, height)
    pub det_size: (u32, u32),
    pub det_threshold: f32,
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub swapper: PathBuf,
    pub swapper_url: Option<String>,
    pub restorer: PathBuf,
    pub restorer_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub restoration_enabled: bool,
    pub output_key_policy: OutputKeyPolicy,
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    /// Root directory for the local backend
    pub local_root: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }

    /// Apply environment overrides (`PORT`)
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelsConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            body_limit_mb: 20,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            preload: true,
            det_size: (640, 640),
            det_threshold: 0.5,
            detector: PathBuf::from("models/det_10g.onnx"),
            recognizer: PathBuf::from("models/w600k_r50.onnx"),
            swapper: PathBuf::from("models/inswapper_128.onnx"),
            swapper_url: None,
            restorer: PathBuf::from("models/GFPGANv1.4.onnx"),
            restorer_url: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            restoration_enabled: false,
            output_key_policy: OutputKeyPolicy::Simple,
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            region: None,
            endpoint: None,
            local_root: PathBuf::from("data/buckets"),
        }
    }
}
