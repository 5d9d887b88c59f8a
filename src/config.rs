use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DOWNLOAD_BASE: &str = "https://cdn.jsdelivr.net/gh/601338232/signalrgb-models/main/models/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbCfg {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ThumbCfg {
    fn default() -> Self {
        Self { max_width: 80, max_height: 80 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_bytes: u64,
    pub user_agent: String,
    /// Hosts (and their subdomains) remote images may be downloaded from.
    /// Empty means any host.
    pub allowed_hosts: Vec<String>,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
            max_bytes: 5 * 1024 * 1024,
            user_agent: "Mozilla/5.0 (SignalRGB-Model-Indexer/1.0)".into(),
            allowed_hosts: vec!["github.com".into(), "raw.githubusercontent.com".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexCfg {
    pub models_dir: PathBuf,
    /// Defaults to `<models_dir>/index.json`.
    pub output: Option<PathBuf>,
    pub version: String,
    pub download_base_url: String,
    /// Index size (KiB) above which a warning is logged.
    pub warn_size_kib: u64,
    pub thumbnail: ThumbCfg,
    pub fetch: FetchCfg,
}

impl Default for IndexCfg {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            output: None,
            version: "2.0".into(),
            download_base_url: DEFAULT_DOWNLOAD_BASE.into(),
            warn_size_kib: 1000,
            thumbnail: ThumbCfg::default(),
            fetch: FetchCfg::default(),
        }
    }
}

impl IndexCfg {
    pub async fn load(path: &Path) -> Result<Self> {
        let txt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&txt).context("Failed to parse config YAML")
    }

    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.models_dir.join("index.json"))
    }
}
