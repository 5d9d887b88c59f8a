use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod fetch;
mod index;
mod indexer;
mod io;
mod record;
mod thumbnail;

use config::IndexCfg;
use indexer::Indexer;

/// Build `index.json` (with embedded PNG thumbnails) for a directory of model files.
#[derive(Debug, Parser)]
#[command(name = "model-index", version)]
struct Cli {
    /// Directory containing the model `.json` files.
    #[arg(long, env = "MODEL_INDEX_DIR")]
    models_dir: Option<PathBuf>,

    /// Where to write the index (default: <models-dir>/index.json).
    #[arg(long, env = "MODEL_INDEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Optional YAML config; CLI flags win over it.
    #[arg(long, env = "MODEL_INDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Thumbnail bounding box (both sides).
    #[arg(long, env = "MODEL_INDEX_MAX_SIZE")]
    max_size: Option<u32>,

    #[arg(long, env = "MODEL_INDEX_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Never download `ImageUrl` images.
    #[arg(long, env = "MODEL_INDEX_NO_REMOTE")]
    no_remote: bool,
}

impl Cli {
    async fn into_config(self) -> Result<IndexCfg> {
        let mut cfg = match &self.config {
            Some(path) => IndexCfg::load(path).await?,
            None => IndexCfg::default(),
        };
        if let Some(dir) = self.models_dir { cfg.models_dir = dir; }
        if let Some(out) = self.output { cfg.output = Some(out); }
        if let Some(px) = self.max_size {
            cfg.thumbnail.max_width = px;
            cfg.thumbnail.max_height = px;
        }
        if let Some(secs) = self.timeout_secs { cfg.fetch.timeout_secs = secs; }
        if self.no_remote { cfg.fetch.enabled = false; }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Cli::parse().into_config().await?;
    let warn_kib = cfg.warn_size_kib;

    let summary = Indexer::new(cfg)?.run().await?;
    let stats = &summary.stats;
    let kib = summary.size_bytes as f64 / 1024.0;

    info!(
        total = stats.total,
        thumbnails = stats.thumbnails,
        base64 = stats.base64,
        url = stats.url,
        none = stats.none,
        unreadable = stats.unreadable,
        "index statistics"
    );
    for (reason, n) in &stats.failures {
        info!(reason, count = n, "thumbnail failures");
    }
    info!(path = %summary.output.display(), size_kib = %format!("{kib:.1}"), "index written");
    if kib > warn_kib as f64 {
        warn!(size_kib = %format!("{kib:.1}"), limit_kib = warn_kib, "index file is unusually large");
    }
    Ok(())
}
