use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};

use crate::index::ModelIndex;

/// Write the index as pretty JSON via a `.tmp` sibling. Returns the size in bytes.
pub async fn save_index(path: &Path, index: &ModelIndex) -> anyhow::Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut bytes = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    index.serialize(&mut serde_json::Serializer::with_formatter(&mut bytes, fmt))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    if let Err(e) = write_then_rename(tmp, path, &bytes).await {
        let _ = fs::remove_file(tmp).await;
        return Err(e);
    }
    Ok(bytes.len() as u64)
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    {
        let mut f = fs::File::create(tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        f.write_all(bytes).await?;
        let _ = f.sync_all().await; // best-effort
    }
    fs::rename(tmp, path).await?;
    Ok(())
}
