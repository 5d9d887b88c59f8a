use anyhow::{bail, Context, Result};
use serde_json::error::Category;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::IndexCfg;
use crate::fetch::RemoteFetcher;
use crate::index::{ImageType, IndexAccumulator, IndexEntry, IndexStats, ModelIndex};
use crate::io::save_index;
use crate::record::{ImageSource, ModelRecord};
use crate::thumbnail::{decode_embedded, FailureReason, Thumbnail, ThumbnailNormalizer};

pub struct RunSummary {
    pub output: PathBuf,
    pub stats: IndexStats,
    pub size_bytes: u64,
}

pub struct Indexer {
    cfg: IndexCfg,
    normalizer: ThumbnailNormalizer,
    fetcher: Option<RemoteFetcher>,
}

impl Indexer {
    pub fn new(cfg: IndexCfg) -> Result<Self> {
        let normalizer = ThumbnailNormalizer::new(cfg.thumbnail.max_width, cfg.thumbnail.max_height);
        let fetcher = if cfg.fetch.enabled {
            Some(RemoteFetcher::new(&cfg.fetch).context("Failed to build HTTP client")?)
        } else {
            None
        };
        Ok(Self { cfg, normalizer, fetcher })
    }

    /// Build the index and write it next to (or wherever configured) the model files.
    pub async fn run(&self) -> Result<RunSummary> {
        let (index, stats) = self.build().await?;
        let output = self.cfg.output_path();
        let size_bytes = save_index(&output, &index)
            .await
            .with_context(|| format!("Failed to write index: {}", output.display()))?;
        Ok(RunSummary { output, stats, size_bytes })
    }

    pub async fn build(&self) -> Result<(ModelIndex, IndexStats)> {
        let dir = &self.cfg.models_dir;
        let output = self.cfg.output_path();
        let files = discover_model_files(dir, &output).await?;
        info!(count = files.len(), dir = %dir.display(), "found model files");

        let mut acc = IndexAccumulator::new();
        for name in &files {
            self.process_file(dir, name, &mut acc).await;
        }

        let stats = acc.stats();
        Ok((acc.finish(&self.cfg.version), stats))
    }

    async fn process_file(&self, dir: &Path, name: &str, acc: &mut IndexAccumulator) {
        info!(file = name, "processing");
        let bytes = match tokio::fs::read(dir.join(name)).await {
            Ok(b) => b,
            Err(e) => {
                warn!(file = name, error = %e, "failed to read model file, skipping");
                return;
            }
        };
        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) if matches!(e.classify(), Category::Syntax | Category::Eof) => {
                warn!(file = name, error = %e, "JSON decode error");
                acc.push_unreadable(IndexEntry::unreadable(name, &self.cfg.download_base_url));
                return;
            }
            Err(e) => {
                warn!(file = name, error = %e, "failed to parse model file, skipping");
                return;
            }
        };
        if !value.is_object() {
            warn!(file = name, "model file is not a JSON object, skipping");
            return;
        }
        let rec: ModelRecord = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = name, error = %e, "failed to read model fields, skipping");
                return;
            }
        };

        let mut entry = IndexEntry::from_record(name, &rec, &self.cfg.download_base_url);
        match rec.image_source() {
            ImageSource::Embedded(text) => {
                entry.image_type = ImageType::Base64;
                let outcome = decode_embedded(text).and_then(|raw| self.normalizer.normalize(&raw));
                self.apply(name, &mut entry, outcome, acc);
            }
            ImageSource::Remote(url) => {
                entry.image_type = ImageType::Url;
                match &self.fetcher {
                    Some(fetcher) if fetcher.is_allowed(url) => {
                        let outcome = match fetcher.fetch(url).await {
                            Ok(raw) => self.normalizer.normalize(&raw),
                            Err(e) => Err(e),
                        };
                        self.apply(name, &mut entry, outcome, acc);
                    }
                    _ => info!(file = name, url, "external image url, skipped"),
                }
            }
            ImageSource::None => debug!(file = name, "no image"),
        }

        info!(file = name, leds = entry.leds, width = entry.width, height = entry.height, "indexed");
        acc.push(entry);
    }

    fn apply(
        &self,
        name: &str,
        entry: &mut IndexEntry,
        outcome: Result<Thumbnail, FailureReason>,
        acc: &mut IndexAccumulator,
    ) {
        match outcome {
            Ok(thumb) => {
                debug!(file = name, width = thumb.width, height = thumb.height, "thumbnail generated");
                entry.set_thumbnail(thumb);
            }
            Err(reason) => {
                warn!(file = name, reason = reason.code(), "thumbnail failed: {reason}");
                acc.record_failure(&reason);
            }
        }
    }
}

/// `*.json` files directly inside `dir`, excluding the index itself, sorted by name.
pub async fn discover_model_files(dir: &Path, output: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        bail!("models directory '{}' does not exist", dir.display());
    }
    let skip = output.file_name().and_then(|n| n.to_str()).unwrap_or("index.json");

    let mut names = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else { continue };
        if name.to_lowercase().ends_with(".json") && name != "index.json" && name != skip {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::tests::png_bytes;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{Rgba, RgbaImage};
    use std::fs;

    fn offline_cfg(dir: &Path) -> IndexCfg {
        let mut cfg = IndexCfg { models_dir: dir.to_path_buf(), ..IndexCfg::default() };
        cfg.fetch.enabled = false;
        cfg
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn indexes_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let png = STANDARD.encode(png_bytes(RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255])).into()));

        write(dir, "b_embedded.json", &format!(r#"{{"ProductName":"Pad","LedCount":12,"Image":"data:image/png;base64,{png}"}}"#));
        write(dir, "a_plain.json", r#"{"Width": 4, "Height": 2}"#);
        write(dir, "c_broken.json", "{ not json");
        write(dir, "d_url.json", r#"{"ImageUrl":"https://example.com/x.png"}"#);
        write(dir, "e_bad_image.json", r#"{"Image":"aGVsbG8="}"#);
        write(dir, "index.json", "{}");
        write(dir, "notes.txt", "ignored");

        let indexer = Indexer::new(offline_cfg(dir)).unwrap();
        let (index, stats) = indexer.build().await.unwrap();

        let names: Vec<_> = index.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a_plain.json", "b_embedded.json", "c_broken.json", "d_url.json", "e_bad_image.json"]);
        assert_eq!(index.count, 5);
        assert_eq!(index.thumbnails, 1);

        let plain = &index.models[0];
        assert_eq!((plain.title.as_str(), plain.width, plain.height), ("a_plain", 4, 2));
        assert_eq!(plain.image_type, ImageType::None);

        let embedded = &index.models[1];
        assert_eq!(embedded.title, "Pad");
        assert_eq!(embedded.leds, 12);
        assert_eq!(embedded.image_type, ImageType::Base64);
        let thumb = crate::thumbnail::decode_data_uri(embedded.thumbnail.as_deref().unwrap()).unwrap();
        let img = image::load_from_memory(&thumb).unwrap();
        assert_eq!((img.width(), img.height()), (80, 40));

        let broken = &index.models[2];
        assert_eq!(broken.brand, "Error");
        assert!(broken.thumbnail.is_none());

        assert_eq!(index.models[3].image_type, ImageType::Url);
        assert!(index.models[3].thumbnail.is_none());

        assert_eq!(index.models[4].image_type, ImageType::Base64);
        assert!(index.models[4].thumbnail.is_none());

        assert_eq!((stats.base64, stats.url, stats.none), (2, 1, 2));
        assert_eq!(stats.unreadable, 1);
        assert_eq!(stats.failures.get("decode_error"), Some(&1));
    }

    #[tokio::test]
    async fn run_writes_index_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "one.json", r#"{"Brand":"Acme"}"#);

        let summary = Indexer::new(offline_cfg(tmp.path())).unwrap().run().await.unwrap();
        assert_eq!(summary.output, tmp.path().join("index.json"));

        let v: serde_json::Value = serde_json::from_slice(&fs::read(&summary.output).unwrap()).unwrap();
        assert_eq!(v["version"], "2.0");
        assert_eq!(v["count"], 1);
        assert_eq!(v["models"][0]["brand"], "Acme");
        assert_eq!(summary.size_bytes, fs::metadata(&summary.output).unwrap().len());

        // A second run must not pick up its own output.
        let again = Indexer::new(offline_cfg(tmp.path())).unwrap().run().await.unwrap();
        assert_eq!(again.stats.total, 1);
    }

    #[tokio::test]
    async fn missing_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Indexer::new(offline_cfg(&tmp.path().join("nope")))
            .unwrap()
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn partial_records_keep_what_they_can() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "a_mistyped.json", r#"{"ProductName":"Keep","Width":10.5,"LedCount":3}"#);
        write(dir, "b_array.json", "[1, 2]");
        write(dir, "c_truncated.json", r#"{"ProductName":"#);
        write(dir, "d_string.json", r#""just text""#);

        let (index, stats) = Indexer::new(offline_cfg(dir)).unwrap().build().await.unwrap();

        let names: Vec<_> = index.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a_mistyped.json", "c_truncated.json"]);

        let kept = &index.models[0];
        assert_eq!(kept.title, "Keep");
        assert_eq!(kept.leds, 3);
        assert_eq!(kept.width, 0);
        assert_eq!(kept.brand, "CompGen");

        assert_eq!(index.models[1].brand, "Error");
        assert_eq!(index.models[1].title, "c_truncated");
        assert_eq!(stats.unreadable, 1);
    }

    #[tokio::test]
    async fn remote_images_are_fetched_and_normalized() {
        use axum::{http::StatusCode, routing::get, Router};

        let png = png_bytes(RgbaImage::from_pixel(160, 40, Rgba([9, 9, 9, 255])).into());
        let app = Router::new()
            .route("/ok.png", get(move || { let png = png.clone(); async move { png } }))
            .route("/missing.png", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route("/huge.png", get(|| async { vec![0u8; 6 * 1024 * 1024] }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for (file, path) in [("a_ok.json", "ok.png"), ("b_missing.json", "missing.png"), ("c_huge.json", "huge.png")] {
            write(dir, file, &format!(r#"{{"ImageUrl":"http://{addr}/{path}"}}"#));
        }
        write(dir, "d_elsewhere.json", r#"{"ImageUrl":"https://example.com/x.png"}"#);

        let mut cfg = IndexCfg { models_dir: dir.to_path_buf(), ..IndexCfg::default() };
        cfg.fetch.allowed_hosts = vec!["127.0.0.1".into()];
        cfg.fetch.timeout_secs = 5;
        let (index, stats) = Indexer::new(cfg).unwrap().build().await.unwrap();

        assert!(index.models.iter().all(|m| m.image_type == ImageType::Url));
        let thumb = crate::thumbnail::decode_data_uri(index.models[0].thumbnail.as_deref().unwrap()).unwrap();
        let img = image::load_from_memory(&thumb).unwrap();
        assert_eq!((img.width(), img.height()), (80, 20));

        assert!(index.models[1..].iter().all(|m| m.thumbnail.is_none()));
        assert_eq!(index.thumbnails, 1);
        assert_eq!(stats.failures.get("http_error"), Some(&1));
        assert_eq!(stats.failures.get("too_large"), Some(&1));
        assert_eq!(stats.failures.values().sum::<u64>(), 2);
        assert_eq!(stats.url, 4);
    }
}
