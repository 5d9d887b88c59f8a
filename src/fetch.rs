use anyhow::Result;
use futures_util::StreamExt;
use reqwest::Url;
use std::time::Duration;

use crate::config::FetchCfg;
use crate::thumbnail::FailureReason;

/// Single-attempt, size- and time-bounded downloader for `ImageUrl` records.
pub struct RemoteFetcher {
    client: reqwest::Client,
    max_bytes: u64,
    allowed_hosts: Vec<String>,
}

impl RemoteFetcher {
    pub fn new(cfg: &FetchCfg) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_bytes: cfg.max_bytes,
            allowed_hosts: cfg.allowed_hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        })
    }

    /// Whether `url` points at a host we are willing to download from.
    /// An empty allow list accepts any http(s) URL.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = parsed.host_str() else { return false };
        let host = host.to_ascii_lowercase();
        self.allowed_hosts
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FailureReason> {
        let resp = self.client.get(url).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FailureReason::Http(format!("status {status}")));
        }
        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FailureReason::TooLarge { limit: self.max_bytes });
        }

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify)?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FailureReason::TooLarge { limit: self.max_bytes });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn classify(err: reqwest::Error) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::http(err)
    }
}
