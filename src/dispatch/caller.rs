// src/dispatch/caller.rs

//! Host service surface.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Performs a single service call on the host platform.
pub trait ServiceCaller: Send + Sync {
    fn call(&self, domain: &str, service: &str, data: Map<String, Value>) -> BoxFuture<'_, Result<()>>;
}

/// Caller that only logs. Used when no host service sink is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingServiceCaller;

impl ServiceCaller for LoggingServiceCaller {
    fn call(&self, domain: &str, service: &str, data: Map<String, Value>) -> BoxFuture<'_, Result<()>> {
        let data = Value::Object(data);
        info!(%domain, %service, %data, "service call");
        Box::pin(async { Ok(()) })
    }
}

/// Appends each call as one JSON line to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesServiceCaller {
    path: PathBuf,
    // Serializes appends so lines from concurrent entities never interleave.
    lock: Arc<Mutex<()>>,
}

impl JsonLinesServiceCaller {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }
}

impl ServiceCaller for JsonLinesServiceCaller {
    fn call(&self, domain: &str, service: &str, data: Map<String, Value>) -> BoxFuture<'_, Result<()>> {
        let record = json!({
            "at": Utc::now().to_rfc3339(),
            "domain": domain,
            "service": service,
            "data": data,
        });

        Box::pin(async move {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');

            let _guard = self.lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .with_context(|| format!("opening service log {:?}", self.path))?;
            file.write_all(&line)
                .await
                .with_context(|| format!("appending to service log {:?}", self.path))?;
            // tokio finishes file writes in the background; wait for it
            // before the next call may append.
            file.flush()
                .await
                .with_context(|| format!("flushing service log {:?}", self.path))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_lines_caller_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let caller = JsonLinesServiceCaller::new(&path);

        let mut data = Map::new();
        data.insert("entity_id".into(), json!("light.porch"));
        caller.call("homeassistant", "turn_on", data).await.unwrap();
        caller.call("notify", "notify", Map::new()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["service"], json!("turn_on"));
        assert_eq!(lines[0]["data"]["entity_id"], json!("light.porch"));
        assert_eq!(lines[1]["domain"], json!("notify"));
    }

    #[tokio::test]
    async fn every_call_is_on_disk_when_it_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let caller = JsonLinesServiceCaller::new(&path);

        for i in 0..50 {
            let mut data = Map::new();
            data.insert("n".into(), json!(i));
            caller.call("homeassistant", "toggle", data).await.unwrap();

            let text = std::fs::read_to_string(&path).unwrap();
            let last: Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
            assert_eq!(text.lines().count(), i + 1);
            assert_eq!(last["data"]["n"], json!(i));
        }
    }

    #[tokio::test]
    async fn logging_caller_accepts_any_payload() {
        let mut data = Map::new();
        data.insert("message".into(), json!("hi"));
        LoggingServiceCaller.call("notify", "notify", data).await.unwrap();
    }
}
