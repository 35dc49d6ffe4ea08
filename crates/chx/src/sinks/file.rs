//! 📝 FileSink: writes every routed record as one JSON line.
//!
//! What the broker would have received, in the order it would have received it.
//! Handy for dry runs, and for proving to a skeptical colleague that chunk 3
//! really did carry the terminal header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::debug;

use crate::common::RoutedRecord;
use crate::sinks::BrokerSink;

#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub file_name: String,
}

#[derive(Debug)]
pub struct FileSink {
    writer: BufWriter<File>,
    config: FileSinkConfig,
    written: u64,
}

impl FileSink {
    pub async fn create(config: FileSinkConfig) -> Result<Self> {
        let file = File::create(&config.file_name).await.context(format!(
            "💀 Could not create '{}'. The directory may not exist, or it may not like us.",
            config.file_name
        ))?;
        Ok(Self {
            writer: BufWriter::new(file),
            config,
            written: 0,
        })
    }
}

#[async_trait]
impl BrokerSink for FileSink {
    async fn send(&mut self, record: RoutedRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record).context("💀 Routed record refused to serialize")?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .context(format!("💀 Write to '{}' failed. Disk full? Disk gone?", self.config.file_name))?;
        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .context(format!("💀 Final flush of '{}' failed", self.config.file_name))?;
        debug!("🗑️ FileSink closed after {} records", self.written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn the_one_where_each_record_gets_its_own_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("published.ndjson");
        let mut sink = FileSink::create(FileSinkConfig {
            file_name: path.display().to_string(),
        })
        .await?;

        for key in ["1", "2"] {
            sink.send(RoutedRecord {
                topic: "topic".into(),
                key: key.into(),
                value: "{}".into(),
                headers: BTreeMap::from([("jobId".to_string(), "job-1".to_string())]),
            })
            .await?;
        }
        sink.close().await?;

        let contents = std::fs::read_to_string(&path)?;
        let lines: Vec<RoutedRecord> = contents
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].key, "2");
        assert_eq!(lines[0].header("jobId"), Some("job-1"));
        Ok(())
    }
}
