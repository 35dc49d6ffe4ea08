//! 🎬 *[a file full of records. a broker that only eats chunks.]*
//! *[one crate to slice, wrap, key and hand them over, in order, without drowning anyone.]* 🦆
//!
//! 📦 chx: a backpressure-aware chunk producer.
//!
//! A [`readers::RecordReader`] hands out batches. The [`stream::ChunkStream`] turns each batch
//! into a gzip+base64 [`envelope::Envelope`], gives it a rotating routing key, tags it with the
//! job id, and pushes it through a bounded [`queue::DeliveryQueue`] to a consumer. After the
//! last batch comes one empty chunk carrying the `__terminal__` header, and then the stream closes.
//! The [`publisher`] is the stock consumer: it feeds a [`sinks::BrokerSink`] with a fixed number of
//! records in flight.
//!
//! 🧠 Knowledge graph:
//! - reader (sync, pull) → pump task → delivery queue → handler → publisher → sink (async, push)
//! - configs live next to what they configure, and are assembled in [`app_config`]

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::info;

pub mod app_config;
pub mod common;
pub mod envelope;
pub mod error;
pub mod keyer;
pub(crate) mod progress;
pub mod publisher;
pub mod queue;
pub mod readers;
pub mod sinks;
pub mod stream;

pub use error::StreamError;

use crate::app_config::AppConfig;
use crate::publisher::PublishSummary;
use crate::readers::ReaderBackend;
use crate::sinks::SinkBackend;
use crate::stream::ChunkStream;

/// 🚀 Read everything the config points at and publish it, chunk by chunk, into the configured sink.
pub async fn run(app_config: AppConfig) -> Result<PublishSummary> {
    let AppConfig {
        stream: stream_config,
        reader_config,
        sink_config,
    } = app_config;

    let total_expected = match stream_config.total_expected {
        Some(total_expected) => total_expected,
        None => reader_config
            .count_records()
            .context("💀 No total_expected configured, and counting the source failed too")?,
    };
    info!(
        "🔮 job {} expects {} records, publishing to topic {}",
        stream_config.job_id, total_expected, stream_config.topic
    );

    let reader = ReaderBackend::from_config(reader_config).context("💀 Could not open the reader")?;
    let sink = SinkBackend::from_config(sink_config)
        .await
        .context("💀 Could not open the sink")?;
    let stream = ChunkStream::spawn(&Handle::current(), reader, stream_config.settings(total_expected))
        .context("💀 The stream settings were rejected")?;

    let summary = publisher::publish(&stream, sink, stream_config.in_flight).await?;
    info!("📊 records per routing key:\n{}", summary.render());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{ReaderConfig, SinkConfig, StreamConfig};
    use crate::common::{ContentFormat, RoutedRecord, TERMINAL_HEADER};
    use crate::envelope::Envelope;
    use crate::readers::FileReaderConfig;
    use crate::sinks::FileSinkConfig;
    use std::collections::BTreeMap;

    fn stream_config(total_expected: Option<u64>) -> StreamConfig {
        StreamConfig {
            topic: "DI_RAW_RECORDS_CHUNK_READ".into(),
            job_id: "job-e2e".into(),
            tenant: "diku".into(),
            fanout_width: 3,
            queue_capacity: 1,
            in_flight: 2,
            total_expected,
            headers: BTreeMap::from([("x-okapi-url".to_string(), "http://okapi:9130".to_string())]),
        }
    }

    #[tokio::test]
    async fn the_one_where_a_file_goes_in_and_chunks_come_out() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("records.jsonl");
        let output = dir.path().join("published.ndjson");
        let lines: Vec<String> = (0..10).map(|i| format!("{{\"id\":{i}}}")).collect();
        std::fs::write(&input, lines.join("\n\n"))?;

        let app_config = AppConfig {
            stream: stream_config(None),
            reader_config: ReaderConfig::File(FileReaderConfig {
                file_name: input.display().to_string(),
                content_format: ContentFormat::Json,
                batch_size: 4,
                show_progress: false,
            }),
            sink_config: SinkConfig::File(FileSinkConfig {
                file_name: output.display().to_string(),
            }),
        };

        let summary = run(app_config).await?;
        // -- 📦 4 + 4 + 2, then the terminal chunk
        assert_eq!(summary.records_sent, 4);

        let published: Vec<RoutedRecord> = std::fs::read_to_string(&output)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(
            published.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "0", "1"]
        );
        assert!(published[3].is_terminal());
        assert_eq!(published[3].header(TERMINAL_HEADER), Some("true"));
        assert!(published.iter().all(|r| r.header("x-okapi-url") == Some("http://okapi:9130")));

        let chunks = published
            .iter()
            .map(|r| Envelope::from_json(&r.value)?.decode_chunk())
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(
            chunks.iter().map(|c| c.metadata.cumulative_count).collect::<Vec<_>>(),
            vec![4, 8, 10, 10]
        );
        // -- 🔢 counted from the file since the config left it out
        assert!(chunks.iter().all(|c| c.metadata.total_expected == 10));
        assert_eq!(chunks[1].records[0].record, "{\"id\":4}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_configured_total_wins_over_counting() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("published.ndjson");
        let app_config = AppConfig {
            stream: stream_config(Some(1_000)),
            reader_config: ReaderConfig::InMemory(crate::readers::InMemoryReaderConfig {
                records: vec!["a".into(), "b".into(), "c".into()],
                batch_size: 2,
                content_format: ContentFormat::Raw,
            }),
            sink_config: SinkConfig::File(FileSinkConfig {
                file_name: output.display().to_string(),
            }),
        };
        let summary = run(app_config).await?;
        assert_eq!(summary.records_sent, 3);

        let chunks = std::fs::read_to_string(&output)?
            .lines()
            .map(|line| {
                let record: RoutedRecord = serde_json::from_str(line)?;
                Envelope::from_json(&record.value)?.decode_chunk()
            })
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(chunks.len(), 3);
        // -- 🔮 3 records on hand, 1000 promised, and the promise is what gets stamped
        assert!(chunks.iter().all(|c| c.metadata.total_expected == 1_000));
        assert_eq!(chunks[2].metadata.cumulative_count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_zero_width_fanout_is_turned_away() {
        let mut config = stream_config(Some(0));
        config.fanout_width = 0;
        let app_config = AppConfig {
            stream: config,
            reader_config: ReaderConfig::InMemory(crate::readers::InMemoryReaderConfig {
                records: vec![],
                batch_size: 1,
                content_format: ContentFormat::Raw,
            }),
            sink_config: SinkConfig::InMemory,
        };
        let err = run(app_config).await.expect_err("💀 width 0 must not run");
        assert!(format!("{err:#}").contains("fanout"), "got: {err:#}");
    }
}
