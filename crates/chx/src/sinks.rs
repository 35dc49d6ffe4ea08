//! 🕳️ Sinks: the broker-shaped hole at the end of the pipeline.
//!
//! The real broker client lives somewhere else and speaks its own wire protocol.
//! What we need from it is small: take a routed record, send it, and flush when
//! told. This module is that contract plus two stand-ins: one in memory (tests),
//! one on disk (dry runs, and audits of what would have been published).
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `SinkBackend` enum, resolved from `SinkConfig`
//! - Sinks are I/O only. No routing, no batching, no opinions about keys.

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::SinkConfig;
use crate::common::RoutedRecord;

pub(crate) mod file;
pub(crate) mod in_mem;

pub use file::{FileSink, FileSinkConfig};
pub use in_mem::InMemorySink;

/// 📡 Accepts routed records for delivery. `close` MUST be called. Skipping it is rude.
#[async_trait]
pub trait BrokerSink: std::fmt::Debug + Send {
    async fn send(&mut self, record: RoutedRecord) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a sink.
#[derive(Debug)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    File(FileSink),
}

impl SinkBackend {
    pub async fn from_config(config: SinkConfig) -> Result<Self> {
        Ok(match config {
            SinkConfig::InMemory => SinkBackend::InMemory(InMemorySink::new()),
            SinkConfig::File(config) => SinkBackend::File(FileSink::create(config).await?),
        })
    }
}

#[async_trait]
impl BrokerSink for SinkBackend {
    async fn send(&mut self, record: RoutedRecord) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(record).await,
            SinkBackend::File(sink) => sink.send(record).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::File(sink) => sink.close().await,
        }
    }
}
