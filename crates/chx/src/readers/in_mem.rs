//! # Previously, on chx...
//!
//! 🎬 The records were already in memory. They had nowhere to go. Someone had to
//! hand them out, a few at a time, and then admit there were no more.
//!
//! `InMemoryReader` does exactly that. It is for tests, demos, and anyone who
//! wants to see the pump work without first finding a 2GB MARC file. 🦆

use anyhow::Result;
use serde::Deserialize;

use crate::common::{Batch, ContentFormat, RawRecord};
use crate::readers::RecordReader;

fn default_batch_size() -> usize {
    50
}

/// 📦 Config for the in-memory reader: the records themselves, inline.
#[derive(Debug, Deserialize, Clone)]
pub struct InMemoryReaderConfig {
    pub records: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub content_format: ContentFormat,
}

/// 📦 Hands out a fixed list of records in fixed-size batches.
#[derive(Debug, Clone)]
pub struct InMemoryReader {
    records: Vec<RawRecord>,
    batch_size: usize,
    cursor: usize,
    content_format: ContentFormat,
}

impl InMemoryReader {
    /// `batch_size` of 0 is bumped to 1. A reader that never yields is a different, sadder reader.
    pub fn new<S: Into<String>>(
        records: impl IntoIterator<Item = S>,
        batch_size: usize,
        content_format: ContentFormat,
    ) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(order, record)| RawRecord::new(record, Some(order as u64)))
            .collect();
        Self {
            records,
            batch_size: batch_size.max(1),
            cursor: 0,
            content_format,
        }
    }

    pub fn from_config(config: InMemoryReaderConfig) -> Self {
        Self::new(config.records, config.batch_size, config.content_format)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordReader for InMemoryReader {
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.cursor < self.records.len())
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let end = (self.cursor + self.batch_size).min(self.records.len());
        let batch = self.records[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    fn content_format(&self) -> ContentFormat {
        self.content_format
    }
}
