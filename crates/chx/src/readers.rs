//! 📖 Readers: where records come from, one batch at a time.
//!
//! 🚰 A reader is a faucet with a peephole: you can ask whether there's more
//! (`has_next`), take the next batch (`next_batch`), and ask what kind of water
//! is coming out (`content_format`). It is synchronous on purpose. It may block.
//! That is between the reader and its disk.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`InMemoryReader`, `FileReader`) → `ReaderBackend` enum
//! - The pump calls these from its own task only, never concurrently.
//! - Any `Err` here becomes a production error on the stream. 🦆

use std::path::Path;

use anyhow::Result;

use crate::app_config::ReaderConfig;
use crate::common::{Batch, ContentFormat};

pub(crate) mod file;
pub(crate) mod in_mem;

pub use file::{FileReader, FileReaderConfig, count_records};
pub use in_mem::{InMemoryReader, InMemoryReaderConfig};

/// 📚 A synchronous, pull-based source of record batches.
///
/// # Contract 📜
/// - `has_next` peeks. Calling it twice in a row gives the same answer and consumes nothing.
/// - `next_batch` consumes the next batch. Calling it after `has_next` said `false` is on you.
/// - `content_format` is fixed for the lifetime of the reader.
pub trait RecordReader: std::fmt::Debug + Send {
    fn has_next(&mut self) -> Result<bool>;
    fn next_batch(&mut self) -> Result<Batch>;
    fn content_format(&self) -> ContentFormat;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }

    fn next_batch(&mut self) -> Result<Batch> {
        (**self).next_batch()
    }

    fn content_format(&self) -> ContentFormat {
        (**self).content_format()
    }
}

/// 🎭 The many faces of a reader, resolved from config.
#[derive(Debug)]
pub enum ReaderBackend {
    InMemory(InMemoryReader),
    File(FileReader),
}

impl ReaderBackend {
    /// 🏗️ Open whatever the config points at.
    pub fn from_config(config: ReaderConfig) -> Result<Self> {
        Ok(match config {
            ReaderConfig::InMemory(config) => ReaderBackend::InMemory(InMemoryReader::from_config(config)),
            ReaderConfig::File(config) => ReaderBackend::File(FileReader::open(config)?),
        })
    }
}

impl ReaderConfig {
    /// 🔢 How many records this source holds, for filling in `total_expected`.
    pub fn count_records(&self) -> Result<u64> {
        match self {
            ReaderConfig::InMemory(config) => Ok(config.records.len() as u64),
            ReaderConfig::File(config) => count_records(Path::new(&config.file_name)),
        }
    }
}

impl RecordReader for ReaderBackend {
    fn has_next(&mut self) -> Result<bool> {
        match self {
            ReaderBackend::InMemory(r) => r.has_next(),
            ReaderBackend::File(r) => r.has_next(),
        }
    }

    fn next_batch(&mut self) -> Result<Batch> {
        match self {
            ReaderBackend::InMemory(r) => r.next_batch(),
            ReaderBackend::File(r) => r.next_batch(),
        }
    }

    fn content_format(&self) -> ContentFormat {
        match self {
            ReaderBackend::InMemory(r) => r.content_format(),
            ReaderBackend::File(r) => r.content_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_config_picks_the_reader_and_knows_the_headcount() -> Result<()> {
        let config = ReaderConfig::InMemory(InMemoryReaderConfig {
            records: vec!["a".into(), "b".into(), "c".into()],
            batch_size: 2,
            content_format: ContentFormat::Xml,
        });
        assert_eq!(config.count_records()?, 3);

        let mut reader = ReaderBackend::from_config(config)?;
        assert!(matches!(reader, ReaderBackend::InMemory(_)));
        assert_eq!(reader.content_format(), ContentFormat::Xml);

        let mut sizes = Vec::new();
        while reader.has_next()? {
            sizes.push(reader.next_batch()?.len());
        }
        assert_eq!(sizes, vec![2, 1]);
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_file_is_reported_not_counted() {
        let config = ReaderConfig::File(FileReaderConfig {
            file_name: "/nope/not/here.jsonl".into(),
            content_format: ContentFormat::Raw,
            batch_size: 10,
            show_progress: false,
        });
        assert!(config.count_records().is_err());
        assert!(ReaderBackend::from_config(config).is_err());
    }
}
