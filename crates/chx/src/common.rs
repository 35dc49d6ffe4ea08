//! 📦 Common data structures: the building blocks of chx
//!
//! ---
//!
//! 🎬 COLD OPEN. INT. LIBRARY BASEMENT, 3:47 AM
//!
//! A catalog export sits on a shared drive. Four hundred thousand MARC records.
//! One file. Nobody downstream can hold it in memory, and nobody upstream will
//! split it for them. So we do. One `Chunk` at a time, each one carrying a
//! running count of how far along we are, and the last one carrying nothing
//! but the news that it is, in fact, the last one.
//!
//! 🦆
//!
//! This module defines the humble, load-bearing structs that ferry records from
//! the reader to the broker: [`RawRecord`], [`Chunk`], [`ChunkMetadata`],
//! [`RoutedRecord`] and the [`ConnectionContext`] that tags along for the ride.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 🏁 Header that marks the final routed record of a stream. Present iff `isLast`.
pub const TERMINAL_HEADER: &str = "__terminal__";

/// 🔗 Header carrying the job correlation identifier on every routed record.
pub const JOB_ID_HEADER: &str = "jobId";

/// 🏷️ The event kind stamped on every envelope.
pub const CHUNK_READ_EVENT_KIND: &str = "chunk-read";

/// 📚 What the records inside a chunk look like, as reported by the reader.
///
/// The wire names keep the catalog-world spelling because downstream
/// consumers already match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentFormat {
    #[serde(rename = "MARC_RAW")]
    Raw,
    #[serde(rename = "MARC_JSON")]
    Json,
    #[serde(rename = "MARC_XML")]
    Xml,
}

/// 🎯 One record, exactly as the reader found it. No parsing, no opinions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// 📦 The record body, uninterpreted.
    pub record: String,
    /// 🔢 Zero-based position in the source, when the reader knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
}

impl RawRecord {
    pub fn new(record: impl Into<String>, order: Option<u64>) -> Self {
        Self {
            record: record.into(),
            order,
        }
    }
}

/// 🛒 One reader pull worth of records. The reader decides the size, we just carry it.
pub type Batch = Vec<RawRecord>;

/// 📊 Progress metadata that rides along with every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub content_format: ContentFormat,
    /// Running total of records produced so far, including this chunk.
    pub cumulative_count: u64,
    pub is_last: bool,
    /// 🔮 The caller's a-priori estimate. Advisory. May be wrong. Usually is, a little.
    pub total_expected: u64,
}

/// 📦 A published batch plus its progress metadata, or the empty terminal batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub records: Vec<RawRecord>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// 🚚 A regular chunk carrying one batch.
    pub fn batch(
        records: Batch,
        content_format: ContentFormat,
        cumulative_count: u64,
        total_expected: u64,
    ) -> Self {
        Self {
            records,
            metadata: ChunkMetadata {
                content_format,
                cumulative_count,
                is_last: false,
                total_expected,
            },
        }
    }

    /// 🏁 The terminal chunk: no records, just the final running total and a goodbye.
    pub fn terminal(content_format: ContentFormat, cumulative_count: u64, total_expected: u64) -> Self {
        Self {
            records: Vec::new(),
            metadata: ChunkMetadata {
                content_format,
                cumulative_count,
                is_last: true,
                total_expected,
            },
        }
    }
}

/// 🏢 Who we are publishing on behalf of, and which headers to forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    pub tenant: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ConnectionContext {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// 📡 What actually goes to the broker: topic, routing key, serialized envelope, headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedRecord {
    pub topic: String,
    pub key: String,
    pub value: String,
    pub headers: BTreeMap<String, String>,
}

impl RoutedRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// 🏁 Does this record carry the end-of-stream marker?
    pub fn is_terminal(&self) -> bool {
        self.headers.contains_key(TERMINAL_HEADER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_chunk_json_uses_the_wire_names() -> anyhow::Result<()> {
        let chunk = Chunk::batch(
            vec![RawRecord::new("00714cam", Some(0))],
            ContentFormat::Raw,
            1,
            62,
        );
        let json = serde_json::to_value(&chunk)?;
        assert_eq!(json["metadata"]["contentFormat"], "MARC_RAW");
        assert_eq!(json["metadata"]["cumulativeCount"], 1);
        assert_eq!(json["metadata"]["isLast"], false);
        assert_eq!(json["metadata"]["totalExpected"], 62);
        assert_eq!(json["records"][0]["record"], "00714cam");
        assert_eq!(json["records"][0]["order"], 0);
        Ok(())
    }

    #[test]
    fn the_one_where_the_terminal_chunk_travels_light() -> anyhow::Result<()> {
        let chunk = Chunk::terminal(ContentFormat::Xml, 62, 70);
        let json = serde_json::to_value(&chunk)?;
        assert_eq!(json["records"], serde_json::json!([]));
        assert_eq!(json["metadata"]["isLast"], true);
        assert_eq!(json["metadata"]["cumulativeCount"], 62);
        assert_eq!(json["metadata"]["contentFormat"], "MARC_XML");
        Ok(())
    }

    #[test]
    fn the_one_where_terminal_is_a_header_not_a_vibe() {
        let mut record = RoutedRecord {
            topic: "t".into(),
            key: "0".into(),
            value: "{}".into(),
            headers: BTreeMap::new(),
        };
        assert!(!record.is_terminal());
        record.headers.insert(TERMINAL_HEADER.into(), "true".into());
        assert!(record.is_terminal());
        assert_eq!(record.header(TERMINAL_HEADER), Some("true"));
    }
}
