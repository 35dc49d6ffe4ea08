//! ✉️ Envelope: where a chunk gets zipped, stamped, and sealed for travel.
//!
//! ```text
//!   Chunk ──serde_json──▶ text ──gzip──▶ bytes ──base64──▶ payload
//!                                                          │
//!          id (uuid v4) + kind "chunk-read" + context ─────┴──▶ Envelope
//! ```
//!
//! 🧠 Knowledge graph:
//! - Built once per chunk by the pump, serialized once into `RoutedRecord::value`.
//! - Immutable after `build`. Fields are public for reading, the struct has no setters.
//! - `decode_chunk` is the inverse, for consumers (and for tests that do not trust us).
//! - Any failure here is a production error. We do not swallow. We propagate. 🦆

use std::io::{Read, Write};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::common::{CHUNK_READ_EVENT_KIND, Chunk};

/// ⏳ Envelope time-to-live. One hop. Downstream re-wraps if it wants more.
pub const DEFAULT_EVENT_TTL: u32 = 1;

/// 🏢 Routing metadata copied from the caller's connection context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub tenant: String,
    pub ttl: u32,
    /// Module name and version of whoever published the event. That's us.
    pub originator: String,
}

/// ✉️ The compressed, identified event wrapping one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub context: EventContext,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("💀 Envelope refused to become JSON. It had one job.")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("💀 That string was not an envelope. Or it was, once.")
    }

    /// 📬 Unseal the payload: base64 → gunzip → JSON → `Chunk`.
    pub fn decode_chunk(&self) -> Result<Chunk> {
        let compressed = STANDARD
            .decode(self.payload.as_bytes())
            .context("💀 Envelope payload is not valid base64")?;
        let mut text = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut text)
            .context("💀 Envelope payload did not gunzip. The bytes are squished beyond recognition.")?;
        serde_json::from_str(&text).context("💀 Decompressed payload is not a chunk")
    }
}

/// 🏭 Builds envelopes with a fixed tenant and originator.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    tenant: String,
    originator: String,
    ttl: u32,
}

impl EnvelopeBuilder {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            originator: default_originator(),
            ttl: DEFAULT_EVENT_TTL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = originator.into();
        self
    }

    /// 🔨 Serialize, compress, encode, stamp. Fresh uuid every time.
    pub fn build(&self, chunk: &Chunk) -> Result<Envelope> {
        let text = serde_json::to_string(chunk).context("💀 Chunk refused to serialize")?;
        let payload = compress(text.as_bytes())?;
        Ok(Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            kind: CHUNK_READ_EVENT_KIND.to_string(),
            payload,
            context: EventContext {
                tenant: self.tenant.clone(),
                ttl: self.ttl,
                originator: self.originator.clone(),
            },
        })
    }
}

fn compress(bytes: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder
        .write_all(bytes)
        .context("💀 gzip choked on the chunk bytes")?;
    let compressed = encoder
        .finish()
        .context("💀 gzip could not finish. It started strong, though.")?;
    Ok(STANDARD.encode(compressed))
}

fn default_originator() -> String {
    format!("{}_{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ContentFormat, RawRecord};

    fn sample_chunk() -> Chunk {
        Chunk::batch(
            vec![
                RawRecord::new(r#"{"leader":"00714cam"}"#, Some(0)),
                RawRecord::new(r#"{"leader":"00822cam"}"#, Some(1)),
            ],
            ContentFormat::Json,
            2,
            10,
        )
    }

    #[test]
    fn the_one_where_the_envelope_survives_the_round_trip() -> Result<()> {
        let builder = EnvelopeBuilder::new("diku");
        let chunk = sample_chunk();
        let envelope = builder.build(&chunk)?;

        let wire = envelope.to_json()?;
        let back = Envelope::from_json(&wire)?;
        assert_eq!(back, envelope);
        assert_eq!(back.decode_chunk()?, chunk);
        Ok(())
    }

    #[test]
    fn the_one_where_every_envelope_gets_its_own_name() -> Result<()> {
        let builder = EnvelopeBuilder::new("diku");
        let chunk = sample_chunk();
        let first = builder.build(&chunk)?;
        let second = builder.build(&chunk)?;
        assert_ne!(first.id, second.id);
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
        Ok(())
    }

    #[test]
    fn the_one_where_context_is_copied_not_invented() -> Result<()> {
        let envelope = EnvelopeBuilder::new("college")
            .with_originator("mod-import_9.9.9")
            .build(&Chunk::terminal(ContentFormat::Raw, 0, 0))?;
        assert_eq!(envelope.kind, "chunk-read");
        assert_eq!(envelope.context.tenant, "college");
        assert_eq!(envelope.context.ttl, 1);
        assert_eq!(envelope.context.originator, "mod-import_9.9.9");
        Ok(())
    }

    #[test]
    fn the_one_where_the_wire_json_has_the_expected_shape() -> Result<()> {
        let envelope = EnvelopeBuilder::new("diku").build(&sample_chunk())?;
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json()?)?;
        assert!(json["id"].is_string());
        assert_eq!(json["kind"], "chunk-read");
        assert!(json["payload"].is_string());
        assert_eq!(json["context"]["tenant"], "diku");
        assert_eq!(json["context"]["ttl"], 1);
        assert!(json["context"]["originator"].as_str().unwrap_or_default().starts_with("chx_"));
        Ok(())
    }

    #[test]
    fn the_one_where_a_mangled_payload_is_an_error_not_a_shrug() {
        let mut envelope = EnvelopeBuilder::new("diku")
            .build(&sample_chunk())
            .expect("💀 building a sample envelope should not fail");
        envelope.payload = "definitely not base64 !!!".into();
        assert!(envelope.decode_chunk().is_err());
    }
}
