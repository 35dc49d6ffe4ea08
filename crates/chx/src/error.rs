//! 🚨 Errors: the three flavors of "no" the stream knows how to say.
//!
//! 🧠 Knowledge graph:
//! - `Configuration`: you handed us a fan-out width of zero. We said no at the door.
//! - `InvalidState`: the stream is closed. It has moved on. You should too.
//! - `Production`: something broke while reading, zipping, or queueing a chunk.
//!   Reader errors land here as well, wearing an `anyhow` trench coat.
//!
//! Everything inside the crate speaks `anyhow`. This enum is only the public
//! face, the one we show to callers of `ChunkStream`. 🦆

use thiserror::Error;

/// 🏷️ Everything that can go wrong at the edges of a `ChunkStream`.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 🔧 Construction-time rejection. No stream was harmed, because no stream was created.
    #[error("💀 invalid stream configuration: {0}")]
    Configuration(String),

    /// 🔒 A control call arrived after the terminal chunk was delivered.
    #[error("💀 stream is closed: {0}")]
    InvalidState(&'static str),

    /// 📦 A chunk could not be produced. `{:#}` so the whole cause chain shows up in one line.
    #[error("💀 chunk production failed: {0:#}")]
    Production(anyhow::Error),
}

impl StreamError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
