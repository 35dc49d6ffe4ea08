//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! Three sections: `[stream]` (who we are, where records go, how wide and how deep),
//! `[reader_config.<Kind>]` (where records come from) and `[sink_config.<Kind>]`
//! (the broker stand-in that receives them). Environment variables prefixed `CHX_`
//! fill in whatever the file leaves out, with `__` separating nested keys
//! (`CHX_STREAM__TOPIC`).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::common::ConnectionContext;
use crate::readers::{FileReaderConfig, InMemoryReaderConfig};
use crate::sinks::FileSinkConfig;
use crate::stream::StreamSettings;

fn default_fanout_width() -> i64 {
    100
}

fn default_queue_capacity() -> usize {
    1
}

fn default_in_flight() -> usize {
    8
}

/// 📦 The AppConfig: one struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub reader_config: ReaderConfig,
    pub sink_config: SinkConfig,
}

/// 🌊 Everything about the stream itself.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    pub topic: String,
    pub job_id: String,
    pub tenant: String,
    /// 🔑 distinct routing keys, so at most this many partitions see traffic
    #[serde(default = "default_fanout_width")]
    pub fanout_width: i64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 📤 publisher credit window
    #[serde(default = "default_in_flight")]
    pub in_flight: usize,
    /// 🔮 counted from the reader's source when absent
    #[serde(default)]
    pub total_expected: Option<u64>,
    /// 📨 forwarded on every record
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl StreamConfig {
    pub fn settings(&self, total_expected: u64) -> StreamSettings {
        let connection = self
            .headers
            .iter()
            .fold(ConnectionContext::new(self.tenant.clone()), |connection, (key, value)| {
                connection.with_header(key.clone(), value.clone())
            });
        StreamSettings::new(self.job_id.clone(), self.topic.clone(), connection)
            .with_total_expected(total_expected)
            .with_fanout_width(self.fanout_width)
            .with_queue_capacity(self.queue_capacity)
    }
}

/// 📖 Where records come from.
#[derive(Debug, Deserialize, Clone)]
pub enum ReaderConfig {
    InMemory(InMemoryReaderConfig),
    File(FileReaderConfig),
}

/// 🕳️ Where routed records go.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    InMemory,
    File(FileSinkConfig),
}

/// 🚀 Load the config from `CHX_*` env vars, layered under an optional TOML file.
///
/// 📐 `None` means env vars only. `Some(path)` merges the file on top; the file wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("CHX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CHX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CHX_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
