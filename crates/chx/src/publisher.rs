//! 🎬 *[the stream has records. the broker wants records.]*
//! *[between them: a channel, a credit counter, and a worker who does not sleep.]*
//!
//! 📤 The publisher drives a [`ChunkStream`] into a [`BrokerSink`] with a fixed number of
//! records in flight. It pauses the stream, grants `in_flight` credits, and hands one credit
//! back per record the sink accepts. The stream never runs more than `in_flight` records
//! ahead of the sink, whatever the sink's speed.
//!
//! ```text
//!   pump task ──handler──▶ async_channel (bounded) ──▶ sink worker ──send──▶ sink
//!       ▲                                                   │
//!       └──────────────────────── fetch(1) ─────────────────┘
//! ```
//!
//! 🧠 Knowledge graph:
//! - The stream's callbacks run on the pump task and must not block, so they `try_send`.
//!   Credits bound what can be in the channel, so `try_send` only fails if the worker is gone.
//! - End of stream closes the sink. A production error fails the publish without closing it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_channel::{Receiver, Sender};
use comfy_table::{Table, presets::UTF8_FULL};
use tracing::{debug, info, warn};

use crate::common::RoutedRecord;
use crate::error::StreamError;
use crate::sinks::{BrokerSink, SinkBackend};
use crate::stream::{ChunkStream, EndHandler, ExceptionHandler, RecordHandler};

/// 📊 What made it to the sink.
#[derive(Debug, Clone, Default)]
pub struct PublishSummary {
    /// Every routed record the sink accepted, terminal record included.
    pub records_sent: u64,
    /// 🔑 How many records went out under each routing key.
    pub per_key: BTreeMap<String, u64>,
    pub elapsed: Duration,
}

impl PublishSummary {
    fn count(&mut self, record: &RoutedRecord) {
        self.records_sent += 1;
        *self.per_key.entry(record.key.clone()).or_default() += 1;
    }

    /// 🖨️ A small table of records per key.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Key", "Records"]);
        for (key, count) in &self.per_key {
            table.add_row(vec![key.clone(), count.to_string()]);
        }
        table.add_row(vec!["total".to_string(), self.records_sent.to_string()]);
        table.to_string()
    }
}

enum Event {
    Record(RoutedRecord),
    End,
    Failed(StreamError),
}

/// 🚀 Publish everything the stream produces into `sink`, at most `in_flight` records ahead.
///
/// Returns once the terminal record has been sent and the sink closed. Errors if the stream
/// fails, the sink fails, or the stream goes away without ever sending its terminal record.
pub async fn publish(stream: &ChunkStream, mut sink: SinkBackend, in_flight: usize) -> Result<PublishSummary> {
    let in_flight = in_flight.max(1);
    // -- 📏 at most `in_flight` records, plus one end or one failure, ever sit in here
    let (tx, rx) = async_channel::bounded(in_flight + 2);

    stream.pause();
    stream
        .exception_handler(Some(forward_failures(tx.clone())))
        .context("💀 Could not attach the exception handler")?;
    stream
        .end_handler(Some(forward_end(tx.clone())))
        .context("💀 Could not attach the end handler")?;
    stream
        .handler(Some(forward_records(tx)))
        .context("💀 Could not attach the record handler")?;
    stream.fetch(in_flight as u64);
    info!("📤 publishing with up to {} records in flight", in_flight);

    let result = drain(stream, &mut sink, rx).await;
    if result.is_err() {
        // -- 🔌 nobody is listening anymore. let the pump idle instead of filling a dead channel.
        if let Err(err) = stream.handler(None) {
            debug!("stream already closed while detaching: {}", err);
        }
    }
    result
}

async fn drain(stream: &ChunkStream, sink: &mut SinkBackend, rx: Receiver<Event>) -> Result<PublishSummary> {
    let started = Instant::now();
    let mut summary = PublishSummary::default();
    loop {
        match rx.recv().await {
            Ok(Event::Record(record)) => {
                debug!("🪣 sink worker received record with key {}", record.key);
                summary.count(&record);
                sink.send(record)
                    .await
                    .context("💀 The sink refused a routed record")?;
                stream.fetch(1);
            }
            Ok(Event::End) => {
                sink.close().await.context("💀 The sink failed to close")?;
                summary.elapsed = started.elapsed();
                info!(
                    "🏁 published {} records in {:.2?}",
                    summary.records_sent, summary.elapsed
                );
                return Ok(summary);
            }
            Ok(Event::Failed(err)) => {
                return Err(anyhow::Error::new(err).context("💀 Chunk production failed mid-publish"));
            }
            Err(_) => bail!("💀 The stream went away without sending its terminal chunk"),
        }
    }
}

fn forward(tx: &Sender<Event>, event: Event) {
    if tx.try_send(event).is_err() {
        warn!("⚠️ publisher channel rejected an event, the sink worker is gone or overrun");
    }
}

fn forward_records(tx: Sender<Event>) -> RecordHandler {
    Arc::new(move |record: RoutedRecord| forward(&tx, Event::Record(record)))
}

fn forward_end(tx: Sender<Event>) -> EndHandler {
    Arc::new(move || forward(&tx, Event::End))
}

fn forward_failures(tx: Sender<Event>) -> ExceptionHandler {
    Arc::new(move |err: StreamError| forward(&tx, Event::Failed(err)))
}
