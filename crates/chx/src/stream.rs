//! 🎬 *[camera pans across a reader that only knows how to be asked]*
//! *[and a consumer that only knows how to be told]*
//! *["Somebody," whispers the narrator, "has to stand in the middle."]* 🦆
//!
//! 🌊 The chunk stream: pulls batches from a synchronous [`RecordReader`], wraps each
//! one in a compressed [`Envelope`], routes it, and pushes it through a
//! [`DeliveryQueue`] to whoever registered a handler. When the reader runs dry it
//! sends one last, empty chunk with the terminal header and closes.
//!
//! ```text
//!   caller thread(s)                       pump task (one per stream)
//!  ┌───────────────┐   control channel   ┌───────────────────────────────────────┐
//!  │ ChunkStream   │ ──────────────────▶ │ apply(cmd) ─▶ pump loop ─▶ queue.write │
//!  │ handler/pause │                     │      ▲              │           │      │
//!  │ resume/fetch  │                     │      └── drain flag ┘     deliver ─▶ handler
//!  └───────────────┘                     └───────────────────────────────────────┘
//! ```
//!
//! 🧠 Knowledge graph:
//! - States: Idle (no handler yet) → Streaming → Closed. A production error parks the
//!   stream in Failed, which is a stall, not a close.
//! - Every queue mutation, reader pull and delivery happens on the pump task. Callers only
//!   ever send messages, so the handler slots are never touched from two places at once.
//! - The pump loop is a plain `loop`, re-entered when the queue reports a drain. No recursion.
//! - `closed` is mirrored into an `AtomicBool` so control calls can fail fast on the caller's side.
//! - Closed means "the terminal record was delivered", not "the terminal record was queued".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::common::{Chunk, ConnectionContext, JOB_ID_HEADER, RoutedRecord, TERMINAL_HEADER};
use crate::envelope::EnvelopeBuilder;
use crate::error::StreamError;
use crate::keyer::DistributionKeyer;
use crate::queue::DeliveryQueue;
use crate::readers::RecordReader;

/// 📬 Receives every delivered routed record, in order.
pub type RecordHandler = Arc<dyn Fn(RoutedRecord) + Send + Sync>;
/// 🏁 Called once, after the terminal record has been delivered.
pub type EndHandler = Arc<dyn Fn() + Send + Sync>;
/// 💀 Called with the error that stopped production.
pub type ExceptionHandler = Arc<dyn Fn(StreamError) + Send + Sync>;

fn default_queue_capacity() -> usize {
    1
}

/// 🔧 Everything a stream needs to know besides its reader.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// 🔗 Correlation id, stamped on every record as the `jobId` header.
    pub job_id: String,
    /// 🔮 Advisory. Copied into every chunk's metadata, never enforced.
    pub total_expected: u64,
    pub connection: ConnectionContext,
    /// 🔑 Number of distinct routing keys. Must be positive.
    pub fanout_width: i64,
    pub topic: String,
    /// 🚦 Backlog at which the queue stops accepting writes. Must be at least 1.
    pub queue_capacity: usize,
}

impl StreamSettings {
    pub fn new(job_id: impl Into<String>, topic: impl Into<String>, connection: ConnectionContext) -> Self {
        Self {
            job_id: job_id.into(),
            total_expected: 0,
            connection,
            fanout_width: 1,
            topic: topic.into(),
            queue_capacity: default_queue_capacity(),
        }
    }

    pub fn with_total_expected(mut self, total_expected: u64) -> Self {
        self.total_expected = total_expected;
        self
    }

    pub fn with_fanout_width(mut self, fanout_width: i64) -> Self {
        self.fanout_width = fanout_width;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    fn validate(&self) -> Result<(), StreamError> {
        if self.topic.trim().is_empty() {
            return Err(StreamError::configuration("topic must not be empty"));
        }
        if self.job_id.trim().is_empty() {
            return Err(StreamError::configuration("job_id must not be empty"));
        }
        if self.connection.tenant.trim().is_empty() {
            return Err(StreamError::configuration("tenant must not be empty"));
        }
        Ok(())
    }
}

enum Command {
    Handler(Option<RecordHandler>),
    Pause,
    Resume,
    Fetch(u64),
    EndHandler(Option<EndHandler>),
    ExceptionHandler(Option<ExceptionHandler>),
    Barrier(oneshot::Sender<()>),
}

/// 🎛️ The caller-facing handle. Cheap to clone, safe to use from any thread.
#[derive(Clone)]
pub struct ChunkStream {
    control: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChunkStream {
    /// 🚀 Validate the settings and start the pump task on `runtime`.
    ///
    /// Nothing is read until a handler is registered.
    pub fn spawn<R>(runtime: &Handle, reader: R, settings: StreamSettings) -> Result<Self, StreamError>
    where
        R: RecordReader + 'static,
    {
        settings.validate()?;
        let keyer = DistributionKeyer::new(settings.fanout_width)?;
        let queue = DeliveryQueue::new(settings.queue_capacity)?;

        let (control, control_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let pump = Pump::new(reader, settings, keyer, queue, closed.clone());
        runtime.spawn(pump.run(control_rx));

        Ok(Self { control, closed })
    }

    /// 📬 Register (`Some`) or detach (`None`) the consumer.
    ///
    /// Registering starts the pump, or restarts it after a detach. Detaching drops every
    /// record that was buffered but not yet delivered.
    pub fn handler(&self, handler: Option<RecordHandler>) -> Result<(), StreamError> {
        self.send_checked(Command::Handler(handler))
    }

    pub fn end_handler(&self, handler: Option<EndHandler>) -> Result<(), StreamError> {
        self.send_checked(Command::EndHandler(handler))
    }

    /// 💀 Register where production errors go. An error that happened before this call
    /// is delivered to the new handler straight away.
    pub fn exception_handler(&self, handler: Option<ExceptionHandler>) -> Result<(), StreamError> {
        self.send_checked(Command::ExceptionHandler(handler))
    }

    /// ⏸️ Stop deliveries. A no-op once closed.
    pub fn pause(&self) {
        self.send_quietly(Command::Pause);
    }

    /// ▶️ Resume unlimited deliveries. A no-op once closed.
    pub fn resume(&self) {
        self.send_quietly(Command::Resume);
    }

    /// 🎟️ Allow `amount` more deliveries, even while paused. A no-op once closed.
    pub fn fetch(&self, amount: u64) {
        self.send_quietly(Command::Fetch(amount));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 🧱 Resolves once every control call sent before it has been applied,
    /// including any pumping and delivery those calls triggered.
    pub async fn barrier(&self) {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Command::Barrier(tx)).is_ok() {
            // -- an Err here means the pump task finished first, which is just as settled
            let _ = rx.await;
        }
    }

    fn send_checked(&self, command: Command) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::InvalidState("the terminal chunk was already delivered"));
        }
        self.control
            .send(command)
            .map_err(|_| StreamError::InvalidState("the pump task is no longer running"))
    }

    fn send_quietly(&self, command: Command) {
        if self.is_closed() {
            return;
        }
        if self.control.send(command).is_err() {
            trace!("control call dropped, the pump task has already exited");
        }
    }
}

/// 🔒 The consumer-side slots. Shared between the pump and the queue's delivery
/// closure, both of which only ever run on the pump task.
#[derive(Default)]
struct Consumer {
    handler: Option<RecordHandler>,
    end_handler: Option<EndHandler>,
    ended: bool,
}

fn lock(consumer: &Mutex<Consumer>) -> MutexGuard<'_, Consumer> {
    consumer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// ⚙️ The state machine that owns the reader. Lives and dies on its own task.
struct Pump<R> {
    reader: R,
    builder: EnvelopeBuilder,
    keyer: DistributionKeyer,
    queue: DeliveryQueue<RoutedRecord>,
    topic: String,
    job_id: String,
    forwarded_headers: BTreeMap<String, String>,
    total_expected: u64,
    cumulative_count: u64,
    terminal_enqueued: bool,
    failed: bool,
    parked_failure: Option<StreamError>,
    exception_handler: Option<ExceptionHandler>,
    consumer: Arc<Mutex<Consumer>>,
    drain_requested: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl<R: RecordReader> Pump<R> {
    fn new(
        reader: R,
        settings: StreamSettings,
        keyer: DistributionKeyer,
        mut queue: DeliveryQueue<RoutedRecord>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        let consumer = Arc::new(Mutex::new(Consumer::default()));
        let drain_requested = Arc::new(AtomicBool::new(false));

        queue.handler(deliver_to(consumer.clone(), closed.clone(), settings.job_id.clone()));
        let drain_flag = drain_requested.clone();
        queue.drain_handler(Box::new(move || drain_flag.store(true, Ordering::Release)));

        let mut forwarded_headers = settings.connection.headers;
        // -- 🏁 only the pump decides what is terminal
        forwarded_headers.remove(TERMINAL_HEADER);

        Self {
            reader,
            builder: EnvelopeBuilder::new(settings.connection.tenant),
            keyer,
            queue,
            topic: settings.topic,
            job_id: settings.job_id,
            forwarded_headers,
            total_expected: settings.total_expected,
            cumulative_count: 0,
            terminal_enqueued: false,
            failed: false,
            parked_failure: None,
            exception_handler: None,
            consumer,
            drain_requested,
            closed,
        }
    }

    async fn run(mut self, mut control: mpsc::UnboundedReceiver<Command>) {
        debug!("🚀 pump task for job {} started", self.job_id);
        while let Some(command) = control.recv().await {
            self.apply(command);
            while self.drain_requested.swap(false, Ordering::AcqRel) {
                self.pump();
            }
            if self.closed.load(Ordering::Acquire) {
                break;
            }
        }
        debug!(
            "🗑️ pump task for job {} exiting after {} records in {} chunks",
            self.job_id,
            self.cumulative_count,
            self.keyer.issued()
        );
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Handler(Some(handler)) => {
                lock(&self.consumer).handler = Some(handler);
                self.pump();
            }
            Command::Handler(None) => {
                lock(&self.consumer).handler = None;
                let dropped = self.queue.len();
                self.queue.clear();
                // -- 🏁 a terminal record that was queued but never delivered went out with the
                // rest, so the next consumer gets a fresh one
                if self.terminal_enqueued && !self.closed.load(Ordering::Acquire) {
                    self.terminal_enqueued = false;
                }
                debug!("🔌 consumer detached, dropped {} undelivered records", dropped);
            }
            Command::Pause => self.queue.pause(),
            Command::Resume => self.queue.resume(),
            Command::Fetch(amount) => self.queue.fetch(amount),
            Command::EndHandler(handler) => lock(&self.consumer).end_handler = handler,
            Command::ExceptionHandler(handler) => {
                self.exception_handler = handler;
                if let Some(handler) = &self.exception_handler {
                    if let Some(parked) = self.parked_failure.take() {
                        handler(parked);
                    }
                }
            }
            Command::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    /// 🔄 Produce until the queue pushes back, the terminal chunk is out, or something breaks.
    fn pump(&mut self) {
        if self.failed || self.terminal_enqueued || self.closed.load(Ordering::Acquire) {
            return;
        }
        loop {
            // -- 🚦 a full queue restarts us through the drain flag, not through re-registration
            if !self.queue.is_writable() {
                break;
            }
            match self.produce_one() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }
    }

    /// 📦 One iteration: pull, wrap, route, enqueue. `Ok(true)` means go again right away.
    fn produce_one(&mut self) -> Result<bool> {
        let more = self
            .reader
            .has_next()
            .context("reader could not tell whether more batches exist")?;
        let content_format = self.reader.content_format();
        let chunk = if more {
            let batch = self
                .reader
                .next_batch()
                .context("reader failed to produce the next batch")?;
            self.cumulative_count += batch.len() as u64;
            Chunk::batch(batch, content_format, self.cumulative_count, self.total_expected)
        } else {
            Chunk::terminal(content_format, self.cumulative_count, self.total_expected)
        };

        let record = self.route(&chunk)?;
        let key = record.key.clone();
        if !more {
            self.terminal_enqueued = true;
        }
        let accepted = self.queue.write(record);
        debug!(
            "📦 chunk written to the queue: key {}, cumulative {}, last {}, accepted {}",
            key, chunk.metadata.cumulative_count, chunk.metadata.is_last, accepted
        );
        Ok(accepted && more && !self.closed.load(Ordering::Acquire))
    }

    fn route(&mut self, chunk: &Chunk) -> Result<RoutedRecord> {
        let envelope = self
            .builder
            .build(chunk)
            .context("failed to build the chunk envelope")?;
        let value = envelope.to_json()?;
        let key = self.keyer.next_key();

        let mut headers = self.forwarded_headers.clone();
        headers.insert(JOB_ID_HEADER.to_string(), self.job_id.clone());
        if chunk.metadata.is_last {
            headers.insert(TERMINAL_HEADER.to_string(), "true".to_string());
        }
        trace!("✉️ envelope {} routed with key {}", envelope.id, key);
        Ok(RoutedRecord {
            topic: self.topic.clone(),
            key,
            value,
            headers,
        })
    }

    fn fail(&mut self, err: anyhow::Error) {
        self.failed = true;
        let err = StreamError::Production(err);
        error!("💀 production for job {} stopped: {}", self.job_id, err);
        match &self.exception_handler {
            Some(handler) => handler(err),
            None => {
                warn!(
                    "⚠️ no exception handler registered for job {}, the error is parked until one is",
                    self.job_id
                );
                self.parked_failure = Some(err);
            }
        }
    }
}

/// 📬 The queue's delivery closure: forward to the consumer, and close on the terminal record.
fn deliver_to(
    consumer: Arc<Mutex<Consumer>>,
    closed: Arc<AtomicBool>,
    job_id: String,
) -> Box<dyn FnMut(RoutedRecord) + Send> {
    Box::new(move |record: RoutedRecord| {
        let terminal = record.is_terminal();
        // -- 🔒 copy the handler out, call it outside the lock
        let handler = lock(&consumer).handler.clone();
        match handler {
            Some(handler) => handler(record),
            None => debug!("📭 record with key {} delivered with no consumer attached", record.key),
        }
        if !terminal {
            return;
        }
        let end_handler = {
            let mut slots = lock(&consumer);
            if slots.ended {
                return;
            }
            slots.ended = true;
            slots.handler = None;
            slots.end_handler.take()
        };
        closed.store(true, Ordering::Release);
        info!("🏁 stream for job {} reached its terminal chunk", job_id);
        if let Some(end_handler) = end_handler {
            end_handler();
        }
    })
}
