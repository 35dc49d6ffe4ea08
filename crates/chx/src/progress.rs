//! 📊 progress.rs: "Are we there yet?" asked on behalf of every import file ever.
//!
//! 🚀 Tracks how much of the source the reader has chewed through: bytes, records,
//! rates over a short sliding window, and a guess at how long is left. Rendered as
//! an indicatif bar with a comfy-table stuck to its forehead.
//!
//! ⚠️ Staring at the bar does not make the reader faster. We checked.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: f64 = 1024.0 * 1024.0;
// -- ⏱️ rates are measured over this much recent history, so one slow batch doesn't cause panic
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 🔢 "1234567" → "1,234,567". For the humans.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS when the import has become a lifestyle.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 📊 Running totals for one reader, plus the bar that shows them off.
pub(crate) struct ProgressMetrics {
    source_name: String,
    /// 📏 0 means "no idea". The bar copes.
    total_size: u64,
    total_bytes: u64,
    total_records: u64,
    progress_bar: ProgressBar,
    // -- 🔄 (when, bytes so far, records so far), oldest at the front
    samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar won't Debug, so it stays off the guest list
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_records", &self.total_records)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(source_name: String, total_size: u64) -> Self {
        let progress_bar = ProgressBar::new(total_size);
        // -- 🎨 the template is a literal. if it fails to parse we fall back to the default bar.
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        let start_time = Instant::now();
        let mut samples = VecDeque::new();
        samples.push_back((start_time, 0, 0));
        Self {
            source_name,
            total_size,
            total_bytes: 0,
            total_records: 0,
            progress_bar,
            samples,
            start_time,
        }
    }

    /// 🔄 Feed in one batch worth of bytes and records.
    pub(crate) fn update(&mut self, bytes_read: u64, records_read: u64) {
        self.total_bytes += bytes_read;
        self.total_records += records_read;
        let (records_per_sec, mib_per_sec) = self.rates();
        self.render(records_per_sec, mib_per_sec);
        self.progress_bar.set_position(self.total_bytes);
    }

    /// ✅ Done. Ring the bell.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    pub(crate) fn total_records(&self) -> u64 {
        self.total_records
    }

    fn rates(&mut self) -> (f64, f64) {
        let now = Instant::now();
        while let Some(&(at, _, _)) = self.samples.front() {
            if now.duration_since(at) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.total_bytes, self.total_records));

        let Some(&(oldest, oldest_bytes, oldest_records)) = self.samples.front() else {
            return (0.0, 0.0);
        };
        let elapsed = now.duration_since(oldest).as_secs_f64();
        if elapsed <= 0.0 {
            return (0.0, 0.0);
        }
        let records = self.total_records.saturating_sub(oldest_records) as f64 / elapsed;
        let mib = self.total_bytes.saturating_sub(oldest_bytes) as f64 / elapsed / MIB;
        (records, mib)
    }

    fn render(&self, records_per_sec: f64, mib_per_sec: f64) {
        let percent = if self.total_size > 0 {
            self.total_bytes as f64 / self.total_size as f64 * 100.0
        } else {
            0.0
        };
        let elapsed = self.start_time.elapsed();
        // 🔮 linear extrapolation. the future resembles the past until it doesn't.
        let remaining = if percent > 0.0 {
            let total = elapsed.as_secs_f64() / (percent / 100.0);
            let left = total - elapsed.as_secs_f64();
            if left > 0.0 {
                format_duration(Duration::from_secs_f64(left))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Records/s", format_number(records_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Records", format_number(self.total_records)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{mib_per_sec:.2} MiB/s")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{percent:.2}%")).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{remaining} remaining")).set_alignment(CellAlignment::Right),
        ]);
        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}
