//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The export landed on disk. One record per line, they promised. Mostly true.
//! A few blank lines snuck in, a `\r` or two from a Windows box, and one line at
//! the end with no newline at all, because of course.
//!
//! `FileReader` walks a line-delimited export, skips the blanks, numbers every
//! record by its position, and hands them out `batch_size` at a time. It keeps one
//! line of lookahead so `has_next` can peek without eating anything.
//!
//! 🚰 file → BufReader → lookahead line → Batch → pump
//! 💀 unreadable file → production error, your problem now
//! 🦆 (mandatory, no notes)

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::common::{Batch, ContentFormat, RawRecord};
use crate::progress::ProgressMetrics;
use crate::readers::RecordReader;

fn default_batch_size() -> usize {
    50
}

fn default_show_progress() -> bool {
    true
}

/// 📂 FileReaderConfig: lives next to the reader that uses it, not in some distant config attic.
#[derive(Debug, Deserialize, Clone)]
pub struct FileReaderConfig {
    pub file_name: String,
    pub content_format: ContentFormat,
    /// 📦 records per batch, which is records per chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

pub struct FileReader {
    lines: BufReader<File>,
    config: FileReaderConfig,
    // -- 👀 the next non-blank line, already read, not yet handed out
    lookahead: Option<String>,
    exhausted: bool,
    next_order: u64,
    progress: Option<ProgressMetrics>,
}

// 🐛 progress stays out of Debug. nobody debugging a reader wants to read a progress bar's innards.
impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("config", &self.config)
            .field("next_order", &self.next_order)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl FileReader {
    pub fn open(config: FileReaderConfig) -> Result<Self> {
        let file = File::open(&config.file_name).context(format!(
            "💀 The door to '{}' would not budge. It might not exist. It might not be ours to open.",
            config.file_name
        ))?;
        // 📏 for the progress bar only. unknown size is fine, the bar just shrugs.
        let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        let progress = config
            .show_progress
            .then(|| ProgressMetrics::new(config.file_name.clone(), file_size));
        let config = FileReaderConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Ok(Self {
            lines: BufReader::new(file),
            config,
            lookahead: None,
            exhausted: false,
            next_order: 0,
            progress,
        })
    }

    /// 🔭 Make sure `lookahead` holds the next non-blank line, if there is one.
    /// Returns the bytes consumed from the file while looking.
    fn fill_lookahead(&mut self) -> Result<u64> {
        let mut consumed = 0u64;
        while self.lookahead.is_none() && !self.exhausted {
            let mut line = String::new();
            let bytes_read = self
                .lines
                .read_line(&mut line)
                .context(format!("💀 Failed to read a line from '{}'", self.config.file_name))?;
            if bytes_read == 0 {
                self.exhausted = true;
                if let Some(progress) = &self.progress {
                    progress.finish();
                    debug!(
                        "📭 reached the end of '{}' after {} records",
                        self.config.file_name,
                        progress.total_records()
                    );
                }
                break;
            }
            consumed += bytes_read as u64;
            let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
            // -- 🧮 same blank rule as count_records: ASCII whitespace only
            if !trimmed.trim_ascii().is_empty() {
                self.lookahead = Some(trimmed.to_string());
            }
        }
        Ok(consumed)
    }
}

impl RecordReader for FileReader {
    fn has_next(&mut self) -> Result<bool> {
        let consumed = self.fill_lookahead()?;
        if consumed > 0 {
            if let Some(progress) = self.progress.as_mut() {
                progress.update(consumed, 0);
            }
        }
        Ok(self.lookahead.is_some())
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        let mut bytes = 0u64;
        while batch.len() < self.config.batch_size {
            bytes += self.fill_lookahead()?;
            let Some(line) = self.lookahead.take() else {
                break;
            };
            batch.push(RawRecord::new(line, Some(self.next_order)));
            self.next_order += 1;
        }
        trace!(
            "📖 pulled {} records ({} bytes) out of '{}'",
            batch.len(),
            bytes,
            self.config.file_name
        );
        if let Some(progress) = self.progress.as_mut() {
            progress.update(bytes, batch.len() as u64);
        }
        Ok(batch)
    }

    fn content_format(&self) -> ContentFormat {
        self.config.content_format
    }
}

/// 🔢 Count the non-blank lines in a file without holding it in memory.
///
/// Used to fill in `total_expected` when the caller didn't know it up front.
/// Advisory, like the number it feeds.
pub fn count_records(path: &Path) -> Result<u64> {
    let mut file = File::open(path)
        .context(format!("💀 Could not open '{}' to count its records", path.display()))?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut count = 0u64;
    // -- 🧮 does the current line have anything besides whitespace in it yet?
    let mut line_has_content = false;
    loop {
        let read = file
            .read(&mut buf)
            .context(format!("💀 Read failed while counting '{}'", path.display()))?;
        if read == 0 {
            break;
        }
        let mut start = 0;
        for newline in memchr::memchr_iter(b'\n', &buf[..read]) {
            if line_has_content || !buf[start..newline].trim_ascii().is_empty() {
                count += 1;
            }
            line_has_content = false;
            start = newline + 1;
        }
        if !buf[start..read].trim_ascii().is_empty() {
            line_has_content = true;
        }
    }
    if line_has_content {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_export(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("💀 temp file refused to exist");
        file.write_all(contents.as_bytes())
            .expect("💀 temp file refused our bytes");
        file
    }

    fn config_for(file: &tempfile::NamedTempFile, batch_size: usize) -> FileReaderConfig {
        FileReaderConfig {
            file_name: file.path().display().to_string(),
            content_format: ContentFormat::Json,
            batch_size,
            show_progress: false,
        }
    }

    #[test]
    fn the_one_where_blank_lines_are_politely_ignored() -> Result<()> {
        let export = write_export("{\"a\":1}\n\n{\"a\":2}\r\n   \n{\"a\":3}");
        let mut reader = FileReader::open(config_for(&export, 2))?;

        assert!(reader.has_next()?);
        let first = reader.next_batch()?;
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].record, "{\"a\":2}");

        assert!(reader.has_next()?);
        let second = reader.next_batch()?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].record, "{\"a\":3}");
        assert_eq!(second[0].order, Some(2));

        assert!(!reader.has_next()?);
        Ok(())
    }

    #[test]
    fn the_one_where_peeking_twice_costs_nothing() -> Result<()> {
        let export = write_export("one\ntwo\n");
        let mut reader = FileReader::open(config_for(&export, 10))?;
        assert!(reader.has_next()?);
        assert!(reader.has_next()?);
        let batch = reader.next_batch()?;
        assert_eq!(
            batch.iter().map(|r| r.record.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert!(!reader.has_next()?);
        Ok(())
    }

    #[test]
    fn the_one_where_a_file_of_nothing_has_nothing() -> Result<()> {
        let export = write_export("\n\n");
        let mut reader = FileReader::open(config_for(&export, 5))?;
        assert!(!reader.has_next()?);
        Ok(())
    }

    #[test]
    fn the_one_where_the_door_does_not_exist() {
        let config = FileReaderConfig {
            file_name: "/definitely/not/here.jsonl".into(),
            content_format: ContentFormat::Raw,
            batch_size: 1,
            show_progress: false,
        };
        assert!(FileReader::open(config).is_err());
    }

    #[test]
    fn the_one_where_counting_agrees_with_reading() -> Result<()> {
        let export = write_export("a\n\nb\r\n  \nc");
        assert_eq!(count_records(export.path())?, 3);

        let mut reader = FileReader::open(config_for(&export, 100))?;
        let mut total = 0;
        while reader.has_next()? {
            total += reader.next_batch()?.len();
        }
        assert_eq!(total, 3);
        Ok(())
    }

    #[test]
    fn the_one_where_a_non_breaking_space_is_a_record_to_both_of_them() -> Result<()> {
        let export = write_export("a\n\u{a0}\n\t \nb\n");
        let counted = count_records(export.path())?;

        let mut reader = FileReader::open(config_for(&export, 100))?;
        let mut read = Vec::new();
        while reader.has_next()? {
            read.extend(reader.next_batch()?);
        }
        assert_eq!(counted, 3);
        assert_eq!(read.len() as u64, counted);
        assert_eq!(read[1].record, "\u{a0}");
        Ok(())
    }
}
