//! Resumable single-stream GET into a file.
//!
//! An existing partial file is continued with `Range: bytes=N-`. The body is
//! streamed to disk chunk by chunk, publishing progress after every chunk and
//! checking the cancellation token between chunks. The body is appended only
//! when a `206` starts exactly at the partial length; a `200`, or a `206`
//! from byte 0, rewrites the file from the start.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::error::TransferError;
use super::response::parse_head;
use super::{Outcome, TransferOptions};
use crate::job::TransferProgress;

/// Length of the file at `path`, or 0 if it does not exist. An empty file is
/// removed so the next request starts without a range.
fn existing_length(path: &Path) -> Result<u64, TransferError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => {
            fs::remove_file(path)?;
            Ok(0)
        }
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// State shared by the header and write callbacks of one attempt.
struct StreamSink<'a> {
    path: &'a Path,
    resume_from: u64,
    progress: &'a TransferProgress,
    cancel: &'a CancellationToken,
    header_lines: Vec<String>,
    file: Option<BufWriter<File>>,
    /// Bytes of the destination file that are on disk, offset included.
    written: u64,
    body_started: bool,
    already_complete: bool,
    failure: Option<TransferError>,
}

impl<'a> StreamSink<'a> {
    fn on_header(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line).trim_end().to_string();
        if line.starts_with("HTTP/") {
            self.header_lines.clear();
        }
        self.header_lines.push(line);
    }

    /// Inspect the final response head and open the destination file.
    fn begin_body(&mut self) -> Result<(), TransferError> {
        self.body_started = true;
        let head = parse_head(&self.header_lines);

        if self.resume_from > 0 && head.unsatisfied_total() == Some(self.resume_from) {
            tracing::debug!(path = %self.path.display(), "file already complete on disk");
            self.already_complete = true;
            self.written = self.resume_from;
            self.progress.raise_total(self.resume_from);
            self.progress.set_downloaded(self.resume_from);
            return Ok(());
        }
        if !head.is_success() {
            return Err(TransferError::RequestFailed(head.status.unwrap_or(0)));
        }

        let base = if self.resume_from == 0 {
            0
        } else if head.status != Some(206) {
            tracing::info!(
                path = %self.path.display(),
                "server ignored range request; restarting from byte 0"
            );
            0
        } else {
            match head.partial_start() {
                Some(start) if start == self.resume_from => start,
                Some(0) => {
                    tracing::info!(
                        path = %self.path.display(),
                        requested = self.resume_from,
                        "server answered range request from byte 0; restarting"
                    );
                    0
                }
                served => {
                    return Err(TransferError::RangeMismatch {
                        requested: self.resume_from,
                        served,
                    })
                }
            }
        };
        let append = base > 0;
        if let Some(total) = head.total_size(base) {
            self.progress.raise_total(total);
        }

        let file = if append {
            OpenOptions::new().append(true).open(self.path)?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(self.path)?
        };
        self.file = Some(BufWriter::new(file));
        self.written = base;
        self.progress.set_downloaded(base);
        Ok(())
    }

    fn on_data(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if !self.body_started {
            self.begin_body()?;
        }
        if self.already_complete {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
        }
        self.written += data.len() as u64;
        self.progress.set_downloaded(self.written);
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransferError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Downloads `url` into `path`, resuming from whatever is already there.
///
/// Returns `Completed` once the announced total is on disk and `Cancelled`
/// when `cancel` fired first. Every other failure is an error; partial data
/// stays on disk for the next attempt.
pub fn download_resumable(
    url: &str,
    path: &Path,
    progress: &TransferProgress,
    cancel: &CancellationToken,
    options: &TransferOptions,
) -> Result<Outcome, TransferError> {
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    let resume_from = existing_length(path)?;
    if resume_from > 0 {
        tracing::debug!(path = %path.display(), resume_from, "resuming partial file");
    }
    progress.set_downloaded(resume_from);

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.buffer_size(options.chunk_size)?;
    easy.connect_timeout(options.connect_timeout)?;
    easy.low_speed_limit(options.low_speed_limit)?;
    easy.low_speed_time(options.low_speed_time)?;
    easy.useragent(&options.user_agent)?;
    easy.progress(true)?;
    if resume_from > 0 {
        easy.range(&format!("{}-", resume_from))?;
    }

    let sink = RefCell::new(StreamSink {
        path,
        resume_from,
        progress,
        cancel,
        header_lines: Vec::new(),
        file: None,
        written: 0,
        body_started: false,
        already_complete: false,
        failure: None,
    });

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            sink.borrow_mut().on_header(line);
            true
        })?;
        transfer.write_function(|data| {
            let mut sink = sink.borrow_mut();
            match sink.on_data(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    sink.failure = Some(e);
                    Ok(0)
                }
            }
        })?;
        // Also fires while the server is silent, so a stalled stream still
        // notices cancellation.
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    let mut sink = sink.into_inner();
    if let Some(failure) = sink.failure.take() {
        let _ = sink.flush();
        return match failure {
            TransferError::Cancelled => Ok(Outcome::Cancelled),
            e => Err(e),
        };
    }
    if sink.already_complete {
        return Ok(Outcome::Completed);
    }
    if let Err(e) = performed {
        let _ = sink.flush();
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        return Err(TransferError::Curl(e));
    }
    if !sink.body_started {
        // Empty body: the head still decides, and an empty file is created.
        sink.begin_body()?;
        if sink.already_complete {
            return Ok(Outcome::Completed);
        }
    }
    sink.flush()?;

    let total = progress.total_size();
    if total > 0 && sink.written == total {
        Ok(Outcome::Completed)
    } else if cancel.is_cancelled() {
        Ok(Outcome::Cancelled)
    } else {
        Err(TransferError::Incomplete {
            expected: total,
            received: sink.written,
        })
    }
}
