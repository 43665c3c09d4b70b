//! Save a response body to disk while reporting progress.
//!
//! # Design
//! `Download` is a plain iterator over `DownloadState`: each `next` does just
//! enough blocking I/O to produce the following state. `save_async` drives
//! that same iterator on tokio's blocking pool and forwards the states through
//! a channel, so the async and blocking paths cannot drift apart.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::error::DownloadError;
use crate::http::RawResponse;

pub const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub enum DownloadState {
    Started,
    /// Percentage of the declared length written so far, 0 to 100.
    Downloading { progress: u8 },
    Finished,
    Failed(DownloadError),
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Finished | DownloadState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Begin,
    Open,
    Copy,
    Done,
}

/// Blocking download of one response body. See `save`.
pub struct Download {
    status: u16,
    total: Option<u64>,
    source: Option<Box<dyn Read + Send>>,
    path: PathBuf,
    file: Option<File>,
    written: u64,
    last_progress: Option<u8>,
    stage: Stage,
    buf: Vec<u8>,
}

/// Copy `response` into a new file at `path`.
///
/// Yields `Started`, deduplicated `Downloading` percentages and then
/// `Finished`, or a single `Failed` for a non-200 status (in which case no
/// file is created). An empty body yields `Started, Finished` and leaves an
/// empty file. Without a `Content-Length` no percentages are reported.
pub fn save(response: RawResponse, path: impl AsRef<Path>) -> Download {
    let status = response.status;
    let total = response.content_length();
    Download {
        status,
        total,
        source: Some(response.into_reader()),
        path: path.as_ref().to_path_buf(),
        file: None,
        written: 0,
        last_progress: None,
        stage: Stage::Begin,
        buf: vec![0; CHUNK_SIZE],
    }
}

impl Download {
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn progress(&self) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        Some((self.written.saturating_mul(100) / total).min(100) as u8)
    }

    fn read_chunk(&mut self) -> io::Result<usize> {
        let (Some(source), Some(file)) = (self.source.as_mut(), self.file.as_mut()) else {
            return Ok(0);
        };
        let n = loop {
            match source.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        file.write_all(&self.buf[..n])?;
        self.written += n as u64;
        Ok(n)
    }

    fn finish(&mut self) -> DownloadState {
        let flushed = self.file.as_mut().map_or(Ok(()), |f| f.flush());
        self.close();
        match flushed {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), bytes = self.written, "download finished");
                DownloadState::Finished
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn fail(&mut self, cause: DownloadError) -> DownloadState {
        self.close();
        tracing::warn!(path = %self.path.display(), error = %cause, "download failed");
        DownloadState::Failed(cause)
    }

    fn close(&mut self) {
        self.source = None;
        self.file = None;
        self.stage = Stage::Done;
    }
}

impl Iterator for Download {
    type Item = DownloadState;

    fn next(&mut self) -> Option<DownloadState> {
        loop {
            match self.stage {
                Stage::Begin => {
                    if self.status != 200 {
                        return Some(self.fail(DownloadError::Status(self.status)));
                    }
                    self.stage = Stage::Open;
                    tracing::debug!(path = %self.path.display(), total = ?self.total, "download started");
                    return Some(DownloadState::Started);
                }
                Stage::Open => {
                    match File::create(&self.path) {
                        Ok(file) => self.file = Some(file),
                        Err(e) => return Some(self.fail(e.into())),
                    }
                    if self.total == Some(0) {
                        return Some(self.finish());
                    }
                    self.stage = Stage::Copy;
                }
                Stage::Copy => match self.read_chunk() {
                    Ok(0) => return Some(self.finish()),
                    Ok(_) => {
                        if let Some(progress) = self.progress() {
                            if self.last_progress != Some(progress) {
                                self.last_progress = Some(progress);
                                return Some(DownloadState::Downloading { progress });
                            }
                        }
                    }
                    Err(e) => return Some(self.fail(e.into())),
                },
                Stage::Done => return None,
            }
        }
    }
}

/// Run `save` on the blocking pool of the current tokio runtime.
///
/// Dropping the stream stops the copy before the next state is produced.
/// Outside a runtime nothing is written and the stream yields a single
/// `Failed(Runtime)`.
pub fn save_async(response: RawResponse, path: impl AsRef<Path>) -> DownloadStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = tx.send(DownloadState::Failed(DownloadError::Runtime(e.to_string())));
            return DownloadStream { rx };
        }
    };
    let mut download = save(response, path);

    runtime.spawn_blocking(move || {
        while !tx.is_closed() {
            let Some(state) = download.next() else {
                break;
            };
            if tx.send(state).is_err() {
                break;
            }
        }
    });

    DownloadStream { rx }
}

/// Async view of a `Download`.
pub struct DownloadStream {
    rx: UnboundedReceiver<DownloadState>,
}

impl Stream for DownloadStream {
    type Item = DownloadState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{FutureExt, StreamExt};

    use super::*;

    fn response(status: u16, body: Vec<u8>, declared: Option<usize>) -> RawResponse {
        let headers = declared
            .map(|len| vec![("content-length".to_string(), len.to_string())])
            .unwrap_or_default();
        RawResponse::from_bytes(status, headers, body)
    }

    fn progresses(states: &[DownloadState]) -> Vec<u8> {
        states
            .iter()
            .filter_map(|s| match s {
                DownloadState::Downloading { progress } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn copies_body_and_reports_monotonic_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let body: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

        let states: Vec<_> = save(response(200, body.clone(), Some(body.len())), &path).collect();

        assert!(matches!(states.first(), Some(DownloadState::Started)));
        assert!(matches!(states.last(), Some(DownloadState::Finished)));
        let p = progresses(&states);
        assert!(!p.is_empty());
        assert!(p.windows(2).all(|w| w[0] < w[1]), "progress must strictly increase: {p:?}");
        assert_eq!(*p.last().unwrap(), 100);
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[test]
    fn small_body_reports_single_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        let states: Vec<_> = save(response(200, b"abc".to_vec(), Some(3)), &path).collect();

        assert_eq!(states.len(), 3);
        assert!(matches!(states[1], DownloadState::Downloading { progress: 100 }));
        assert!(matches!(states[2], DownloadState::Finished));
    }

    #[test]
    fn non_ok_status_fails_without_creating_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let states: Vec<_> = save(response(404, b"nope".to_vec(), Some(4)), &path).collect();

        assert_eq!(states.len(), 1);
        assert!(matches!(states[0], DownloadState::Failed(DownloadError::Status(404))));
        assert!(!path.exists());
    }

    #[test]
    fn zero_length_body_finishes_with_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let states: Vec<_> = save(response(200, Vec::new(), Some(0)), &path).collect();

        assert_eq!(states.len(), 2);
        assert!(matches!(states[0], DownloadState::Started));
        assert!(matches!(states[1], DownloadState::Finished));
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn unknown_length_skips_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunked.bin");
        let states: Vec<_> = save(response(200, vec![7; 20_000], None), &path).collect();

        assert_eq!(states.len(), 2);
        assert!(progresses(&states).is_empty());
        assert_eq!(std::fs::read(&path).unwrap().len(), 20_000);
    }

    #[test]
    fn progress_is_clamped_when_body_exceeds_declared_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.bin");
        let states: Vec<_> = save(response(200, vec![1; 30_000], Some(10_000)), &path).collect();

        assert!(progresses(&states).iter().all(|p| *p <= 100));
        assert!(matches!(states.last(), Some(DownloadState::Finished)));
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.served = true;
            buf[..10].fill(1);
            Ok(10)
        }
    }

    #[test]
    fn read_error_ends_with_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        let response = RawResponse::new(
            200,
            vec![("content-length".to_string(), "100".to_string())],
            Box::new(FailingReader { served: false }),
        );

        let states: Vec<_> = save(response, &path).collect();
        assert!(matches!(states[0], DownloadState::Started));
        assert!(matches!(states[1], DownloadState::Downloading { progress: 10 }));
        assert!(matches!(&states[2], DownloadState::Failed(DownloadError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset));
        assert_eq!(states.len(), 3);
    }

    #[test]
    fn async_save_outside_a_runtime_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let stream = save_async(response(200, b"abc".to_vec(), Some(3)), &path);

        let states: Vec<_> = stream.collect().now_or_never().unwrap();
        assert_eq!(states.len(), 1);
        assert!(matches!(states[0], DownloadState::Failed(DownloadError::Runtime(_))));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_destination_fails_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("file.bin");
        let states: Vec<_> = save(response(200, b"abc".to_vec(), Some(3)), &path).collect();

        assert_eq!(states.len(), 2);
        assert!(matches!(states[0], DownloadState::Started));
        assert!(matches!(states[1], DownloadState::Failed(DownloadError::Io(_))));
    }
}
