//! Capture dispatch
//!
//! Runs once per cycle after the protocol dispatcher: drains the held
//! capture rings into the log sink and the publish channel, then releases
//! them. Sink failures are logged and reported back to the sink; they never
//! stop the cycle or keep a lock alive.

use super::{CaptureKind, CaptureReader, CaptureRing, CaptureScope};
use crate::core::session::SessionState;
use thiserror::Error;

/// Capture sink errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// I/O error while appending
    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No log file is open for this kind
    #[error("No {0} log file is open")]
    NotOpen(CaptureKind),

    /// The publish subscriber refused the data
    #[error("Publish refused: {0}")]
    PublishRefused(String),
}

/// Destination for captured bytes written to disk
#[cfg_attr(test, mockall::automock)]
pub trait LogSink {
    /// Append bytes of `kind`. Returns how many bytes were accepted.
    fn append(&mut self, kind: CaptureKind, bytes: &[u8]) -> Result<usize, CaptureError>;

    /// Told about a failed append; the sink decides how to surface it
    fn on_error(&mut self, _kind: CaptureKind, _error: &CaptureError) {}
}

/// Channel forwarding captured text to an out-of-process subscriber
#[cfg_attr(test, mockall::automock)]
pub trait PublishChannel {
    /// Whether a subscriber is attached at all. Publishing is switched off
    /// for the session when this is false.
    fn is_active(&self) -> bool {
        true
    }

    /// Whether the subscriber currently accepts advise notifications
    fn advise_permitted(&self) -> bool;

    /// Forward text. Returns how many bytes the subscriber took.
    fn publish(&mut self, text: &[u8]) -> Result<usize, CaptureError>;

    /// Told about a failed forward
    fn on_error(&mut self, _error: &CaptureError) {}
}

/// Sink that discards everything it is given
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&mut self, _kind: CaptureKind, bytes: &[u8]) -> Result<usize, CaptureError> {
        Ok(bytes.len())
    }
}

/// Publish channel with no subscriber; advise is never permitted
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPublish;

impl PublishChannel for NoPublish {
    fn is_active(&self) -> bool {
        false
    }

    fn advise_permitted(&self) -> bool {
        false
    }

    fn publish(&mut self, _text: &[u8]) -> Result<usize, CaptureError> {
        Ok(0)
    }
}

/// What one dispatch pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Text bytes appended to file
    pub text_logged: usize,
    /// Binary bytes appended to file
    pub binary_logged: usize,
    /// Text bytes forwarded to the publish channel
    pub published: usize,
    /// Failed sink calls
    pub failures: usize,
    /// Locks released by this pass
    pub released: usize,
}

/// Feed the pending bytes of `reader` to `write`, oldest first.
///
/// Stops early when the consumer takes less than it was offered.
fn drain(
    ring: &mut CaptureRing,
    reader: CaptureReader,
    mut write: impl FnMut(&[u8]) -> Result<usize, CaptureError>,
) -> Result<usize, CaptureError> {
    let mut total = 0;
    for _ in 0..2 {
        let (chunk, _) = ring.peek(reader);
        if chunk.is_empty() {
            break;
        }
        let offered = chunk.len();
        let taken = write(chunk)?.min(offered);
        ring.consume(reader, taken);
        total += taken;
        if taken < offered {
            break;
        }
    }
    Ok(total)
}

/// Drain and release every capture ring `scope` holds
pub fn dispatch(
    session: &mut SessionState,
    scope: &mut CaptureScope,
    sink: &mut dyn LogSink,
    publish: &mut dyn PublishChannel,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for kind in CaptureKind::ALL {
        let Some(ring) = scope.get_mut(kind) else {
            continue;
        };

        let file_enabled = match kind {
            CaptureKind::Text => session.capture.file_log,
            CaptureKind::Binary => session.capture.binary_log,
        };
        if file_enabled {
            match drain(ring, CaptureReader::File, |chunk| sink.append(kind, chunk)) {
                Ok(n) => match kind {
                    CaptureKind::Text => report.text_logged += n,
                    CaptureKind::Binary => report.binary_logged += n,
                },
                Err(e) => {
                    tracing::warn!(%kind, "Capture append failed: {}", e);
                    sink.on_error(kind, &e);
                    report.failures += 1;
                }
            }
        }

        if kind == CaptureKind::Text && session.capture.publish && publish.advise_permitted() {
            match drain(ring, CaptureReader::Publish, |chunk| publish.publish(chunk)) {
                Ok(n) => report.published += n,
                Err(e) => {
                    tracing::warn!("Publish failed: {}", e);
                    publish.on_error(&e);
                    report.failures += 1;
                }
            }
        }

        session.sync_capture_counts(kind, ring);
        if scope.release(kind) {
            report.released += 1;
        }
    }

    report
}
