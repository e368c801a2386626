//! Scoped capture of the inference runner's console emission.
//!
//! The vision model does not return its result as a value: it emits text on
//! the runner's stdout. This adapter owns every read against that stream so
//! capture logic never leaks into orchestration code. One call to
//! [`capture_emission`] consumes exactly one response — all bytes up to the
//! terminating sentinel line — and leaves the stream aligned on the next
//! response boundary on every exit path. A stream error means the boundary
//! is lost and the engine must be reloaded.
//!
//! Wire format (runner → host, one response per request):
//!
//! ```text
//! <free-form emission lines, including harness diagnostics>
//! <<done>>
//! ```
//!
//! A runner-side failure is reported as a `<<error>> <message>` line before
//! the sentinel.

use std::io::BufRead;
use thiserror::Error;

/// Line terminating one emission.
pub const DONE_SENTINEL: &str = "<<done>>";

/// Prefix of a runner-side failure line.
pub const ERROR_PREFIX: &str = "<<error>>";

/// Prefix of the readiness line printed once after the model is loaded.
pub const READY_PREFIX: &str = "READY";

/// Errors from the capture adapter.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The stream ended before the sentinel; the runner died mid-response.
    #[error("emission stream closed before the response was complete")]
    StreamClosed,

    /// Reading the stream failed; the response boundary is lost.
    #[error("emission stream read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The runner reported a failure for this request.
    #[error("runner reported: {0}")]
    Runner(String),
}

/// Capture one emission: every byte up to (not including) the sentinel
/// line.
///
/// When the runner reports a failure, the remainder of the response is
/// still consumed through the sentinel before the error is returned, so the
/// stream stays usable for the next request.
pub fn capture_emission<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, CaptureError> {
    let mut captured = Vec::new();
    let mut runner_error: Option<String> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Err(CaptureError::StreamClosed);
        }

        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\r', '\n']);

        if trimmed == DONE_SENTINEL {
            return match runner_error {
                Some(msg) => Err(CaptureError::Runner(msg)),
                None => Ok(captured),
            };
        }

        if let Some(msg) = trimmed.strip_prefix(ERROR_PREFIX) {
            runner_error = Some(msg.trim().to_string());
            continue;
        }

        captured.extend_from_slice(&line);
    }
}

/// Wait for the runner's readiness line, returning whatever follows the
/// `READY` prefix (the attention backend the runner settled on).
///
/// EOF before readiness means the runner refused the requested backend or
/// failed to start.
pub fn await_ready<R: BufRead>(reader: &mut R) -> Result<String, CaptureError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(CaptureError::StreamClosed);
        }
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(READY_PREFIX) {
            return Ok(rest.trim().to_string());
        }
        if let Some(msg) = trimmed.strip_prefix(ERROR_PREFIX) {
            return Err(CaptureError::Runner(msg.trim().to_string()));
        }
    }
}
