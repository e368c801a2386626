//! Error types for the visioningest pipeline.
//!
//! A single [`PipelineError`] covers every fatal failure mode of the
//! document pipeline. Two failure classes deliberately never appear here:
//!
//! * Preprocessing estimation failures (skew detection finding no lines,
//!   etc.) degrade to "no adjustment" inside
//!   [`crate::pipeline::preprocess`] and never abort a document.
//! * Malformed reasoning-engine completions are recovered locally by
//!   [`crate::structured::StructuredExtractor`] via the empty-schema
//!   fallback; only the provider boundary itself uses
//!   [`crate::reasoning::ReasoningError`], and that too is swallowed.
//!
//! Everything else — rasterisation, inference, scratch I/O — fails the
//! whole document with exactly one wrapped error. There are no automatic
//! retries; whole-document retry is a caller responsibility.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the visioningest pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Model weights were not found at the configured path at load time.
    #[error("model weights not found at '{path}'\nDownload the model and point `model_path` at it.")]
    WeightsNotFound { path: PathBuf },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Resource state errors ─────────────────────────────────────────────
    /// Extraction was attempted while the inference engine is `Unloaded`.
    #[error("inference engine is not loaded\nCall `AppContext::load_engine()` before extracting.")]
    EngineNotLoaded,

    /// The inference runner process could not be started or died before
    /// signalling readiness on either attention backend.
    #[error("inference runner unavailable: {detail}")]
    RunnerUnavailable { detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The declared media type is neither a PDF nor a raster image.
    #[error("unsupported media type '{declared}'\nSupported: application/pdf and image/* (png, jpeg, webp).")]
    UnsupportedMediaType { declared: String },

    /// The input bytes could not be decoded as a raster image.
    #[error("failed to decode image input: {detail}")]
    ImageDecodeFailed { detail: String },

    /// The PDF header/xref is corrupt and cannot be opened.
    #[error("document is corrupt and cannot be opened: {detail}")]
    CorruptDocument { detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Rasterisation of a specific page failed.
    #[error("rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Inference failed on a specific page. Fails the whole document.
    #[error("inference failed on page {page}: {detail}")]
    InferenceFailed { page: usize, detail: String },

    /// Scratch-file read/write failed (temp frame PNGs).
    #[error("scratch file I/O failed: {detail}")]
    Scratch { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failures and the like).
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_not_found_names_path() {
        let e = PipelineError::WeightsNotFound {
            path: PathBuf::from("/models/ocr"),
        };
        assert!(e.to_string().contains("/models/ocr"));
    }

    #[test]
    fn inference_failed_names_page() {
        let e = PipelineError::InferenceFailed {
            page: 3,
            detail: "runner closed the stream".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"));
        assert!(msg.contains("runner closed the stream"));
    }

    #[test]
    fn unsupported_media_type_display() {
        let e = PipelineError::UnsupportedMediaType {
            declared: "text/html".into(),
        };
        assert!(e.to_string().contains("text/html"));
    }
}
