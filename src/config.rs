//! Configuration types for the document pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share the config across tasks and to log it alongside a
//! run.
//!
//! The quality-profile registry also lives here: a total function from a
//! profile name to resolution/scale/token parameters, with `"base"` as the
//! named default for unrecognised names.

use crate::error::PipelineError;
use serde::Serialize;
use std::path::PathBuf;

/// Configuration for the extraction pipeline.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use visioningest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model_path("models/deepseek-ocr-2")
///     .device("cuda")
///     .templates_dir("templates")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Filesystem path to the vision model weights. Checked at
    /// [`engine load`](crate::pipeline::engine::InferenceEngine::load) time;
    /// a missing path is a load failure, not a panic.
    pub model_path: PathBuf,

    /// Path to the inference runner executable that hosts the model.
    /// Resolved through `PATH` when not absolute.
    pub runner_path: PathBuf,

    /// Model identifier reported in [`crate::output::ExtractionMetadata`].
    pub model_name: String,

    /// Accelerator device identifier passed to the runner. Default: "cuda".
    pub device: String,

    /// Reduced numeric precision mode passed to the runner. Default: "bf16".
    pub precision: String,

    /// Whether the runner may tile the page into crops. Default: false —
    /// crop mode can break multi-column layouts.
    pub crop_mode: bool,

    /// Fixed secondary patch dimension for inference requests. Default: 768.
    pub patch_size: u32,

    /// Directory holding `<template_id>.json` schema and
    /// `<template_id>.txt` instruction artifacts.
    pub templates_dir: PathBuf,

    /// Base URL of the Ollama-style reasoning engine.
    /// Default: "http://localhost:11434".
    pub reasoning_base_url: String,

    /// Advisory page-count ceiling. Carried for the transport layer to
    /// enforce at admission; the pipeline itself processes whatever it is
    /// given. Default: 10.
    pub max_pages: usize,

    /// Advisory processing timeout in seconds. Not wired into the inference
    /// path: once an inference call is dispatched it runs to completion.
    /// Callers wanting a hard deadline must wrap the pipeline call in their
    /// own timeout. Default: 60.
    pub processing_timeout_secs: u64,

    /// Directory for scratch frame PNGs. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/deepseek-ocr-2"),
            runner_path: PathBuf::from("deepseek-ocr-runner"),
            model_name: "deepseek-ai/DeepSeek-OCR-2".to_string(),
            device: "cuda".to_string(),
            precision: "bf16".to_string(),
            crop_mode: false,
            patch_size: 768,
            templates_dir: PathBuf::from("templates"),
            reasoning_base_url: "http://localhost:11434".to_string(),
            max_pages: 10,
            processing_timeout_secs: 60,
            temp_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the configured device is an accelerator (reported in
    /// metadata as `accelerator_used`).
    pub fn uses_accelerator(&self) -> bool {
        self.device == "cuda"
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = path.into();
        self
    }

    pub fn runner_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runner_path = path.into();
        self
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.config.model_name = name.into();
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.config.device = device.into();
        self
    }

    pub fn precision(mut self, precision: impl Into<String>) -> Self {
        self.config.precision = precision.into();
        self
    }

    pub fn crop_mode(mut self, v: bool) -> Self {
        self.config.crop_mode = v;
        self
    }

    pub fn patch_size(mut self, px: u32) -> Self {
        self.config.patch_size = px.max(64);
        self
    }

    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.templates_dir = dir.into();
        self
    }

    pub fn reasoning_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.reasoning_base_url = url.into();
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn processing_timeout_secs(mut self, secs: u64) -> Self {
        self.config.processing_timeout_secs = secs;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.model_name.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "model_name must not be empty".into(),
            ));
        }
        if c.reasoning_base_url.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "reasoning_base_url must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Quality profiles ─────────────────────────────────────────────────────

/// Named bundle of resolution/scale/token parameters trading speed against
/// detail.
///
/// `target_size` is the base size handed to the vision model, `raster_scale`
/// the page-to-pixels multiplier used when rasterising PDF pages, and
/// `token_budget` the per-page vision token budget exposed so callers can
/// budget downstream work per profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityProfile {
    pub name: &'static str,
    pub target_size: u32,
    pub raster_scale: f32,
    pub token_budget: u32,
}

/// Quality presets matching the vision model's native resolutions.
pub const QUALITY_PROFILES: [QualityProfile; 4] = [
    QualityProfile {
        name: "tiny",
        target_size: 512,
        raster_scale: 1.5,
        token_budget: 64,
    },
    QualityProfile {
        name: "small",
        target_size: 640,
        raster_scale: 2.0,
        token_budget: 100,
    },
    QualityProfile {
        name: "base",
        target_size: 1024,
        raster_scale: 2.0,
        token_budget: 256,
    },
    QualityProfile {
        name: "large",
        target_size: 1280,
        raster_scale: 3.0,
        token_budget: 400,
    },
];

/// Resolve a quality profile by name.
///
/// Total function: an unrecognised name resolves to the `"base"` profile
/// rather than failing.
pub fn quality_profile(name: &str) -> &'static QualityProfile {
    QUALITY_PROFILES
        .iter()
        .find(|p| p.name == name)
        .unwrap_or(&QUALITY_PROFILES[2]) // "base"
}
