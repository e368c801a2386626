//! visioningest — two-stage document understanding pipeline.
//!
//! Stage one ("Eyes") turns a PDF or raster image into clean document text:
//! rasterise pages, normalise each frame (deskew, upscale, contrast), run a
//! vision model hosted by an external runner process, and sanitise its
//! emission. Stage two ("Brain") turns that text into structured data via a
//! template-driven prompt against a locally hosted reasoning model, with a
//! deterministic fallback so the pipeline always yields an object-shaped
//! result.
//!
//! The crate is transport-agnostic: no HTTP server, no upload handling, no
//! process startup. A service layer builds one [`AppContext`] and calls
//! [`process_document`] (or [`extract_text`] for text only).
//!
//! # Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use visioningest::{
//!     AppContext, MediaType, OllamaProvider, PipelineConfig, ProcessRequest,
//! };
//!
//! # async fn run() -> Result<(), visioningest::PipelineError> {
//! let config = PipelineConfig::builder()
//!     .model_path("models/deepseek-ocr-2")
//!     .runner_path("deepseek-ocr-runner")
//!     .templates_dir("templates")
//!     .build()?;
//!
//! let provider = Arc::new(OllamaProvider::new(config.reasoning_base_url.clone()));
//! let ctx = AppContext::new(config, provider);
//! ctx.load_engine().await?;
//!
//! let request = ProcessRequest {
//!     bytes: std::fs::read("resume.pdf").unwrap(),
//!     media_type: MediaType::Pdf,
//!     quality: "base".to_string(),
//!     reasoning_model: "qwen2.5:7b".to_string(),
//!     template_id: "resume".to_string(),
//!     token_budget: None,
//!     expected_sections: vec!["personal_info".to_string(), "experience".to_string()],
//! };
//!
//! let result = visioningest::process_document(&ctx, request).await?;
//! println!("{}", result.raw_text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod reasoning;
pub mod structured;
pub mod template;

pub use config::{quality_profile, PipelineConfig, QualityProfile, QUALITY_PROFILES};
pub use context::{AppContext, EnginePool};
pub use error::PipelineError;
pub use extract::{extract_text, process_document, ProcessRequest};
pub use output::{ExtractionMetadata, ParsedResult, PipelineResult};
pub use pipeline::rasterize::MediaType;
pub use reasoning::{CompletionOptions, OllamaProvider, ReasoningError, ReasoningProvider};
pub use structured::StructuredExtractor;
pub use template::{Template, TemplateStore};
