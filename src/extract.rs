//! Orchestration of the two-stage pipeline.
//!
//! Stage one ("Eyes", [`extract_text`]): rasterise the document, normalise
//! each page, drive the vision engine page-by-page, sanitise each emission,
//! and assemble the document text with page markers. Stage two ("Brain",
//! via [`process_document`]): hand the text to the structured extractor and
//! attach missing-section warnings.
//!
//! The Eyes stage holds the engine slot for the whole document and runs
//! entirely on the blocking pool: pages go through strictly in order, one
//! inference call at a time, and another document cannot interleave its
//! pages with this one. Any per-page failure abandons the document — no
//! partial text ever escapes.

use crate::config::{quality_profile, QualityProfile};
use crate::context::{AppContext, EnginePool};
use crate::error::PipelineError;
use crate::output::{missing_section_warnings, ExtractionMetadata, PipelineResult};
use crate::pipeline::engine::InferError;
use crate::pipeline::preprocess::preprocess;
use crate::pipeline::rasterize::{rasterize, MediaType, PageFrame};
use crate::pipeline::sanitize::clean_emission;
use image::{ImageFormat, RgbImage};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, warn};

/// Method tag reported in extraction metadata.
const METHOD_TAG: &str = "deepseek-ocr-2";

/// One full pipeline request.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    /// Quality profile name; unknown names resolve to `"base"`.
    pub quality: String,
    /// Reasoning model identifier, e.g. `"qwen2.5:7b"`.
    pub reasoning_model: String,
    pub template_id: String,
    /// Token budget for the reasoning call; `None` uses the quality
    /// profile's budget.
    pub token_budget: Option<u32>,
    /// Top-level schema keys the caller expects to see populated; each
    /// absent or empty one becomes a warning on the result.
    pub expected_sections: Vec<String>,
}

/// Run the Eyes stage: document bytes in, sanitised text plus metadata out.
///
/// Fails with [`PipelineError::EngineNotLoaded`] unless the engine has been
/// loaded via [`AppContext::load_engine`].
pub async fn extract_text(
    ctx: &AppContext,
    bytes: Vec<u8>,
    media_type: MediaType,
    quality: &str,
) -> Result<(String, ExtractionMetadata), PipelineError> {
    let profile = quality_profile(quality);
    let pool = Arc::clone(&ctx.engine);
    let temp_dir = ctx.config.temp_dir.clone();
    let max_pages = ctx.config.max_pages;

    tokio::task::spawn_blocking(move || {
        extract_text_blocking(&pool, temp_dir.as_deref(), max_pages, &bytes, media_type, profile)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("extraction task panicked: {e}")))?
}

fn extract_text_blocking(
    pool: &EnginePool,
    temp_dir: Option<&Path>,
    max_pages: usize,
    bytes: &[u8],
    media_type: MediaType,
    profile: &'static QualityProfile,
) -> Result<(String, ExtractionMetadata), PipelineError> {
    let started = Instant::now();

    // Hold the slot for the whole document so pages never interleave.
    let mut engine = pool.acquire_blocking();
    if !engine.is_loaded() {
        return Err(PipelineError::EngineNotLoaded);
    }

    let frames = rasterize(bytes, media_type, profile.raster_scale)?;
    let page_count = frames.len();
    if page_count > max_pages {
        warn!("Document has {page_count} pages, above the advised ceiling of {max_pages}");
    }
    info!(
        "Extracting {page_count} page(s) at quality '{}' ({}px)",
        profile.name, profile.target_size
    );

    let mut pages = Vec::with_capacity(page_count);
    for frame in frames {
        let page_text = infer_page(&mut engine, temp_dir, frame, profile.target_size)?;
        pages.push(page_text);
    }

    let text = join_pages(&pages);
    let config = engine.config();
    let metadata = ExtractionMetadata {
        method: METHOD_TAG.to_string(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        page_count,
        accelerator_used: config.uses_accelerator(),
        model_version: Some(config.model_name.clone()),
    };
    info!(
        "Extraction finished: {} chars from {page_count} page(s) in {} ms",
        text.len(),
        metadata.processing_time_ms
    );
    Ok((text, metadata))
}

/// Preprocess one frame, stage it as a scratch PNG for exactly one
/// inference call, and sanitise the emission. The scratch file is removed
/// on every path when the `NamedTempFile` guard drops.
fn infer_page(
    engine: &mut crate::pipeline::engine::InferenceEngine,
    temp_dir: Option<&Path>,
    frame: PageFrame,
    target_size: u32,
) -> Result<String, PipelineError> {
    let page = frame.index + 1;
    let pixels = preprocess(frame.pixels);

    let scratch = write_scratch_png(temp_dir, &pixels)?;
    let emission = engine.infer(scratch.path(), target_size).map_err(|e| match e {
        InferError::NotLoaded => PipelineError::EngineNotLoaded,
        other => PipelineError::InferenceFailed {
            page,
            detail: other.to_string(),
        },
    })?;

    let cleaned = clean_emission(&emission);
    debug!("Page {page}: {} raw bytes → {} clean chars", emission.len(), cleaned.len());
    Ok(cleaned)
}

fn write_scratch_png(
    temp_dir: Option<&Path>,
    pixels: &RgbImage,
) -> Result<NamedTempFile, PipelineError> {
    let builder_result = {
        let mut builder = Builder::new();
        builder.prefix("frame-").suffix(".png");
        match temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    };
    let mut scratch = builder_result.map_err(|e| PipelineError::Scratch {
        detail: e.to_string(),
    })?;
    pixels
        .write_to(scratch.as_file_mut(), ImageFormat::Png)
        .map_err(|e| PipelineError::Scratch {
            detail: e.to_string(),
        })?;
    Ok(scratch)
}

/// Assemble page texts: single-page documents pass through unmarked;
/// multi-page documents get 1-based `--- Page k ---` markers joined with a
/// blank line.
fn join_pages(pages: &[String]) -> String {
    match pages {
        [only] => only.clone(),
        many => many
            .iter()
            .enumerate()
            .map(|(i, text)| format!("--- Page {} ---\n{text}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

/// Run the full pipeline: Eyes then Brain.
///
/// The Brain stage cannot fail the document — reasoning failures degrade to
/// the empty-schema fallback inside the structured extractor — so the only
/// error sources here are the Eyes stage and document decoding.
pub async fn process_document(
    ctx: &AppContext,
    request: ProcessRequest,
) -> Result<PipelineResult, PipelineError> {
    let (raw_text, metadata) =
        extract_text(ctx, request.bytes, request.media_type, &request.quality).await?;

    let token_budget = request
        .token_budget
        .unwrap_or_else(|| quality_profile(&request.quality).token_budget);

    let parsed = ctx
        .structured
        .extract(
            &raw_text,
            &request.template_id,
            &request.reasoning_model,
            token_budget,
        )
        .await;

    let warnings = missing_section_warnings(parsed.mapping(), &request.expected_sections);
    for warning in &warnings {
        warn!("{warning}");
    }

    Ok(PipelineResult {
        status: "success".to_string(),
        raw_text,
        parsed,
        metadata,
        warnings,
    })
}
