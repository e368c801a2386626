//! Result types produced by the pipeline.

use serde::Serialize;
use serde_json::{Map, Value};

/// Metadata describing one Eyes-stage extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetadata {
    /// Extraction method tag, e.g. `"deepseek-ocr"`.
    pub method: String,
    /// Wall-clock duration of the extraction in whole milliseconds.
    pub processing_time_ms: u64,
    /// Number of pages processed.
    pub page_count: usize,
    /// Whether the engine ran on an accelerator device.
    pub accelerator_used: bool,
    /// Identifier of the loaded model, when known.
    pub model_version: Option<String>,
}

/// Outcome of structured extraction.
///
/// Always JSON-object-shaped. The two variants let callers distinguish a
/// genuinely parsed (possibly sparse) result from the defensive fallback
/// taken when the reasoning engine produced no decodable JSON object: in
/// the fallback case the mapping is the template's own schema decoded as an
/// empty instance, never null and never an error object.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ParsedResult {
    /// The completion decoded as a JSON object.
    Parsed(Map<String, Value>),
    /// Decode failed (or the reasoning call itself failed); the mapping is
    /// the template schema as an empty instance.
    FallbackEmpty(Map<String, Value>),
}

impl ParsedResult {
    /// The structured mapping, regardless of outcome.
    pub fn mapping(&self) -> &Map<String, Value> {
        match self {
            ParsedResult::Parsed(m) | ParsedResult::FallbackEmpty(m) => m,
        }
    }

    /// Consume the result, yielding the mapping.
    pub fn into_mapping(self) -> Map<String, Value> {
        match self {
            ParsedResult::Parsed(m) | ParsedResult::FallbackEmpty(m) => m,
        }
    }

    /// True when this result is the empty-schema fallback rather than a
    /// decoded completion.
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedResult::FallbackEmpty(_))
    }
}

/// Full result of the two-stage pipeline for one document.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// `"success"` — failures surface as errors, not result values.
    pub status: String,
    /// Sanitized document text assembled from all pages (Eyes stage).
    pub raw_text: String,
    /// Structured mapping from the Brain stage.
    pub parsed: ParsedResult,
    /// Eyes-stage metadata.
    pub metadata: ExtractionMetadata,
    /// One warning per expected top-level section missing from `parsed`.
    pub warnings: Vec<String>,
}

/// Compute warnings for expected top-level sections absent from a mapping.
///
/// A section counts as missing when the key is absent or its value is
/// null, an empty string, an empty array, or an empty object. Each missing
/// section yields one `"No <section> extracted"` string with underscores
/// rendered as spaces.
pub fn missing_section_warnings(mapping: &Map<String, Value>, expected: &[String]) -> Vec<String> {
    expected
        .iter()
        .filter(|key| mapping.get(key.as_str()).map_or(true, is_empty_value))
        .map(|key| format!("No {} extracted", key.replace('_', " ")))
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
