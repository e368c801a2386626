//! Brain stage: template-driven structured extraction over document text.
//!
//! Builds the extraction prompt from a template, runs the reasoning engine
//! deterministically (temperature 0.0), and decodes the completion into a
//! JSON mapping. This stage never fails past its boundary: every provider or
//! decode failure is logged and recovered into the template's own schema
//! decoded as an empty instance, so callers always receive an object-shaped
//! result and can tell the two outcomes apart via
//! [`ParsedResult::is_fallback`].

use crate::output::ParsedResult;
use crate::prompts::build_parse_prompt;
use crate::reasoning::{CompletionOptions, ReasoningProvider};
use crate::template::TemplateStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Leading code fence with an optional language tag (` ```json `, ` ``` `).
/// Chat-tuned models routinely open their answer with one.
static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\n(.*?)\n?\s*```").unwrap());

/// How much of an undecodable completion makes it into the log.
const LOG_FRAGMENT_CHARS: usize = 500;

pub struct StructuredExtractor {
    provider: Arc<dyn ReasoningProvider>,
    templates: Arc<TemplateStore>,
}

impl StructuredExtractor {
    pub fn new(provider: Arc<dyn ReasoningProvider>, templates: Arc<TemplateStore>) -> Self {
        Self {
            provider,
            templates,
        }
    }

    /// Extract structured data from document text.
    ///
    /// Total over its inputs: an unknown template id resolves to the generic
    /// fallback template, and any reasoning or decode failure yields
    /// [`ParsedResult::FallbackEmpty`] rather than an error.
    pub async fn extract(
        &self,
        document_text: &str,
        template_id: &str,
        model: &str,
        token_budget: u32,
    ) -> ParsedResult {
        let template = self.templates.get(template_id);
        let prompt = build_parse_prompt(&template.instruction, &template.schema, document_text);

        let options = CompletionOptions {
            temperature: 0.0,
            max_output_tokens: token_budget,
        };

        let completion = match self.provider.complete(model, &prompt, options).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Reasoning engine failed for template '{template_id}': {e}");
                return ParsedResult::FallbackEmpty(template.empty_instance());
            }
        };

        match decode_completion(&completion) {
            Ok(mapping) => {
                debug!(
                    "Decoded completion for template '{template_id}' ({} top-level keys)",
                    mapping.len()
                );
                ParsedResult::Parsed(mapping)
            }
            Err(detail) => {
                let fragment: String = completion.chars().take(LOG_FRAGMENT_CHARS).collect();
                warn!("Completion did not decode as a JSON object ({detail}): {fragment}");
                ParsedResult::FallbackEmpty(template.empty_instance())
            }
        }
    }
}

/// Decode a model completion into a JSON object.
///
/// Unwraps the fence when the completion opens with a fenced code block,
/// discards any prose before the first `{`, then requires the remainder to
/// parse as a JSON object. A fence that is not the opening of the
/// completion is left alone — the `{` scan handles whatever follows it.
fn decode_completion(completion: &str) -> Result<Map<String, Value>, String> {
    let trimmed = completion.trim_start();
    let text = if trimmed.starts_with("```") {
        match RE_FENCE.captures(trimmed) {
            Some(captures) => captures.get(1).map_or(trimmed, |m| m.as_str()),
            None => trimmed,
        }
    } else {
        completion
    };

    let start = text.find('{').ok_or_else(|| "no object start found".to_string())?;
    match serde_json::from_str::<Value>(&text[start..]) {
        Ok(Value::Object(mapping)) => Ok(mapping),
        Ok(other) => Err(format!("decoded a JSON {} instead of an object", kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ReasoningError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct StubProvider {
        completion: Option<&'static str>,
    }

    #[async_trait]
    impl ReasoningProvider for StubProvider {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            options: CompletionOptions,
        ) -> Result<String, ReasoningError> {
            assert_eq!(options.temperature, 0.0);
            self.completion
                .map(str::to_string)
                .ok_or_else(|| ReasoningError::Malformed("engine down".into()))
        }
    }

    fn extractor(completion: Option<&'static str>) -> (TempDir, StructuredExtractor) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("resume.json"),
            r#"{"personal_info": {}, "skills": []}"#,
        )
        .unwrap();
        let templates = Arc::new(TemplateStore::new(dir.path()));
        let extractor =
            StructuredExtractor::new(Arc::new(StubProvider { completion }), templates);
        (dir, extractor)
    }

    #[tokio::test]
    async fn clean_json_completion_is_parsed() {
        let (_dir, extractor) = extractor(Some(r#"{"personal_info": {"name": "Ada"}}"#));
        let result = extractor.extract("text", "resume", "m", 256).await;
        assert!(!result.is_fallback());
        assert_eq!(result.mapping()["personal_info"]["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn completion_opening_with_fence_is_unwrapped_and_parsed() {
        let (_dir, extractor) = extractor(Some("```json\n{\"skills\": [\"rust\"]}\n```"));
        let result = extractor.extract("text", "resume", "m", 256).await;
        assert!(!result.is_fallback());
        assert_eq!(result.mapping()["skills"], json!(["rust"]));
    }

    #[tokio::test]
    async fn undecodable_completion_falls_back_to_empty_schema_instance() {
        let (_dir, extractor) = extractor(Some("I could not find any structure."));
        let result = extractor.extract("text", "resume", "m", 256).await;
        assert!(result.is_fallback());
        assert_eq!(result.mapping()["personal_info"], json!({}));
        assert_eq!(result.mapping()["skills"], json!([]));
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        let (_dir, extractor) = extractor(None);
        let result = extractor.extract("text", "resume", "m", 256).await;
        assert!(result.is_fallback());
        assert_eq!(result.mapping().len(), 2);
    }

    #[tokio::test]
    async fn non_object_json_falls_back() {
        let (_dir, extractor) = extractor(Some("[1, 2, 3]"));
        let result = extractor.extract("text", "resume", "m", 256).await;
        assert!(result.is_fallback());
    }

    #[test]
    fn decode_discards_prefix_before_first_brace() {
        let mapping = decode_completion("Sure! {\"a\": 1}").unwrap();
        assert_eq!(mapping["a"], json!(1));
    }

    #[test]
    fn decode_handles_bare_fence_without_language_tag() {
        let mapping = decode_completion("```\n{\"b\": true}\n```\n").unwrap();
        assert_eq!(mapping["b"], json!(true));
    }

    #[test]
    fn decode_ignores_fences_that_do_not_open_the_completion() {
        // Only an opening fence is unwrapped; a fence later in the text is
        // ordinary content and must not displace the object scan.
        let completion = "Considered this snippet:\n```\nnot json here\n```\n{\"a\": 1}";
        let mapping = decode_completion(completion).unwrap();
        assert_eq!(mapping["a"], json!(1));
    }
}
