//! Prompt and fallback text for both pipeline stages.
//!
//! Centralising every prompt here keeps a single source of truth and lets
//! unit tests inspect prompt layout without driving a real model.

/// Fixed structure-preserving conversion instruction sent to the vision
/// model with every frame. The grounding token asks the model to preserve
/// document layout; the sanitizer strips any grounding artefacts that leak
/// into the emission.
pub const CONVERSION_PROMPT: &str = "<image>\n<|grounding|>Convert the document to markdown.";

/// Instruction used when a template has no `<id>.txt` artifact.
pub const FALLBACK_INSTRUCTION: &str =
    "Extract the document data into the JSON schema provided.";

/// Schema used when a template has no `<id>.json` artifact.
pub const FALLBACK_SCHEMA: &str = "{\"data\": {}}";

/// Build the reasoning-engine prompt for structured extraction.
///
/// Layout: template instruction, the literal schema text, the document
/// text, then a directive to return only the JSON object. The directive is
/// load-bearing: without it chat-tuned models wrap the object in prose or
/// code fences far more often.
pub fn build_parse_prompt(instruction: &str, schema: &str, document_text: &str) -> String {
    format!(
        "{instruction}\n\nJSON Schema:\n{schema}\n\nDocument Text:\n{document_text}\n\nReturn ONLY the JSON object:"
    )
}
