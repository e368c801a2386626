//! Response sanitisation: turn a raw engine emission into clean page text.
//!
//! The vision model interleaves its markdown output with harness
//! diagnostics (size/patch/compression banners) and layout-grounding
//! control tokens. This module drops those lines, repairs any undecodable
//! byte sequences, preserves the relative order of surviving lines, and
//! trims the joined result.

/// Substrings that mark a harness diagnostic line.
const DIAGNOSTIC_MARKERS: [&str; 6] = [
    "BASE:",
    "PATCHES:",
    "===",
    "image size:",
    "tokens",
    "compression",
];

/// Layout/grounding control tokens; any line carrying one is dropped.
const CONTROL_TOKENS: [&str; 3] = ["<|ref|>", "<|det|>", "<|grounding|>"];

/// Clean one raw emission.
///
/// Undecodable byte sequences are replaced (U+FFFD) rather than failing;
/// this function never errors.
pub fn clean_emission(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !is_diagnostic(line) && !has_control_token(line))
        .collect();
    kept.join("\n").trim().to_string()
}

fn is_diagnostic(line: &str) -> bool {
    DIAGNOSTIC_MARKERS.iter().any(|m| line.contains(m))
}

fn has_control_token(line: &str) -> bool {
    CONTROL_TOKENS.iter().any(|t| line.contains(t))
}
