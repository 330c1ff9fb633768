//! Pattern tables used to screen student input and clean model output.
//!
//! The lists are tuned against the phrasing habits of the hosted model and
//! are kept here as plain data so they can be reviewed and bumped as one
//! unit. Any change to a list must bump [`PATTERN_TABLE_VERSION`]; the
//! version is reported by `/healthz` so a deployment can be matched to the
//! table it runs with.

use once_cell::sync::Lazy;
use regex::Regex;

/// Version of the pattern tables below.
pub const PATTERN_TABLE_VERSION: u32 = 4;

/// Phrases that indicate an attempt to override the prompt's system rules.
/// Matched case-insensitively anywhere in the input.
pub const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(the\s+)?(previous|prior|above|earlier)\s+(instructions|rules|prompts?)",
    r"disregard\s+(all\s+)?(the\s+)?(previous|prior|above|earlier|system)",
    r"forget\s+(all\s+)?(your|the|previous)\s+(instructions|rules)",
    r"you\s+are\s+now\s+(a|an|in)\b",
    r"pretend\s+(to\s+be|you\s+are)",
    r"act\s+as\s+(a|an)\s+(different|new|unrestricted)",
    r"new\s+instructions\s*:",
    r"system\s+prompt",
    r"reveal\s+(your|the)\s+(instructions|prompt|rules)",
    r"\bjailbreak\b",
    r"\bdan\s+mode\b",
    r"developer\s+mode",
    r"override\s+(the\s+)?(system|safety|rules)",
    r"</?\s*(system|assistant|instructions?)\s*>",
    r"\[\s*(system|inst)\s*\]",
];

/// Lead-ins the model likes to put in front of the actual answer. Anchored
/// at the start of the (trimmed) completion and stripped repeatedly.
pub const PREAMBLE_PATTERNS: &[&str] = &[
    r"^(sure|certainly|of course|okay|ok|absolutely|great)[!,.]+\s*",
    r"^here(\s+is|'s|’s)\s+(a|an|the|your|my)?\s*[^:\n]{0,60}:\s*",
    r"^(the\s+)?(polished|rewritten|revised|formal|expanded|combined)\s+(text|version|paragraph|sentence)\s*:\s*",
    r"^(summary|conclusion|draft|category|label|answer|response|output)\s*:\s*",
    r"^i\s+(have|'ve)\s+(rewritten|polished|revised|summarized|drafted)[^:\n]{0,60}:\s*",
    r"^based on (the|your) [^,:\n]{0,60}[,:]\s*",
];

/// Refusal phrasing. A completion matching any of these is never shown to
/// the student verbatim.
pub const REFUSAL_PATTERNS: &[&str] = &[
    r"^i\s+(cannot|can't|can’t|am unable to|won't|will not)\b",
    r"^(i'm|i’m|i am)\s+(sorry|afraid|not able)",
    r"^sorry\b",
    r"\bas an ai\b",
    r"\bi('m| am) not able to (help|assist)",
    r"\bagainst (my|the) (guidelines|policy|policies)\b",
    r"\bi (cannot|can't) (help|assist) with (that|this)\b",
];

/// Ways the model says "nothing is missing" in the gaps section of a
/// check-idea answer. The gaps text only counts as empty when it consists
/// of nothing but these phrases (see [`NO_GAP_RE`]), so "not well supported"
/// or "Looks good, but ..." still read as gaps.
pub const NO_GAP_PATTERNS: &[&str] = &[
    r"none",
    r"n/?a",
    r"nothing",
    r"(it\s+)?looks\s+good(\s+to\s+me)?",
    r"no\s+(major\s+|obvious\s+|significant\s+)?gaps?(\s+found)?",
    r"(the\s+idea\s+is\s+)?(well|fully)[-\s]supported",
    r"nothing\s+(is\s+)?missing",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pat| match Regex::new(&format!("(?i){}", pat)) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::error!(pattern = %pat, error = ?err, "failed to compile pattern, ignoring");
                None
            }
        })
        .collect()
}

pub static INJECTION_RES: Lazy<Vec<Regex>> = Lazy::new(|| compile(INJECTION_PATTERNS));
pub static PREAMBLE_RES: Lazy<Vec<Regex>> = Lazy::new(|| compile(PREAMBLE_PATTERNS));
pub static REFUSAL_RES: Lazy<Vec<Regex>> = Lazy::new(|| compile(REFUSAL_PATTERNS));
/// Whole-text match: one or more [`NO_GAP_PATTERNS`] phrases separated by
/// punctuation and nothing else.
pub static NO_GAP_RE: Lazy<Regex> = Lazy::new(|| {
    let phrases = NO_GAP_PATTERNS.join("|");
    let pattern = format!(r"(?i)^\s*(?:[-*•]?\s*(?:{})\s*[.!,;]*\s*)+$", phrases);
    match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::error!(error = ?err, "failed to compile no-gap table, treating every gaps text as a gap");
            Regex::new(r"[^\s\S]").unwrap()
        }
    }
});
