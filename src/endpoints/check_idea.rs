//! `POST /api/check-idea`: which of the student's bookmarks back up an idea.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Assist, Bookmark, Interpreted, Screen};
use crate::patterns::NO_GAP_RE;
use crate::postprocess::strip_quotes;
use crate::prompt::{refusal_prompt, PaperContext, PromptBuilder};

const MAX_BOOKMARKS: usize = 8;
const MAX_BOOKMARK_CHARS: usize = 300;
const MAX_IDEA_CHARS: usize = 500;

const SUPPORTED_HEADER: &str = "SUPPORTED BY:";
const GAPS_HEADER: &str = "GAPS TO CONSIDER:";

static SUPPORTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)supported\s+by\s*:").unwrap());
static GAPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)gaps\s+to\s+consider\s*:").unwrap());
static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckIdeaRequest {
    #[serde(default)]
    pub idea: String,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default)]
    pub context: Option<PaperContext>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SupportLevel {
    WellSupported,
    PartiallySupported,
    NotSupported,
}

impl SupportLevel {
    pub fn from_matches(match_count: usize, has_gaps: bool) -> Self {
        if match_count >= 2 && !has_gaps {
            SupportLevel::WellSupported
        } else if match_count >= 1 {
            SupportLevel::PartiallySupported
        } else {
            SupportLevel::NotSupported
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MatchedBookmark {
    /// Zero-based position in the request's bookmark list.
    pub index: usize,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIdeaResponse {
    pub matching_bookmarks: Vec<MatchedBookmark>,
    pub suggestions: String,
    pub support_level: SupportLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse a completion laid out as a `SUPPORTED BY:` list of `[n] why`
/// lines followed by a `GAPS TO CONSIDER:` paragraph.
///
/// Every `[n]` on a line of the supported section counts, wherever it sits
/// ("Bookmark [1] shows", "1. [2] shows", "[1], [3] both"). The explanation
/// is whatever follows the last marker on the line. Indices are 1-based in
/// the completion and zero-based in the result; anything outside
/// `1..=bookmark_count` is dropped and repeats keep the first explanation.
pub fn parse_completion(completion: &str, bookmark_count: usize) -> CheckIdeaResponse {
    let text = strip_quotes(completion);
    let gaps_at = GAPS_RE.find(text);
    let supported_end = gaps_at.map(|m| m.start()).unwrap_or(text.len());
    let supported_start = SUPPORTED_RE
        .find(&text[..supported_end])
        .map(|m| m.end())
        .unwrap_or(0);
    let supported = &text[supported_start..supported_end];

    let mut matches: Vec<MatchedBookmark> = Vec::new();
    for line in supported.lines() {
        let Some(last) = INDEX_RE.find_iter(line).last() else {
            continue;
        };
        let explanation = line[last.end()..]
            .trim_start_matches(|c: char| {
                c.is_whitespace() || matches!(c, ':' | '-' | ',' | '\u{2013}' | '\u{2014}')
            })
            .trim_end()
            .to_string();
        for idx in INDEX_RE.captures_iter(line) {
            let Ok(n) = idx[1].parse::<usize>() else {
                continue;
            };
            if n == 0 || n > bookmark_count {
                continue;
            }
            if matches.iter().any(|m| m.index == n - 1) {
                continue;
            }
            matches.push(MatchedBookmark {
                index: n - 1,
                explanation: explanation.clone(),
            });
        }
    }

    let gaps = gaps_at
        .map(|m| text[m.end()..].trim())
        .unwrap_or("");
    let suggestions = if gaps.is_empty() || NO_GAP_RE.is_match(gaps) {
        String::new()
    } else {
        gaps.to_string()
    };

    let support_level = SupportLevel::from_matches(matches.len(), !suggestions.is_empty());
    CheckIdeaResponse {
        matching_bookmarks: matches,
        suggestions,
        support_level,
        error: None,
    }
}

pub struct CheckIdea;

impl Assist for CheckIdea {
    const NAME: &'static str = "check-idea";
    const MAX_TOKENS: u32 = 400;
    const DEFAULT_LIMIT: u32 = 10;

    type Request = CheckIdeaRequest;
    type Response = CheckIdeaResponse;

    fn validate(req: &CheckIdeaRequest) -> Result<(), String> {
        if req.idea.trim().is_empty() {
            return Err("Missing idea to check".into());
        }
        if req.bookmarks.iter().take(MAX_BOOKMARKS).all(Bookmark::is_blank) {
            return Err("At least one bookmark is required".into());
        }
        Ok(())
    }

    fn build_prompt(req: &CheckIdeaRequest, screen: &Screen<'_>) -> String {
        let Some(idea) = screen.admit(&req.idea, MAX_IDEA_CHARS) else {
            return refusal_prompt(&format!(
                "{}\nNONE\n{}\nPlease rewrite your idea in your own words.",
                SUPPORTED_HEADER, GAPS_HEADER
            ));
        };
        let bookmarks: Vec<String> = req
            .bookmarks
            .iter()
            .take(MAX_BOOKMARKS)
            .enumerate()
            .filter(|(_, b)| !b.is_blank())
            .map(|(i, b)| b.render(i + 1, MAX_BOOKMARK_CHARS, screen))
            .collect();

        PromptBuilder::new()
            .paper_context(req.context.as_ref())
            .instruction("A student wrote an idea for their position paper and saved the numbered bookmarks below as research.")
            .instruction("Decide which bookmarks give evidence for the idea and what the idea still needs.")
            .instruction("Answer in exactly this format:")
            .instruction(SUPPORTED_HEADER)
            .instruction("[number] one short sentence on how that bookmark supports the idea")
            .instruction("(one line per supporting bookmark, or NONE)")
            .instruction(GAPS_HEADER)
            .instruction("One or two sentences on what evidence is still missing, or \"Looks good!\" if nothing is missing.")
            .instruction("Only cite bookmark numbers that appear in the list.")
            .content(format!("IDEA: {}", idea))
            .content(format!("BOOKMARKS:\n{}", bookmarks.join("\n")))
            .build()
    }

    fn interpret(req: &CheckIdeaRequest, completion: &str) -> Interpreted<CheckIdeaResponse> {
        let count = req.bookmarks.len().min(MAX_BOOKMARKS);
        Interpreted::ok(parse_completion(completion, count))
    }

    fn failure(message: String) -> CheckIdeaResponse {
        CheckIdeaResponse {
            matching_bookmarks: Vec::new(),
            suggestions: String::new(),
            support_level: SupportLevel::NotSupported,
            error: Some(message),
        }
    }
}
