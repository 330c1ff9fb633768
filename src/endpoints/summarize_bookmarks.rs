//! `POST /api/summarize-bookmarks`

use serde::{Deserialize, Serialize};

use super::{Assist, Bookmark, Interpreted, Screen};
use crate::postprocess::{clean_completion, is_refusal};
use crate::prompt::{refusal_prompt, PaperContext, PromptBuilder};
use crate::util::lowercase_first;

const MAX_BOOKMARKS: usize = 5;
const MAX_BOOKMARK_CHARS: usize = 400;

const LEAD_INS: &[&str] = &["it sounds like", "so basically"];
const DEFAULT_LEAD_IN: &str = "So basically, ";

const REFUSAL_MESSAGE: &str = "The AI couldn't summarize these bookmarks. Try picking different ones.";

/// Make sure a summary opens with one of the fixed lead-in phrases.
pub fn ensure_lead_in(summary: &str) -> String {
    let trimmed = summary.trim();
    let lower = trimmed.to_lowercase();
    if LEAD_INS.iter().any(|lead| lower.starts_with(lead)) {
        return trimmed.to_string();
    }
    format!("{}{}", DEFAULT_LEAD_IN, lowercase_first(trimmed))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeBookmarksRequest {
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default)]
    pub context: Option<PaperContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeBookmarksResponse {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SummarizeBookmarks;

impl Assist for SummarizeBookmarks {
    const NAME: &'static str = "summarize-bookmarks";
    const MAX_TOKENS: u32 = 150;
    const DEFAULT_LIMIT: u32 = 15;

    type Request = SummarizeBookmarksRequest;
    type Response = SummarizeBookmarksResponse;

    fn validate(req: &SummarizeBookmarksRequest) -> Result<(), String> {
        if req.bookmarks.iter().take(MAX_BOOKMARKS).all(Bookmark::is_blank) {
            return Err("At least one bookmark is required".into());
        }
        Ok(())
    }

    fn build_prompt(req: &SummarizeBookmarksRequest, screen: &Screen<'_>) -> String {
        let lines: Vec<String> = req
            .bookmarks
            .iter()
            .take(MAX_BOOKMARKS)
            .enumerate()
            .filter(|(_, b)| !b.is_blank())
            .map(|(i, b)| b.render(i + 1, MAX_BOOKMARK_CHARS, screen))
            .collect();
        if screen.flagged() >= lines.len() {
            return refusal_prompt("So basically, these bookmarks couldn't be summarized.");
        }

        PromptBuilder::new()
            .paper_context(req.context.as_ref())
            .instruction("Summarize what the student's bookmarks below say, as if explaining it back to them.")
            .instruction("Write 1 to 2 sentences.")
            .instruction("Begin with \"It sounds like\" or \"So basically\".")
            .instruction("Skip any bookmark marked [removed].")
            .content(format!("BOOKMARKS:\n{}", lines.join("\n")))
            .build()
    }

    fn interpret(_req: &SummarizeBookmarksRequest, completion: &str) -> Interpreted<SummarizeBookmarksResponse> {
        let cleaned = clean_completion(completion);
        if cleaned.is_empty() || is_refusal(&cleaned) {
            return Interpreted::refused(Self::failure(REFUSAL_MESSAGE.into()));
        }
        Interpreted::ok(SummarizeBookmarksResponse {
            summary: ensure_lead_in(&cleaned),
            error: None,
        })
    }

    fn failure(message: String) -> SummarizeBookmarksResponse {
        SummarizeBookmarksResponse {
            summary: String::new(),
            error: Some(message),
        }
    }
}
