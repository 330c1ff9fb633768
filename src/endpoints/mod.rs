//! The five writing-assist endpoints.
//!
//! Each endpoint is a zero-sized type implementing [`Assist`]: it names its
//! request and response bodies, validates the request, renders a prompt
//! and interprets the model's completion. The request pipeline in the
//! crate root drives every endpoint through the same steps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::sanitize::{detects_injection_with, sanitize_input};

pub mod check_idea;
pub mod classify_bookmark;
pub mod draft_conclusion;
pub mod polish_text;
pub mod summarize_bookmarks;

pub use self::check_idea::CheckIdea;
pub use self::classify_bookmark::ClassifyBookmark;
pub use self::draft_conclusion::DraftConclusion;
pub use self::polish_text::PolishText;
pub use self::summarize_bookmarks::SummarizeBookmarks;

/// Route names, in the order they are reported on `/metrics`.
pub const ENDPOINT_NAMES: &[&str] = &[
    CheckIdea::NAME,
    ClassifyBookmark::NAME,
    DraftConclusion::NAME,
    PolishText::NAME,
    SummarizeBookmarks::NAME,
];

/// Prompt-injection screening for one request. Built per request from the
/// configured extra phrases; counts how many fields it flagged.
pub struct Screen<'a> {
    extra_phrases: &'a [String],
    flagged: std::cell::Cell<usize>,
}

impl<'a> Screen<'a> {
    pub fn new(extra_phrases: &'a [String]) -> Self {
        Self {
            extra_phrases,
            flagged: std::cell::Cell::new(0),
        }
    }

    /// True (and counted) if `text` looks like an attempt to override the rules.
    pub fn flags(&self, text: &str) -> bool {
        let hit = detects_injection_with(text, self.extra_phrases);
        if hit {
            self.flagged.set(self.flagged.get() + 1);
        }
        hit
    }

    /// Sanitized text, or `None` when the raw text was flagged.
    pub fn admit(&self, text: &str, max_len: usize) -> Option<String> {
        if self.flags(text) {
            return None;
        }
        Some(sanitize_input(text, max_len))
    }

    pub fn flagged(&self) -> usize {
        self.flagged.get()
    }
}

/// Completion interpreted into a response body. `refused` marks a model
/// refusal that was replaced by a fallback message.
pub struct Interpreted<R> {
    pub body: R,
    pub refused: bool,
}

impl<R> Interpreted<R> {
    pub fn ok(body: R) -> Self {
        Self {
            body,
            refused: false,
        }
    }

    pub fn refused(body: R) -> Self {
        Self {
            body,
            refused: true,
        }
    }
}

pub trait Assist: Send + Sync + 'static {
    /// Route segment under `/api/`; also the rate-limit and metrics key.
    const NAME: &'static str;
    const MAX_TOKENS: u32;
    /// Requests allowed per client per window unless overridden in config.
    const DEFAULT_LIMIT: u32;

    type Request: DeserializeOwned + Send + 'static;
    type Response: Serialize + Send + 'static;

    /// Reject a request before anything is sent to the model. The message
    /// is shown to the student.
    fn validate(req: &Self::Request) -> Result<(), String>;

    fn build_prompt(req: &Self::Request, screen: &Screen<'_>) -> String;

    fn interpret(req: &Self::Request, completion: &str) -> Interpreted<Self::Response>;

    /// Envelope carrying an error and an empty result.
    fn failure(message: String) -> Self::Response;
}

/// A saved research snippet from the student's bookmark list.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(default, alias = "content")]
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "url")]
    pub source: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Bookmark {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// One numbered line for a prompt: `[n] title: text (source: …)`.
    /// Flagged bookmarks are listed as removed so numbering stays stable.
    pub fn render(&self, number: usize, max_len: usize, screen: &Screen<'_>) -> String {
        let raw = format!(
            "{}\n{}\n{}",
            self.title.as_deref().unwrap_or(""),
            self.text,
            self.note.as_deref().unwrap_or("")
        );
        if screen.flags(&raw) {
            return format!("[{}] [removed]", number);
        }
        let text = sanitize_input(&self.text, max_len);
        let mut line = format!("[{}] ", number);
        if let Some(title) = self.title.as_deref().map(|t| sanitize_input(t, 100)) {
            if !title.is_empty() {
                line.push_str(&title);
                line.push_str(": ");
            }
        }
        line.push_str(&text);
        if let Some(note) = self.note.as_deref().map(|n| sanitize_input(n, 150)) {
            if !note.is_empty() {
                line.push_str(" (student note: ");
                line.push_str(&note);
                line.push(')');
            }
        }
        if let Some(source) = self.source.as_deref().map(|s| sanitize_input(s, 100)) {
            if !source.is_empty() {
                line.push_str(" (source: ");
                line.push_str(&source);
                line.push(')');
            }
        }
        line
    }
}
