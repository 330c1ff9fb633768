//! `POST /api/polish-text`: rewrite a student's draft text.
//!
//! The transform type picks the task wording; `targetLayer` picks how long
//! the rewrite should be. Prior answers from earlier steps of the writer
//! are passed along as read-only background.

use serde::{Deserialize, Serialize};

use super::{Assist, Interpreted, Screen};
use crate::postprocess::{clean_completion, is_refusal};
use crate::prompt::{refusal_prompt, PaperContext, PromptBuilder};

const MAX_TEXT_CHARS: usize = 2000;
const MAX_PRIOR_ANSWERS: usize = 5;
const MAX_PRIOR_ANSWER_CHARS: usize = 400;
const DEFAULT_LAYER: u8 = 2;

const REFUSAL_MESSAGE: &str =
    "The AI couldn't polish this text. Try rewording it and make sure it's about your topic.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    BulletsToParagraph,
    ExpandSentence,
    Formalize,
    CombineSolutions,
}

impl TransformType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "bullets-to-paragraph" => Some(TransformType::BulletsToParagraph),
            "expand-sentence" => Some(TransformType::ExpandSentence),
            "formalize" => Some(TransformType::Formalize),
            "combine-solutions" => Some(TransformType::CombineSolutions),
            _ => None,
        }
    }

    fn task(self) -> &'static str {
        match self {
            TransformType::BulletsToParagraph => {
                "Turn the student's bullet points into one connected paragraph. Keep every point and add simple linking words."
            }
            TransformType::ExpandSentence => {
                "Expand the student's sentence by explaining the idea a little more. Do not invent statistics, names or dates."
            }
            TransformType::Formalize => {
                "Rewrite the student's text in a formal diplomatic tone suitable for a position paper. Keep the meaning the same."
            }
            TransformType::CombineSolutions => {
                "Combine the student's proposed solutions into one clear paragraph that presents them as a plan."
            }
        }
    }
}

/// Sentence-count range for a `targetLayer` hint. Unknown layers use the default.
pub fn layer_length(layer: Option<u8>) -> (u8, u8) {
    match layer.unwrap_or(DEFAULT_LAYER) {
        1 => (1, 2),
        3 => (5, 7),
        _ => (3, 4),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolishTextRequest {
    #[serde(default)]
    pub text: String,
    /// Kept as a string so an unknown value is a validation error, not a
    /// JSON rejection.
    #[serde(default)]
    pub transform_type: String,
    #[serde(default)]
    pub context: Option<PaperContext>,
    #[serde(default)]
    pub prior_answers: Vec<String>,
    #[serde(default)]
    pub target_layer: Option<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolishTextResponse {
    pub polished_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PolishText;

impl Assist for PolishText {
    const NAME: &'static str = "polish-text";
    const MAX_TOKENS: u32 = 600;
    const DEFAULT_LIMIT: u32 = 20;

    type Request = PolishTextRequest;
    type Response = PolishTextResponse;

    fn validate(req: &PolishTextRequest) -> Result<(), String> {
        if !req.context.as_ref().is_some_and(PaperContext::is_complete) {
            return Err("Missing context (country, committee, or topic)".into());
        }
        if req.text.trim().is_empty() {
            return Err("Missing text to polish".into());
        }
        if TransformType::parse(&req.transform_type).is_none() {
            return Err("Invalid transform type".into());
        }
        Ok(())
    }

    fn build_prompt(req: &PolishTextRequest, screen: &Screen<'_>) -> String {
        let Some(text) = screen.admit(&req.text, MAX_TEXT_CHARS) else {
            return refusal_prompt("I can't help with that.");
        };
        let transform = TransformType::parse(&req.transform_type)
            .unwrap_or(TransformType::Formalize);
        let (min, max) = layer_length(req.target_layer);

        let prior: Vec<String> = req
            .prior_answers
            .iter()
            .filter(|a| !a.trim().is_empty())
            .take(MAX_PRIOR_ANSWERS)
            .filter_map(|a| screen.admit(a, MAX_PRIOR_ANSWER_CHARS))
            .map(|a| format!("- {}", a))
            .collect();

        let mut builder = PromptBuilder::new()
            .paper_context(req.context.as_ref())
            .instruction(transform.task())
            .instruction(format!("Write {} to {} sentences.", min, max))
            .instruction("Use words a middle-school student would use. Return only the rewritten text.");
        if !prior.is_empty() {
            builder = builder
                .instruction("Earlier answers from the same student are included for background only; do not rewrite them.")
                .content(format!("EARLIER ANSWERS:\n{}", prior.join("\n")));
        }
        builder.content(format!("TEXT TO REWRITE:\n{}", text)).build()
    }

    fn interpret(_req: &PolishTextRequest, completion: &str) -> Interpreted<PolishTextResponse> {
        let cleaned = clean_completion(completion);
        if cleaned.is_empty() || is_refusal(&cleaned) {
            return Interpreted::refused(Self::failure(REFUSAL_MESSAGE.into()));
        }
        Interpreted::ok(PolishTextResponse {
            polished_text: cleaned,
            error: None,
        })
    }

    fn failure(message: String) -> PolishTextResponse {
        PolishTextResponse {
            polished_text: String::new(),
            error: Some(message),
        }
    }
}
