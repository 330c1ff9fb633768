//! `POST /api/draft-conclusion`

use serde::{Deserialize, Serialize};

use super::{Assist, Interpreted, Screen};
use crate::postprocess::{clean_completion, is_refusal, limit_sentences};
use crate::prompt::{refusal_prompt, PaperContext, PromptBuilder};

const MAX_SECTION_CHARS: usize = 1500;
const MAX_SENTENCES: usize = 3;

const REFUSAL_MESSAGE: &str =
    "The AI couldn't draft a conclusion from these sections. Try writing a first sentence yourself.";

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaperSections {
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub country_policy: Option<String>,
    #[serde(default, alias = "possibleSolutions")]
    pub solutions: Option<String>,
}

impl PaperSections {
    fn labelled(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("BACKGROUND", self.background.as_deref()),
            ("COUNTRY POLICY", self.country_policy.as_deref()),
            ("POSSIBLE SOLUTIONS", self.solutions.as_deref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.labelled()
            .iter()
            .all(|(_, v)| v.map_or(true, |s| s.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftConclusionRequest {
    #[serde(default)]
    pub context: Option<PaperContext>,
    #[serde(default)]
    pub sections: PaperSections,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftConclusionResponse {
    pub draft: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DraftConclusion;

impl Assist for DraftConclusion {
    const NAME: &'static str = "draft-conclusion";
    const MAX_TOKENS: u32 = 250;
    const DEFAULT_LIMIT: u32 = 10;

    type Request = DraftConclusionRequest;
    type Response = DraftConclusionResponse;

    fn validate(req: &DraftConclusionRequest) -> Result<(), String> {
        if !req.context.as_ref().is_some_and(PaperContext::is_complete) {
            return Err("Missing context (country, committee, or topic)".into());
        }
        if req.sections.is_empty() {
            return Err("At least one paper section is required".into());
        }
        Ok(())
    }

    fn build_prompt(req: &DraftConclusionRequest, screen: &Screen<'_>) -> String {
        let mut blocks = Vec::new();
        for (label, value) in req.sections.labelled() {
            let Some(raw) = value.filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            match screen.admit(raw, MAX_SECTION_CHARS) {
                Some(clean) => blocks.push(format!("{}:\n{}", label, clean)),
                None => return refusal_prompt("I can't help with that."),
            }
        }

        let mut builder = PromptBuilder::new()
            .paper_context(req.context.as_ref())
            .instruction("Write a conclusion for this student's position paper using only the sections below.")
            .instruction("Write 2 to 3 sentences in the first person plural, as the delegation of the country.")
            .instruction("Restate the country's position and its main proposed solution. Do not add new facts.")
            .instruction("Keep the student's own voice and vocabulary; a middle-school student should be able to say it aloud.");
        for block in blocks {
            builder = builder.content(block);
        }
        builder.build()
    }

    fn interpret(_req: &DraftConclusionRequest, completion: &str) -> Interpreted<DraftConclusionResponse> {
        let cleaned = clean_completion(completion);
        if cleaned.is_empty() || is_refusal(&cleaned) {
            return Interpreted::refused(Self::failure(REFUSAL_MESSAGE.into()));
        }
        Interpreted::ok(DraftConclusionResponse {
            draft: limit_sentences(&cleaned, MAX_SENTENCES),
            error: None,
        })
    }

    fn failure(message: String) -> DraftConclusionResponse {
        DraftConclusionResponse {
            draft: String::new(),
            error: Some(message),
        }
    }
}
