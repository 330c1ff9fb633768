//! `POST /api/classify-bookmark`: file a research snippet under one category.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Assist, Interpreted, Screen};
use crate::postprocess::clean_completion;
use crate::prompt::{refusal_prompt, PaperContext, PromptBuilder};

const MAX_TEXT_CHARS: usize = 1000;

pub const EXACT_CONFIDENCE: f32 = 0.7;
pub const CONTAINED_CONFIDENCE: f32 = 0.5;
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Bookmark categories offered by the writer's research panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    KeyStatistics,
    HistoricalContext,
    CountryPosition,
    UnAction,
    TreatyOrResolution,
    ExpertQuote,
    CaseStudy,
    CurrentEvents,
    EconomicImpact,
    SocialImpact,
    EnvironmentalImpact,
    HealthImpact,
    HumanRights,
    SecurityConcern,
    LegalFramework,
    RegionalPerspective,
    StakeholderView,
    ProposedSolution,
    PastSolution,
    ObstacleOrChallenge,
    FundingSource,
    Definition,
    Counterargument,
    BackgroundInfo,
    Other,
}

impl Category {
    pub const ALL: [Category; 25] = [
        Category::KeyStatistics,
        Category::HistoricalContext,
        Category::CountryPosition,
        Category::UnAction,
        Category::TreatyOrResolution,
        Category::ExpertQuote,
        Category::CaseStudy,
        Category::CurrentEvents,
        Category::EconomicImpact,
        Category::SocialImpact,
        Category::EnvironmentalImpact,
        Category::HealthImpact,
        Category::HumanRights,
        Category::SecurityConcern,
        Category::LegalFramework,
        Category::RegionalPerspective,
        Category::StakeholderView,
        Category::ProposedSolution,
        Category::PastSolution,
        Category::ObstacleOrChallenge,
        Category::FundingSource,
        Category::Definition,
        Category::Counterargument,
        Category::BackgroundInfo,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::KeyStatistics => "key_statistics",
            Category::HistoricalContext => "historical_context",
            Category::CountryPosition => "country_position",
            Category::UnAction => "un_action",
            Category::TreatyOrResolution => "treaty_or_resolution",
            Category::ExpertQuote => "expert_quote",
            Category::CaseStudy => "case_study",
            Category::CurrentEvents => "current_events",
            Category::EconomicImpact => "economic_impact",
            Category::SocialImpact => "social_impact",
            Category::EnvironmentalImpact => "environmental_impact",
            Category::HealthImpact => "health_impact",
            Category::HumanRights => "human_rights",
            Category::SecurityConcern => "security_concern",
            Category::LegalFramework => "legal_framework",
            Category::RegionalPerspective => "regional_perspective",
            Category::StakeholderView => "stakeholder_view",
            Category::ProposedSolution => "proposed_solution",
            Category::PastSolution => "past_solution",
            Category::ObstacleOrChallenge => "obstacle_or_challenge",
            Category::FundingSource => "funding_source",
            Category::Definition => "definition",
            Category::Counterargument => "counterargument",
            Category::BackgroundInfo => "background_info",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// Map a completion onto a category and a coarse confidence.
///
/// An exact label scores 0.7, a label found somewhere in the text 0.5, and
/// anything else falls back to `other` at 0.3. Longer labels are tried
/// first so `past_solution` is not read as a bare substring of something
/// shorter.
pub fn classify_completion(completion: &str) -> (Category, f32) {
    let normalized: String = clean_completion(completion)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            ' ' | '-' => '_',
            _ => ' ',
        })
        .collect();
    let token = normalized.trim().trim_matches('_');
    if let Ok(cat) = token.parse::<Category>() {
        return (cat, EXACT_CONFIDENCE);
    }
    let mut by_length: Vec<Category> = Category::ALL.to_vec();
    by_length.sort_by_key(|c| std::cmp::Reverse(c.as_str().len()));
    if let Some(cat) = by_length
        .into_iter()
        .filter(|c| *c != Category::Other)
        .find(|c| normalized.contains(c.as_str()))
    {
        return (cat, CONTAINED_CONFIDENCE);
    }
    (Category::Other, FALLBACK_CONFIDENCE)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyBookmarkRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub context: Option<PaperContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyBookmarkResponse {
    pub category: Category,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ClassifyBookmark;

impl Assist for ClassifyBookmark {
    const NAME: &'static str = "classify-bookmark";
    const MAX_TOKENS: u32 = 20;
    const DEFAULT_LIMIT: u32 = 30;

    type Request = ClassifyBookmarkRequest;
    type Response = ClassifyBookmarkResponse;

    fn validate(req: &ClassifyBookmarkRequest) -> Result<(), String> {
        if req.text.trim().is_empty() {
            return Err("Missing bookmark text".into());
        }
        Ok(())
    }

    fn build_prompt(req: &ClassifyBookmarkRequest, screen: &Screen<'_>) -> String {
        let Some(text) = screen.admit(&req.text, MAX_TEXT_CHARS) else {
            return refusal_prompt(Category::Other.as_str());
        };
        let labels: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        PromptBuilder::new()
            .paper_context(req.context.as_ref())
            .instruction("Classify the research snippet a student bookmarked.")
            .instruction(format!("Choose exactly one label from this list: {}", labels.join(", ")))
            .instruction("Reply with the label only, in lower case, exactly as written in the list.")
            .instruction("If nothing fits, reply with: other")
            .content(text)
            .build()
    }

    fn interpret(_req: &ClassifyBookmarkRequest, completion: &str) -> Interpreted<ClassifyBookmarkResponse> {
        let (category, confidence) = classify_completion(completion);
        Interpreted::ok(ClassifyBookmarkResponse {
            category,
            confidence,
            error: None,
        })
    }

    fn failure(message: String) -> ClassifyBookmarkResponse {
        ClassifyBookmarkResponse {
            category: Category::Other,
            confidence: 0.0,
            error: Some(message),
        }
    }
}
