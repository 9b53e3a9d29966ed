use std::collections::BTreeSet;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            Display,
            EnumIter,
            EnumString,
        )]
        #[serde(rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case", ascii_case_insensitive)]
        pub enum $name {
            $($variant),+
        }
    };
}

vocabulary!(
    Sentiment { Positive, Negative, Neutral }
);

vocabulary!(
    Emotion { Frustration, Satisfaction, Confusion, Urgency }
);

vocabulary!(
    /// Issues detected in a conversation, either by keyword scan or by the
    /// oracle.
    ProblemKind {
        TechnicalIssues,
        UserConfusion,
        SystemLimitations,
        MissingInformation,
        RoutingError,
        PerformanceLatency,
        ProcessInefficiency,
        CommunicationFailure,
        Other,
    }
);

vocabulary!(
    Category {
        Information,
        Communication,
        Other,
        ProjectTasks,
        Hr,
        Organizational,
        TechSupport,
        ProductsInfo,
        DepartmentInfo,
        Meetings,
        TaskManagement,
        Faq,
        Feedback,
        Statistics,
        DesignRequest,
        SourcesRequest,
    }
);

vocabulary!(
    Intent { TechnicalHelp, ProcessQuestion, ProjectTask, GeneralInfo, Coordination }
);

impl Intent {
    /// The category every conversation with this primary intent belongs to.
    pub fn category(self) -> Category {
        match self {
            Intent::TechnicalHelp => Category::TechSupport,
            Intent::ProcessQuestion => Category::Organizational,
            Intent::ProjectTask => Category::ProjectTasks,
            Intent::GeneralInfo => Category::Information,
            Intent::Coordination => Category::Communication,
        }
    }
}

/// Topic and purpose of a conversation.
///
/// The category is never stored independently: it is always derived from the
/// primary intent, so both fields stay consistent whatever the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRequestClassification")]
pub struct RequestClassification {
    category: Vec<Category>,
    intent: Vec<Intent>,
}

#[derive(Deserialize)]
struct RawRequestClassification {
    #[serde(default)]
    intent: Vec<Intent>,
}

impl From<RawRequestClassification> for RequestClassification {
    fn from(value: RawRequestClassification) -> Self {
        Self::new(value.intent)
    }
}

impl Default for RequestClassification {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RequestClassification {
    /// Builds a classification from the intents in priority order. Duplicates
    /// are dropped and an empty list falls back to `general_info`.
    pub fn new(intent: impl IntoIterator<Item = Intent>) -> Self {
        let mut seen = BTreeSet::new();
        let mut intent: Vec<Intent> = intent.into_iter().filter(|i| seen.insert(*i)).collect();
        if intent.is_empty() {
            intent.push(Intent::GeneralInfo);
        }
        let category = vec![intent[0].category()];
        Self { category, intent }
    }

    /// Same as [`RequestClassification::new`], logging when the categories
    /// proposed alongside the intents disagree with the derived one.
    pub fn reconcile(
        proposed: impl IntoIterator<Item = Category>,
        intent: impl IntoIterator<Item = Intent>,
    ) -> Self {
        let classification = Self::new(intent);
        let proposed: Vec<Category> = proposed.into_iter().collect();
        if !proposed.is_empty() && proposed != classification.category {
            tracing::debug!(
                proposed = ?proposed,
                derived = ?classification.category,
                "Overriding category with the value derived from the primary intent"
            );
        }
        classification
    }

    pub fn category(&self) -> &[Category] {
        &self.category
    }

    pub fn intent(&self) -> &[Intent] {
        &self.intent
    }

    pub fn primary_intent(&self) -> Intent {
        self.intent.first().copied().unwrap_or(Intent::GeneralInfo)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct ProblemDetection {
    #[serde(default)]
    pub problems: BTreeSet<ProblemKind>,
    /// 0 means no problem, 10 a critical failure.
    #[serde(default)]
    pub severity: u8,
    #[serde(default)]
    pub details: String,
}

impl ProblemDetection {
    pub const MAX_SEVERITY: u8 = 10;

    pub fn new(problems: impl IntoIterator<Item = ProblemKind>) -> Self {
        Self { problems: problems.into_iter().collect(), ..Default::default() }
    }

    pub fn merge(&mut self, problems: impl IntoIterator<Item = ProblemKind>) -> &mut Self {
        self.problems.extend(problems);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct UxAnalysis {
    pub sentiment: Sentiment,
    pub confidence: f64,
    #[serde(default)]
    pub emotions: BTreeSet<Emotion>,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub is_successful: bool,
}

impl Default for UxAnalysis {
    fn default() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            confidence: 0.5,
            emotions: BTreeSet::new(),
            feedback: Vec::new(),
            suggestions: Vec::new(),
            is_successful: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzed,
    /// The oracle could not annotate the conversation. Only keyword-detected
    /// problems are meaningful.
    Unanalyzed,
}

/// Annotations attached to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct Analysis {
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[setters(strip_option)]
    pub failure: Option<String>,
    pub request: RequestClassification,
    pub problems: ProblemDetection,
    pub ux: UxAnalysis,
}

impl Analysis {
    pub fn new(request: RequestClassification, problems: ProblemDetection, ux: UxAnalysis) -> Self {
        Self { status: AnalysisStatus::Analyzed, failure: None, request, problems, ux }
    }

    /// Placeholder recorded for conversations the oracle failed on.
    pub fn unanalyzed(reason: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Unanalyzed,
            failure: Some(reason.into()),
            request: RequestClassification::default(),
            problems: ProblemDetection::default().details("Failed to analyze"),
            ux: UxAnalysis::default().confidence(0.0).is_successful(false),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.status == AnalysisStatus::Analyzed
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_category_follows_primary_intent() {
        let fixture = RequestClassification::new([Intent::Coordination, Intent::TechnicalHelp]);
        let actual = fixture.category();
        let expected = [Category::Communication];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_empty_intent_defaults_to_general_info() {
        let fixture = RequestClassification::new([]);
        let actual = (fixture.intent().to_vec(), fixture.category().to_vec());
        let expected = (vec![Intent::GeneralInfo], vec![Category::Information]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_reconcile_overrides_inconsistent_category() {
        let fixture = RequestClassification::reconcile([Category::Hr], [Intent::ProjectTask]);
        let actual = fixture.category();
        let expected = [Category::ProjectTasks];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_deserialized_category_is_recomputed() {
        let fixture = json!({"category": ["hr", "faq"], "intent": ["technical_help"]});
        let actual: RequestClassification = serde_json::from_value(fixture).unwrap();
        let expected = RequestClassification::new([Intent::TechnicalHelp]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_intent_is_deduplicated_in_order() {
        let fixture = RequestClassification::new([
            Intent::GeneralInfo,
            Intent::Coordination,
            Intent::GeneralInfo,
        ]);
        let actual = fixture.intent();
        let expected = [Intent::GeneralInfo, Intent::Coordination];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_vocabulary_parses_snake_case_case_insensitively() {
        let actual = ProblemKind::from_str("Technical_Issues").unwrap();
        let expected = ProblemKind::TechnicalIssues;
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_unanalyzed_is_explicit() {
        let fixture = Analysis::unanalyzed("rate limited");

        assert!(!fixture.is_analyzed());
        assert_eq!(fixture.failure.as_deref(), Some("rate limited"));
        assert_eq!(fixture.ux.confidence, 0.0);
        assert!(!fixture.ux.is_successful);
    }

    #[test]
    fn test_merge_problems_is_a_set_union() {
        let mut fixture = ProblemDetection::new([ProblemKind::UserConfusion]);
        fixture.merge([ProblemKind::UserConfusion, ProblemKind::PerformanceLatency]);
        let actual = fixture.problems.len();
        let expected = 2;
        assert_eq!(actual, expected);
    }
}
