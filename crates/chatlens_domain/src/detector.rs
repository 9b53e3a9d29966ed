use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::{Conversation, ProblemKind};

const TECHNICAL_ISSUES: &[&str] = &[
    "ошибка",
    "сбой",
    "упал",
    "не работает",
    "неисправность",
    "баг",
    "глюк",
    "поломка",
    "отказ",
    "нарушение",
    "проблема с системой",
    "технические неполадки",
    "системная ошибка",
    "сервер недоступен",
    "соединение потеряно",
    "timeout",
    "connection lost",
    "error",
    "exception",
    "failed",
    "failure",
    "crash",
    "bug",
    "traceback",
    "stack trace",
    "server error",
    "500",
    "503",
    "502",
    "database error",
    "connection error",
    "network error",
    "internal error",
    "system failure",
    "malfunction",
];

const USER_CONFUSION: &[&str] = &[
    "не понимаю",
    "не понял",
    "не поняла",
    "что именно",
    "как именно",
    "поясните",
    "объясните",
    "уточните",
    "что вы имеете в виду",
    "не ясно",
    "непонятно",
    "можете объяснить",
    "что это значит",
    "как это работает",
    "не разобрался",
    "запутался",
    "сложно понять",
    "QA уточняет",
    "нужны уточнения",
    "требуется пояснение",
    "please clarify",
    "not clear",
    "confused",
    "do not understand",
    "what do you mean",
    "can you explain",
    "please explain",
    "i don't get it",
    "unclear",
    "ambiguous",
    "vague",
];

const SYSTEM_LIMITATIONS: &[&str] = &[
    "не могу",
    "не умею",
    "не поддерживается",
    "недоступно",
    "функция отсутствует",
    "пока не реализовано",
    "в разработке",
    "не предусмотрено",
    "ограничение системы",
    "нет такой возможности",
    "данная функция недоступна",
    "не может быть выполнено",
    "превышен лимит",
    "нет прав доступа",
    "функция заблокирована",
    "not supported",
    "feature not available",
    "cannot perform",
    "limitation",
    "restricted",
    "access denied",
    "permission denied",
    "feature disabled",
    "not implemented",
    "under development",
    "out of scope",
    "beyond capabilities",
];

const MISSING_INFORMATION: &[&str] = &[
    "не найдено",
    "ничего не найдено",
    "нет данных",
    "отсутствует",
    "информация недоступна",
    "данные отсутствуют",
    "пустой результат",
    "нет результатов",
    "база данных пуста",
    "записи не найдены",
    "файл не найден",
    "документ отсутствует",
    "нет такого пользователя",
    "не существует",
    "информация устарела",
    "данные не обновлены",
    "not found",
    "no data",
    "no results",
    "empty result",
    "no information",
    "data not available",
    "missing data",
    "no records",
    "database empty",
    "file not found",
    "document missing",
    "user not found",
    "does not exist",
    "no match",
    "zero results",
    "no entries",
];

const ROUTING_ERROR: &[&str] = &[
    "не по адресу",
    "неправильный ассистент",
    "не мой профиль",
    "не моя специализация",
    "обратитесь к другому",
    "не компетентен",
    "это не ко мне",
    "передаю другому специалисту",
    "неправильный отдел",
    "не в моей компетенции",
    "обратитесь в другой отдел",
    "я не занимаюсь этим",
    "не моя задача",
    "переадресую",
    "wrong assistant",
    "not my area",
    "wrong department",
    "transfer to",
    "redirect to",
    "not my expertise",
    "out of my scope",
    "contact another",
    "wrong person",
    "incorrect routing",
    "misrouted",
    "wrong channel",
];

/// Oracle-free problem scan over conversation text and timing.
///
/// Keywords match as lower-cased substrings, so short entries such as `500`
/// also hit inside longer tokens.
#[derive(Debug, Clone)]
pub struct ProblemKeywordDetector {
    keywords: BTreeMap<ProblemKind, Vec<String>>,
    latency_threshold: Duration,
}

impl Default for ProblemKeywordDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ProblemKeywordDetector {
    pub fn new(latency_threshold: Duration) -> Self {
        let keywords = [
            (ProblemKind::TechnicalIssues, TECHNICAL_ISSUES),
            (ProblemKind::UserConfusion, USER_CONFUSION),
            (ProblemKind::SystemLimitations, SYSTEM_LIMITATIONS),
            (ProblemKind::MissingInformation, MISSING_INFORMATION),
            (ProblemKind::RoutingError, ROUTING_ERROR),
        ]
        .into_iter()
        .map(|(kind, words)| (kind, words.iter().map(|w| w.to_lowercase()).collect()))
        .collect();

        Self { keywords, latency_threshold }
    }

    /// Replaces the keyword list of one kind.
    pub fn with_keywords(
        mut self,
        kind: ProblemKind,
        keywords: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let keywords = keywords.into_iter().map(|k| k.as_ref().to_lowercase()).collect();
        self.keywords.insert(kind, keywords);
        self
    }

    pub fn latency_threshold(&self) -> Duration {
        self.latency_threshold
    }

    pub fn detect(&self, conversation: &Conversation) -> BTreeSet<ProblemKind> {
        let mut problems = self.detect_text(&conversation.texts().join(" "));
        if conversation.duration_seconds() > self.latency_threshold.as_secs_f64() {
            problems.insert(ProblemKind::PerformanceLatency);
        }
        problems
    }

    /// Keyword scan only, without the latency rule.
    pub fn detect_text(&self, text: &str) -> BTreeSet<ProblemKind> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Block, DialogueId, Role};

    fn conversation(minutes: f64, texts: &[&str]) -> Conversation {
        Conversation::new(
            DialogueId::FIRST,
            1_i64,
            Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap(),
        )
        .duration_minutes(minutes)
        .blocks(texts.iter().map(|t| Block::new(Role::User, *t)).collect::<Vec<_>>())
    }

    #[test]
    fn test_detects_technical_issue_in_russian() {
        let fixture = ProblemKeywordDetector::default();
        let actual = fixture.detect_text("Извините, ошибка сервера");
        let expected = BTreeSet::from([ProblemKind::TechnicalIssues]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_long_conversation_is_latency_problem() {
        let fixture = ProblemKeywordDetector::new(Duration::from_secs(10));
        let actual = fixture.detect(&conversation(15.0, &["hello"]));
        let expected = BTreeSet::from([ProblemKind::PerformanceLatency]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let fixture = ProblemKeywordDetector::default();
        let actual = fixture.detect_text("Please Clarify: the File Not Found message");
        let expected = BTreeSet::from([ProblemKind::UserConfusion, ProblemKind::MissingInformation]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_mixed_case_keyword_is_normalised() {
        let fixture = ProblemKeywordDetector::default();
        let actual = fixture.detect_text("qa уточняет детали");
        let expected = BTreeSet::from([ProblemKind::UserConfusion]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_falls_back_to_full_text() {
        let fixture = ProblemKeywordDetector::default();
        let conversation = conversation(0.1, &[]).full_text("This is the wrong department");
        let actual = fixture.detect(&conversation);
        let expected = BTreeSet::from([ProblemKind::RoutingError]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_clean_short_conversation_has_no_problems() {
        let fixture = ProblemKeywordDetector::default();
        let actual = fixture.detect(&conversation(0.1, &["thanks", "you are welcome"]));
        assert_eq!(actual, BTreeSet::new());
    }

    #[test]
    fn test_custom_keywords_replace_defaults() {
        let fixture =
            ProblemKeywordDetector::default().with_keywords(ProblemKind::TechnicalIssues, ["Kaboom"]);
        let actual = (
            fixture.detect_text("kaboom happened"),
            fixture.detect_text("an error happened"),
        );
        let expected = (BTreeSet::from([ProblemKind::TechnicalIssues]), BTreeSet::new());
        assert_eq!(actual, expected);
    }
}
