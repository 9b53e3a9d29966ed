use std::collections::BTreeSet;
use std::str::FromStr;

use chatlens_domain::{
    Analysis, AnnotationFailure, Category, Emotion, Intent, ProblemDetection, ProblemKind,
    RequestClassification, Sentiment, UxAnalysis,
};
use serde_json::{Map, Value};

/// Turns the oracle's reply into an [`Analysis`].
///
/// Validation is lenient: unknown vocabulary values are dropped, numbers are
/// clamped into range and missing fields take their defaults. Only a reply
/// without any JSON object in it is a failure.
pub fn parse_analysis(content: &str) -> Result<Analysis, AnnotationFailure> {
    let mut root = extract_object(content)
        .ok_or_else(|| AnnotationFailure::other("Oracle reply contains no JSON object"))?;
    if let Some(Value::Object(inner)) = root.remove("analysis") {
        root = inner;
    }
    let empty = Map::new();
    let section = |name: &str| root.get(name).and_then(Value::as_object).unwrap_or(&empty);

    let request = section("request");
    let request = RequestClassification::reconcile(
        tags::<Category>(request.get("category"), "category"),
        tags::<Intent>(request.get("intent"), "intent"),
    );

    // `problems` is either the detection object or a bare list of kinds.
    let problems = match root.get("problems") {
        Some(Value::Object(detection)) => ProblemDetection::new(tags::<ProblemKind>(
            detection.get("problems"),
            "problems",
        ))
        .severity(severity(detection.get("severity")))
        .details(detection.get("details").and_then(Value::as_str).unwrap_or_default()),
        list => ProblemDetection::new(tags::<ProblemKind>(list, "problems")),
    };

    let ux = section("ux");
    let ux = UxAnalysis::default()
        .sentiment(
            tags::<Sentiment>(ux.get("sentiment"), "sentiment")
                .into_iter()
                .next()
                .unwrap_or(Sentiment::Neutral),
        )
        .confidence(confidence(ux.get("confidence")))
        .emotions(
            tags::<Emotion>(ux.get("emotions"), "emotions")
                .into_iter()
                .collect::<BTreeSet<_>>(),
        )
        .feedback(strings(ux.get("feedback")))
        .suggestions(strings(ux.get("suggestions")))
        .is_successful(ux.get("is_successful").and_then(Value::as_bool).unwrap_or(true));

    Ok(Analysis::new(request, problems, ux))
}

/// Parses the whole reply as an object, else the outermost `{...}` span.
fn extract_object(content: &str) -> Option<Map<String, Value>> {
    let parse = |text: &str| match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };
    parse(content.trim()).or_else(|| {
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        (start < end).then(|| parse(&content[start..=end])).flatten()
    })
}

/// Closed-vocabulary values from a string or an array of strings.
fn tags<T: FromStr>(value: Option<&Value>, field: &str) -> Vec<T> {
    let raw: Vec<&str> = match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .filter_map(|tag| match T::from_str(tag.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::debug!(field, value = tag, "Dropping value outside the vocabulary");
                None
            }
        })
        .collect()
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn confidence(value: Option<&Value>) -> f64 {
    number(value).map(|n| n.clamp(0.0, 1.0)).unwrap_or(0.5)
}

fn severity(value: Option<&Value>) -> u8 {
    number(value)
        .map(|n| n.round().clamp(0.0, f64::from(ProblemDetection::MAX_SEVERITY)) as u8)
        .unwrap_or_default()
}
