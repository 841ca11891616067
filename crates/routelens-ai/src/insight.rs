use once_cell::sync::Lazy;
use regex::Regex;
use routelens_analysis::atomic_publish;
use routelens_core::{insight_file_name, AIInsight, Result, RouteLensError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

const EVIDENCE_LIMIT: usize = 400;

const NO_SUMMARY: &str = "No summary provided.";
const NO_NOTES: &str = "No notes provided.";

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("pattern compiles"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("pattern compiles"));

static MISSING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([}\]])(\s*)([{\[])").expect("pattern compiles"));

static UNQUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_$]*)\s*:"#).expect("pattern compiles"));

/// Recovers a structured insight from raw model text. The upstream format is
/// not contractually guaranteed, so this walks an ordered recovery ladder:
/// fenced `json` block, then greedy brace span, then residual-fence cleanup,
/// then strict parse with one bounded auto-repair pass. Unrecoverable input
/// yields the error-shaped insight carrying truncated evidence rather than
/// discarding anything.
pub fn clean(raw: &str) -> AIInsight {
    let candidate = extract_candidate(raw);

    let Some(candidate) = candidate else {
        return unrecoverable("no JSON object found in model response", "", raw);
    };

    match parse_with_repair(&candidate) {
        Some(value) => normalize(value, &candidate, raw),
        None => unrecoverable(
            "model response could not be parsed as JSON after repair",
            &candidate,
            raw,
        ),
    }
}

fn extract_candidate(raw: &str) -> Option<String> {
    let inner = FENCED_JSON
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| brace_span(raw))?;

    // Residual fence markers and stray format-name tokens survive when the
    // model nests or truncates its own fencing.
    let stripped = inner.replace("```", "");
    let stripped = stripped
        .trim_start()
        .strip_prefix("json")
        .map(str::to_string)
        .unwrap_or(stripped);

    brace_span(&stripped)
}

/// Substring from the first `{` to the last `}` inclusive. Tolerates leading
/// and trailing prose around the object.
fn brace_span(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Strict parse, then the repair rules of the recovery contract applied in
/// order. Each rule is followed by its own re-validation so one bad rewrite
/// cannot mask a more precise fix. Quote normalization runs before key
/// quoting because the key rule assumes plain quotes.
fn parse_with_repair(candidate: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    let repairs: [fn(&str) -> String; 4] = [
        |text| TRAILING_COMMA.replace_all(text, "$1").into_owned(),
        |text| MISSING_COMMA.replace_all(text, "$1,$2$3").into_owned(),
        |text| {
            text.replace(['\u{201c}', '\u{201d}'], "\"")
                .replace(['\u{2018}', '\u{2019}'], "'")
        },
        |text| UNQUOTED_KEY.replace_all(text, "$1\"$2\":").into_owned(),
    ];

    let mut current = candidate.to_string();
    for repair in repairs {
        current = repair(&current);
        if let Ok(value) = serde_json::from_str(&current) {
            return Some(value);
        }
    }
    None
}

/// Fixed-shape normalization: every absent field gets a documented neutral
/// default so downstream consumers never branch on missing keys.
fn normalize(value: Value, candidate: &str, raw: &str) -> AIInsight {
    let Value::Object(map) = value else {
        return unrecoverable("model reply was valid JSON but not an object", candidate, raw);
    };

    let summary = map
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(NO_SUMMARY)
        .to_string();

    let notes = map
        .get("notes")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(NO_NOTES)
        .to_string();

    let before_after = match map.get("before_after") {
        None | Some(Value::Null) => None,
        Some(other) => Some(other.clone()),
    };

    AIInsight::Report {
        summary,
        issues: sequence_field(map.get("issues")),
        suggestions: sequence_field(map.get("suggestions")),
        before_after,
        notes,
    }
}

/// Ordered sequence of strings or objects; a bare string is wrapped, anything
/// else collapses to empty.
fn sequence_field(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) if !s.is_empty() => vec![Value::String(s.clone())],
        _ => Vec::new(),
    }
}

fn unrecoverable(error: &str, extracted: &str, raw: &str) -> AIInsight {
    AIInsight::Unrecoverable {
        error: error.to_string(),
        extracted: truncate(extracted),
        raw: truncate(raw),
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(EVIDENCE_LIMIT).collect()
}

/// Persist one insight to the append-only store. Names combine handler
/// identity and a filesystem-safe timestamp so artifacts are unique and sort
/// chronologically.
pub async fn save_insight(insight: &AIInsight, handler: &str, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| RouteLensError::Persistence(format!("creating {}: {}", dir.display(), e)))?;

    let final_path = dir.join(insight_file_name(handler));
    let document = serde_json::to_vec_pretty(insight)?;
    atomic_publish(&final_path, &document).await?;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(insight: &AIInsight) -> (&str, &Vec<Value>, &Vec<Value>, &Option<Value>, &str) {
        match insight {
            AIInsight::Report {
                summary,
                issues,
                suggestions,
                before_after,
                notes,
            } => (summary, issues, suggestions, before_after, notes),
            AIInsight::Unrecoverable { error, .. } => {
                panic!("expected report, got error: {}", error)
            }
        }
    }

    #[test]
    fn recovers_fenced_json_exactly() {
        let raw = "```json\n{\"summary\":\"ok\",\"issues\":[],\"suggestions\":[],\"before_after\":null,\"notes\":\"n\"}\n```";
        let insight = clean(raw);
        let (summary, issues, suggestions, before_after, notes) = report(&insight);
        assert_eq!(summary, "ok");
        assert!(issues.is_empty());
        assert!(suggestions.is_empty());
        assert!(before_after.is_none());
        assert_eq!(notes, "n");
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let raw = "Here is my review:\n{\"summary\":\"fine\",\"notes\":\"x\"}\nHope that helps!";
        let insight = clean(raw);
        let (summary, ..) = report(&insight);
        assert_eq!(summary, "fine");
    }

    #[test]
    fn repairs_trailing_commas() {
        let insight = clean(r#"{"summary":"ok","issues":[],}"#);
        let (summary, ..) = report(&insight);
        assert_eq!(summary, "ok");
    }

    #[test]
    fn repairs_smart_quotes_and_unquoted_keys() {
        let insight = clean("{summary: \u{201c}ok\u{201d}, notes: \u{201c}n\u{201d}}");
        let (summary, _, _, _, notes) = report(&insight);
        assert_eq!(summary, "ok");
        assert_eq!(notes, "n");
    }

    #[test]
    fn inserts_commas_between_adjacent_literals() {
        let insight = clean(r#"{"summary":"ok","issues":[{"a":1} {"b":2}]}"#);
        let (_, issues, ..) = report(&insight);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn braceless_input_is_error_shaped() {
        let insight = clean("no braces here");
        match insight {
            AIInsight::Unrecoverable { error, raw, .. } => {
                assert!(!error.is_empty());
                assert_eq!(raw, "no braces here");
            }
            AIInsight::Report { .. } => panic!("expected error shape"),
        }
    }

    #[test]
    fn evidence_is_truncated() {
        let long = format!("{{\"summary\": {}", "x".repeat(2000));
        match clean(&long) {
            AIInsight::Unrecoverable { extracted, raw, .. } => {
                assert!(extracted.chars().count() <= 400);
                assert!(raw.chars().count() <= 400);
            }
            AIInsight::Report { .. } => panic!("expected error shape"),
        }
    }

    #[test]
    fn missing_fields_get_neutral_defaults() {
        let (summary, issues, suggestions, before_after, notes) = {
            let insight = clean("{}");
            let (s, i, g, b, n) = report(&insight);
            (
                s.to_string(),
                i.clone(),
                g.clone(),
                b.clone(),
                n.to_string(),
            )
        };
        assert_eq!(summary, "No summary provided.");
        assert!(issues.is_empty());
        assert!(suggestions.is_empty());
        assert!(before_after.is_none());
        assert_eq!(notes, "No notes provided.");
    }

    #[test]
    fn string_sequences_are_wrapped() {
        let insight = clean(r#"{"summary":"ok","issues":"missing auth"}"#);
        let (_, issues, ..) = report(&insight);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0], Value::String("missing auth".into()));
    }

    #[tokio::test]
    async fn insight_store_is_append_only() {
        let dir = TempDir::new().unwrap();
        let insight = clean(r#"{"summary":"ok"}"#);
        let first = save_insight(&insight, "getUser", dir.path()).await.unwrap();
        let second = save_insight(&insight, "getUser", dir.path()).await.unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("_AI_Insights_"));
    }
}
