use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP verbs recognized by the endpoint scanner. Serialized uppercase so
/// persisted artifacts carry `"GET"`/`"POST"`/... exactly as `Display` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "patch" => Ok(HttpMethod::Patch),
            "delete" => Ok(HttpMethod::Delete),
            "options" => Ok(HttpMethod::Options),
            "head" => Ok(HttpMethod::Head),
            _ => Err(format!("Unknown HTTP method: {}", s)),
        }
    }
}

/// One discovered route binding: method + path + handler name, plus the route
/// file it came from. Recomputed on every run, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub handler_name: String,
    pub source_file_ref: String,
}

impl Endpoint {
    /// Identifier handed to the selection collaborator, e.g.
    /// `GET /users/:id → getUser`.
    pub fn selection_id(&self) -> String {
        format!("{} {} → {}", self.method, self.path, self.handler_name)
    }
}

/// Exact source span of one located handler function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub name: String,
    pub source_text: String,
    /// 1-based line of the first line of the construct.
    pub start_line: u32,
    /// 1-based line of the last line of the construct.
    pub end_line: u32,
    pub is_async: bool,
}

impl ExtractedFunction {
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Deterministic normalization of an extracted handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedLogic {
    pub cleaned_code: String,
    pub summary: String,
}

/// Redacted handler code plus a note describing what was scrubbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedCode {
    pub safe_code: String,
    pub note: String,
}

/// Function slice of an analysis payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionReport {
    pub name: String,
    pub cleaned_code: String,
    pub sanitized_code: String,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub lines: u32,
}

/// The unit persisted to the request-artifact store. Written at most once per
/// endpoint per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub endpoint: Endpoint,
    pub function: FunctionReport,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
}

/// Normalized model review, or the error shape when the raw response could
/// not be recovered into JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AIInsight {
    Report {
        summary: String,
        issues: Vec<serde_json::Value>,
        suggestions: Vec<serde_json::Value>,
        before_after: Option<serde_json::Value>,
        notes: String,
    },
    Unrecoverable {
        error: String,
        /// Truncated candidate text that failed to parse.
        extracted: String,
        /// Truncated original raw model output.
        raw: String,
    },
}

impl AIInsight {
    pub fn is_error(&self) -> bool {
        matches!(self, AIInsight::Unrecoverable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trip() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("DELETE".parse::<HttpMethod>(), Ok(HttpMethod::Delete));
        assert!("connect".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }

    #[test]
    fn method_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&HttpMethod::Get).unwrap(),
            "\"GET\""
        );
        let back: HttpMethod = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(back, HttpMethod::Delete);
    }

    #[test]
    fn selection_id_format() {
        let ep = Endpoint {
            method: HttpMethod::Get,
            path: "/users/:id".into(),
            handler_name: "getUser".into(),
            source_file_ref: "user.routes.js".into(),
        };
        assert_eq!(ep.selection_id(), "GET /users/:id → getUser");
    }

    #[test]
    fn line_count_is_inclusive() {
        let f = ExtractedFunction {
            name: "f".into(),
            source_text: String::new(),
            start_line: 10,
            end_line: 14,
            is_async: false,
        };
        assert_eq!(f.line_count(), 5);
    }
}
