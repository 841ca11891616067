use chrono::{SecondsFormat, Utc};

/// RFC 3339 timestamp with colons and dots replaced so the result is legal in
/// a filename on every platform while still sorting chronologically.
/// Nanosecond precision keeps names collision-free within a run even for
/// back-to-back writes against the same handler.
pub fn fs_safe_timestamp() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .replace([':', '.'], "-")
}

/// `{handler}_{timestamp}.json` — request-payload artifact name.
pub fn payload_file_name(handler: &str) -> String {
    format!("{}_{}.json", handler, fs_safe_timestamp())
}

/// `{handler}_AI_Insights_{timestamp}.json` — insight artifact name.
pub fn insight_file_name(handler: &str) -> String {
    format!("{}_AI_Insights_{}.json", handler, fs_safe_timestamp())
}
