use routelens_core::AnalysisPayload;

/// Builds the review prompt for one payload. Deterministic: the same payload
/// always produces the same text (metadata is emitted in sorted key order),
/// so re-runs send identical requests.
pub fn build_review_prompt(payload: &AnalysisPayload) -> String {
    let endpoint = &payload.endpoint;
    let function = &payload.function;

    let mut prompt = String::new();
    prompt.push_str("You are a senior engineer reviewing one HTTP endpoint handler.\n\n");
    prompt.push_str(&format!(
        "Endpoint: {} {}\n",
        endpoint.method, endpoint.path
    ));
    prompt.push_str(&format!(
        "Handler: {} ({}, {} lines)\n",
        function.name,
        if function.is_async { "async" } else { "sync" },
        function.lines
    ));

    if !payload.metadata.is_empty() {
        let mut keys: Vec<&String> = payload.metadata.keys().collect();
        keys.sort();
        prompt.push_str("Metadata:\n");
        for key in keys {
            prompt.push_str(&format!("  {}: {}\n", key, payload.metadata[key]));
        }
    }

    prompt.push_str("\nHandler source (sanitized):\n```js\n");
    prompt.push_str(&function.sanitized_code);
    if !function.sanitized_code.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n\n");
    prompt.push_str(
        "Review the handler for correctness, error handling, security and style. \
         Respond with ONLY a JSON object with exactly these keys: \
         \"summary\" (string), \"issues\" (array), \"suggestions\" (array), \
         \"before_after\" (string or null), \"notes\" (string). \
         Do not wrap the JSON in markdown or add any other text.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use routelens_core::{Endpoint, FunctionReport, HttpMethod};
    use std::collections::HashMap;

    fn payload_with_metadata(metadata: HashMap<String, serde_json::Value>) -> AnalysisPayload {
        AnalysisPayload {
            endpoint: Endpoint {
                method: HttpMethod::Post,
                path: "/orders".into(),
                handler_name: "createOrder".into(),
                source_file_ref: "order.routes.js".into(),
            },
            function: FunctionReport {
                name: "createOrder".into(),
                cleaned_code: "async (req, res) => { res.json({}); }".into(),
                sanitized_code: "async (req, res) => { res.json({}); }".into(),
                is_async: true,
                lines: 1,
            },
            metadata,
            timestamp: "2026-08-26T00:00:00Z".into(),
        }
    }

    #[test]
    fn embeds_endpoint_and_function_facts() {
        let prompt = build_review_prompt(&payload_with_metadata(HashMap::new()));
        assert!(prompt.contains("POST /orders"));
        assert!(prompt.contains("createOrder (async, 1 lines)"));
        assert!(prompt.contains("```js"));
        assert!(prompt.contains("\"before_after\""));
    }

    #[test]
    fn metadata_order_is_deterministic() {
        let mut metadata = HashMap::new();
        metadata.insert("zeta".to_string(), serde_json::json!(1));
        metadata.insert("alpha".to_string(), serde_json::json!(2));
        let payload = payload_with_metadata(metadata);
        let a = build_review_prompt(&payload);
        let b = build_review_prompt(&payload);
        assert_eq!(a, b);
        assert!(a.find("alpha").unwrap() < a.find("zeta").unwrap());
    }
}
