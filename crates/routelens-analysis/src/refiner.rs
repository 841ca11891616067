use routelens_core::{ExtractedFunction, RefinedLogic};

/// Reduces an extracted handler to its executable lines plus a short
/// description of what it does. Pure and deterministic: refining the same
/// input twice yields byte-identical output, so re-runs are idempotent.
pub fn refine(function: &ExtractedFunction) -> RefinedLogic {
    if function.source_text.trim().is_empty() {
        // Degrade rather than fail on unexpected shapes.
        return RefinedLogic {
            cleaned_code: function.source_text.clone(),
            summary: String::new(),
        };
    }

    let cleaned_code = strip_decorative_noise(&function.source_text);
    let summary = summarize(function, &cleaned_code);

    RefinedLogic {
        cleaned_code,
        summary,
    }
}

/// Removes comments and collapses blank runs while keeping every executable
/// line. Comment detection tracks string state so `"http://..."` literals
/// survive intact.
fn strip_decorative_noise(source: &str) -> String {
    let without_comments = strip_comments(source);

    let mut lines = Vec::new();
    let mut previous_blank = false;
    for line in without_comments.lines() {
        let trimmed_end = line.trim_end();
        let blank = trimmed_end.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(trimmed_end.to_string());
    }
    while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let bytes: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut string_delim: Option<char> = None;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        match string_delim {
            Some(delim) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        i += 2;
                        continue;
                    }
                } else if c == delim {
                    string_delim = None;
                }
                i += 1;
            }
            None => {
                if c == '/' && next == Some('/') {
                    while i < bytes.len() && bytes[i] != '\n' {
                        i += 1;
                    }
                } else if c == '/' && next == Some('*') {
                    i += 2;
                    while i + 1 < bytes.len() && !(bytes[i] == '*' && bytes[i + 1] == '/') {
                        // Keep newlines so surviving code stays on its line.
                        if bytes[i] == '\n' {
                            out.push('\n');
                        }
                        i += 1;
                    }
                    i = (i + 2).min(bytes.len());
                } else if c == '/' && regex_can_follow(&out) {
                    // A slash in expression position opens a regex literal,
                    // not a comment; `/\//` must survive intact.
                    i = consume_regex_literal(&bytes, i, &mut out);
                } else {
                    if c == '\'' || c == '"' || c == '`' {
                        string_delim = Some(c);
                    }
                    out.push(c);
                    i += 1;
                }
            }
        }
    }
    out
}

/// A `/` begins a regex literal only where an expression may start: after an
/// operator, an opening bracket, a separator, or a prefix keyword. After an
/// identifier, number or closing bracket it is division.
fn regex_can_follow(out: &str) -> bool {
    let trimmed = out.trim_end();
    let Some(prev) = trimmed.chars().last() else {
        return true;
    };
    if "=([{,;:!&|?+-*%^~<>".contains(prev) {
        return true;
    }
    const PREFIX_KEYWORDS: [&str; 8] = [
        "return",
        "typeof",
        "case",
        "in",
        "of",
        "new",
        "delete",
        "void",
    ];
    PREFIX_KEYWORDS.iter().any(|kw| {
        trimmed.ends_with(kw)
            && trimmed[..trimmed.len() - kw.len()]
                .chars()
                .last()
                .map(|c| !c.is_alphanumeric() && c != '_' && c != '$')
                .unwrap_or(true)
    })
}

/// Copies a regex literal verbatim, honoring escapes and character classes
/// (where `/` is literal). Stops at the closing `/` or, defensively, at end
/// of line.
fn consume_regex_literal(bytes: &[char], mut i: usize, out: &mut String) -> usize {
    out.push('/');
    i += 1;
    let mut in_class = false;
    while i < bytes.len() {
        let ch = bytes[i];
        out.push(ch);
        i += 1;
        if ch == '\\' {
            if i < bytes.len() {
                out.push(bytes[i]);
                i += 1;
            }
            continue;
        }
        match ch {
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            '\n' => break,
            _ => {}
        }
    }
    i
}

fn summarize(function: &ExtractedFunction, cleaned: &str) -> String {
    let params = parameter_list(cleaned);
    let kind = if function.is_async {
        "Async handler"
    } else {
        "Handler"
    };

    let mut reads = Vec::new();
    for source in ["req.params", "req.body", "req.query", "req.headers"] {
        if cleaned.contains(source) {
            reads.push(source);
        }
    }

    let mut responds = Vec::new();
    for sink in ["res.json", "res.send", "res.render", "res.redirect", "res.end"] {
        if cleaned.contains(sink) {
            responds.push(sink);
        }
    }
    let sets_status = cleaned.contains("res.status");

    let mut first = format!("{} {}({})", kind, function.name, params);
    if !reads.is_empty() {
        first.push_str(&format!(" reads {}", reads.join(", ")));
    }
    first.push('.');

    let mut second = String::new();
    if !responds.is_empty() {
        second.push_str(&format!("Responds via {}", responds.join(", ")));
        if sets_status {
            second.push_str(" with explicit status codes");
        }
        second.push('.');
    } else if sets_status {
        second.push_str("Sets an explicit response status.");
    }

    if second.is_empty() {
        first
    } else {
        format!("{} {}", first, second)
    }
}

/// First parenthesized parameter list in the construct, joined verbatim.
fn parameter_list(source: &str) -> String {
    let open = match source.find('(') {
        Some(open) => open,
        None => return String::new(),
    };
    let close = match source[open..].find(')') {
        Some(close) => open + close,
        None => return String::new(),
    };
    source[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
