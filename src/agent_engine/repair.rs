//! Lenient JSON recovery for model-written action blocks.
//!
//! Handles the usual slips: markdown code fences, prose around the object,
//! single-quoted strings, Python literals, unquoted keys, trailing commas and
//! unclosed brackets or strings.

use crate::errors::{GridClawError, GridClawResult};

/// Strip fences and cut the text down to the outermost `{…}` when present.
fn extract_candidate(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop an optional language tag on the fence line.
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        (Some(start), _) => &text[start..],
        _ => text,
    }
}

fn strip_trailing_comma(out: &mut String) {
    let kept = out.trim_end().len();
    if out[..kept].ends_with(',') {
        out.truncate(kept - 1);
    }
}

/// Best-effort rewrite into valid JSON.
pub fn repair_json(raw: &str) -> String {
    let src: Vec<char> = extract_candidate(raw).chars().collect();
    let mut out = String::with_capacity(src.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < src.len() {
        let c = src[i];

        if let Some(q) = quote {
            match c {
                '\\' if i + 1 < src.len() => {
                    let next = src[i + 1];
                    if next == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(next);
                    }
                    i += 2;
                    continue;
                }
                _ if c == q => {
                    out.push('"');
                    quote = None;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push('"');
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                strip_trailing_comma(&mut out);
                if closers.last() == Some(&c) {
                    closers.pop();
                }
                out.push(c);
            }
            // Exponents like `1e5` stay attached to their number.
            c if (c.is_ascii_alphabetic() || c == '_')
                && !out.ends_with(|p: char| p.is_ascii_digit() || p == '.') =>
            {
                let start = i;
                while i < src.len() && (src[i].is_ascii_alphanumeric() || src[i] == '_') {
                    i += 1;
                }
                let word: String = src[start..i].iter().collect();
                let mut j = i;
                while j < src.len() && src[j].is_whitespace() {
                    j += 1;
                }
                let is_key = j < src.len() && src[j] == ':';
                match word.as_str() {
                    "True" | "true" if !is_key => out.push_str("true"),
                    "False" | "false" if !is_key => out.push_str("false"),
                    "None" | "null" if !is_key => out.push_str("null"),
                    _ => {
                        out.push('"');
                        out.push_str(&word);
                        out.push('"');
                    }
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    if quote.is_some() {
        out.push('"');
    }
    strip_trailing_comma(&mut out);
    while let Some(close) = closers.pop() {
        out.push(close);
    }
    out
}

/// Parse an action block, repairing it first if strict parsing fails.
pub fn parse_action_block(raw: &str) -> GridClawResult<serde_json::Value> {
    let candidate = extract_candidate(raw);
    if let Ok(v) = serde_json::from_str(candidate) {
        return Ok(v);
    }
    let repaired = repair_json(raw);
    tracing::debug!(repaired = %repaired, "action block repaired");
    serde_json::from_str(&repaired).map_err(|e| GridClawError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_passes_through() {
        let v = parse_action_block(r#" {"action_type": "click", "repeat": 2} "#).unwrap();
        assert_eq!(v, json!({"action_type": "click", "repeat": 2}));
    }

    #[test]
    fn fenced_block_with_trailing_comma() {
        let raw = "```json\n{\"action_type\": \"move\", \"point_id\": \"G-05-03\",}\n```";
        let v = parse_action_block(raw).unwrap();
        assert_eq!(v["point_id"], "G-05-03");
    }

    #[test]
    fn single_quotes_and_python_literals() {
        let v = parse_action_block("{'action_type': 'type', 'text': 'it\\'s \"ok\"', 'submit': True}").unwrap();
        assert_eq!(v["text"], "it's \"ok\"");
        assert_eq!(v["submit"], true);
    }

    #[test]
    fn unquoted_keys_and_missing_closer() {
        let v = parse_action_block("{action_type: \"hotkey\", keys: [\"ctrl\", \"c\"").unwrap();
        assert_eq!(v, json!({"action_type": "hotkey", "keys": ["ctrl", "c"]}));
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let v = parse_action_block("Here you go: {\"action_type\": \"wait\"} done").unwrap();
        assert_eq!(v["action_type"], "wait");
    }

    #[test]
    fn hopeless_input_is_a_parse_error() {
        assert!(matches!(parse_action_block(":::"), Err(GridClawError::Parse(_))));
    }
}
