//! Cleanup for JSON produced by chat models.
//!
//! Models asked for "a JSON object" still wrap it in code fences, prefix it
//! with prose, or get cut off by `max_tokens`. These helpers turn that text
//! into a `serde_json::Value` when the object is recoverable.

use serde_json::Value;

/// Removes a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "JSON", ...) on the fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Returns the first balanced `{...}` object in `text`, ignoring braces inside strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Closes unterminated strings, arrays and objects left by a truncated reply.
pub fn repair_json(json_str: &str) -> String {
    let trimmed = json_str.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }

    let mut result = trimmed.to_string();
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => closers.push('}'),
            '[' if !in_string => closers.push(']'),
            '}' | ']' if !in_string => {
                closers.pop();
            }
            _ => {}
        }
    }

    if in_string {
        result.push('"');
    }
    let tail = result.trim_end();
    if tail.ends_with(',') || tail.ends_with(':') {
        let cut = tail.len() - 1;
        result.truncate(cut);
    }
    while let Some(closer) = closers.pop() {
        result.push(closer);
    }
    result
}

/// Best-effort parse of a model reply into a JSON object.
pub fn parse_model_json(text: &str) -> Result<Value, String> {
    let unfenced = strip_code_fences(text);
    if unfenced.is_empty() {
        return Err("empty model reply".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    if let Some(object) = extract_json_object(unfenced) {
        if let Ok(value) = serde_json::from_str::<Value>(object) {
            return Ok(value);
        }
    }

    let from_brace = match unfenced.find('{') {
        Some(idx) => &unfenced[idx..],
        None => return Err("no JSON object in model reply".to_string()),
    };
    let repaired = repair_json(from_brace);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            tracing::debug!(
                "[JSON-REPAIR] Repaired truncated model JSON: {} -> {} chars",
                from_brace.len(),
                repaired.len()
            );
            Ok(value)
        }
        Err(e) => Err(format!(
            "Failed to parse model JSON even after repair: {} ({} chars)",
            e,
            text.len()
        )),
    }
}

/// Drops `null` object entries recursively so `#[serde(default)]` fields take over.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_extract_first_object_skips_prose() {
        let text = r#"Here you go: {"a": {"b": "}"}} and then {"c": 2}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": {"b": "}"}}"#));
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn test_repair_truncated_reply() {
        let repaired = repair_json(r#"{"severity": 6, "triggers": [{"type": "physical","#);
        let value: Value = match serde_json::from_str(&repaired) {
            Ok(v) => v,
            Err(e) => panic!("repair produced invalid JSON {:?}: {}", repaired, e),
        };
        assert_eq!(value["severity"], 6);
    }

    #[test]
    fn test_parse_model_json_paths() {
        match parse_model_json("```\n{\"isCrashReport\": false}\n```") {
            Ok(v) => assert_eq!(v["isCrashReport"], false),
            Err(e) => panic!("fenced parse failed: {}", e),
        }
        assert!(parse_model_json("").is_err());
        assert!(parse_model_json("I cannot help with that").is_err());
    }

    #[test]
    fn test_strip_nulls_recursive() {
        let mut v = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, {"f": null}]});
        strip_nulls(&mut v);
        assert_eq!(v, json!({"b": {"d": 1}, "e": [{}]}));
    }
}
