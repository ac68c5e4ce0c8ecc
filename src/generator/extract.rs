// src/generator/extract.rs — Pull a JSON document out of model text

use serde_json::Value;

/// Strip a surrounding code fence, with or without a language tag.
///
/// "```json\n{...}\n```" → "{...}". Unfenced text is returned trimmed.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    // drop an info string such as `json` or `JSON` on the opening line
    let body = match body.split_once('\n') {
        Some((tag, after)) if is_fence_tag(tag) => after,
        _ => body,
    };
    let body = body.trim();
    body.strip_prefix("json")
        .or_else(|| body.strip_prefix("JSON"))
        .map(str::trim_start)
        .filter(|b| b.starts_with('{') || b.starts_with('['))
        .unwrap_or(body)
}

fn is_fence_tag(line: &str) -> bool {
    let tag = line.trim();
    tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse model text as a JSON document.
///
/// Strict first (the whole unfenced text), then lenient: the outermost
/// `{ ... }` span, for models that wrap the object in prose.
pub fn parse_document(raw: &str) -> Result<Value, String> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err("empty response".into());
    }

    let strict_err = match serde_json::from_str::<Value>(body) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&body[start..=end]) {
                return Ok(v);
            }
        }
    }

    Err(format!("not valid JSON: {strict_err}"))
}

/// If `doc` is an object whose payload sits under `key`, return the payload.
pub fn unwrap_envelope(doc: Value, key: &str) -> Value {
    match doc {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
