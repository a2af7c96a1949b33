use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").unwrap())
}

/// Resolve a dotted path (`a.b.c`) against a JSON value. Missing path
/// segments, or a segment that doesn't exist, yield `None` — the caller
/// decides whether that means "" (lenient) or `invalid` (strict).
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every `{{a.b.c}}` placeholder in `template` against `context`.
/// Missing paths resolve to an empty string (§4.5 interpolation, lenient
/// mode). Hand-rolled recursive-descent-free regex pass — the placeholder
/// grammar is intentionally too small to need a parser.
pub fn interpolate(template: &str, context: &Value) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            resolve_path(context, path)
                .map(render_value)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Strict variant: returns `None` (the caller should emit `invalid`) the
/// first time a placeholder's path does not resolve.
pub fn interpolate_strict(template: &str, context: &Value) -> Option<String> {
    let mut missing = false;
    let rendered = placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            match resolve_path(context, path) {
                Some(v) => render_value(v),
                None => {
                    missing = true;
                    String::new()
                }
            }
        })
        .into_owned();
    if missing {
        None
    } else {
        Some(rendered)
    }
}

/// Recursively interpolate every string leaf of a JSON config value — used
/// to resolve an entire `ActionSpec.config` object against the context in
/// one pass (§3.2: "any string in an action `config`... is substituted").
pub fn interpolate_json(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, context)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_json(v, context)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_json(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let ctx = json!({"input": {"text": "pizza"}});
        assert_eq!(
            interpolate("You said {{input.text}}", &ctx),
            "You said pizza"
        );
    }

    #[test]
    fn missing_path_yields_empty_string() {
        let ctx = json!({"input": {"text": "pizza"}});
        assert_eq!(interpolate("Hi {{input.missing}}!", &ctx), "Hi !");
    }

    #[test]
    fn interpolate_json_walks_nested_objects() {
        let ctx = json!({"user": {"name": "Asha"}});
        let config = json!({"greeting": "Hi {{user.name}}", "nested": ["{{user.name}}"]});
        let rendered = interpolate_json(&config, &ctx);
        assert_eq!(rendered["greeting"], "Hi Asha");
        assert_eq!(rendered["nested"][0], "Asha");
    }

    #[test]
    fn strict_mode_detects_missing_path() {
        let ctx = json!({"a": 1});
        assert!(interpolate_strict("{{a}}", &ctx).is_some());
        assert!(interpolate_strict("{{b}}", &ctx).is_none());
    }
}
