//! Routing-key templates.
//!
//! A publisher derives the routing key of each message from the message
//! itself: a template such as `payments.{{event.kind}}.{{currency}}` is
//! rendered against the outgoing payload, and the result is collapsed into a
//! valid dot-delimited topic key.
//!
//! Placeholders use `{{dot.path}}` syntax and resolve against the payload
//! tree; a path that is missing (or points at `null`, an object or an array)
//! renders as the empty string. Rendering never fails - empty segments are
//! dropped during normalization, so `a.{{missing}}.d` yields `a.d`, not
//! `a..d`.

use serde_json::Value;

/// Render `template` against `payload` and normalize the result into a topic
/// routing key: no leading or trailing dots, no empty segments.
pub fn render(template: &str, payload: &Value) -> String {
    normalize(&substitute(template, payload))
}

/// Replace every `{{path}}` placeholder with the stringified payload field it
/// points at. Text outside placeholders is copied verbatim; an unterminated
/// `{{` is treated as literal text.
fn substitute(template: &str, payload: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                out.push_str(&lookup(payload, path));
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve a dot-separated path against the payload and stringify the value.
///
/// Scalars render as their natural textual form; anything unresolvable or
/// non-scalar renders as the empty string.
fn lookup(payload: &Value, path: &str) -> String {
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return String::new(),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(value) => value,
                None => return String::new(),
            },
            _ => return String::new(),
        };
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) | Value::Array(_) => String::new(),
    }
}

/// Drop empty dot-segments: leading dots, trailing dots and any `..` runs
/// collapse away, leaving a well-formed AMQP topic key.
fn normalize(raw: &str) -> String {
    raw.split('.')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::render;
    use serde_json::json;

    #[test]
    fn renders_nested_fields_into_the_template() {
        let payload = json!({"b": {"c": "bee"}, "c": "sea", "d": "die"});
        assert_eq!(render("a.{{b.c}}.d", &payload), "a.bee.d");
    }

    #[test]
    fn missing_fields_render_as_empty_and_collapse() {
        assert_eq!(render("a.{{missing}}.d", &json!({})), "a.d");
    }

    #[test]
    fn leading_and_trailing_placeholders_do_not_leave_dots() {
        let payload = json!({});
        assert_eq!(render("{{gone}}.a.b.{{gone}}", &payload), "a.b");
    }

    #[test]
    fn numbers_and_booleans_are_stringified() {
        let payload = json!({"version": 2, "live": true});
        assert_eq!(render("v{{version}}.{{live}}", &payload), "v2.true");
    }

    #[test]
    fn array_elements_are_addressable_by_index() {
        let payload = json!({"tags": ["alpha", "beta"]});
        assert_eq!(render("t.{{tags.1}}", &payload), "t.beta");
    }

    #[test]
    fn whitespace_inside_placeholders_is_ignored() {
        let payload = json!({"b": {"c": "bee"}});
        assert_eq!(render("a.{{ b.c }}.d", &payload), "a.bee.d");
    }

    #[test]
    fn unterminated_placeholder_is_literal_text() {
        assert_eq!(render("a.{{b.c", &json!({})), "a.{{b.c");
    }

    #[test]
    fn rendered_keys_never_contain_empty_segments() {
        let payload = json!({"x": "", "y": {"z": ""}});
        for template in [
            ".a..b.",
            "{{x}}.{{y.z}}.{{nope}}",
            "...",
            "a.{{x}}.{{x}}.b",
            "{{x}}",
        ] {
            let key = render(template, &payload);
            assert!(!key.starts_with('.'), "template {template:?} -> {key:?}");
            assert!(!key.ends_with('.'), "template {template:?} -> {key:?}");
            assert!(!key.contains(".."), "template {template:?} -> {key:?}");
        }
    }
}
