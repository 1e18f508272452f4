use serde_json::Value;

/// Human-readable label for a resource node.
///
/// Tries, in order: the first `name` entry (`text`, else `given family`),
/// `display`, `code.text`, the first `code.coding[].display`, and finally
/// `"<resourceType> <id>"`.
pub fn display_label(resource: &Value) -> String {
    name_label(resource)
        .or_else(|| non_empty(resource.get("display")))
        .or_else(|| non_empty(resource.pointer("/code/text")))
        .or_else(|| coding_display(resource))
        .unwrap_or_else(|| {
            let resource_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or("Resource");
            let id = resource.get("id").and_then(Value::as_str).unwrap_or("");
            format!("{} {}", resource_type, id).trim_end().to_string()
        })
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn name_label(resource: &Value) -> Option<String> {
    let name = match resource.get("name")? {
        Value::Array(entries) => entries.first()?,
        Value::String(s) => {
            let s = s.trim();
            return (!s.is_empty()).then(|| s.to_string());
        }
        other => other,
    };

    if let Some(text) = non_empty(name.get("text")) {
        return Some(text);
    }

    let given = match name.get("given") {
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");

    let full = format!("{} {}", given, family).trim().to_string();
    (!full.is_empty()).then_some(full)
}

fn coding_display(resource: &Value) -> Option<String> {
    resource
        .pointer("/code/coding")?
        .as_array()?
        .iter()
        .find_map(|coding| non_empty(coding.get("display")))
}
