//! Whitespace normalisation of free-text fields.

use serde_json::Value;

use crate::external::records::{FieldMap, Record};

/// Collapse runs of whitespace (including the ideographic space) inside each
/// line, trim every line, squeeze blank-line runs to one and trim the ends.
pub fn normalize_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(collapsed);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Patch with the normalised value of every listed text field that changes.
///
/// With `fields = None` every string field of the record is considered.
pub fn cleanup_patch(record: &Record, fields: Option<&[&str]>) -> Option<FieldMap> {
    let mut patch = FieldMap::new();
    for (name, value) in &record.fields {
        if fields.is_some_and(|wanted| !wanted.contains(&name.as_str())) {
            continue;
        }
        if let Value::String(text) = value {
            let normalized = normalize_text(text);
            if &normalized != text {
                patch.insert(name.clone(), Value::String(normalized));
            }
        }
    }
    (!patch.is_empty()).then_some(patch)
}
