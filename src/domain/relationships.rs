//! Issue to bill links.
//!
//! A bill is related to an issue when they share a category, or when the
//! issue's source text mentions the bill number.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::domain::fields::{bill, issue};
use crate::external::records::{FieldMap, Record};

/// Ids of the bills related to `issue_record`, sorted and deduplicated
pub fn related_bill_ids(issue_record: &Record, bills: &[Record]) -> Vec<String> {
    let categories: BTreeSet<String> = issue_record.list(issue::CATEGORY).into_iter().collect();
    let source = issue_record.non_blank(issue::SOURCE).unwrap_or_default();

    let related: BTreeSet<&str> = bills
        .iter()
        .filter(|b| {
            let shares_category = b
                .list(bill::CATEGORY)
                .iter()
                .any(|c| categories.contains(c));
            let cited = b
                .non_blank(bill::BILL_NUMBER)
                .is_some_and(|number| cites(source, number));
            shares_category || cited
        })
        .map(|b| b.id.as_str())
        .collect();

    related.into_iter().map(str::to_string).collect()
}

/// Whether `source` mentions `number` as a whole token.
///
/// `213-1` is not cited by `213-12` or `1213-1`: a digit edge of the number
/// may not touch another digit, nor a `-` on the left.
fn cites(source: &str, number: &str) -> bool {
    let leading_digit = number.starts_with(|c: char| c.is_ascii_digit());
    let trailing_digit = number.ends_with(|c: char| c.is_ascii_digit());

    source.match_indices(number).any(|(start, _)| {
        let before = source[..start].chars().next_back();
        let after = source[start + number.len()..].chars().next();
        let joined_left = leading_digit && before.is_some_and(|c| c.is_ascii_digit() || c == '-');
        let joined_right = trailing_digit && after.is_some_and(|c| c.is_ascii_digit());
        !joined_left && !joined_right
    })
}

/// Patch setting `Related_Bills`, or `None` when the stored links already match
pub fn relationship_patch(issue_record: &Record, bills: &[Record]) -> Option<FieldMap> {
    let related = related_bill_ids(issue_record, bills);

    let mut current = issue_record.list(issue::RELATED_BILLS);
    current.sort();
    current.dedup();
    if current == related {
        return None;
    }

    let mut patch = FieldMap::new();
    patch.insert(
        issue::RELATED_BILLS.to_string(),
        Value::Array(related.into_iter().map(Value::String).collect()),
    );
    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, fields: Value) -> Record {
        Record::new(id, fields.as_object().cloned().unwrap())
    }

    fn bills() -> Vec<Record> {
        vec![
            record("recB1", json!({ "Bill_Number": "213-12", "Category": ["welfare"] })),
            record("recB2", json!({ "Bill_Number": "213-40", "Category": ["tax"] })),
            record("recB3", json!({ "Bill_Number": "213-41", "Category": ["defense"] })),
        ]
    }

    #[test]
    fn test_category_and_citation_both_link() {
        let issue = record(
            "recI1",
            json!({ "Category": ["welfare"], "Source": "See bill 213-40 in committee" }),
        );
        assert_eq!(related_bill_ids(&issue, &bills()), vec!["recB1", "recB2"]);
    }

    #[test]
    fn test_citation_needs_whole_bill_number() {
        let bills = vec![record("recB1", json!({ "Bill_Number": "213-1" }))];
        let linked = |source: &str| {
            let issue = record("recI1", json!({ "Source": source }));
            related_bill_ids(&issue, &bills)
        };

        assert!(linked("See bill 213-12 in committee").is_empty());
        assert!(linked("Refers to 1213-1").is_empty());
        assert!(linked("Amends 9-213-1").is_empty());
        assert_eq!(linked("See bill 213-1 in committee"), vec!["recB1"]);
        assert_eq!(linked("(213-1), 213-12"), vec!["recB1"]);
        assert_eq!(linked("213-1"), vec!["recB1"]);
    }

    #[test]
    fn test_no_patch_when_links_match() {
        let issue = record(
            "recI1",
            json!({ "Category": ["tax"], "Related_Bills": ["recB2"] }),
        );
        assert!(relationship_patch(&issue, &bills()).is_none());
    }

    #[test]
    fn test_patch_replaces_stale_links() {
        let issue = record(
            "recI1",
            json!({ "Category": ["defense"], "Related_Bills": ["recB1"] }),
        );
        let patch = relationship_patch(&issue, &bills()).unwrap();
        assert_eq!(patch["Related_Bills"], json!(["recB3"]));
    }

    #[test]
    fn test_issue_without_category_or_source() {
        let issue = record("recI1", json!({ "Title": "Unsorted" }));
        assert!(related_bill_ids(&issue, &bills()).is_empty());
        assert!(relationship_patch(&issue, &bills()).is_none());
    }
}
