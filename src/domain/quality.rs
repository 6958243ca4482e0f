//! Bill completeness scoring.
//!
//! Each required field is worth 16 points and a well-formed bill number 20,
//! for a maximum of 100.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::domain::fields::bill;
use crate::external::records::{FieldMap, Record};

const FIELD_POINTS: f64 = 16.0;
const NUMBER_POINTS: f64 = 20.0;

/// `213-12`, `閣法12`, `第12号` and `衆法 第3号` style numbers
static BILL_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,3}-\d{1,4}|(?:閣法|衆法|参法)?\s*第?\d{1,4}号?)$")
        .expect("bill number pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillAssessment {
    pub bill_id: String,
    pub score: f64,
    pub missing_fields: Vec<&'static str>,
    pub bill_number_valid: bool,
}

impl BillAssessment {
    pub fn is_below(&self, min_score: f64) -> bool {
        self.score < min_score
    }

    /// Patch for `Quality_Score`, or `None` when the stored score matches
    pub fn patch(&self, current: &Record) -> Option<FieldMap> {
        if current
            .number(bill::QUALITY_SCORE)
            .is_some_and(|s| (s - self.score).abs() < f64::EPSILON)
        {
            return None;
        }
        let mut patch = FieldMap::new();
        patch.insert(bill::QUALITY_SCORE.to_string(), json!(self.score));
        Some(patch)
    }

    pub fn describe(&self) -> String {
        let mut text = format!("bill {} scored {:.0}", self.bill_id, self.score);
        if !self.missing_fields.is_empty() {
            text.push_str(&format!(", missing {}", self.missing_fields.join(", ")));
        }
        if !self.bill_number_valid {
            text.push_str(", malformed bill number");
        }
        text
    }
}

pub fn assess_bill(record: &Record) -> BillAssessment {
    let missing_fields: Vec<&'static str> = bill::REQUIRED_FIELDS
        .into_iter()
        .filter(|field| record.non_blank(field).is_none() && record.number(field).is_none())
        .collect();

    let bill_number_valid = record
        .non_blank(bill::BILL_NUMBER)
        .is_some_and(|n| BILL_NUMBER.is_match(n));

    let present = (bill::REQUIRED_FIELDS.len() - missing_fields.len()) as f64;
    let mut score = present * FIELD_POINTS;
    if bill_number_valid {
        score += NUMBER_POINTS;
    }

    BillAssessment {
        bill_id: record.id.clone(),
        score,
        missing_fields,
        bill_number_valid,
    }
}
