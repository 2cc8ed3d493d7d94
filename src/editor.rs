use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::row::{Row, Value};

lazy_static! {
    static ref LONG_TEXT_HEADER: Regex = Regex::new(r"(?i)observ|nota|coment|direc").unwrap();
}

/// Values longer than this get a multi-line input
pub const LONG_TEXT_THRESHOLD: usize = 70;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    SingleLine,
    MultiLine,
}

/// One input in the edit form
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditField {
    pub header: String,
    pub value: String,
    pub kind: FieldKind,
}

/// Read-only label/value pair for the detail view
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetailField {
    pub header: String,
    pub value: String,
}

pub fn is_long_field(header: &str, value: &str) -> bool {
    value.chars().count() > LONG_TEXT_THRESHOLD || LONG_TEXT_HEADER.is_match(header)
}

/// Every column of the row, the ID included
pub fn detail_fields(row: &Row, headers: &[String]) -> Vec<DetailField> {
    headers
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| DetailField {
            header: h.clone(),
            value: row.display(h),
        })
        .collect()
}

/// Editable inputs: every non-blank header except the ID column
pub fn edit_fields(row: &Row, headers: &[String], id_header: Option<&str>) -> Vec<EditField> {
    headers
        .iter()
        .filter(|h| !h.is_empty() && Some(h.as_str()) != id_header)
        .map(|h| {
            let value = row.display(h);
            let kind = if is_long_field(h, &value) {
                FieldKind::MultiLine
            } else {
                FieldKind::SingleLine
            };
            EditField {
                header: h.clone(),
                value,
                kind,
            }
        })
        .collect()
}

/// Apply edited values over a copy of `original`
///
/// Edited values are stored as text. The ID column is always copied back from
/// the original so the backend updates the existing record instead of
/// inserting a new one.
pub fn merge_edits<I, K, V>(original: &Row, edits: I, id_header: Option<&str>) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut updated = original.clone();
    for (header, value) in edits {
        updated.set(header.as_ref(), Value::Text(value.into()));
    }
    if let Some((id_header, id)) = id_header.and_then(|h| original.get(h).map(|v| (h, v))) {
        updated.set(id_header, id.clone());
    }
    updated
}
