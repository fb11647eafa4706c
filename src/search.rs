//! Search/filter/page pipeline: pure functions over the merged roster,
//! recomputed whenever a query or the data set changes.

use crate::normalize;
use crate::record::ProfileRecord;
use crate::sanitize;

/// Fields a query slot can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Role,
    Body,
    Links,
}

impl SearchField {
    /// Parse from a configuration string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(SearchField::Name),
            "role" => Some(SearchField::Role),
            "body" => Some(SearchField::Body),
            "links" => Some(SearchField::Links),
            _ => None,
        }
    }
}

/// One query slot: a free-text query matched as a case-insensitive
/// substring against a field set. A record passes the pipeline only if it
/// matches every active (non-empty) slot.
#[derive(Debug, Clone)]
pub struct QuerySlot<'a> {
    pub text: &'a str,
    pub fields: &'a [SearchField],
}

/// Filter the roster, returning indices into `records` in original order.
/// With no active slot the input passes through unfiltered.
pub fn filter_indices(records: &[ProfileRecord], slots: &[QuerySlot]) -> Vec<usize> {
    let active: Vec<(String, &[SearchField])> = slots
        .iter()
        .filter_map(|slot| normalize::fold_query(slot.text).map(|q| (q, slot.fields)))
        .collect();

    if active.is_empty() {
        return (0..records.len()).collect();
    }

    records
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            active
                .iter()
                .all(|(query, fields)| matches_slot(record, query, fields))
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn matches_slot(record: &ProfileRecord, folded_query: &str, fields: &[SearchField]) -> bool {
    fields
        .iter()
        .flat_map(|field| field_text(record, *field))
        .any(|text| normalize::fold(&text).contains(folded_query))
}

fn field_text(record: &ProfileRecord, field: SearchField) -> Vec<String> {
    match field {
        SearchField::Name => vec![record.name.clone()],
        SearchField::Role => vec![record.role.clone()],
        SearchField::Body => record
            .details_html
            .as_deref()
            .map(sanitize::plain_text)
            .into_iter()
            .collect(),
        SearchField::Links => record
            .company_url
            .iter()
            .chain(record.linked_in_url.iter())
            .cloned()
            .collect(),
    }
}

/// Apply the item-count cap: 0 means unlimited, N > 0 keeps a prefix of at
/// most N items in original order. This is a display cap, not pagination.
pub fn cap(mut indices: Vec<usize>, limit: usize) -> Vec<usize> {
    if limit > 0 {
        indices.truncate(limit);
    }
    indices
}
