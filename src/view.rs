use chrono::TimeZone;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::columns::ColumnRoles;
use crate::dates::sort_key;
use crate::row::Row;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// User-controlled view parameters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub search: String,
    pub salesperson: String,
    pub interest: String,
    pub page: usize,
}

impl ViewState {
    pub fn new() -> Self {
        ViewState {
            page: 1,
            ..Default::default()
        }
    }

    pub fn has_filters(&self) -> bool {
        !self.search.trim().is_empty()
            || !self.salesperson.trim().is_empty()
            || !self.interest.trim().is_empty()
    }
}

/// Indices into `rows` that survive the view, in display order
///
/// Steps run in a fixed order: date-descending sort (when a date column is
/// bound), salesperson filter, interest filter, then free-text search over the
/// visible columns.
pub fn filter_indices<Tz: TimeZone>(
    rows: &[Row],
    visible_headers: &[String],
    roles: &ColumnRoles,
    state: &ViewState,
    tz: &Tz,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();

    if let Some(date_header) = roles.date.as_deref() {
        let keys: Vec<i64> = rows
            .iter()
            .map(|r| sort_key(r.get(date_header), tz))
            .collect();
        // Stable: rows with equal dates keep store order.
        order.sort_by(|a, b| keys[*b].cmp(&keys[*a]));
    }

    let salesperson = state.salesperson.trim();
    if let (false, Some(header)) = (salesperson.is_empty(), roles.salesperson.as_deref()) {
        order.retain(|&i| rows[i].display(header).trim() == salesperson);
    }

    let interest = state.interest.trim();
    if let (false, Some(header)) = (interest.is_empty(), roles.interest.as_deref()) {
        order.retain(|&i| rows[i].display(header).trim() == interest);
    }

    let query = state.search.trim().to_lowercase();
    if !query.is_empty() {
        order.retain(|&i| matches_search(&rows[i], visible_headers, &query));
    }

    order
}

/// Same as [`filter_indices`] but hands back the rows themselves
pub fn apply_filters<'a, Tz: TimeZone>(
    rows: &'a [Row],
    visible_headers: &[String],
    roles: &ColumnRoles,
    state: &ViewState,
    tz: &Tz,
) -> Vec<&'a Row> {
    filter_indices(rows, visible_headers, roles, state, tz)
        .into_iter()
        .map(|i| &rows[i])
        .collect()
}

/// `query` must already be lowercased
pub fn matches_search(row: &Row, visible_headers: &[String], query: &str) -> bool {
    visible_headers
        .iter()
        .any(|h| row.display(h).to_lowercase().contains(query))
}

/// Distinct non-blank values of a column, in dropdown order
pub fn filter_options(rows: &[Row], header: Option<&str>) -> Vec<String> {
    let Some(header) = header else {
        return Vec::new();
    };
    let distinct: BTreeSet<String> = rows
        .iter()
        .map(|r| r.display(header).trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    let mut values: Vec<String> = distinct.into_iter().collect();
    values.sort_by(|a, b| collate(a, b));
    values
}

/// Keep a selection only while it is still one of the options
pub fn retain_selection(options: &[String], current: &str) -> String {
    if options.iter().any(|o| o == current) {
        current.to_string()
    } else {
        String::new()
    }
}

/// Dictionary-style ordering: accents and case only break ties
pub fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

fn collation_key(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// One page of a filtered result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// 1-based page number after clamping
    pub number: usize,
    pub total_pages: usize,
    /// Half-open slice bounds into the filtered sequence
    pub start: usize,
    pub end: usize,
    pub total_results: usize,
}

impl PageWindow {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

pub fn total_pages(count: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    count.div_ceil(size).max(1)
}

/// Clamp `requested` into `[1, total_pages]` and compute the slice bounds
///
/// # Arguments
/// * `count` - Number of rows after filtering
/// * `requested` - 1-based page number, clamped into range
/// * `page_size` - Rows per page; zero is treated as one
///
/// # Returns
/// * `PageWindow` - Page number, page count and the `start..end` slice
///
/// # Examples
/// ```
/// use nexcard_panel::view::paginate;
///
/// let window = paginate(35, 9, 15);
/// assert_eq!((window.number, window.total_pages), (3, 3));
/// assert_eq!((window.start, window.end), (30, 35));
/// ```
pub fn paginate(count: usize, requested: usize, page_size: usize) -> PageWindow {
    let size = page_size.max(1);
    let total = total_pages(count, size);
    let number = requested.clamp(1, total);
    let start = ((number - 1) * size).min(count);
    let end = (number * size).min(count);

    PageWindow {
        number,
        total_pages: total,
        start,
        end,
        total_results: count,
    }
}
