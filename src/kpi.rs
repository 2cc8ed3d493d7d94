use chrono::{DateTime, Duration, Local, TimeZone};
use serde::Serialize;

use crate::dates::parse_date_in;
use crate::row::Row;

/// Recency counters shown above the table
///
/// Windows overlap: a lead from this morning counts in `today`, `last_7_days`
/// and `last_30_days` at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Kpis {
    pub total: usize,
    pub today: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
}

/// Count rows against the current local time
///
/// # Arguments
/// * `rows` - Every row in the store, not just the filtered ones
/// * `date_header` - The bound date column; without one only `total` is set
pub fn summarize(rows: &[Row], date_header: Option<&str>) -> Kpis {
    summarize_at(rows, date_header, Local::now())
}

/// Count rows against a fixed `now`
///
/// "Today" starts at local midnight of `now`'s calendar day; the 7 and 30 day
/// windows are rolling and measured back from `now`. Rows without a parsable
/// date only count towards `total`.
pub fn summarize_at<Tz: TimeZone>(
    rows: &[Row],
    date_header: Option<&str>,
    now: DateTime<Tz>,
) -> Kpis {
    let mut kpis = Kpis {
        total: rows.len(),
        ..Default::default()
    };
    let Some(header) = date_header else {
        return kpis;
    };

    let tz = now.timezone();
    let start_of_today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest());
    let week = Duration::days(7);
    let month = Duration::days(30);

    for row in rows {
        let Some(date) = row.get(header).and_then(|v| parse_date_in(v, &tz)) else {
            continue;
        };
        let age = now.clone().signed_duration_since(date.clone());
        if start_of_today.as_ref().is_some_and(|start| date >= *start) {
            kpis.today += 1;
        }
        if age <= week {
            kpis.last_7_days += 1;
        }
        if age <= month {
            kpis.last_30_days += 1;
        }
    }

    kpis
}
