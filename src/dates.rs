use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::row::Value;

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?$").unwrap();
    static ref ISO_DATE_TIME: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[Tt ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?\s*(Z|z|[+-]\d{2}:?\d{2})?$"
    )
    .unwrap();
    static ref MONTH_FIRST: Regex = Regex::new(
        r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([AaPp])\.?[Mm]\.?)?)?$"
    )
    .unwrap();
    static ref YEAR_FIRST: Regex = Regex::new(
        r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})(?:[Tt\s]\s*(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([AaPp])\.?[Mm]\.?)?)?$"
    )
    .unwrap();
    static ref DAY_FIRST: Regex = Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})").unwrap();
    static ref LEADING_WEEKDAY: Regex =
        Regex::new(r"(?i)^(mon|tue|wed|thu|fri|sat|sun)[a-z]*,?\s+").unwrap();
    static ref GMT_SUFFIX: Regex =
        Regex::new(r"(?i)\s+(?:GMT|UTC)([+-]\d{4})?(?:\s*\(.*\))?$").unwrap();
}

const TEXTUAL_DATE_FORMATS: &[&str] = &["%b %d %Y", "%b %d, %Y", "%d %b %Y", "%d %b, %Y"];
const TEXTUAL_TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parse a cell as a date in the machine's local time zone
pub fn parse_date(value: &Value) -> Option<DateTime<Local>> {
    parse_date_in(value, &Local)
}

/// Parse a cell as a date, interpreting zone-less forms in `tz`
///
/// Forms a browser `Date` parser accepts are tried first, then day-first
/// `D/M/Y` as typed in Spanish-language sheets.
///
/// # Arguments
/// * `value` - The cell to read
/// * `tz` - Zone for forms that carry no offset
///
/// # Returns
/// * `Some(instant)` for any accepted form
/// * `None` for null, blank or unrecognised values
pub fn parse_date_in<Tz: TimeZone>(value: &Value, tz: &Tz) -> Option<DateTime<Tz>> {
    if value.is_null() {
        return None;
    }
    let text = value.display();
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    general_parse(s, tz).or_else(|| day_first(s, tz))
}

/// Milliseconds since the epoch used for ordering; unparsable dates are zero
pub fn sort_key<Tz: TimeZone>(value: Option<&Value>, tz: &Tz) -> i64 {
    value
        .and_then(|v| parse_date_in(v, tz))
        .map(|d| d.timestamp_millis())
        .unwrap_or(0)
}

fn general_parse<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    iso_date(s, tz)
        .or_else(|| iso_date_time(s, tz))
        .or_else(|| {
            DateTime::parse_from_rfc2822(s)
                .ok()
                .map(|d| d.with_timezone(tz))
        })
        .or_else(|| year_first(s, tz))
        .or_else(|| month_first(s, tz))
        .or_else(|| textual(s, tz))
}

/// Resolve a wall-clock time in `tz`; times skipped by a DST jump move forward
fn local_instant<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        tz.from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
    })
}

fn utc_instant<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    Utc.from_utc_datetime(&naive).with_timezone(tz)
}

fn capture_u32(caps: &regex::Captures, idx: usize, default: u32) -> Option<u32> {
    match caps.get(idx) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(default),
    }
}

// Date-only ISO forms are UTC midnight.
fn iso_date<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let caps = ISO_DATE.captures(s)?;
    let year: i32 = caps[1].parse().ok()?;
    let month = capture_u32(&caps, 2, 1)?;
    let day = capture_u32(&caps, 3, 1)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(utc_instant(tz, date.and_hms_opt(0, 0, 0)?))
}

fn iso_date_time<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let caps = ISO_DATE_TIME.captures(s)?;
    let year: i32 = caps[1].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[3].parse().ok()?)?;
    let hour = capture_u32(&caps, 4, 0)?;
    let minute = capture_u32(&caps, 5, 0)?;
    let second = capture_u32(&caps, 6, 0)?;
    let nanos = match caps.get(7) {
        Some(m) => {
            let digits = format!("{:0<9}", m.as_str());
            digits.parse().ok()?
        }
        None => 0,
    };
    let naive = date.and_hms_nano_opt(hour, minute, second, nanos)?;

    match caps.get(8).map(|m| m.as_str()) {
        None => local_instant(tz, naive),
        Some("Z") | Some("z") => Some(utc_instant(tz, naive)),
        Some(offset) => {
            let offset = parse_offset(offset)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|d| d.with_timezone(tz))
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Calendar date with browser rollover: months must be 1-12 and days 1-31,
/// and a day past the end of its month runs into the next one
fn rolled_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_signed(Duration::days(i64::from(day) - 1))
}

/// Wall-clock time from the optional time captures starting at `first`
fn clock_time(caps: &regex::Captures, first: usize) -> Option<(u32, u32, u32)> {
    let hour = capture_u32(caps, first, 0)?;
    let minute = capture_u32(caps, first + 1, 0)?;
    let second = capture_u32(caps, first + 2, 0)?;
    let hour = match caps.get(first + 3).map(|m| m.as_str().to_ascii_lowercase()) {
        None => hour,
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(meridiem) if meridiem == "p" => hour % 12 + 12,
        Some(_) => hour % 12,
    };
    Some((hour, minute, second))
}

// Browser legacy parsing reads numeric dates month first.
fn month_first<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let caps = MONTH_FIRST.captures(s)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if caps[3].len() <= 2 {
        year += if year < 50 { 2000 } else { 1900 };
    }
    let date = rolled_date(year, month, day)?;
    let (hour, minute, second) = clock_time(&caps, 4)?;
    local_instant(tz, date.and_hms_opt(hour, minute, second)?)
}

// `YYYY/M/D` and unpadded `YYYY-M-D` are local, unlike padded ISO dates.
fn year_first<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let caps = YEAR_FIRST.captures(s)?;
    let year: i32 = caps[1].parse().ok()?;
    let date = rolled_date(year, caps[2].parse().ok()?, caps[3].parse().ok()?)?;
    let (hour, minute, second) = clock_time(&caps, 4)?;
    local_instant(tz, date.and_hms_opt(hour, minute, second)?)
}

fn textual<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let stripped = LEADING_WEEKDAY.replace(s, "");
    let (body, offset) = match GMT_SUFFIX.captures(&stripped) {
        Some(caps) => {
            let offset = match caps.get(1) {
                Some(m) => Some(parse_offset(m.as_str())?),
                None => FixedOffset::east_opt(0),
            };
            (stripped[..caps.get(0)?.start()].to_string(), offset)
        }
        None => (stripped.to_string(), None),
    };
    let body = body.trim();

    let naive = TEXTUAL_DATE_FORMATS.iter().find_map(|date_fmt| {
        NaiveDate::parse_from_str(body, date_fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .or_else(|| {
                TEXTUAL_TIME_FORMATS.iter().find_map(|time_fmt| {
                    NaiveDateTime::parse_from_str(body, &format!("{} {}", date_fmt, time_fmt)).ok()
                })
            })
    })?;

    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|d| d.with_timezone(tz)),
        None => local_instant(tz, naive),
    }
}

// `D/M/Y` with browser-style rollover: day 31 of February lands in March.
fn day_first<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let caps = DAY_FIRST.captures(s)?;
    let day: i64 = caps[1].parse().ok()?;
    let month: i64 = caps[2].parse().ok()?;
    let mut year: i64 = caps[3].parse().ok()?;
    if year < 100 {
        year += 2000;
    }

    let months = year * 12 + (month - 1);
    let first = NaiveDate::from_ymd_opt(
        i32::try_from(months.div_euclid(12)).ok()?,
        u32::try_from(months.rem_euclid(12) + 1).ok()?,
        1,
    )?;
    let date = first.checked_add_signed(Duration::days(day - 1))?;
    local_instant(tz, date.and_hms_opt(0, 0, 0)?)
}
