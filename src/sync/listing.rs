//! Parser for Unix-style `LIST` output.
//!
//! Only one line shape is recognized:
//!
//! ```text
//! [d]<attributes> <size> <Mon> <dd> <HH:MM|  yyyy> <name>
//! ```
//!
//! Times carry no zone and no year when the entry is recent; they are kept as
//! naive values and only ever compared with each other.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

const LINE_PATTERN: &str = concat!(
    r"^(?P<dir>[dD])?(?P<attribs>.*)\s(?P<size>[0-9]+)\s",
    r"(?P<month>Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s(?P<day>[0-9\s]{2})\s",
    r"(\s(?P<year>[0-9]{4})|(?P<time>[0-9]{2}:[0-9]{2}))\s",
    r"(?P<name>[A-Za-z0-9\-._\s]+)$",
);

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| Regex::new(LINE_PATTERN).expect("listing pattern is valid"))
}

/// A regular file found in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub size: u64,
    /// Server-reported modification time, in the server's own frame.
    pub modified: NaiveDateTime,
}

/// Parse every file line of `text`. Directories and lines that do not fit the
/// grammar or carry an impossible date are skipped.
///
/// `current_year` is assumed for entries that show a time of day.
pub fn parse_listing(text: &str, current_year: i32) -> Vec<ListingEntry> {
    text.split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let entry = parse_line(line, current_year);
            if entry.is_none() {
                tracing::trace!(line, "Skipping listing line");
            }
            entry
        })
        .collect()
}

/// Parse one listing line. `None` for directories and unparseable lines.
pub fn parse_line(line: &str, current_year: i32) -> Option<ListingEntry> {
    let caps = line_regex().captures(line)?;
    if caps.name("dir").is_some() {
        return None;
    }

    let month = month_number(&caps["month"])?;
    let day: u32 = caps["day"].trim().parse().ok()?;

    let with_time = caps
        .name("time")
        .and_then(|time| at_time(current_year, month, day, time.as_str()));
    let modified = match with_time {
        Some(modified) => modified,
        None => {
            let year = caps.name("year")?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?
        }
    };

    Some(ListingEntry {
        name: caps["name"].to_string(),
        size: caps["size"].parse().ok()?,
        modified,
    })
}

fn at_time(year: i32, month: u32, day: u32, time: &str) -> Option<NaiveDateTime> {
    let time = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    Some(NaiveDate::from_ymd_opt(year, month, day)?.and_time(time))
}

fn month_number(abbrev: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == abbrev)
        .map(|index| index as u32 + 1)
}
