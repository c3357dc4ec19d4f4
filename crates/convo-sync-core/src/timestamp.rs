//! Locale adapter for the talk page's date and time strings.
//!
//! The source renders dates like `2025/9/24(水)` and times like `06:15既読`,
//! where the parenthesised weekday and the trailing read marker are display
//! decoration. All locale assumptions live here so they can be swapped
//! without touching fingerprinting or diffing.
//!
//! Parsing never fails: anything unparsable maps to [`SENTINEL_MIN`], which
//! keeps sorting total and sinks such entries to the end of a
//! newest-first ordering.

use chrono::NaiveDateTime;

use crate::models::MessageRecord;

/// Substituted for any `(date, time)` pair that cannot be parsed.
pub const SENTINEL_MIN: NaiveDateTime = NaiveDateTime::MIN;

/// Turns a record's raw `(date, time)` strings into a sortable instant.
pub trait TimestampParser: Send + Sync {
    fn parse(&self, date: &str, time: &str) -> NaiveDateTime;

    fn timestamp_of(&self, record: &MessageRecord) -> NaiveDateTime {
        self.parse(&record.date, &record.time)
    }

    /// The `time` string with display decoration removed.
    ///
    /// Records are keyed on this form, so a marker that appears on a later
    /// scrape does not turn a known message into a new one.
    fn canonical_time(&self, time: &str) -> String {
        time.trim().to_string()
    }
}

/// Parser for the talk page's `YYYY/M/D(曜)` + `HH:MM[marker]` format.
#[derive(Debug, Clone)]
pub struct TalkPageLocale {
    read_marker: String,
    format: String,
}

impl TalkPageLocale {
    pub fn new(read_marker: impl Into<String>) -> Self {
        Self {
            read_marker: read_marker.into(),
            format: "%Y/%m/%d %H:%M".to_string(),
        }
    }

    /// `2025/9/24(水)` → `2025/9/24`.
    pub fn strip_weekday<'a>(&self, date: &'a str) -> &'a str {
        date.split('(').next().unwrap_or(date).trim()
    }

    /// `06:15既読` → `06:15`.
    pub fn strip_read_marker(&self, time: &str) -> String {
        if self.read_marker.is_empty() {
            return time.trim().to_string();
        }
        time.replace(&self.read_marker, "").trim().to_string()
    }
}

impl Default for TalkPageLocale {
    fn default() -> Self {
        Self::new("既読")
    }
}

impl TimestampParser for TalkPageLocale {
    fn canonical_time(&self, time: &str) -> String {
        self.strip_read_marker(time)
    }

    fn parse(&self, date: &str, time: &str) -> NaiveDateTime {
        let combined = format!(
            "{} {}",
            self.strip_weekday(date),
            self.strip_read_marker(time)
        );
        NaiveDateTime::parse_from_str(&combined, &self.format).unwrap_or(SENTINEL_MIN)
    }
}

/// Rewrite each record's `time` into its canonical form.
pub fn canonicalize(records: Vec<MessageRecord>, parser: &dyn TimestampParser) -> Vec<MessageRecord> {
    records
        .into_iter()
        .map(|mut r| {
            r.time = parser.canonical_time(&r.time);
            r
        })
        .collect()
}

/// Sort records newest first. Unparsable entries end up last.
pub fn sort_newest_first(records: &mut [MessageRecord], parser: &dyn TimestampParser) {
    records.sort_by_cached_key(|r| std::cmp::Reverse(parser.timestamp_of(r)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_with_weekday_and_read_marker() {
        let locale = TalkPageLocale::default();
        let ts = locale.parse("2025/9/24(水)", "06:15既読");
        let expected = NaiveDate::from_ymd_opt(2025, 9, 24)
            .unwrap()
            .and_hms_opt(6, 15, 0)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_plain() {
        let locale = TalkPageLocale::default();
        let ts = locale.parse("2025/10/15", "10:00");
        assert_ne!(ts, SENTINEL_MIN);
    }

    #[test]
    fn test_malformed_maps_to_sentinel() {
        let locale = TalkPageLocale::default();
        assert_eq!(locale.parse("yesterday", "06:15"), SENTINEL_MIN);
        assert_eq!(locale.parse("2025/9/24(水)", ""), SENTINEL_MIN);
        assert_eq!(locale.parse("", ""), SENTINEL_MIN);
        assert_eq!(locale.parse("2025/13/40", "25:99"), SENTINEL_MIN);
    }

    #[test]
    fn test_custom_read_marker() {
        let locale = TalkPageLocale::new("Read");
        assert_ne!(locale.parse("2025/1/2", "09:30 Read"), SENTINEL_MIN);
    }

    #[test]
    fn test_read_marker_does_not_change_fingerprint() {
        use crate::fingerprint::fingerprint;

        let locale = TalkPageLocale::default();
        let unread = MessageRecord::new("2025/10/15(水)", "10:00", Speaker::Me, "hello");
        let read = MessageRecord::new("2025/10/15(水)", "10:00既読", Speaker::Me, "hello");
        assert_ne!(fingerprint(&unread), fingerprint(&read));

        let out = canonicalize(vec![unread, read], &locale);
        assert_eq!(out[0].time, "10:00");
        assert_eq!(out[1].time, "10:00");
        assert_eq!(fingerprint(&out[0]), fingerprint(&out[1]));
    }

    #[test]
    fn test_sort_puts_malformed_last() {
        let locale = TalkPageLocale::default();
        let mut records = vec![
            MessageRecord::new("garbage", "??", Speaker::Partner, "broken"),
            MessageRecord::new("2025/9/23(火)", "22:00", Speaker::Partner, "older"),
            MessageRecord::new("2025/9/24(水)", "06:15既読", Speaker::Me, "newer"),
        ];
        sort_newest_first(&mut records, &locale);
        assert_eq!(records[0].text, "newer");
        assert_eq!(records[1].text, "older");
        assert_eq!(records[2].text, "broken");
    }
}
