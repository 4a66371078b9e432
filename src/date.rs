//! Locale-aware date normalization.
//!
//! Listing and chapter pages print dates either as absolute strings
//! (`15/03/2024`, `2024-03-15 08:30:00`) or as relative phrases
//! (`3 giờ trước`, `2 weeks ago`, `vừa xong`). A [`DateGrammar`] turns both
//! into epoch milliseconds.
//!
//! Parsing never fails loudly: blank input, unknown units and malformed
//! strings all produce `None`.
//!
//! # Examples
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use yomikomi::date::{DateGrammar, Locale};
//!
//! let grammar = DateGrammar::preset(Locale::En);
//! let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
//!
//! let expected = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
//! assert_eq!(
//!     grammar.parse_at(Some("1 month ago"), now),
//!     Some(expected.timestamp_millis())
//! );
//! assert_eq!(grammar.parse_at(Some("garbage text"), now), None);
//! ```

use chrono::{
    DateTime, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Calendar unit of a relative date phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// How the unit word of a relative phrase is matched against the grammar's
/// unit table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMatching {
    /// The word after the amount must equal a unit key.
    #[default]
    Exact,
    /// Everything after the amount is searched for a unit key, longest key
    /// first.
    Contains,
}

/// Built-in grammar presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    En,
    Vi,
}

/// A date grammar: absolute formats, relative unit words and the site's
/// local time zone.
#[derive(Debug, Clone, PartialEq)]
pub struct DateGrammar {
    /// chrono `strftime` patterns, tried in order
    pub absolute_formats: Vec<String>,
    /// Localized unit word to unit
    pub units: BTreeMap<String, DateUnit>,
    /// Phrases meaning "now"
    pub just_now: Vec<String>,
    /// Replacements applied to the lower-cased text before tokenizing
    pub synonyms: Vec<(String, String)>,
    pub unit_matching: UnitMatching,
    /// Offset of the site's local time from UTC
    pub utc_offset_minutes: i32,
}

impl Default for DateGrammar {
    fn default() -> Self {
        DateGrammar::preset(Locale::En)
    }
}

impl DateGrammar {
    pub fn preset(locale: Locale) -> Self {
        match locale {
            Locale::En => Self::english(),
            Locale::Vi => Self::vietnamese(),
        }
    }

    fn english() -> Self {
        let units = [
            ("second", DateUnit::Second),
            ("seconds", DateUnit::Second),
            ("sec", DateUnit::Second),
            ("secs", DateUnit::Second),
            ("minute", DateUnit::Minute),
            ("minutes", DateUnit::Minute),
            ("min", DateUnit::Minute),
            ("mins", DateUnit::Minute),
            ("hour", DateUnit::Hour),
            ("hours", DateUnit::Hour),
            ("day", DateUnit::Day),
            ("days", DateUnit::Day),
            ("week", DateUnit::Week),
            ("weeks", DateUnit::Week),
            ("month", DateUnit::Month),
            ("months", DateUnit::Month),
            ("year", DateUnit::Year),
            ("years", DateUnit::Year),
        ];

        Self {
            absolute_formats: strings(&[
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d",
                "%m/%d/%Y",
                "%B %d, %Y",
            ]),
            units: unit_table(&units),
            just_now: strings(&["just now", "right now", "moments ago"]),
            synonyms: Vec::new(),
            unit_matching: UnitMatching::Exact,
            utc_offset_minutes: 0,
        }
    }

    fn vietnamese() -> Self {
        let units = [
            ("giây", DateUnit::Second),
            ("phút", DateUnit::Minute),
            ("giờ", DateUnit::Hour),
            ("tiếng", DateUnit::Hour),
            ("ngày", DateUnit::Day),
            ("tuần", DateUnit::Week),
            ("tháng", DateUnit::Month),
            ("năm", DateUnit::Year),
        ];

        Self {
            absolute_formats: strings(&[
                "%d/%m/%Y",
                "%d/%m/%Y %H:%M",
                "%H:%M %d/%m/%Y",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d",
            ]),
            units: unit_table(&units),
            just_now: strings(&["vừa xong", "vừa mới", "mới đây", "vừa"]),
            synonyms: vec![(" trc".to_string(), " trước".to_string())],
            unit_matching: UnitMatching::Contains,
            utc_offset_minutes: 7 * 60,
        }
    }

    /// Parses a date string relative to the current time.
    pub fn parse(&self, text: Option<&str>) -> Option<i64> {
        self.parse_at(text, Utc::now())
    }

    /// Parses a date string relative to `now`.
    ///
    /// Absolute formats are tried first. Text that looks absolute (contains
    /// `/`) but matches no format yields `None` instead of being read as a
    /// relative phrase.
    pub fn parse_at(&self, text: Option<&str>, now: DateTime<Utc>) -> Option<i64> {
        let text = text.map(str::trim).filter(|t| !t.is_empty())?;
        let offset = self.offset()?;

        if let Some(millis) = self.parse_absolute(text, &offset) {
            return Some(millis);
        }
        if text.contains('/') {
            trace!(text, "absolute-looking date matched no format");
            return None;
        }

        let mut lowered = text.to_lowercase();
        for (from, to) in &self.synonyms {
            lowered = lowered.replace(from.as_str(), to);
        }

        if self.just_now.iter().any(|token| lowered.contains(token.as_str())) {
            return Some(now.timestamp_millis());
        }

        let result = self.parse_relative(&lowered, now.with_timezone(&offset));
        if result.is_none() {
            trace!(text, "unrecognized date");
        }
        result
    }

    fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    fn parse_absolute(&self, text: &str, offset: &FixedOffset) -> Option<i64> {
        self.absolute_formats.iter().find_map(|format| {
            let naive = NaiveDateTime::parse_from_str(text, format)
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, format)
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.timestamp_millis())
        })
    }

    fn parse_relative(&self, lowered: &str, now: DateTime<FixedOffset>) -> Option<i64> {
        let mut words = lowered.split_whitespace();
        let amount: u32 = words.next()?.parse().ok()?;
        let unit = match self.unit_matching {
            UnitMatching::Exact => self.units.get(words.next()?).copied()?,
            UnitMatching::Contains => {
                let rest = words.collect::<Vec<_>>().join(" ");
                self.units_longest_first()
                    .find(|(key, _)| rest.contains(key.as_str()))
                    .map(|(_, unit)| *unit)?
            }
        };

        let n = u64::from(amount);
        let shifted = match unit {
            DateUnit::Second => now.checked_sub_signed(TimeDelta::try_seconds(i64::from(amount))?),
            DateUnit::Minute => now.checked_sub_signed(TimeDelta::try_minutes(i64::from(amount))?),
            DateUnit::Hour => now.checked_sub_signed(TimeDelta::try_hours(i64::from(amount))?),
            DateUnit::Day => now.checked_sub_days(Days::new(n)),
            DateUnit::Week => now.checked_sub_days(Days::new(n.checked_mul(7)?)),
            DateUnit::Month => now.checked_sub_months(Months::new(amount)),
            DateUnit::Year => now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        }?;

        Some(shifted.timestamp_millis())
    }

    fn units_longest_first(&self) -> impl Iterator<Item = (&String, &DateUnit)> {
        let mut units: Vec<_> = self.units.iter().collect();
        units.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        units.into_iter()
    }
}

/// Per-site date configuration: a preset plus optional overrides.
///
/// ```toml
/// [date]
/// locale = "vi"
/// absolute_formats = ["%d/%m/%Y"]
/// extra_units = { "tiếng" = "hour" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateConfig {
    pub locale: Option<Locale>,
    pub absolute_formats: Option<Vec<String>>,
    pub units: Option<BTreeMap<String, DateUnit>>,
    #[serde(default)]
    pub extra_units: BTreeMap<String, DateUnit>,
    pub just_now: Option<Vec<String>>,
    pub synonyms: Option<Vec<(String, String)>>,
    pub unit_matching: Option<UnitMatching>,
    pub utc_offset_minutes: Option<i32>,
}

impl DateConfig {
    /// Resolves the configuration into a grammar.
    pub fn grammar(&self) -> DateGrammar {
        let mut grammar = DateGrammar::preset(self.locale.unwrap_or(Locale::En));

        if let Some(formats) = &self.absolute_formats {
            grammar.absolute_formats = formats.clone();
        }
        if let Some(units) = &self.units {
            grammar.units = units.clone();
        }
        grammar
            .units
            .extend(self.extra_units.iter().map(|(k, v)| (k.to_lowercase(), *v)));
        if let Some(tokens) = &self.just_now {
            grammar.just_now = tokens.clone();
        }
        if let Some(synonyms) = &self.synonyms {
            grammar.synonyms = synonyms.clone();
        }
        if let Some(matching) = self.unit_matching {
            grammar.unit_matching = matching;
        }
        if let Some(offset) = self.utc_offset_minutes {
            grammar.utc_offset_minutes = offset;
        }
        grammar
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn unit_table(units: &[(&str, DateUnit)]) -> BTreeMap<String, DateUnit> {
    units.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[rstest]
    #[case("30 seconds ago", utc(2024, 3, 31, 11, 59) + 30_000)]
    #[case("5 minutes ago", utc(2024, 3, 31, 11, 55))]
    #[case("3 hours ago", utc(2024, 3, 31, 9, 0))]
    #[case("1 day ago", utc(2024, 3, 30, 12, 0))]
    #[case("2 weeks ago", utc(2024, 3, 17, 12, 0))]
    #[case("1 month ago", utc(2024, 2, 29, 12, 0))]
    #[case("1 year ago", utc(2023, 3, 31, 12, 0))]
    #[case("Just now", utc(2024, 3, 31, 12, 0))]
    #[case("2024-01-05", utc(2024, 1, 5, 0, 0))]
    #[case("2024-01-05 08:30:00", utc(2024, 1, 5, 8, 30))]
    fn english_dates(#[case] text: &str, #[case] expected: i64) {
        let grammar = DateGrammar::preset(Locale::En);
        assert_eq!(grammar.parse_at(Some(text), now()), Some(expected));
    }

    #[rstest]
    #[case("1 tháng trước", utc(2024, 2, 29, 12, 0))]
    #[case("3 ngày trc", utc(2024, 3, 28, 12, 0))]
    #[case("2 giờ trước", utc(2024, 3, 31, 10, 0))]
    #[case("1 năm trước", utc(2023, 3, 31, 12, 0))]
    #[case("Vừa xong", utc(2024, 3, 31, 12, 0))]
    #[case("15/03/2024", utc(2024, 3, 14, 17, 0))]
    #[case("2024-03-15 08:00:00", utc(2024, 3, 15, 1, 0))]
    fn vietnamese_dates(#[case] text: &str, #[case] expected: i64) {
        let grammar = DateGrammar::preset(Locale::Vi);
        assert_eq!(grammar.parse_at(Some(text), now()), Some(expected));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    #[case(Some("garbage text"))]
    #[case(Some("3 fortnights ago"))]
    #[case(Some("31/02/2024"))]
    #[case(Some("99/99/9999"))]
    fn unparseable_dates_are_none(#[case] text: Option<&str>) {
        for locale in [Locale::En, Locale::Vi] {
            assert_eq!(DateGrammar::preset(locale).parse_at(text, now()), None);
        }
    }

    #[test]
    fn huge_amounts_do_not_panic() {
        let grammar = DateGrammar::preset(Locale::En);
        assert_eq!(grammar.parse_at(Some("4000000000 years ago"), now()), None);
        assert_eq!(grammar.parse_at(Some("4294967295 years ago"), now()), None);
    }

    #[test]
    fn config_overrides_preset() {
        let config = DateConfig {
            locale: Some(Locale::Vi),
            absolute_formats: Some(vec!["%d-%m-%Y".to_string()]),
            utc_offset_minutes: Some(0),
            ..Default::default()
        };
        let grammar = config.grammar();
        assert_eq!(grammar.unit_matching, UnitMatching::Contains);
        assert_eq!(grammar.parse_at(Some("05-01-2024"), now()), Some(utc(2024, 1, 5, 0, 0)));
        assert_eq!(grammar.parse_at(Some("05/01/2024"), now()), None);
    }
}
