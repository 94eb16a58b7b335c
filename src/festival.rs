//! Recurring festival dates.
//!
//! A festival repeats either on a fixed month-day or on the Nth weekday of
//! a month, optionally spanning a few days around that anchor. Relative
//! rules are only evaluated for the reference date's own month: the
//! question answered is "does this festival fall in the current month, and
//! on which days", not "when is it in every year".

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KIND_ABSOLUTE: &str = "絶対日付";
const KIND_RELATIVE: &str = "相対日付";

/// Furthest a resolved day may sit from its anchor, either side.
pub const MAX_OFFSET_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("month must be 1-12, got {0}")]
    Month(u32),

    #[error("week of month must be 1-5, got {0}")]
    Week(u32),

    #[error("offset {0} is outside ±366 days")]
    Offset(i64),
}

/// A recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FestivalRule {
    /// Same month and day every year, written `MM-DD`.
    Absolute { month_day: String },
    Relative(RelativeRule),
}

/// "The Nth `weekday` of `month`", widened to `[start_offset_days, end_offset_days]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeRule {
    /// 1..=12. A rule without a month never resolves.
    pub month: Option<u32>,
    pub week_of_month: u32,
    pub weekday: Weekday,
    pub start_offset_days: i64,
    pub end_offset_days: i64,
}

impl RelativeRule {
    /// Build from possibly missing fields: week 1, Sunday, zero offsets.
    pub fn from_parts(
        month: Option<u32>,
        week_of_month: Option<u32>,
        weekday: Option<Weekday>,
        start_offset_days: Option<i64>,
        end_offset_days: Option<i64>,
    ) -> Self {
        Self {
            month,
            week_of_month: week_of_month.unwrap_or(1),
            weekday: weekday.unwrap_or(Weekday::Sun),
            start_offset_days: start_offset_days.unwrap_or(0),
            end_offset_days: end_offset_days.unwrap_or(0),
        }
    }

    /// Reject what user input should never carry: a month outside 1..=12,
    /// a week outside 1..=5, or an offset beyond [`MAX_OFFSET_DAYS`].
    ///
    /// Stored records are not checked; `resolve` copes with any values.
    pub fn validate(&self) -> Result<(), RuleError> {
        if let Some(month) = self.month.filter(|m| !(1..=12).contains(m)) {
            return Err(RuleError::Month(month));
        }
        if !(1..=5).contains(&self.week_of_month) {
            return Err(RuleError::Week(self.week_of_month));
        }
        for offset in [self.start_offset_days, self.end_offset_days] {
            if !(-MAX_OFFSET_DAYS..=MAX_OFFSET_DAYS).contains(&offset) {
                return Err(RuleError::Offset(offset));
            }
        }
        Ok(())
    }

    /// The anchor day in `year`, before offsets.
    ///
    /// Not clamped: a fifth weekday that the month doesn't have lands in
    /// the following month. Week 0 has no anchor.
    pub fn anchor(&self, year: i32) -> Option<NaiveDate> {
        let month = self.month?;
        if self.week_of_month == 0 {
            return None;
        }
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let to_weekday = (self.weekday.num_days_from_sunday() + 7
            - first.weekday().num_days_from_sunday())
            % 7;
        let days = i64::from(to_weekday) + 7 * (i64::from(self.week_of_month) - 1);
        first.checked_add_signed(Duration::try_days(days)?)
    }

    /// Offsets cut to the `±MAX_OFFSET_DAYS` window around the anchor.
    fn offset_window(&self) -> std::ops::RangeInclusive<i64> {
        self.start_offset_days.max(-MAX_OFFSET_DAYS)..=self.end_offset_days.min(MAX_OFFSET_DAYS)
    }
}

impl FestivalRule {
    pub fn absolute(month_day: impl Into<String>) -> Self {
        Self::Absolute { month_day: month_day.into() }
    }

    /// The month the rule names directly, without resolving it.
    pub fn stated_month(&self) -> Option<u32> {
        match self {
            Self::Absolute { month_day } => parse_month_day(month_day).map(|(m, _)| m),
            Self::Relative(rule) => rule.month,
        }
    }

    /// Concrete dates of this rule relative to `reference`, ascending.
    ///
    /// Empty for an impossible month-day, for a relative rule whose month
    /// is not the reference month, and for inverted offsets. Days further
    /// than [`MAX_OFFSET_DAYS`] from the anchor are dropped.
    pub fn resolve(&self, reference: NaiveDate) -> Vec<NaiveDate> {
        match self {
            Self::Absolute { month_day } => parse_month_day(month_day)
                .and_then(|(m, d)| NaiveDate::from_ymd_opt(reference.year(), m, d))
                .into_iter()
                .collect(),
            Self::Relative(rule) => {
                if rule.month != Some(reference.month()) {
                    return Vec::new();
                }
                let Some(anchor) = rule.anchor(reference.year()) else {
                    return Vec::new();
                };
                rule.offset_window()
                    .filter_map(|offset| anchor.checked_add_signed(Duration::try_days(offset)?))
                    .collect()
            }
        }
    }

    /// Whether the rule has a date in `month` of `today`'s year.
    ///
    /// Absolute rules answer from their stated month. Relative rules are
    /// resolved with the reference moved into `month`, since they only
    /// resolve in their own month; the resolved days must still fall in
    /// `month` (offsets and week overflow can push them out).
    pub fn occurs_in_month(&self, month: u32, today: NaiveDate) -> bool {
        match self {
            Self::Absolute { .. } => self.stated_month() == Some(month),
            Self::Relative(_) => match NaiveDate::from_ymd_opt(today.year(), month, 1) {
                Some(reference) => self.resolve(reference).iter().any(|d| d.month() == month),
                None => false,
            },
        }
    }

    /// Whether any resolved day falls in the Monday-start week containing `today`.
    pub fn occurs_in_week_of(&self, today: NaiveDate) -> bool {
        let start = start_of_week(today);
        let end = start + Duration::days(6);
        self.resolve(today).iter().any(|d| is_between(*d, start, end))
    }
}

/// Parse `MM-DD` (single digits accepted).
fn parse_month_day(s: &str) -> Option<(u32, u32)> {
    let (m, d) = s.trim().split_once('-')?;
    Some((m.parse().ok()?, d.parse().ok()?))
}

/// Kanji weekday name to `Weekday`. Unknown names read as Sunday.
pub fn weekday_from_kanji(name: &str) -> Weekday {
    match name.trim() {
        "月" | "月曜" | "月曜日" => Weekday::Mon,
        "火" | "火曜" | "火曜日" => Weekday::Tue,
        "水" | "水曜" | "水曜日" => Weekday::Wed,
        "木" | "木曜" | "木曜日" => Weekday::Thu,
        "金" | "金曜" | "金曜日" => Weekday::Fri,
        "土" | "土曜" | "土曜日" => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Weekday from its Sunday-based index, 0..=6.
pub fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Monday of the week containing `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn is_between(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    start <= date && date <= end
}

/// A festival as stored on a shrine record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FestivalRecord {
    #[serde(rename = "名称", default)]
    pub name: String,
    #[serde(rename = "日付区分", default)]
    pub recurrence_type: Option<String>,
    #[serde(rename = "開催月日", default, skip_serializing_if = "Option::is_none")]
    pub month_day: Option<String>,
    #[serde(rename = "開催月", default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(rename = "開催月第何週", default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<u32>,
    #[serde(rename = "開催月何曜日", default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
    #[serde(rename = "開始オフセット", default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<i64>,
    #[serde(rename = "終了オフセット", default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<i64>,
}

impl FestivalRecord {
    /// The recurrence rule, if the record describes one.
    pub fn rule(&self) -> Option<FestivalRule> {
        match self.recurrence_type.as_deref() {
            Some(KIND_ABSOLUTE) => self.month_day.clone().map(FestivalRule::absolute),
            Some(KIND_RELATIVE) => Some(FestivalRule::Relative(RelativeRule::from_parts(
                self.month,
                self.week_of_month,
                self.weekday.as_deref().map(weekday_from_kanji),
                self.start_offset,
                self.end_offset,
            ))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn relative(month: u32, week: u32, weekday: Weekday, start: i64, end: i64) -> FestivalRule {
        FestivalRule::Relative(RelativeRule {
            month: Some(month),
            week_of_month: week,
            weekday,
            start_offset_days: start,
            end_offset_days: end,
        })
    }

    #[test]
    fn test_third_sunday_of_september_plus_monday() {
        // 2026-09-01 is a Tuesday.
        let rule = relative(9, 3, Weekday::Sun, 0, 1);
        let dates = rule.resolve(ymd(2026, 9, 15));
        assert_eq!(dates, vec![ymd(2026, 9, 20), ymd(2026, 9, 21)]);
    }

    #[test]
    fn test_first_weekday_on_the_first() {
        // 2026-11-01 is a Sunday.
        let rule = relative(11, 1, Weekday::Sun, 0, 0);
        assert_eq!(rule.resolve(ymd(2026, 11, 30)), vec![ymd(2026, 11, 1)]);
    }

    #[test]
    fn test_second_monday_of_january() {
        let rule = relative(1, 2, Weekday::Mon, 0, 0);
        assert_eq!(rule.resolve(ymd(2026, 1, 1)), vec![ymd(2026, 1, 12)]);
    }

    #[test]
    fn test_relative_other_month_is_empty() {
        let rule = relative(9, 3, Weekday::Sun, 0, 1);
        assert!(rule.resolve(ymd(2026, 10, 18)).is_empty());
    }

    #[test]
    fn test_negative_offsets_span_eve() {
        let rule = relative(9, 3, Weekday::Sun, -1, 0);
        assert_eq!(rule.resolve(ymd(2026, 9, 1)), vec![ymd(2026, 9, 19), ymd(2026, 9, 20)]);
    }

    #[test]
    fn test_fifth_week_overflows_into_next_month() {
        // February 2026 has four Fridays (6, 13, 20, 27).
        let rule = relative(2, 5, Weekday::Fri, 0, 0);
        assert_eq!(rule.resolve(ymd(2026, 2, 10)), vec![ymd(2026, 3, 6)]);
    }

    #[test]
    fn test_inverted_offsets_resolve_empty() {
        let rule = relative(9, 1, Weekday::Sun, 2, 0);
        assert!(rule.resolve(ymd(2026, 9, 1)).is_empty());
    }

    #[test]
    fn test_absolute_uses_reference_year() {
        let rule = FestivalRule::absolute("07-01");
        assert_eq!(rule.resolve(ymd(2031, 12, 31)), vec![ymd(2031, 7, 1)]);
        assert_eq!(rule.resolve(ymd(2024, 1, 1)), vec![ymd(2024, 7, 1)]);
    }

    #[test]
    fn test_absolute_invalid_day_is_empty() {
        assert!(FestivalRule::absolute("02-30").resolve(ymd(2026, 1, 1)).is_empty());
        assert!(FestivalRule::absolute("13-01").resolve(ymd(2026, 1, 1)).is_empty());
        assert!(FestivalRule::absolute("garbage").resolve(ymd(2026, 1, 1)).is_empty());
    }

    #[test]
    fn test_absolute_leap_day() {
        let rule = FestivalRule::absolute("02-29");
        assert_eq!(rule.resolve(ymd(2028, 5, 1)), vec![ymd(2028, 2, 29)]);
        assert!(rule.resolve(ymd(2026, 5, 1)).is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let rule = RelativeRule::from_parts(Some(11), None, None, None, None);
        assert_eq!(rule.week_of_month, 1);
        assert_eq!(rule.weekday, Weekday::Sun);
        assert_eq!(rule.start_offset_days, 0);
        assert_eq!(rule.end_offset_days, 0);
        let dates = FestivalRule::Relative(rule).resolve(ymd(2026, 11, 3));
        assert_eq!(dates, vec![ymd(2026, 11, 1)]);
    }

    #[test]
    fn test_missing_month_never_resolves() {
        let rule = FestivalRule::Relative(RelativeRule::from_parts(None, Some(2), None, None, None));
        assert!(rule.resolve(ymd(2026, 11, 3)).is_empty());
        assert_eq!(rule.stated_month(), None);
    }

    #[test]
    fn test_occurs_in_month() {
        let today = ymd(2026, 10, 18);
        let autumn = relative(9, 3, Weekday::Sun, 0, 1);
        assert!(autumn.occurs_in_month(9, today));
        assert!(!autumn.occurs_in_month(10, today));
        assert!(FestivalRule::absolute("07-01").occurs_in_month(7, today));
        // Stated month only; the day is not validated.
        assert!(FestivalRule::absolute("02-30").occurs_in_month(2, today));
        let overflow = relative(2, 5, Weekday::Fri, 0, 0);
        assert!(!overflow.occurs_in_month(2, today));
    }

    #[test]
    fn test_occurs_in_week() {
        // 2026-10-18 is a Sunday; its week starts Monday 10-12.
        let today = ymd(2026, 10, 18);
        assert_eq!(start_of_week(today), ymd(2026, 10, 12));
        assert!(FestivalRule::absolute("10-12").occurs_in_week_of(today));
        assert!(!FestivalRule::absolute("10-19").occurs_in_week_of(today));
        // Second Sunday of October 2026 is 10-11, the previous week.
        assert!(!relative(10, 2, Weekday::Sun, 0, 0).occurs_in_week_of(today));
        assert!(relative(10, 3, Weekday::Sun, 0, 0).occurs_in_week_of(today));
    }

    #[test]
    fn test_huge_offsets_do_not_panic() {
        let far = FestivalRule::Relative(RelativeRule::from_parts(
            Some(9),
            Some(3),
            None,
            Some(-200_000_000_000_000),
            Some(-200_000_000_000_000),
        ));
        assert!(far.resolve(ymd(2026, 9, 1)).is_empty());
        assert!(!far.occurs_in_month(9, ymd(2026, 10, 18)));
        assert!(!far.occurs_in_week_of(ymd(2026, 9, 20)));

        let extremes = relative(9, 3, Weekday::Sun, i64::MIN, i64::MAX);
        let dates = extremes.resolve(ymd(2026, 9, 1));
        assert_eq!(dates.len() as i64, 2 * MAX_OFFSET_DAYS + 1);
        assert_eq!(dates.first(), Some(&ymd(2025, 9, 19)));
        assert_eq!(dates.last(), Some(&ymd(2027, 9, 21)));
        assert!(extremes.occurs_in_month(9, ymd(2026, 10, 18)));
    }

    #[test]
    fn test_stored_record_with_huge_offset() {
        let rec = FestivalRecord {
            recurrence_type: Some(KIND_RELATIVE.into()),
            month: Some(9),
            start_offset: Some(200_000_000_000_000),
            end_offset: Some(200_000_000_000_000),
            ..Default::default()
        };
        let rule = rec.rule().unwrap();
        assert!(!rule.occurs_in_month(9, ymd(2026, 10, 18)));
        assert!(rule.resolve(ymd(2026, 9, 1)).is_empty());
    }

    #[test]
    fn test_week_zero_and_huge_week_have_no_dates() {
        assert!(relative(9, 0, Weekday::Sun, 0, 0).resolve(ymd(2026, 9, 1)).is_empty());
        assert!(relative(9, u32::MAX, Weekday::Sun, 0, 0).resolve(ymd(2026, 9, 1)).is_empty());
        assert!(!relative(9, 0, Weekday::Sun, 0, 0).occurs_in_month(9, ymd(2026, 10, 18)));
    }

    #[test]
    fn test_validate() {
        assert_eq!(RelativeRule::from_parts(Some(9), Some(3), None, Some(-1), Some(1)).validate(), Ok(()));
        assert_eq!(RelativeRule::from_parts(None, None, None, None, None).validate(), Ok(()));
        assert_eq!(RelativeRule::from_parts(Some(13), None, None, None, None).validate(), Err(RuleError::Month(13)));
        assert_eq!(RelativeRule::from_parts(Some(0), None, None, None, None).validate(), Err(RuleError::Month(0)));
        assert_eq!(RelativeRule::from_parts(Some(9), Some(0), None, None, None).validate(), Err(RuleError::Week(0)));
        assert_eq!(RelativeRule::from_parts(Some(9), Some(6), None, None, None).validate(), Err(RuleError::Week(6)));
        assert_eq!(
            RelativeRule::from_parts(Some(9), None, None, Some(i64::MIN), None).validate(),
            Err(RuleError::Offset(i64::MIN))
        );
        assert_eq!(
            RelativeRule::from_parts(Some(9), None, None, None, Some(MAX_OFFSET_DAYS + 1)).validate(),
            Err(RuleError::Offset(MAX_OFFSET_DAYS + 1))
        );
        assert_eq!(
            RelativeRule::from_parts(Some(9), None, None, Some(-MAX_OFFSET_DAYS), Some(MAX_OFFSET_DAYS)).validate(),
            Ok(())
        );
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_from_kanji("土"), Weekday::Sat);
        assert_eq!(weekday_from_kanji("水曜日"), Weekday::Wed);
        assert_eq!(weekday_from_kanji("?"), Weekday::Sun);
        assert_eq!(weekday_from_index(0), Some(Weekday::Sun));
        assert_eq!(weekday_from_index(6), Some(Weekday::Sat));
        assert_eq!(weekday_from_index(7), None);
    }

    #[test]
    fn test_record_to_rule() {
        let json = r#"{
            "名称": "例大祭",
            "日付区分": "相対日付",
            "開催月": 9,
            "開催月第何週": 3,
            "開催月何曜日": "日",
            "開始オフセット": 0,
            "終了オフセット": 1
        }"#;
        let rec: FestivalRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.rule(), Some(relative(9, 3, Weekday::Sun, 0, 1)));

        let abs = FestivalRecord {
            recurrence_type: Some(KIND_ABSOLUTE.into()),
            month_day: Some("07-01".into()),
            ..Default::default()
        };
        assert_eq!(abs.rule(), Some(FestivalRule::absolute("07-01")));

        let incomplete = FestivalRecord {
            recurrence_type: Some(KIND_ABSOLUTE.into()),
            ..Default::default()
        };
        assert_eq!(incomplete.rule(), None);
        assert_eq!(FestivalRecord::default().rule(), None);
    }
}
