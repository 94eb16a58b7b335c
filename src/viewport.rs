//! The visible, filtered, name-sorted slice of the accumulated records.

use crate::festival::FestivalRule;
use crate::geo::BoundingBox;
use crate::record::ShrineRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Categorical filter applied after the viewport test.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    None,
    /// Festivals held in this month (1..=12) of the current year.
    Month(u32),
    /// Enshrines a deity with exactly this name.
    Deity(String),
    /// Festivals with a day in the current Monday-start week.
    ThisWeek,
}

impl CategoryFilter {
    pub fn matches(&self, record: &ShrineRecord, today: NaiveDate) -> bool {
        match self {
            Self::None => true,
            Self::Month(month) => record.festival_rules().any(|r| r.occurs_in_month(*month, today)),
            Self::Deity(name) => record.deity_names().any(|d| d == name),
            Self::ThisWeek => record.festival_rules().any(|r| r.occurs_in_week_of(today)),
        }
    }
}

/// Records inside `bbox` (inclusive) that pass `category`, sorted by name.
///
/// Records without a usable position are never visible. The input is not
/// modified; call again whenever the viewport, filter or records change.
pub fn filter<'a>(
    records: &'a [ShrineRecord],
    bbox: &BoundingBox,
    category: &CategoryFilter,
    today: NaiveDate,
) -> Vec<&'a ShrineRecord> {
    let mut visible: Vec<&ShrineRecord> = records
        .iter()
        .filter(|r| r.point().is_some_and(|p| bbox.contains(p)))
        .filter(|r| category.matches(r, today))
        .collect();
    visible.sort_by(|a, b| collate(&a.name, &b.name));
    visible
}

/// Distinct festival months named by `records`, ascending.
pub fn festival_months<'a>(records: impl IntoIterator<Item = &'a ShrineRecord>) -> Vec<u32> {
    records
        .into_iter()
        .flat_map(|r| r.festival_rules())
        .filter_map(|rule: FestivalRule| rule.stated_month())
        .filter(|m| (1..=12).contains(m))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct deity names enshrined by `records`, in collation order.
pub fn deity_names<'a>(records: impl IntoIterator<Item = &'a ShrineRecord>) -> Vec<String> {
    let mut names: Vec<String> = records
        .into_iter()
        .flat_map(|r| r.deity_names())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    names.sort_by(|a, b| collate(a, b));
    names
}

/// Display-name ordering for Japanese text.
///
/// Primary comparison folds katakana onto hiragana, full-width ASCII onto
/// ASCII, and case; ties fall back to code point order so the result is total.
pub fn collate(a: &str, b: &str) -> Ordering {
    let primary = a.chars().flat_map(fold).cmp(b.chars().flat_map(fold));
    primary.then_with(|| a.cmp(b))
}

fn fold(c: char) -> std::char::ToLowercase {
    let folded = match c {
        'ァ'..='ヶ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        '！'..='～' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    };
    folded.to_lowercase()
}
