//! Record shapes served by the shrine directory's record store.
//!
//! Field names follow the published dataset, which is keyed in Japanese.

use crate::festival::{FestivalRecord, FestivalRule};
use crate::geo::GeoPoint;
use crate::geohash;
use crate::merge::Identified;
use crate::ngram::{ngram, BIGRAM};
use serde::{Deserialize, Deserializer, Serialize};

pub const FIELD_GEOHASH: &str = "geohash";
pub const FIELD_NAME_BIGRAM: &str = "nameBigram";
pub const FIELD_ADDRESS_BIGRAM: &str = "addressBigram";

/// Precision of the geohash index entry computed for records that don't store one.
pub const INDEX_PRECISION: usize = geohash::DEFAULT_PRECISION;

/// A record that publishes index keys.
///
/// Every field in `INDEX_FIELDS` may hold several values per record
/// (n-gram fields do); a query condition matches if any value matches.
pub trait Indexed: Identified {
    const INDEX_FIELDS: &'static [&'static str];

    fn index_values(&self, field: &str) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deity {
    #[serde(rename = "名称")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShrineRecord {
    pub slug: String,
    #[serde(rename = "名称")]
    pub name: String,
    #[serde(rename = "住所", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "都道府県", default, skip_serializing_if = "Option::is_none")]
    pub prefecture: Option<String>,
    #[serde(rename = "区域", default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(rename = "緯度", default, deserialize_with = "lenient_number")]
    pub lat: Option<f64>,
    #[serde(rename = "経度", default, deserialize_with = "lenient_number")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geohash: Option<String>,
    #[serde(rename = "祭神", default)]
    pub deities: Vec<Deity>,
    #[serde(rename = "祭事", default)]
    pub festivals: Vec<FestivalRecord>,
}

impl ShrineRecord {
    /// Position on the map, if both coordinates parse and are in range.
    pub fn point(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.lat?, self.lon?)
    }

    pub fn festival_rules(&self) -> impl Iterator<Item = FestivalRule> + '_ {
        self.festivals.iter().filter_map(FestivalRecord::rule)
    }

    pub fn deity_names(&self) -> impl Iterator<Item = &str> {
        self.deities.iter().map(|d| d.name.as_str())
    }
}

impl Identified for ShrineRecord {
    fn id(&self) -> &str {
        &self.slug
    }
}

impl Indexed for ShrineRecord {
    const INDEX_FIELDS: &'static [&'static str] = &[FIELD_GEOHASH, FIELD_NAME_BIGRAM];

    fn index_values(&self, field: &str) -> Vec<String> {
        match field {
            FIELD_GEOHASH => match &self.geohash {
                Some(stored) => vec![stored.clone()],
                None => self
                    .point()
                    .and_then(|p| geohash::encode_point(p, INDEX_PRECISION).ok())
                    .into_iter()
                    .collect(),
            },
            FIELD_NAME_BIGRAM => ngram(&self.name, BIGRAM),
            _ => Vec::new(),
        }
    }
}

/// A municipality, used for place-name suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub geohash: String,
    #[serde(rename = "都道府県")]
    pub prefecture: String,
    #[serde(rename = "郡", default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(rename = "市区町村")]
    pub city: String,
}

impl CityRecord {
    /// Prefecture, county and municipality run together, e.g. `京都府京都市`.
    pub fn display_name(&self) -> String {
        format!("{}{}{}", self.prefecture, self.county.as_deref().unwrap_or(""), self.city)
    }

    /// Map link centred on the city.
    pub fn map_url(&self) -> String {
        format!("/s?g={}", self.geohash)
    }
}

impl Identified for CityRecord {
    fn id(&self) -> &str {
        &self.geohash
    }
}

impl Indexed for CityRecord {
    const INDEX_FIELDS: &'static [&'static str] = &[FIELD_ADDRESS_BIGRAM, FIELD_GEOHASH];

    fn index_values(&self, field: &str) -> Vec<String> {
        match field {
            FIELD_ADDRESS_BIGRAM => ngram(&self.display_name(), BIGRAM),
            FIELD_GEOHASH => vec![self.geohash.clone()],
            _ => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Coordinates arrive as numbers or numeric strings; anything else is absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(match raw {
        Some(NumberOrText::Number(n)) => Some(n),
        Some(NumberOrText::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
