use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a gallery item, unique within one source listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A numeric field as it arrived on the wire. Sources send numbers either as
/// JSON numbers or as strings, and the raw form is what gets displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
    Number(f64),
    Text(String),
}

impl Measure {
    /// Parsed numeric value, `None` when the field is not a finite number.
    pub fn value(&self) -> Option<f64> {
        let parsed = match self {
            Measure::Number(n) => Some(*n),
            Measure::Text(raw) => raw.trim().parse::<f64>().ok(),
        };
        parsed.filter(|v| v.is_finite())
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Measure::Number(n) => write!(f, "{n}"),
            Measure::Text(raw) => f.write_str(raw),
        }
    }
}

impl From<f64> for Measure {
    fn from(value: f64) -> Self {
        Measure::Number(value)
    }
}

impl From<&str> for Measure {
    fn from(value: &str) -> Self {
        Measure::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutritionInfo {
    pub food_identified: String,
    pub total_weight_grams: Option<Measure>,
    pub food_weight_grams: Option<Measure>,
    pub calories: Option<Measure>,
    pub carbs: Option<Measure>,
    pub protein: Option<Measure>,
    pub fat: Option<Measure>,
}

impl NutritionInfo {
    pub fn calories_kcal(&self) -> Option<f64> {
        self.calories.as_ref().and_then(Measure::value)
    }
}

/// Where a card's image can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub uri: String,
}

impl Thumbnail {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl fmt::Display for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// One food photo and its analysis. Immutable once received from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub captured_at: Option<OffsetDateTime>,
    pub weight_grams: Option<Measure>,
    pub nutrition: Option<NutritionInfo>,
    pub thumbnail: Thumbnail,
}

impl Item {
    pub fn calories_kcal(&self) -> Option<f64> {
        self.nutrition.as_ref().and_then(NutritionInfo::calories_kcal)
    }
}

/// An image known from a flat listing whose metadata has not been fetched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub id: ItemId,
    pub name: String,
    /// Capture time in unix milliseconds, recovered from the file name.
    pub captured_millis: i64,
    /// Source-specific handle to the metadata document, if one was found.
    pub detail_ref: Option<String>,
}
