//! JSON shapes spoken by the backend API, the fixture file and the Drive
//! metadata documents.

use indexmap::IndexMap;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::SourceError;
use crate::gallery::{
    DateBuckets, DateKey, Item, ItemId, Listing, Measure, NutritionInfo, PendingItem, Thumbnail,
};

const NAIVE_T_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);
const NAIVE_SPACE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// Epoch seconds or milliseconds, RFC 3339, or a naive local date-time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Number(f64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_datetime(&self, offset: UtcOffset) -> Option<OffsetDateTime> {
        match self {
            WireTimestamp::Number(value) => from_epoch(*value),
            WireTimestamp::Text(raw) => {
                let raw = raw.trim();
                if let Ok(value) = raw.parse::<f64>() {
                    return from_epoch(value);
                }
                if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
                    return Some(parsed);
                }
                PrimitiveDateTime::parse(raw, NAIVE_T_FORMAT)
                    .or_else(|_| PrimitiveDateTime::parse(raw, NAIVE_SPACE_FORMAT))
                    .ok()
                    .map(|naive| naive.assume_offset(offset))
            }
        }
    }
}

/// Values this large can only be milliseconds; seconds would be past year 5000.
fn from_epoch(value: f64) -> Option<OffsetDateTime> {
    if !value.is_finite() {
        return None;
    }
    let nanos = if value.abs() >= 1e11 {
        value * 1e6
    } else {
        value * 1e9
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).ok()
}

pub fn datetime_from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryDocument {
    #[serde(default)]
    pub dates: IndexMap<String, WireDateGroup>,
    pub total_images: Option<usize>,
    pub error: Option<String>,
}

/// One date group. The server's own totals are not trusted; they are
/// recomputed from the items.
#[derive(Debug, Deserialize)]
pub struct WireDateGroup {
    #[serde(default)]
    pub data: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    pub id: String,
    pub name: Option<String>,
    pub timestamp: Option<WireTimestamp>,
    pub weight_grams: Option<Measure>,
    pub nutritional_info: Option<WireNutrition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNutrition {
    pub total_weight_grams: Option<Measure>,
    pub food_weight_grams: Option<Measure>,
    pub food_identified: Option<String>,
    pub calories: Option<Measure>,
    pub carbs: Option<Measure>,
    pub protein: Option<Measure>,
    pub fat: Option<Measure>,
}

impl WireItem {
    fn into_item(self, offset: UtcOffset, thumbnail: &ThumbnailFn<'_>) -> Item {
        let captured_at = self.timestamp.and_then(|ts| ts.to_datetime(offset));
        let thumbnail = thumbnail(&self.id, captured_at);
        Item {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: ItemId::new(self.id),
            captured_at,
            weight_grams: self.weight_grams,
            nutrition: self.nutritional_info.map(|info| NutritionInfo {
                food_identified: info.food_identified.unwrap_or_default(),
                total_weight_grams: info.total_weight_grams,
                food_weight_grams: info.food_weight_grams,
                calories: info.calories,
                carbs: info.carbs,
                protein: info.protein,
                fat: info.fat,
            }),
            thumbnail,
        }
    }
}

/// Builds the thumbnail reference for an item id and its capture time.
pub type ThumbnailFn<'a> = dyn Fn(&str, Option<OffsetDateTime>) -> Thumbnail + 'a;

/// Turns a gallery-data document into a grouped listing. Groups whose date
/// key does not parse are skipped.
pub fn listing_from_document(
    doc: GalleryDocument,
    offset: UtcOffset,
    thumbnail: &ThumbnailFn<'_>,
) -> Result<Listing, SourceError> {
    if let Some(message) = doc.error {
        return Err(SourceError::Backend(message));
    }
    let mut buckets = DateBuckets::new();
    for (raw_key, group) in doc.dates {
        let Some(key) = DateKey::parse(&raw_key) else {
            tracing::warn!(date = %raw_key, items = group.data.len(), "skipping group with malformed date");
            continue;
        };
        for wire in group.data {
            buckets.insert_at(key, wire.into_item(offset, thumbnail));
        }
    }
    tracing::debug!(
        dates = buckets.len(),
        items = buckets.item_count(),
        reported_images = ?doc.total_images,
        "decoded gallery document"
    );
    Ok(Listing::Grouped(buckets))
}

#[derive(Debug, Deserialize)]
pub struct DriveMetadata {
    pub timestamp: Option<WireTimestamp>,
    pub weight_grams: Option<Measure>,
    pub nutritional_info: Option<DriveNutrition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriveNutrition {
    #[serde(rename = "calories (kcal)")]
    pub calories: Option<Measure>,
    #[serde(rename = "carbohydrates (g)")]
    pub carbs: Option<Measure>,
    #[serde(rename = "protein (g)")]
    pub protein: Option<Measure>,
    #[serde(rename = "fat (g)")]
    pub fat: Option<Measure>,
    pub total_weight_grams: Option<Measure>,
    pub food_weight_grams: Option<Measure>,
    pub food_identified_short: Option<String>,
}

impl DriveNutrition {
    fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.carbs.is_none()
            && self.protein.is_none()
            && self.fat.is_none()
            && self.total_weight_grams.is_none()
            && self.food_weight_grams.is_none()
            && self.food_identified_short.is_none()
    }
}

/// Builds an item from an analysis/metadata document. The capture time comes
/// from the image name, which is also what the date key is derived from.
/// Missing macro values default to zero and missing weights fall back to the
/// raw scale reading.
pub fn item_from_drive_metadata(pending: &PendingItem, meta: DriveMetadata, thumbnail: Thumbnail) -> Item {
    let zero = || Measure::Number(0.0);
    let weight = meta.weight_grams;
    let nutrition = meta
        .nutritional_info
        .filter(|info| !info.is_empty())
        .map(|info| NutritionInfo {
            food_identified: info.food_identified_short.unwrap_or_default(),
            total_weight_grams: info.total_weight_grams.or_else(|| weight.clone()),
            food_weight_grams: info.food_weight_grams.or_else(|| weight.clone()),
            calories: Some(info.calories.unwrap_or_else(zero)),
            carbs: Some(info.carbs.unwrap_or_else(zero)),
            protein: Some(info.protein.unwrap_or_else(zero)),
            fat: Some(info.fat.unwrap_or_else(zero)),
        });
    Item {
        id: pending.id.clone(),
        name: pending.name.clone(),
        captured_at: datetime_from_millis(pending.captured_millis),
        weight_grams: weight,
        nutrition,
        thumbnail,
    }
}
