use std::fmt;

use indexmap::IndexMap;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use super::model::Item;

const DATE_KEY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Calendar date a bucket is keyed by, in the viewer's local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateKey(Date);

impl DateKey {
    pub fn new(date: Date) -> Self {
        Self(date)
    }

    pub fn from_timestamp(timestamp: OffsetDateTime, offset: UtcOffset) -> Self {
        Self(timestamp.to_offset(offset).date())
    }

    pub fn from_unix_millis(millis: i64, offset: UtcOffset) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .ok()
            .map(|ts| Self::from_timestamp(ts, offset))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Date::parse(raw.trim(), DATE_KEY_FORMAT).ok().map(Self)
    }

    pub fn date(&self) -> Date {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(DATE_KEY_FORMAT) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BucketSummary {
    pub total_calories: f64,
    pub valid_items: usize,
}

impl BucketSummary {
    pub fn rounded_calories(&self) -> i64 {
        self.total_calories.round() as i64
    }
}

/// Items captured on one date plus the running calorie aggregate.
#[derive(Debug, Clone, Default)]
pub struct DateBucket {
    items: Vec<Item>,
    summary: BucketSummary,
}

impl DateBucket {
    /// Appends an item. Only items carrying a parseable calorie value count
    /// towards the total.
    pub fn push(&mut self, item: Item) {
        if let Some(kcal) = item.calories_kcal() {
            self.summary.total_calories += kcal;
            self.summary.valid_items += 1;
        }
        self.items.push(item);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn summary(&self) -> BucketSummary {
        self.summary
    }
}

/// Date buckets in source order.
#[derive(Debug, Clone, Default)]
pub struct DateBuckets {
    buckets: IndexMap<DateKey, DateBucket>,
}

impl DateBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files an item under the local date of its capture time. Returns the key
    /// it landed under, or `None` when the item has no timestamp to group by.
    pub fn group_item(&mut self, item: Item, offset: UtcOffset) -> Option<DateKey> {
        let key = DateKey::from_timestamp(item.captured_at?, offset);
        self.insert_at(key, item);
        Some(key)
    }

    /// Files an item under a key the source already decided on.
    pub fn insert_at(&mut self, key: DateKey, item: Item) {
        self.buckets.entry(key).or_default().push(item);
    }

    pub fn get(&self, key: &DateKey) -> Option<&DateBucket> {
        self.buckets.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateKey, &DateBucket)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.buckets.values().map(DateBucket::len).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
