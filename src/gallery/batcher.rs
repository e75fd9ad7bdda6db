use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::UtcOffset;

use super::grouping::{BucketSummary, DateBuckets, DateKey};
use super::model::{Item, ItemId, PendingItem};
use super::render::RenderState;

/// Everything a source knows about, fetched once per reload.
#[derive(Debug, Clone)]
pub enum Listing {
    /// Items already resolved and grouped by date (backend and fixture sources).
    Grouped(DateBuckets),
    /// Images whose metadata still has to be fetched one by one (cloud storage).
    Flat(Vec<PendingItem>),
}

impl Listing {
    pub fn total_items(&self) -> usize {
        match self {
            Listing::Grouped(buckets) => buckets.item_count(),
            Listing::Flat(pending) => pending.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    fn default_mode(&self) -> BatchMode {
        match self {
            Listing::Grouped(_) => BatchMode::ByDate,
            Listing::Flat(_) => BatchMode::ByItem,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BatchMode {
    /// By date for grouped listings, by item for flat ones.
    #[default]
    Auto,
    ByDate,
    ByItem,
}

/// One date's worth of not-yet-rendered items.
#[derive(Debug, Clone)]
pub struct BatchSection {
    pub key: DateKey,
    pub summary: BucketSummary,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum BatchPlan {
    /// Sections ready to hand to the renderer.
    Ready(Vec<BatchSection>),
    /// Items that need a detail lookup before they can be rendered.
    NeedsDetail(Vec<PendingItem>),
    /// Nothing left to render.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    batch_size: usize,
    mode: BatchMode,
}

impl Batcher {
    pub fn new(batch_size: usize, mode: BatchMode) -> Self {
        Self {
            batch_size: batch_size.max(1),
            mode,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn effective_mode(&self, listing: &Listing) -> BatchMode {
        match self.mode {
            BatchMode::Auto => listing.default_mode(),
            mode => mode,
        }
    }

    /// Picks the next slice of unsettled items, preserving source order.
    pub fn next_batch(&self, listing: &Listing, state: &RenderState, offset: UtcOffset) -> BatchPlan {
        let mode = self.effective_mode(listing);
        let plan = match listing {
            Listing::Grouped(buckets) => {
                let sections = match mode {
                    BatchMode::ByItem => self.grouped_by_item(buckets, state),
                    _ => self.grouped_by_date(buckets, state),
                };
                if sections.is_empty() {
                    BatchPlan::Exhausted
                } else {
                    BatchPlan::Ready(sections)
                }
            }
            Listing::Flat(pending) => {
                let picked = match mode {
                    BatchMode::ByDate => self.flat_by_date(pending, state, offset),
                    _ => pending
                        .iter()
                        .filter(|p| !state.is_settled(&p.id))
                        .take(self.batch_size)
                        .cloned()
                        .collect::<Vec<_>>(),
                };
                if picked.is_empty() {
                    BatchPlan::Exhausted
                } else {
                    BatchPlan::NeedsDetail(picked)
                }
            }
        };
        tracing::debug!(
            ?mode,
            batch_size = self.batch_size,
            remaining = state.remaining(listing.total_items()),
            "planned next batch"
        );
        plan
    }

    fn grouped_by_date(&self, buckets: &DateBuckets, state: &RenderState) -> Vec<BatchSection> {
        buckets
            .iter()
            .filter_map(|(key, bucket)| {
                let items: Vec<Item> = bucket
                    .items()
                    .iter()
                    .filter(|item| !state.is_settled(&item.id))
                    .cloned()
                    .collect();
                (!items.is_empty()).then(|| BatchSection {
                    key: *key,
                    summary: bucket.summary(),
                    items,
                })
            })
            .take(self.batch_size)
            .collect()
    }

    fn grouped_by_item(&self, buckets: &DateBuckets, state: &RenderState) -> Vec<BatchSection> {
        let mut budget = self.batch_size;
        let mut sections = Vec::new();
        for (key, bucket) in buckets.iter() {
            if budget == 0 {
                break;
            }
            let items: Vec<Item> = bucket
                .items()
                .iter()
                .filter(|item| !state.is_settled(&item.id))
                .take(budget)
                .cloned()
                .collect();
            if items.is_empty() {
                continue;
            }
            budget -= items.len();
            sections.push(BatchSection {
                key: *key,
                summary: bucket.summary(),
                items,
            });
        }
        sections
    }

    fn flat_by_date(
        &self,
        pending: &[PendingItem],
        state: &RenderState,
        offset: UtcOffset,
    ) -> Vec<PendingItem> {
        let mut by_date: IndexMap<Option<DateKey>, Vec<PendingItem>> = IndexMap::new();
        for entry in pending.iter().filter(|p| !state.is_settled(&p.id)) {
            let key = DateKey::from_unix_millis(entry.captured_millis, offset);
            by_date.entry(key).or_default().push(entry.clone());
        }
        by_date
            .into_values()
            .take(self.batch_size)
            .flatten()
            .collect()
    }
}

/// Groups freshly resolved items into the session's running buckets and
/// returns one section per touched date, in order of first appearance.
/// Items that cannot be dated are handed back as unresolved.
pub fn assemble_sections(
    buckets: &mut DateBuckets,
    items: Vec<Item>,
    offset: UtcOffset,
) -> (Vec<BatchSection>, Vec<ItemId>) {
    let mut touched: IndexMap<DateKey, Vec<Item>> = IndexMap::new();
    let mut undated = Vec::new();
    for item in items {
        let copy = item.clone();
        match buckets.group_item(item, offset) {
            Some(key) => touched.entry(key).or_default().push(copy),
            None => {
                tracing::warn!(item = %copy.id, "resolved item has no capture time; skipping");
                undated.push(copy.id);
            }
        }
    }
    let sections = touched
        .into_iter()
        .map(|(key, items)| BatchSection {
            key,
            summary: buckets.get(&key).map(|b| b.summary()).unwrap_or_default(),
            items,
        })
        .collect();
    (sections, undated)
}
