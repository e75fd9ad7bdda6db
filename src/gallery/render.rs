use std::collections::HashSet;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::UtcOffset;

use super::grouping::{BucketSummary, DateKey};
use super::model::{Item, ItemId, Measure, Thumbnail};

const CARD_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone, PartialEq)]
pub struct SectionHeader {
    pub key: DateKey,
    pub summary: BucketSummary,
}

impl SectionHeader {
    pub fn calorie_label(&self) -> String {
        format!(
            "Total Calories: {} kcal ({} items)",
            self.summary.rounded_calories(),
            self.summary.valid_items
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardDetails {
    Nutrition {
        food: String,
        total_weight: String,
        food_weight: String,
        calories: String,
        carbs: String,
        protein: String,
        fat: String,
    },
    Weight(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemCard {
    pub id: ItemId,
    pub name: String,
    pub thumbnail: Thumbnail,
    pub captured_label: String,
    pub details: CardDetails,
}

impl ItemCard {
    pub fn from_item(item: &Item, offset: UtcOffset) -> Self {
        let captured_label = item
            .captured_at
            .and_then(|ts| ts.to_offset(offset).format(CARD_TIME_FORMAT).ok())
            .unwrap_or_else(|| "unknown".to_string());
        let details = match &item.nutrition {
            Some(info) => CardDetails::Nutrition {
                food: info.food_identified.clone(),
                total_weight: measure_label(info.total_weight_grams.as_ref(), "g"),
                food_weight: measure_label(info.food_weight_grams.as_ref(), "g"),
                calories: measure_label(info.calories.as_ref(), " kcal"),
                carbs: measure_label(info.carbs.as_ref(), "g"),
                protein: measure_label(info.protein.as_ref(), "g"),
                fat: measure_label(info.fat.as_ref(), "g"),
            },
            None => CardDetails::Weight(measure_label(item.weight_grams.as_ref(), "g")),
        };
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            thumbnail: item.thumbnail.clone(),
            captured_label,
            details,
        }
    }
}

/// The unit is only attached to values that are present.
fn measure_label(value: Option<&Measure>, unit: &str) -> String {
    match value {
        Some(measure) => format!("{measure}{unit}"),
        None => "n/a".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMoreControl {
    pub remaining: usize,
    pub enabled: bool,
}

impl LoadMoreControl {
    pub fn ready(remaining: usize) -> Self {
        Self {
            remaining,
            enabled: true,
        }
    }

    pub fn loading(remaining: usize) -> Self {
        Self {
            remaining,
            enabled: false,
        }
    }

    pub fn label(&self) -> String {
        if self.enabled {
            format!("Load More ({} items remaining)", self.remaining)
        } else {
            "Loading...".to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Loading,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn loading(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Loading,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Surface the gallery paints into. Sections are addressed by their position
/// in display order.
pub trait DisplayTree {
    fn section_keys(&self) -> Vec<DateKey>;
    fn insert_section(&mut self, index: usize, header: SectionHeader);
    fn update_section_summary(&mut self, index: usize, summary: BucketSummary);
    fn append_card(&mut self, index: usize, card: ItemCard);
    fn show_control(&mut self, control: LoadMoreControl);
    fn remove_control(&mut self);
    fn append_notice(&mut self, notice: Notice);
    /// Drops every section, notice and control; shows `placeholder` instead.
    fn replace_content(&mut self, placeholder: Option<Notice>);
}

/// Dedup guard and single-flight flag for one gallery lifetime.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    processed: HashSet<ItemId>,
    unresolved: HashSet<ItemId>,
    busy: bool,
}

impl RenderState {
    pub fn is_processed(&self, id: &ItemId) -> bool {
        self.processed.contains(id)
    }

    /// Rendered, or known to be unrenderable for this listing.
    pub fn is_settled(&self, id: &ItemId) -> bool {
        self.processed.contains(id) || self.unresolved.contains(id)
    }

    /// Returns false when the id was already present.
    pub fn mark_processed(&mut self, id: ItemId) -> bool {
        self.processed.insert(id)
    }

    pub fn mark_unresolved(&mut self, id: ItemId) {
        if !self.processed.contains(&id) {
            self.unresolved.insert(id);
        }
    }

    pub fn rendered_count(&self) -> usize {
        self.processed.len()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    /// Items of the listing that are neither rendered nor dropped.
    pub fn remaining(&self, listing_total: usize) -> usize {
        listing_total
            .saturating_sub(self.unresolved.len())
            .saturating_sub(self.processed.len())
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn reset(&mut self) {
        self.processed.clear();
        self.unresolved.clear();
        self.busy = false;
    }
}

/// Index of the first section dated earlier than `key`; sections are kept in
/// descending order so everything before that index is newer.
pub fn insertion_index(keys: &[DateKey], key: DateKey) -> usize {
    keys.iter().position(|existing| *existing < key).unwrap_or(keys.len())
}

pub fn is_descending(keys: &[DateKey]) -> bool {
    keys.windows(2).all(|pair| pair[0] > pair[1])
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    offset: UtcOffset,
}

impl Renderer {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Paints the items of one date, skipping anything already on screen.
    /// Returns the number of cards created.
    pub fn render_date_section<D>(
        &self,
        view: &mut D,
        state: &mut RenderState,
        key: DateKey,
        summary: BucketSummary,
        items: &[Item],
    ) -> usize
    where
        D: DisplayTree + ?Sized,
    {
        let index = self.locate_section(view, key, summary);
        let mut created = 0;
        for item in items {
            if state.is_processed(&item.id) {
                continue;
            }
            view.append_card(index, ItemCard::from_item(item, self.offset));
            state.mark_processed(item.id.clone());
            created += 1;
        }
        tracing::trace!(date = %key, created, "rendered date section");
        created
    }

    fn locate_section<D>(&self, view: &mut D, key: DateKey, summary: BucketSummary) -> usize
    where
        D: DisplayTree + ?Sized,
    {
        let keys = view.section_keys();
        debug_assert!(is_descending(&keys), "date sections out of order: {keys:?}");
        if let Some(index) = keys.iter().position(|existing| *existing == key) {
            view.update_section_summary(index, summary);
            return index;
        }
        let index = insertion_index(&keys, key);
        view.insert_section(index, SectionHeader { key, summary });
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::model::NutritionInfo;
    use crate::gallery::view::GalleryView;
    use time::macros::datetime;

    fn key(day: u8) -> DateKey {
        DateKey::new(
            time::Date::from_calendar_date(2024, time::Month::May, day).expect("valid date"),
        )
    }

    fn item(id: &str) -> Item {
        Item {
            id: ItemId::new(id),
            name: format!("{id}.jpg"),
            captured_at: Some(datetime!(2024-05-03 12:15:30 UTC)),
            weight_grams: Some(Measure::from(180.0)),
            nutrition: None,
            thumbnail: Thumbnail::new(format!("thumb:{id}")),
        }
    }

    #[test]
    fn insertion_index_places_new_dates_between_neighbours() {
        let keys = vec![key(9), key(5), key(2)];
        assert_eq!(insertion_index(&keys, key(10)), 0);
        assert_eq!(insertion_index(&keys, key(7)), 1);
        assert_eq!(insertion_index(&keys, key(3)), 2);
        assert_eq!(insertion_index(&keys, key(1)), 3);
        assert_eq!(insertion_index(&[], key(1)), 0);
    }

    #[test]
    fn sections_stay_descending_for_any_insertion_order() {
        let orders: [[u8; 5]; 4] = [
            [1, 2, 3, 4, 5],
            [5, 4, 3, 2, 1],
            [3, 1, 5, 2, 4],
            [2, 5, 1, 4, 3],
        ];
        for order in orders {
            let renderer = Renderer::new(UtcOffset::UTC);
            let mut view = GalleryView::default();
            let mut state = RenderState::default();
            for day in order {
                let id = format!("item-{day}");
                renderer.render_date_section(
                    &mut view,
                    &mut state,
                    key(day),
                    BucketSummary::default(),
                    &[item(&id)],
                );
            }
            let keys = view.section_keys();
            assert!(is_descending(&keys), "order {order:?} produced {keys:?}");
            assert_eq!(keys.len(), 5);
        }
    }

    #[test]
    fn rendering_twice_creates_no_duplicates() {
        let renderer = Renderer::new(UtcOffset::UTC);
        let mut view = GalleryView::default();
        let mut state = RenderState::default();
        let items = vec![item("a"), item("b")];
        let summary = BucketSummary::default();
        assert_eq!(
            renderer.render_date_section(&mut view, &mut state, key(3), summary, &items),
            2
        );
        assert_eq!(
            renderer.render_date_section(&mut view, &mut state, key(3), summary, &items),
            0
        );
        assert_eq!(view.card_count(), 2);
        assert_eq!(view.section_keys(), vec![key(3)]);
    }

    #[test]
    fn existing_section_receives_updated_summary() {
        let renderer = Renderer::new(UtcOffset::UTC);
        let mut view = GalleryView::default();
        let mut state = RenderState::default();
        let first = BucketSummary {
            total_calories: 100.0,
            valid_items: 1,
        };
        let second = BucketSummary {
            total_calories: 300.0,
            valid_items: 2,
        };
        renderer.render_date_section(&mut view, &mut state, key(3), first, &[item("a")]);
        renderer.render_date_section(&mut view, &mut state, key(3), second, &[item("b")]);
        let section = &view.sections()[0];
        assert_eq!(section.header.summary, second);
        assert_eq!(section.cards.len(), 2);
    }

    #[test]
    fn card_shows_nutrition_or_raw_weight() {
        let plain = ItemCard::from_item(&item("a"), UtcOffset::UTC);
        assert_eq!(plain.captured_label, "2024-05-03 12:15:30");
        assert_eq!(plain.details, CardDetails::Weight("180g".into()));

        let mut analysed = item("b");
        analysed.nutrition = Some(NutritionInfo {
            food_identified: "Oat porridge".into(),
            calories: Some(Measure::from("abc")),
            carbs: Some(Measure::from(40.0)),
            ..NutritionInfo::default()
        });
        let card = ItemCard::from_item(&analysed, UtcOffset::UTC);
        match card.details {
            CardDetails::Nutrition {
                food,
                calories,
                carbs,
                fat,
                ..
            } => {
                assert_eq!(food, "Oat porridge");
                assert_eq!(calories, "abc kcal");
                assert_eq!(carbs, "40g");
                assert_eq!(fat, "n/a");
            }
            other => panic!("expected nutrition details, got {other:?}"),
        }
    }

    #[test]
    fn remaining_excludes_rendered_and_unresolved() {
        let mut state = RenderState::default();
        state.mark_processed(ItemId::new("a"));
        state.mark_unresolved(ItemId::new("b"));
        state.mark_unresolved(ItemId::new("a"));
        assert_eq!(state.remaining(5), 3);
        assert_eq!(state.unresolved_count(), 1);
    }
}
