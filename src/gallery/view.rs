use std::fmt::Write as _;

use super::grouping::{BucketSummary, DateKey};
use super::model::ItemId;
use super::render::{
    CardDetails, DisplayTree, ItemCard, LoadMoreControl, Notice, NoticeKind, SectionHeader,
};

#[derive(Debug, Clone)]
pub struct SectionNode {
    pub header: SectionHeader,
    pub cards: Vec<ItemCard>,
}

/// In-memory display tree shared by the terminal UI and the plain-text
/// commands.
#[derive(Debug, Clone, Default)]
pub struct GalleryView {
    placeholder: Option<Notice>,
    sections: Vec<SectionNode>,
    notices: Vec<Notice>,
    control: Option<LoadMoreControl>,
}

/// Flattened, top-to-bottom view of the tree for list-style drawing.
#[derive(Debug, Clone, Copy)]
pub enum ViewRow<'a> {
    Placeholder(&'a Notice),
    Header(&'a SectionHeader),
    Card(&'a ItemCard),
    Notice(&'a Notice),
    Control(&'a LoadMoreControl),
}

impl GalleryView {
    pub fn sections(&self) -> &[SectionNode] {
        &self.sections
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn control(&self) -> Option<&LoadMoreControl> {
        self.control.as_ref()
    }

    pub fn placeholder(&self) -> Option<&Notice> {
        self.placeholder.as_ref()
    }

    pub fn card_count(&self) -> usize {
        self.sections.iter().map(|s| s.cards.len()).sum()
    }

    pub fn card_ids(&self) -> Vec<&ItemId> {
        self.sections
            .iter()
            .flat_map(|s| s.cards.iter().map(|card| &card.id))
            .collect()
    }

    pub fn rows(&self) -> Vec<ViewRow<'_>> {
        let mut rows = Vec::with_capacity(self.card_count() + self.sections.len() + 2);
        if let Some(placeholder) = &self.placeholder {
            rows.push(ViewRow::Placeholder(placeholder));
        }
        for section in &self.sections {
            rows.push(ViewRow::Header(&section.header));
            rows.extend(section.cards.iter().map(ViewRow::Card));
        }
        rows.extend(self.notices.iter().map(ViewRow::Notice));
        if let Some(control) = &self.control {
            rows.push(ViewRow::Control(control));
        }
        rows
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for row in self.rows() {
            match row {
                ViewRow::Placeholder(notice) | ViewRow::Notice(notice) => {
                    let marker = match notice.kind {
                        NoticeKind::Loading => "...",
                        NoticeKind::Error => "!",
                    };
                    let _ = writeln!(out, "{marker} {}", notice.message);
                }
                ViewRow::Header(header) => {
                    let _ = writeln!(out, "== {} | {}", header.key, header.calorie_label());
                }
                ViewRow::Card(card) => {
                    for line in card_lines(card) {
                        let _ = writeln!(out, "{line}");
                    }
                }
                ViewRow::Control(control) => {
                    let _ = writeln!(out, "[ {} ]", control.label());
                }
            }
        }
        out
    }
}

/// Text lines of one card, first line unindented.
pub fn card_lines(card: &ItemCard) -> Vec<String> {
    let mut lines = vec![
        format!("- {} <{}>", card.name, card.thumbnail),
        format!("  Time: {}", card.captured_label),
    ];
    match &card.details {
        CardDetails::Nutrition {
            food,
            total_weight,
            food_weight,
            calories,
            carbs,
            protein,
            fat,
        } => {
            lines.push(format!(
                "  Total Weight: {total_weight} | Food Weight: {food_weight}"
            ));
            if !food.is_empty() {
                lines.push(format!("  {food}"));
            }
            lines.push(format!(
                "  Calories: {calories} | Carbs: {carbs} | Protein: {protein} | Fat: {fat}"
            ));
        }
        CardDetails::Weight(weight) => lines.push(format!("  Weight: {weight}")),
    }
    lines
}

impl DisplayTree for GalleryView {
    fn section_keys(&self) -> Vec<DateKey> {
        self.sections.iter().map(|s| s.header.key).collect()
    }

    fn insert_section(&mut self, index: usize, header: SectionHeader) {
        let index = index.min(self.sections.len());
        self.placeholder = None;
        self.sections.insert(
            index,
            SectionNode {
                header,
                cards: Vec::new(),
            },
        );
    }

    fn update_section_summary(&mut self, index: usize, summary: BucketSummary) {
        if let Some(section) = self.sections.get_mut(index) {
            section.header.summary = summary;
        }
    }

    fn append_card(&mut self, index: usize, card: ItemCard) {
        match self.sections.get_mut(index) {
            Some(section) => section.cards.push(card),
            None => tracing::warn!(index, card = %card.id, "card for unknown section dropped"),
        }
    }

    fn show_control(&mut self, control: LoadMoreControl) {
        self.control = Some(control);
    }

    fn remove_control(&mut self) {
        self.control = None;
    }

    fn append_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn replace_content(&mut self, placeholder: Option<Notice>) {
        self.sections.clear();
        self.notices.clear();
        self.control = None;
        self.placeholder = placeholder;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::model::Thumbnail;
    use time::macros::date;

    fn card(id: &str, details: CardDetails) -> ItemCard {
        ItemCard {
            id: ItemId::new(id),
            name: format!("{id}.jpg"),
            thumbnail: Thumbnail::new(format!("thumb:{id}")),
            captured_label: "2024-05-03 12:00:00".into(),
            details,
        }
    }

    #[test]
    fn plain_text_layout() {
        let mut view = GalleryView::default();
        view.insert_section(
            0,
            SectionHeader {
                key: DateKey::new(date!(2024 - 05 - 03)),
                summary: BucketSummary {
                    total_calories: 299.6,
                    valid_items: 2,
                },
            },
        );
        view.append_card(0, card("a", CardDetails::Weight("180g".into())));
        view.append_card(
            0,
            card(
                "b",
                CardDetails::Nutrition {
                    food: "Chicken salad".into(),
                    total_weight: "320g".into(),
                    food_weight: "250g".into(),
                    calories: "300 kcal".into(),
                    carbs: "12g".into(),
                    protein: "35g".into(),
                    fat: "9g".into(),
                },
            ),
        );
        view.append_notice(Notice::error("Error loading images. Please try refreshing."));
        view.show_control(LoadMoreControl::ready(13));

        insta::assert_snapshot!(view.render_text(), @r###"
        == 2024-05-03 | Total Calories: 300 kcal (2 items)
        - a.jpg <thumb:a>
          Time: 2024-05-03 12:00:00
          Weight: 180g
        - b.jpg <thumb:b>
          Time: 2024-05-03 12:00:00
          Total Weight: 320g | Food Weight: 250g
          Chicken salad
          Calories: 300 kcal | Carbs: 12g | Protein: 35g | Fat: 9g
        ! Error loading images. Please try refreshing.
        [ Load More (13 items remaining) ]
        "###);
    }

    #[test]
    fn replace_content_clears_everything() {
        let mut view = GalleryView::default();
        view.insert_section(
            0,
            SectionHeader {
                key: DateKey::new(date!(2024 - 05 - 03)),
                summary: BucketSummary::default(),
            },
        );
        view.append_card(0, card("a", CardDetails::Weight("1g".into())));
        view.show_control(LoadMoreControl::ready(1));
        view.replace_content(Some(Notice::loading("Loading fresh images...")));
        assert!(view.sections().is_empty());
        assert!(view.control().is_none());
        assert_eq!(view.rows().len(), 1);
        assert!(view.render_text().starts_with("... Loading fresh images..."));
    }
}
