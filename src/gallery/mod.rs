//! Date bucketing, batching and incremental rendering of gallery items.
//!
//! Nothing in here performs I/O: sources produce a [`Listing`], the
//! [`Batcher`] slices it, and the [`PaginationController`] paints each slice
//! into any [`DisplayTree`].

pub mod batcher;
pub mod grouping;
pub mod model;
pub mod pagination;
pub mod render;
pub mod view;

pub use batcher::{assemble_sections, BatchMode, BatchPlan, BatchSection, Batcher, Listing};
pub use grouping::{BucketSummary, DateBucket, DateBuckets, DateKey};
pub use model::{Item, ItemId, Measure, NutritionInfo, PendingItem, Thumbnail};
pub use pagination::{BatchOutcome, BatchTicket, PaginationController, Phase};
pub use render::{
    CardDetails, DisplayTree, ItemCard, LoadMoreControl, Notice, NoticeKind, RenderState,
    Renderer, SectionHeader,
};
pub use view::{GalleryView, SectionNode, ViewRow};
