//! Fluent search builder and result processing.
//!
//! The builder collects a [`ListingFilter`], a page and an order, then runs
//! the request against every source or a single one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use yomikomi::prelude::*;
//! # use yomikomi::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let sources = Sources::builtin()?;
//!
//! let results = sources
//!     .search("isekai")
//!     .include_tag(TagRef::new("action", "Action"))
//!     .state(ContentState::Finished)
//!     .sort_by(SortOrder::Popularity)
//!     .flatten()
//!     .await?
//!     .dedupe_by_title();
//!
//! // Grouped results keep per-source errors
//! let grouped = sources.search("isekai").page(2).group().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    extract::ListingPage,
    source::Sources,
    types::{ContentState, ListingFilter, Manga, SortOrder, TagRef},
};

/// Fluent builder for listing requests across sources.
///
/// Created with [`Sources::search`]. Nothing is fetched until one of the
/// execution methods is awaited.
pub struct SearchBuilder<'a> {
    sources: &'a Sources,
    filter: ListingFilter,
    page: u32,
    order: Option<SortOrder>,
}

impl<'a> SearchBuilder<'a> {
    pub(crate) fn new(sources: &'a Sources, query: impl Into<String>) -> Self {
        Self {
            sources,
            filter: ListingFilter::from(query.into()),
            page: 1,
            order: None,
        }
    }

    /// Searches by author instead of title.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.filter = self.filter.with_author(author);
        self
    }

    pub fn include_tag(mut self, tag: TagRef) -> Self {
        self.filter = self.filter.include_tag(tag);
        self
    }

    pub fn exclude_tag(mut self, tag: TagRef) -> Self {
        self.filter = self.filter.exclude_tag(tag);
        self
    }

    pub fn state(mut self, state: ContentState) -> Self {
        self.filter = self.filter.with_state(state);
        self
    }

    /// One-based page number, `1` by default.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn sort_by(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn filter(&self) -> &ListingFilter {
        &self.filter
    }

    /// Runs on every source and concatenates the items.
    ///
    /// Fails only when every source failed.
    pub async fn flatten(self) -> Result<Vec<Manga>> {
        self.sources
            .list_all_flat(self.page, self.order, &self.filter)
            .await
    }

    /// Runs on every source and keeps each outcome.
    pub async fn group(self) -> Vec<(String, Result<ListingPage>)> {
        self.sources
            .list_all_grouped(self.page, self.order, &self.filter)
            .await
    }

    /// Runs on a single source.
    pub async fn from_source(self, source_id: &str) -> Result<ListingPage> {
        let source = self
            .sources
            .get(source_id)
            .ok_or_else(|| Error::not_found(format!("Source '{}' not found", source_id)))?;
        source
            .get_list_page(self.page, self.order, &self.filter)
            .await
    }
}

/// Post-processing helpers for result lists.
pub trait SearchResultExt {
    /// Keeps the first entry of each `(source_id, id)` pair.
    fn dedupe_by_id(self) -> Self;

    /// Keeps the first entry of each title, compared case-insensitively.
    fn dedupe_by_title(self) -> Self;

    /// Keeps entries rated at least `min` (in `[0, 1]`). Unrated entries are
    /// dropped.
    fn filter_min_rating(self, min: f32) -> Self;

    /// Highest rated first, unrated last. Stable for equal ratings.
    fn sort_by_rating(self) -> Self;
}

impl SearchResultExt for Vec<Manga> {
    fn dedupe_by_id(mut self) -> Self {
        let mut seen = HashSet::new();
        self.retain(|manga| seen.insert((manga.source_id.clone(), manga.id)));
        self
    }

    fn dedupe_by_title(mut self) -> Self {
        let mut seen = HashSet::new();
        self.retain(|manga| seen.insert(manga.title.trim().to_lowercase()));
        self
    }

    fn filter_min_rating(mut self, min: f32) -> Self {
        self.retain(|manga| manga.rating.is_some_and(|r| r >= min));
        self
    }

    fn sort_by_rating(mut self) -> Self {
        self.sort_by(|a, b| {
            let a = a.rating.unwrap_or(-1.0);
            let b = b.rating.unwrap_or(-1.0);
            b.total_cmp(&a)
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manga(source: &str, id: i64, title: &str, rating: Option<f32>) -> Manga {
        Manga {
            id,
            title: title.into(),
            rating,
            source_id: source.into(),
            ..Default::default()
        }
    }

    #[test]
    fn dedupe_by_id_keeps_sources_apart() {
        let results = vec![
            manga("a", 1, "One", None),
            manga("a", 1, "One again", None),
            manga("b", 1, "One", None),
        ]
        .dedupe_by_id();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "One");
        assert_eq!(results[1].source_id, "b");
    }

    #[test]
    fn dedupe_by_title_ignores_case() {
        let results = vec![
            manga("a", 1, "Solo Leveling", None),
            manga("b", 2, "solo leveling ", None),
            manga("b", 3, "Other", None),
        ]
        .dedupe_by_title();
        assert_eq!(results.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn rating_filter_and_sort() {
        let results = vec![
            manga("a", 1, "Low", Some(0.2)),
            manga("a", 2, "None", None),
            manga("a", 3, "High", Some(0.9)),
            manga("a", 4, "Mid", Some(0.6)),
        ];
        let sorted = results.clone().sort_by_rating();
        assert_eq!(sorted.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4, 1, 2]);

        let filtered = results.filter_min_rating(0.5);
        assert_eq!(filtered.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn builder_collects_filter() {
        let sources = Sources::new();
        let action = TagRef::new("action", "Action");
        let builder = sources
            .search("  ")
            .author("Tác Giả")
            .include_tag(action.clone())
            .exclude_tag(action.clone())
            .state(ContentState::Ongoing)
            .page(0);

        let filter = builder.filter();
        assert_eq!(filter.query_text(), None);
        assert_eq!(filter.author_text(), Some("Tác Giả"));
        assert!(filter.tags.is_empty());
        assert_eq!(filter.tags_exclude, vec![action]);
        assert_eq!(filter.states, vec![ContentState::Ongoing]);
        assert_eq!(builder.page, 1);
    }

    #[tokio::test]
    async fn unknown_source_is_not_found() {
        let sources = Sources::new();
        let err = sources.search("x").from_source("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
