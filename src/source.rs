//! Source trait and collection for managing sites.
//!
//! This module defines the [`Source`] trait every site implements and the
//! [`Sources`] collection that runs listing requests across several sites at
//! once.
//!
//! # Examples
//!
//! ```rust,no_run
//! use yomikomi::prelude::*;
//! use yomikomi::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let sources = Sources::builtin()?;
//!
//! // Search across all sources
//! let results = sources.search("one piece").flatten().await?;
//!
//! // Details from a specific source
//! if let Some(source) = sources.get(&results[0].source_id) {
//!     let details = source.get_details(&results[0]).await?;
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::future;
use std::collections::HashMap;
use tracing::warn;

use crate::{
    error::{Error, Result},
    extract::ListingPage,
    search::SearchBuilder,
    types::{Chapter, ListingFilter, Manga, Page, SortOrder, TagRef},
};

/// Trait that all sites implement.
///
/// # Required Methods
///
/// * [`id()`](Source::id) - Unique identifier for the source
/// * [`name()`](Source::name) - Human-readable name
/// * [`domain()`](Source::domain) - Domain requests go to
/// * [`get_list_page()`](Source::get_list_page) - One listing page
/// * [`get_details()`](Source::get_details) - Details and chapters
/// * [`get_pages()`](Source::get_pages) - Page images of a chapter
/// * [`available_tags()`](Source::available_tags) - The site's tag taxonomy
///
/// # Error Handling
///
/// Implementations return typed errors and never retry. Callers decide with
/// [`Error::is_retryable`].
#[async_trait]
pub trait Source: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn domain(&self) -> &str;

    /// Orders callers may pass to [`get_list_page`](Source::get_list_page).
    fn sort_orders(&self) -> Vec<SortOrder>;

    fn default_sort_order(&self) -> SortOrder;

    /// Fetches one listing page.
    ///
    /// # Parameters
    ///
    /// * `page` - One-based page number
    /// * `order` - Requested order, unsupported orders fall back to the
    ///   default
    /// * `filter` - Search text, author, tags and states
    async fn get_list_page(
        &self,
        page: u32,
        order: Option<SortOrder>,
        filter: &ListingFilter,
    ) -> Result<ListingPage>;

    /// Fetches details and the chapter list of a listing item.
    async fn get_details(&self, manga: &Manga) -> Result<Manga>;

    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>>;

    /// The site's tag list. Fetched at most once per source.
    async fn available_tags(&self) -> Result<Vec<TagRef>>;

    /// Chapters of a listing item in reading order.
    async fn get_chapters(&self, manga: &Manga) -> Result<Vec<Chapter>> {
        Ok(self.get_details(manga).await?.chapters.unwrap_or_default())
    }
}

/// Collection of sources with aggregated listing.
pub struct Sources {
    sources: Vec<Box<dyn Source>>,
    by_id: HashMap<String, usize>,
}

impl Sources {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// A collection holding every built-in site.
    #[cfg(feature = "builtin-sites")]
    pub fn builtin() -> Result<Self> {
        let mut sources = Self::new();
        for config in crate::sources::builtin()? {
            sources.add(crate::sources::SiteEngine::new(config)?);
        }
        Ok(sources)
    }

    /// Starts a search with the given text.
    pub fn search(&self, query: impl Into<String>) -> SearchBuilder<'_> {
        SearchBuilder::new(self, query)
    }

    /// Adds a source, replacing any source with the same id.
    pub fn add(&mut self, source: impl Source + 'static) -> &mut Self {
        let id = source.id().to_string();
        match self.by_id.get(&id) {
            Some(&index) => self.sources[index] = Box::new(source),
            None => {
                self.by_id.insert(id, self.sources.len());
                self.sources.push(Box::new(source));
            }
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn Source> {
        self.by_id
            .get(id)
            .and_then(|&index| self.sources.get(index))
            .map(|s| s.as_ref())
    }

    pub fn list_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Fetches the same listing page from every source concurrently.
    pub async fn list_all_grouped(
        &self,
        page: u32,
        order: Option<SortOrder>,
        filter: &ListingFilter,
    ) -> Vec<(String, Result<ListingPage>)> {
        let futures = self.sources.iter().map(|source| async move {
            let result = source.get_list_page(page, order, filter).await;
            (source.id().to_string(), result)
        });

        future::join_all(futures).await
    }

    /// Like [`list_all_grouped`](Sources::list_all_grouped) with the items
    /// concatenated in source order. Fails only when every source failed.
    pub async fn list_all_flat(
        &self,
        page: u32,
        order: Option<SortOrder>,
        filter: &ListingFilter,
    ) -> Result<Vec<Manga>> {
        let grouped = self.list_all_grouped(page, order, filter).await;

        let mut all_results = Vec::new();
        let mut errors = Vec::new();

        for (source_id, result) in grouped {
            match result {
                Ok(listing) => all_results.extend(listing.into_items()),
                Err(e) => {
                    warn!(source = %source_id, error = %e, "source failed, skipping its items");
                    errors.push(format!("{}: {}", source_id, e));
                }
            }
        }

        if all_results.is_empty() && !errors.is_empty() {
            return Err(Error::Other(format!(
                "All sources failed: {}",
                errors.join(", ")
            )));
        }

        Ok(all_results)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new()
    }
}
