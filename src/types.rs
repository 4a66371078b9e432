//! Core data types for listings, filters and sort orders.
//!
//! This module defines the value types produced and consumed by the engine:
//!
//! - [`Manga`] - A listing item or fully fetched series
//! - [`Chapter`] - One entry of a series' chapter list
//! - [`Page`] - One image of a chapter
//! - [`ListingFilter`] - Generic search filter mapped onto site URLs
//! - [`SortOrder`], [`ContentState`], [`ContentRating`], [`TagRef`]
//!
//! Identifiers are derived from site-relative URLs with [`stable_id`], so the
//! same item always gets the same id across pages, runs and processes.
//!
//! # Examples
//!
//! ```rust
//! use yomikomi::types::*;
//!
//! let filter = ListingFilter::default()
//!     .with_query("tower")
//!     .include_tag(TagRef::new("action", "Action"))
//!     .exclude_tag(TagRef::new("drama", "Drama"))
//!     .with_state(ContentState::Ongoing);
//!
//! assert_eq!(filter.tags.len(), 1);
//! assert_eq!(stable_id("/truyen/abc"), stable_id("/truyen/abc"));
//! ```

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Derives a deterministic 64-bit identifier from a key, usually a
/// site-relative URL.
///
/// The id is the first eight bytes of the SHA-256 digest of the key,
/// read as a big-endian signed integer. It does not depend on the process,
/// platform or compiler version.
///
/// ```rust
/// use yomikomi::types::stable_id;
///
/// assert_eq!(stable_id("/manga/1"), stable_id("/manga/1"));
/// assert_ne!(stable_id("/manga/1"), stable_id("/manga/2"));
/// ```
pub fn stable_id(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// A tag from a site's taxonomy.
///
/// Equality and hashing only consider `key`, the value sent to the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRef {
    /// Value used in URLs
    pub key: String,
    /// Human-readable name
    pub title: String,
}

impl TagRef {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }
}

impl PartialEq for TagRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TagRef {}

impl Hash for TagRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Listing sort orders.
///
/// Each site declares the subset it supports and a default. Orders are
/// written in `snake_case` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortOrder {
    Alphabetical,
    AlphabeticalDesc,
    Updated,
    Newest,
    Popularity,
    PopularityToday,
    PopularityWeek,
    PopularityMonth,
    Rating,
    Relevance,
}

impl SortOrder {
    pub const ALL: [SortOrder; 10] = [
        SortOrder::Alphabetical,
        SortOrder::AlphabeticalDesc,
        SortOrder::Updated,
        SortOrder::Newest,
        SortOrder::Popularity,
        SortOrder::PopularityToday,
        SortOrder::PopularityWeek,
        SortOrder::PopularityMonth,
        SortOrder::Rating,
        SortOrder::Relevance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Alphabetical => "alphabetical",
            SortOrder::AlphabeticalDesc => "alphabetical_desc",
            SortOrder::Updated => "updated",
            SortOrder::Newest => "newest",
            SortOrder::Popularity => "popularity",
            SortOrder::PopularityToday => "popularity_today",
            SortOrder::PopularityWeek => "popularity_week",
            SortOrder::PopularityMonth => "popularity_month",
            SortOrder::Rating => "rating",
            SortOrder::Relevance => "relevance",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortOrder::ALL
            .into_iter()
            .find(|order| order.as_str() == s)
            .ok_or_else(|| format!("unknown sort order `{s}`"))
    }
}

impl TryFrom<String> for SortOrder {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SortOrder> for String {
    fn from(order: SortOrder) -> Self {
        order.as_str().to_string()
    }
}

/// Publication state of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContentState {
    Ongoing,
    Finished,
    Abandoned,
    Paused,
    Upcoming,
}

impl ContentState {
    pub const ALL: [ContentState; 5] = [
        ContentState::Ongoing,
        ContentState::Finished,
        ContentState::Abandoned,
        ContentState::Paused,
        ContentState::Upcoming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentState::Ongoing => "ongoing",
            ContentState::Finished => "finished",
            ContentState::Abandoned => "abandoned",
            ContentState::Paused => "paused",
            ContentState::Upcoming => "upcoming",
        }
    }
}

impl fmt::Display for ContentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown content state `{s}`"))
    }
}

impl TryFrom<String> for ContentState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentState> for String {
    fn from(state: ContentState) -> Self {
        state.as_str().to_string()
    }
}

/// Audience rating, supplied by the site configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRating {
    #[default]
    Safe,
    Suggestive,
    Adult,
}

/// Generic listing filter, translated into site URLs by
/// [`build_url`](crate::query::build_url).
///
/// `tags` and `tags_exclude` are disjoint ordered sets keyed by
/// [`TagRef::key`]. The fluent helpers keep them that way, and the generated
/// builder refuses to build a filter that breaks it:
///
/// ```rust
/// use yomikomi::types::{ListingFilterBuilder, TagRef};
///
/// let action = TagRef::new("action", "Action");
/// let result = ListingFilterBuilder::default()
///     .tags(vec![action.clone()])
///     .tags_exclude(vec![action])
///     .build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ListingFilter {
    /// Free-text search
    #[builder(default)]
    pub query: Option<String>,
    /// Author search, takes priority over `query`
    #[builder(default)]
    pub author: Option<String>,
    /// Tags to include, in insertion order
    #[builder(default)]
    #[serde(default)]
    pub tags: Vec<TagRef>,
    /// Tags to exclude, in insertion order
    #[builder(default)]
    #[serde(default)]
    pub tags_exclude: Vec<TagRef>,
    /// Accepted publication states
    #[builder(default)]
    #[serde(default)]
    pub states: Vec<ContentState>,
}

impl ListingFilterBuilder {
    fn validate(&self) -> Result<(), String> {
        let tags = self.tags.as_deref().unwrap_or_default();
        let excluded = self.tags_exclude.as_deref().unwrap_or_default();

        if let Some(tag) = tags.iter().find(|tag| excluded.contains(tag)) {
            return Err(format!("tag `{}` is both included and excluded", tag.key));
        }
        for list in [tags, excluded] {
            for (i, tag) in list.iter().enumerate() {
                if list[..i].contains(tag) {
                    return Err(format!("tag `{}` is listed twice", tag.key));
                }
            }
        }
        Ok(())
    }
}

impl ListingFilter {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Adds a tag to the included set and removes it from the excluded set.
    pub fn include_tag(mut self, tag: TagRef) -> Self {
        self.tags_exclude.retain(|t| t != &tag);
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Adds a tag to the excluded set and removes it from the included set.
    pub fn exclude_tag(mut self, tag: TagRef) -> Self {
        self.tags.retain(|t| t != &tag);
        if !self.tags_exclude.contains(&tag) {
            self.tags_exclude.push(tag);
        }
        self
    }

    pub fn with_state(mut self, state: ContentState) -> Self {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    /// Returns `true` when no criteria are set.
    pub fn is_empty(&self) -> bool {
        self.query_text().is_none()
            && self.author_text().is_none()
            && self.tags.is_empty()
            && self.tags_exclude.is_empty()
            && self.states.is_empty()
    }

    /// The search text, ignoring blank values.
    pub fn query_text(&self) -> Option<&str> {
        non_blank(self.query.as_deref())
    }

    /// The author name, ignoring blank values.
    pub fn author_text(&self) -> Option<&str> {
        non_blank(self.author.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl From<&str> for ListingFilter {
    fn from(query: &str) -> Self {
        ListingFilter::default().with_query(query)
    }
}

impl From<String> for ListingFilter {
    fn from(query: String) -> Self {
        ListingFilter::default().with_query(query)
    }
}

/// A series as it appears in a listing or on its details page.
///
/// `url` is site-relative and canonical, `public_url` and `cover_url` are
/// absolute. Listing items leave `description`, `state` and `chapters` unset
/// unless the listing exposes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    /// Stable identifier derived from `url`
    pub id: i64,

    /// Main title
    pub title: String,

    /// Alternative titles
    #[serde(default)]
    pub alt_titles: Vec<String>,

    /// Site-relative URL
    pub url: String,

    /// Absolute URL on the site
    pub public_url: String,

    /// Absolute cover image URL, empty when unknown
    pub cover_url: String,

    /// Rating in `[0, 1]`, `None` when unknown
    pub rating: Option<f32>,

    pub content_rating: ContentRating,

    /// Tags/genres
    #[serde(default)]
    pub tags: Vec<TagRef>,

    pub state: Option<ContentState>,

    #[serde(default)]
    pub authors: Vec<String>,

    pub description: Option<String>,

    /// Chapter list in reading order, only set on details
    pub chapters: Option<Vec<Chapter>>,

    /// Source identifier this manga came from
    pub source_id: String,
}

/// A listing item is a [`Manga`] as returned by listing pages.
pub type ListingItem = Manga;

/// A single chapter of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Stable identifier derived from `url`
    pub id: i64,

    /// Chapter title
    pub title: String,

    /// Chapter number (can be decimal for .5 chapters)
    pub number: f32,

    /// Site-relative URL
    pub url: String,

    /// Upload time in epoch milliseconds, `0` when unknown
    pub upload_date: i64,

    pub scanlator: Option<String>,

    /// Source identifier
    pub source_id: String,
}

/// A chapter entry is a [`Chapter`] as returned inside details.
pub type ChapterEntry = Chapter;

/// One page image of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Stable identifier derived from `url`
    pub id: i64,

    /// Absolute image URL
    pub url: String,

    /// Source identifier
    pub source_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_fixed() {
        // Pinned so ids survive refactors and toolchain upgrades
        let digest = Sha256::digest(b"/manga/1");
        let expected = i64::from_be_bytes(digest[..8].try_into().unwrap());
        assert_eq!(stable_id("/manga/1"), expected);
        assert_eq!(stable_id(""), stable_id(""));
    }

    #[test]
    fn tag_equality_uses_key() {
        assert_eq!(TagRef::new("a", "Action"), TagRef::new("a", "Other"));
        assert_ne!(TagRef::new("a", "Action"), TagRef::new("b", "Action"));
    }

    #[test]
    fn include_and_exclude_stay_disjoint() {
        let action = TagRef::new("action", "Action");
        let filter = ListingFilter::default()
            .include_tag(action.clone())
            .exclude_tag(action.clone());
        assert!(filter.tags.is_empty());
        assert_eq!(filter.tags_exclude, vec![action.clone()]);

        let filter = filter.include_tag(action.clone()).include_tag(action.clone());
        assert_eq!(filter.tags, vec![action]);
        assert!(filter.tags_exclude.is_empty());
    }

    #[test]
    fn builder_rejects_duplicates() {
        let a = TagRef::new("a", "A");
        let err = ListingFilterBuilder::default()
            .tags(vec![a.clone(), a])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn sort_order_round_trips_through_str() {
        for order in SortOrder::ALL {
            assert_eq!(order.as_str().parse::<SortOrder>(), Ok(order));
        }
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn blank_query_is_ignored() {
        let filter = ListingFilter::default().with_query("   ");
        assert!(filter.query_text().is_none());
        assert!(filter.is_empty());
    }
}
