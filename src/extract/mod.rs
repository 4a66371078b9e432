//! Declarative extraction rules and the parsers that apply them.
//!
//! A site describes its documents with four rule sets:
//!
//! - [`ListingRule`] - listing pages, returning a [`ListingPage`]
//! - [`DetailsRule`] - series details and the chapter list
//! - [`PagesRule`] - chapter page images
//! - [`TaxonomyRule`] - the site's tag list
//!
//! Each comes in an HTML flavour (CSS selectors, parsed with `scraper`) and a
//! JSON flavour (dot paths, parsed with `serde_json`).
//!
//! Listing parsing distinguishes an empty last page from a page whose layout
//! no longer matches the rules: zero items is [`ListingPage::End`] only when
//! the site says so, otherwise it is [`Error::LayoutChanged`](crate::Error::LayoutChanged).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    date::DateGrammar,
    error::Result,
    net::html,
    types::{ContentRating, ContentState, Manga, TagRef},
};

mod details;
pub mod field;
mod listing;

pub use details::{parse_chapters, parse_details, parse_pages, parse_tags};
pub use field::{Field, JsonField, Transform};
pub use listing::parse_listing;

/// Outcome of one listing page.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingPage {
    /// Items in page order, de-duplicated by URL
    Items(Vec<Manga>),
    /// The site reported that there are no (more) results
    End,
}

impl ListingPage {
    pub fn items(&self) -> &[Manga] {
        match self {
            ListingPage::Items(items) => items,
            ListingPage::End => &[],
        }
    }

    pub fn into_items(self) -> Vec<Manga> {
        match self {
            ListingPage::Items(items) => items,
            ListingPage::End => Vec::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ListingPage::End)
    }
}

/// Site facts every parser needs.
#[derive(Debug, Clone, Copy)]
pub struct SiteContext<'a> {
    pub source_id: &'a str,
    pub domain: &'a str,
    pub content_rating: ContentRating,
    pub dates: &'a DateGrammar,
}

/// A rating read as a number and divided by `scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRule<F> {
    pub field: F,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    5.0
}

impl<F> RatingRule<F> {
    /// Normalizes a raw rating into `[0, 1]`.
    pub fn normalize(&self, raw: &str) -> Option<f32> {
        let value: f32 = raw.trim().replace(',', ".").parse().ok()?;
        if !value.is_finite() || self.scale <= 0.0 {
            return None;
        }
        Some((value / self.scale).clamp(0.0, 1.0))
    }
}

/// Publication state read from text.
///
/// The text is compared with the map keys case-insensitively: an exact match
/// wins, then the longest key contained in the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRule<F> {
    pub field: F,
    #[serde(default)]
    pub map: BTreeMap<String, ContentState>,
    /// State used when the field is present but matches no key
    pub default: Option<ContentState>,
}

impl<F> StateRule<F> {
    pub fn resolve(&self, text: Option<&str>) -> Option<ContentState> {
        let Some(text) = text else {
            return self.default;
        };
        let text = text.to_lowercase();
        if let Some((_, state)) = self.map.iter().find(|(k, _)| k.to_lowercase() == text) {
            return Some(*state);
        }
        let mut keys: Vec<_> = self.map.iter().collect();
        keys.sort_by_key(|(k, _)| std::cmp::Reverse(k.chars().count()));
        keys.into_iter()
            .find(|(k, _)| text.contains(&k.to_lowercase()))
            .map(|(_, state)| *state)
            .or(self.default)
    }
}

/// A list of values, optionally split on a separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRule<F> {
    pub field: F,
    pub split: Option<String>,
}

impl<F> ListRule<F> {
    fn collect(&self, values: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let parts = values.into_iter().flat_map(|value| match &self.split {
            Some(sep) => value
                .split(sep.as_str())
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>(),
            None => vec![value],
        });
        for part in parts {
            if !part.is_empty() && !out.contains(&part) {
                out.push(part);
            }
        }
        out
    }
}

/// Tags read from repeated HTML elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    /// Selector of one tag element
    pub item: String,
    /// Key, by default the last segment of `href`
    #[serde(default = "default_tag_key")]
    pub key: Field,
    /// Title, by default the element text
    #[serde(default)]
    pub title: Field,
}

fn default_tag_key() -> Field {
    Field {
        attrs: vec!["href".to_string()],
        transforms: vec![Transform::LastSegment],
        ..Default::default()
    }
}

/// Tags read from an array of JSON objects or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonTagRule {
    /// Path of the tag values, `*` allowed
    pub items: String,
    #[serde(default)]
    pub key: JsonField,
    #[serde(default)]
    pub title: JsonField,
}

/// Listing page extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ListingRule {
    Html(HtmlListing),
    Json(JsonListing),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlListing {
    /// Selector of one listing item
    pub item: String,
    #[serde(default = "default_href")]
    pub href: Field,
    pub title: Field,
    pub cover: Option<Field>,
    pub rating: Option<RatingRule<Field>>,
    pub state: Option<StateRule<Field>>,
    pub authors: Option<Field>,
    pub tags: Option<TagRule>,
    /// Element present only on "no results" pages
    pub empty_marker: Option<String>,
    /// Results container, present (and empty) on an empty last page
    pub container: Option<String>,
    /// Phrases shown only on "no results" pages, matched case-insensitively
    /// against the page text
    #[serde(default)]
    pub empty_text: Vec<String>,
}

fn default_href() -> Field {
    Field::attr("a", &["href"])
}

fn default_chapter_title() -> Field {
    Field::css("a")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonListing {
    /// Candidate paths of the item array, the first array found wins.
    /// An empty path is the document root.
    pub items: Vec<String>,
    /// Site-relative URL template, `{path}` placeholders read item fields
    pub url: String,
    /// Public URL template, defaults to `url`
    pub public_url: Option<String>,
    pub title: JsonField,
    pub cover: Option<JsonField>,
    pub description: Option<JsonField>,
    pub alt_titles: Option<JsonField>,
    pub authors: Option<JsonField>,
    pub tags: Option<JsonTagRule>,
    pub state: Option<StateRule<JsonField>>,
    pub rating: Option<RatingRule<JsonField>>,
}

/// Details page extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DetailsRule {
    Html(HtmlDetails),
    Json(JsonDetails),
}

impl DetailsRule {
    fn finished_marker(&self) -> Option<&str> {
        match self {
            DetailsRule::Html(rule) => rule.finished_marker.as_deref(),
            DetailsRule::Json(_) => None,
        }
    }

    /// URL template of a separate chapter list document, if any.
    pub fn chapters_endpoint(&self) -> Option<&str> {
        match self {
            DetailsRule::Html(rule) => rule.chapters.endpoint.as_deref(),
            DetailsRule::Json(rule) => rule.chapters.endpoint.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlDetails {
    pub title: Option<Field>,
    pub description: Option<Field>,
    pub cover: Option<Field>,
    pub alt_titles: Option<ListRule<Field>>,
    pub authors: Option<ListRule<Field>>,
    pub tags: Option<TagRule>,
    pub state: Option<StateRule<Field>>,
    pub rating: Option<RatingRule<Field>>,
    /// Text in the newest chapter title that marks the series finished
    pub finished_marker: Option<String>,
    pub chapters: HtmlChapters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlChapters {
    /// Separate chapter list URL template (`{url}`, `{slug}`)
    pub endpoint: Option<String>,
    /// Selector of one chapter entry
    pub item: String,
    #[serde(default = "default_href")]
    pub href: Field,
    /// Title, by default the text of the chapter link
    #[serde(default = "default_chapter_title")]
    pub title: Field,
    pub date: Option<Field>,
    /// Read once from the whole document
    pub scanlator: Option<Field>,
    /// Pattern whose first group is the chapter number, matched on the title
    pub number: Option<String>,
    #[serde(default = "default_true")]
    pub newest_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDetails {
    /// Path of the details object
    #[serde(default)]
    pub root: String,
    pub title: Option<JsonField>,
    pub description: Option<JsonField>,
    pub cover: Option<JsonField>,
    pub alt_titles: Option<ListRule<JsonField>>,
    pub authors: Option<ListRule<JsonField>>,
    pub tags: Option<JsonTagRule>,
    pub state: Option<StateRule<JsonField>>,
    pub rating: Option<RatingRule<JsonField>>,
    pub chapters: JsonChapters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonChapters {
    /// Separate chapter list URL template (`{url}`, `{slug}`)
    pub endpoint: Option<String>,
    /// Candidate paths of the chapter array
    pub items: Vec<String>,
    /// Chapter URL template over chapter fields
    pub url: String,
    pub title: JsonField,
    pub date: Option<JsonField>,
    pub scanlator: Option<JsonField>,
    pub number: Option<JsonField>,
    #[serde(default = "default_true")]
    pub newest_first: bool,
}

fn default_true() -> bool {
    true
}

/// Chapter page extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PagesRule {
    Html {
        image: Field,
        /// Substrings marking placeholder images
        #[serde(default)]
        skip: Vec<String>,
    },
    Json {
        items: Vec<String>,
        url: JsonField,
    },
}

/// Where the site's tag list comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum TaxonomyRule {
    #[default]
    None,
    Static {
        tags: Vec<TagRef>,
    },
    Html {
        path: String,
        tags: TagRule,
    },
    Json {
        path: String,
        tags: JsonTagRule,
    },
}

impl ListingRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            ListingRule::Html(rule) => {
                html::selector(&rule.item)?;
                for css in [&rule.empty_marker, &rule.container].into_iter().flatten() {
                    html::selector(css)?;
                }
                rule.href.validate()?;
                rule.title.validate()?;
                for field in [&rule.cover, &rule.authors].into_iter().flatten() {
                    field.validate()?;
                }
                if let Some(rating) = &rule.rating {
                    rating.field.validate()?;
                }
                if let Some(state) = &rule.state {
                    state.field.validate()?;
                }
                if let Some(tags) = &rule.tags {
                    tags.validate()?;
                }
                Ok(())
            }
            ListingRule::Json(rule) => {
                rule.title.validate()?;
                for field in [&rule.cover, &rule.description, &rule.alt_titles, &rule.authors]
                    .into_iter()
                    .flatten()
                {
                    field.validate()?;
                }
                Ok(())
            }
        }
    }
}

impl DetailsRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            DetailsRule::Html(rule) => {
                for field in [&rule.title, &rule.description, &rule.cover]
                    .into_iter()
                    .flatten()
                {
                    field.validate()?;
                }
                for list in [&rule.alt_titles, &rule.authors].into_iter().flatten() {
                    list.field.validate()?;
                }
                if let Some(tags) = &rule.tags {
                    tags.validate()?;
                }
                if let Some(state) = &rule.state {
                    state.field.validate()?;
                }
                let chapters = &rule.chapters;
                html::selector(&chapters.item)?;
                chapters.href.validate()?;
                chapters.title.validate()?;
                for field in [&chapters.date, &chapters.scanlator].into_iter().flatten() {
                    field.validate()?;
                }
                if let Some(pattern) = &chapters.number {
                    field::pattern(pattern)?;
                }
                Ok(())
            }
            DetailsRule::Json(rule) => {
                for field in [&rule.title, &rule.description, &rule.cover]
                    .into_iter()
                    .flatten()
                {
                    field.validate()?;
                }
                rule.chapters.title.validate()?;
                Ok(())
            }
        }
    }
}

impl PagesRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            PagesRule::Html { image, .. } => image.validate(),
            PagesRule::Json { url, .. } => url.validate(),
        }
    }
}

impl TaxonomyRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            TaxonomyRule::Html { tags, .. } => tags.validate(),
            _ => Ok(()),
        }
    }

    /// Document path to fetch, if the list is not static.
    pub fn path(&self) -> Option<&str> {
        match self {
            TaxonomyRule::Html { path, .. } | TaxonomyRule::Json { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl TagRule {
    fn validate(&self) -> Result<()> {
        html::selector(&self.item)?;
        self.key.validate()?;
        self.title.validate()
    }
}
