//! # Yomikomi - Declarative manga site toolkit
//!
//! Yomikomi reads listing, details and chapter pages from manga sites that are
//! described as data instead of code. Every site is a [`SiteConfig`] record
//! (TOML) driving one generic [`SiteEngine`]; the record says how listing URLs
//! are built, where fields live in the HTML or JSON, and how the site spells
//! its dates.
//!
//! ## Features
//!
//! - **Declarative URL rules**: search, author, genre and browse endpoints with
//!   their own pagination, sort and filter spelling
//! - **Honest listings**: an empty last page ([`ListingPage::End`]) is never
//!   confused with a layout change ([`Error::LayoutChanged`])
//! - **Relative dates**: "3 giờ trước", "2 days ago" and absolute formats
//!   normalized to epoch milliseconds
//! - **Stable ids**: identifiers derived from URLs survive mirror switches
//! - **Shared state done once**: tag lists fetched at most once per source,
//!   page requests spaced by a shared rate limiter
//! - **Typed errors**: callers decide on retries with [`Error::is_retryable`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use yomikomi::prelude::*;
//! use yomikomi::error::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sources = Sources::builtin()?;
//!
//!     let results = sources
//!         .search("isekai")
//!         .sort_by(SortOrder::Popularity)
//!         .flatten()
//!         .await?;
//!
//!     println!("Found {} results", results.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a Chapter
//!
//! ```rust,no_run
//! use yomikomi::prelude::*;
//! use yomikomi::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let sources = Sources::builtin()?;
//! let source = sources.get("lanhlungteam").expect("builtin source");
//!
//! let listing = source.get_list_page(1, None, &ListingFilter::default()).await?;
//! if let Some(manga) = listing.items().first() {
//!     let details = source.get_details(manga).await?;
//!     if let Some(chapter) = details.chapters.as_deref().and_then(|c| c.first()) {
//!         let pages = source.get_pages(chapter).await?;
//!         println!("{} pages", pages.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Custom Sites
//!
//! ```rust,no_run
//! use yomikomi::prelude::*;
//!
//! # async fn example() -> yomikomi::Result<()> {
//! let config = SiteConfig::load("sites/my-site.toml").await?;
//! let mut sources = Sources::new();
//! sources.add(SiteEngine::new(config)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`source`]: The [`Source`] trait and the [`Sources`] collection
//! - [`search`]: Fluent search builder and result processing
//! - [`sources`]: The configuration-driven engine and the built-in sites
//! - [`config`]: Site configuration records
//! - [`query`]: Listing URL construction
//! - [`extract`]: Listing, details, pages and taxonomy parsing
//! - [`date`]: Date normalization
//! - [`types`]: Core data structures
//! - [`net`]: HTTP client, rate limiting and parsing helpers
//! - [`error`]: Error types

pub mod config;
pub mod date;
pub mod error;
pub mod extract;
pub mod net;
pub mod query;
pub mod search;
pub mod source;
pub mod sources;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```rust
/// use yomikomi::prelude::*;
///
/// // Now you have access to:
/// // - Sources, Source trait, SiteEngine, SiteConfig
/// // - SearchBuilder, SearchResultExt
/// // - Manga, Chapter, Page, ListingFilter, SortOrder, TagRef
/// ```
pub mod prelude {
    pub use crate::{
        config::SiteConfig,
        extract::ListingPage,
        net::RateLimiter,
        search::{SearchBuilder, SearchResultExt},
        source::{Source, Sources},
        sources::SiteEngine,
        types::{
            Chapter, ContentRating, ContentState, ListingFilter, Manga, Page, SortOrder, TagRef,
        },
    };
}

// Re-export main types at crate root for direct access
pub use config::SiteConfig;
pub use date::{DateConfig, DateGrammar};
pub use error::{Error, Result};
pub use extract::ListingPage;
pub use query::{SiteRules, build_url};
pub use search::{SearchBuilder, SearchResultExt};
pub use source::{Source, Sources};
pub use sources::SiteEngine;
pub use types::{Chapter, ContentState, ListingFilter, Manga, Page, SortOrder, TagRef, stable_id};
