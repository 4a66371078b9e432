//! HTML parsing utilities built on `scraper`.
//!
//! Listing pages are parsed item by item in parallel with `rayon`. Parsed
//! documents are not `Send`, so each matched element is serialized back to
//! HTML and re-parsed as a fragment on the worker thread.
//!
//! # Examples
//!
//! ```rust
//! use yomikomi::net::html;
//!
//! let document = html::parse(r#"<div class="item"><h3> One   Piece </h3></div>"#);
//! let sel = html::selector(".item").unwrap();
//! let (matched, titles) = html::parse_items(&document, &sel, |el| {
//!     Some(html::text_of(el))
//! });
//! assert_eq!(matched, 1);
//! assert_eq!(titles, vec!["One Piece".to_string()]);
//! ```

use once_cell::sync::Lazy;
use rayon::prelude::*;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Selectors compiled so far, keyed by their source text.
static SELECTORS: Lazy<RwLock<HashMap<String, Arc<Selector>>>> = Lazy::new(Default::default);

/// Parses an HTML document from a string.
pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// Compiles a CSS selector, reporting invalid ones as configuration errors.
///
/// Each distinct selector is compiled once per process; later calls share
/// the compiled form.
pub fn selector(css: &str) -> Result<Arc<Selector>> {
    if let Some(cached) = SELECTORS.read().ok().and_then(|cache| cache.get(css).cloned()) {
        return Ok(cached);
    }
    let compiled = Arc::new(
        Selector::parse(css).map_err(|e| Error::config(format!("invalid selector `{css}`: {e}")))?,
    );
    if let Ok(mut cache) = SELECTORS.write() {
        cache.insert(css.to_string(), Arc::clone(&compiled));
    }
    Ok(compiled)
}

/// Text content of an element with whitespace runs collapsed.
///
/// Text nodes of sibling elements are kept apart, so `<a>Chương 1</a><span>
/// 15/01/2024</span>` reads `Chương 1 15/01/2024`.
pub fn text_of(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `true` when at least one element matches `css`.
///
/// Invalid selectors never match.
pub fn contains(document: &Html, css: &str) -> bool {
    selector(css)
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false)
}

/// Parses every element matching `selector` in parallel.
///
/// Returns the number of matched elements alongside the parsed values, so
/// callers can tell "nothing matched" from "everything was skipped". Output
/// keeps document order.
pub fn parse_items<T, F>(document: &Html, selector: &Selector, parser: F) -> (usize, Vec<T>)
where
    T: Send,
    F: Fn(ElementRef) -> Option<T> + Sync,
{
    let elements: Vec<String> = document.select(selector).map(|el| el.html()).collect();
    let matched = elements.len();

    let items = elements
        .into_par_iter()
        .filter_map(|html_str| {
            let fragment = Html::parse_fragment(&html_str);
            let element = fragment.root_element().child_elements().next()?;
            parser(element)
        })
        .collect();

    (matched, items)
}
