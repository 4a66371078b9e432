use scraper::ElementRef;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

use super::{
    HtmlListing, JsonField, JsonListing, JsonTagRule, ListingPage, ListingRule, SiteContext,
    TagRule,
};
use crate::{
    error::{Error, Result},
    net::{html, json, url},
    types::{Manga, TagRef, stable_id},
};

/// Parses one listing document fetched from `page_url`.
///
/// Zero items yields [`ListingPage::End`] only when the no-results marker or
/// the (empty) results container is present, or when a JSON item array
/// exists and is empty. Anything else is [`Error::LayoutChanged`].
pub fn parse_listing(
    rule: &ListingRule,
    body: &str,
    ctx: &SiteContext,
    page_url: &str,
) -> Result<ListingPage> {
    let (matched, items, empty_signal) = match rule {
        ListingRule::Html(rule) => parse_html(rule, body, ctx)?,
        ListingRule::Json(rule) => parse_json(rule, body, ctx)?,
    };

    if items.is_empty() {
        if matched == 0 && empty_signal {
            debug!(source = ctx.source_id, url = page_url, "listing reached the end");
            return Ok(ListingPage::End);
        }
        warn!(
            source = ctx.source_id,
            url = page_url,
            matched,
            "listing produced no items"
        );
        return Err(Error::layout_changed(ctx.source_id, page_url));
    }

    let mut seen = HashSet::new();
    let items: Vec<Manga> = items
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .collect();
    debug!(source = ctx.source_id, url = page_url, count = items.len(), "parsed listing");
    Ok(ListingPage::Items(items))
}

fn parse_html(
    rule: &HtmlListing,
    body: &str,
    ctx: &SiteContext,
) -> Result<(usize, Vec<Manga>, bool)> {
    let document = html::parse(body);
    let item_selector = html::selector(&rule.item)?;
    let (matched, items) =
        html::parse_items(&document, &item_selector, |el| html_item(rule, el, ctx));

    let empty_signal = matched == 0
        && (rule
            .empty_marker
            .as_deref()
            .is_some_and(|css| html::contains(&document, css))
            || rule
                .container
                .as_deref()
                .is_some_and(|css| html::contains(&document, css))
            || has_empty_text(&document, &rule.empty_text));

    Ok((matched, items, empty_signal))
}

fn has_empty_text(document: &scraper::Html, phrases: &[String]) -> bool {
    if phrases.is_empty() {
        return false;
    }
    let text = html::text_of(document.root_element()).to_lowercase();
    phrases
        .iter()
        .any(|phrase| text.contains(&phrase.to_lowercase()))
}

fn html_item(rule: &HtmlListing, el: ElementRef, ctx: &SiteContext) -> Option<Manga> {
    let Some(href) = rule.href.first(el) else {
        trace!(source = ctx.source_id, "listing item without link");
        return None;
    };
    let Some(title) = rule.title.first(el) else {
        trace!(source = ctx.source_id, href, "listing item without title");
        return None;
    };

    let mut manga = new_manga(&href, title, ctx);
    manga.cover_url = rule
        .cover
        .as_ref()
        .and_then(|f| f.first(el))
        .map(|c| url::to_absolute(&c, ctx.domain))
        .unwrap_or_default();
    manga.rating = rule
        .rating
        .as_ref()
        .and_then(|r| r.normalize(&r.field.first(el)?));
    manga.state = rule
        .state
        .as_ref()
        .and_then(|s| s.resolve(s.field.first(el).as_deref()));
    if let Some(authors) = &rule.authors {
        manga.authors = authors.all(el);
    }
    if let Some(tags) = &rule.tags {
        manga.tags = html_tags(tags, el);
    }
    Some(manga)
}

fn parse_json(
    rule: &JsonListing,
    body: &str,
    ctx: &SiteContext,
) -> Result<(usize, Vec<Manga>, bool)> {
    let document: Value = serde_json::from_str(body)?;

    let Some(array) = rule
        .items
        .iter()
        .find_map(|path| json::extract_array(&document, path))
    else {
        return Ok((0, Vec::new(), false));
    };

    let items = array
        .iter()
        .filter_map(|item| json_item(rule, item, ctx))
        .collect();
    Ok((array.len(), items, array.is_empty()))
}

fn json_item(rule: &JsonListing, item: &Value, ctx: &SiteContext) -> Option<Manga> {
    let href = fill_template(&rule.url, item)?;
    let title = rule.title.first(item)?;

    let mut manga = new_manga(&href, title, ctx);
    if let Some(public) = &rule.public_url {
        manga.public_url = url::to_absolute(&fill_template(public, item)?, ctx.domain);
    }
    manga.cover_url = rule
        .cover
        .as_ref()
        .and_then(|f| f.first(item))
        .map(|c| url::to_absolute(&c, ctx.domain))
        .unwrap_or_default();
    manga.description = rule.description.as_ref().and_then(|f| f.first(item));
    if let Some(alt) = &rule.alt_titles {
        manga.alt_titles = alt.all(item);
    }
    if let Some(authors) = &rule.authors {
        manga.authors = authors.all(item);
    }
    if let Some(tags) = &rule.tags {
        manga.tags = json_tags(tags, item);
    }
    manga.state = rule
        .state
        .as_ref()
        .and_then(|s| s.resolve(s.field.first(item).as_deref()));
    manga.rating = rule
        .rating
        .as_ref()
        .and_then(|r| r.normalize(&r.field.first(item)?));
    Some(manga)
}

/// Builds a bare listing item. The id is derived from the canonical
/// site-relative URL.
pub(crate) fn new_manga(href: &str, title: String, ctx: &SiteContext) -> Manga {
    let relative = url::to_relative(href, ctx.domain);
    Manga {
        id: stable_id(&relative),
        title,
        alt_titles: Vec::new(),
        public_url: url::to_absolute(&relative, ctx.domain),
        url: relative,
        cover_url: String::new(),
        rating: None,
        content_rating: ctx.content_rating,
        tags: Vec::new(),
        state: None,
        authors: Vec::new(),
        description: None,
        chapters: None,
        source_id: ctx.source_id.to_string(),
    }
}

pub(crate) fn html_tags(rule: &TagRule, scope: ElementRef) -> Vec<TagRef> {
    let Ok(sel) = html::selector(&rule.item) else {
        return Vec::new();
    };
    let tags = scope.select(&sel).filter_map(|el| {
        let key = rule.key.first(el)?;
        let title = rule.title.first(el).unwrap_or_else(|| key.clone());
        Some(TagRef::new(key, title))
    });
    unique_tags(tags)
}

pub(crate) fn json_tags(rule: &JsonTagRule, value: &Value) -> Vec<TagRef> {
    let tags = json::select_all(value, &rule.items).into_iter().filter_map(|item| {
        let key = rule.key.first(item)?;
        let title = rule.title.first(item).unwrap_or_else(|| key.clone());
        Some(TagRef::new(key, title))
    });
    unique_tags(tags)
}

pub(crate) fn unique_tags(tags: impl Iterator<Item = TagRef>) -> Vec<TagRef> {
    let mut out: Vec<TagRef> = Vec::new();
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Fills `{path}` placeholders from a JSON object. Any missing field makes
/// the whole template unusable.
pub(crate) fn fill_template(template: &str, item: &Value) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let end = rest[start..].find('}')? + start;
        out.push_str(&rest[..start]);
        out.push_str(&JsonField::path(&rest[start + 1..end]).first(item)?);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}
