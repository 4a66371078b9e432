use scraper::Html;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace};

use super::{
    DetailsRule, HtmlChapters, HtmlDetails, JsonChapters, JsonDetails, PagesRule, SiteContext,
    TaxonomyRule, field,
    listing::{fill_template, html_tags, json_tags, unique_tags},
};
use crate::{
    error::{Error, Result},
    net::{html, json, url},
    types::{Chapter, ContentState, Manga, Page, TagRef, stable_id},
};

/// Parses a details document into an updated copy of `manga`.
///
/// When the chapter list lives in a separate document its body is passed as
/// `chapters_body`, otherwise chapters are read from `body`. Fields the rule
/// does not cover, or that are missing from the page, keep the listing
/// values.
pub fn parse_details(
    rule: &DetailsRule,
    body: &str,
    chapters_body: Option<&str>,
    manga: &Manga,
    ctx: &SiteContext,
) -> Result<Manga> {
    let mut details = match rule {
        DetailsRule::Html(rule) => html_details(rule, body, manga, ctx)?,
        DetailsRule::Json(rule) => json_details(rule, body, manga, ctx)?,
    };
    let chapters = parse_chapters(rule, chapters_body.unwrap_or(body), ctx)?;
    if let (Some(marker), Some(newest)) = (rule.finished_marker(), chapters.last()) {
        if newest.title.to_lowercase().contains(&marker.to_lowercase()) {
            details.state = Some(ContentState::Finished);
        }
    }
    debug!(
        source = ctx.source_id,
        url = %manga.url,
        chapters = chapters.len(),
        "parsed details"
    );
    details.chapters = Some(chapters);
    Ok(details)
}

/// Parses a chapter list in reading order (oldest first).
pub fn parse_chapters(rule: &DetailsRule, body: &str, ctx: &SiteContext) -> Result<Vec<Chapter>> {
    match rule {
        DetailsRule::Html(rule) => html_chapters(&rule.chapters, &html::parse(body), ctx),
        DetailsRule::Json(rule) => {
            let document: Value = serde_json::from_str(body)?;
            json_chapters(&rule.chapters, &document, ctx)
        }
    }
}

fn html_details(rule: &HtmlDetails, body: &str, manga: &Manga, ctx: &SiteContext) -> Result<Manga> {
    let document = html::parse(body);
    let root = document.root_element();
    let mut out = manga.clone();

    if let Some(title) = rule.title.as_ref().and_then(|f| f.first(root)) {
        out.title = title;
    }
    if let Some(description) = rule.description.as_ref().and_then(|f| f.first(root)) {
        out.description = Some(description);
    }
    if let Some(cover) = rule.cover.as_ref().and_then(|f| f.first(root)) {
        out.cover_url = url::to_absolute(&cover, ctx.domain);
    }
    if let Some(alt) = &rule.alt_titles {
        let titles = alt.collect(alt.field.all(root));
        if !titles.is_empty() {
            out.alt_titles = titles;
        }
    }
    if let Some(authors) = &rule.authors {
        let names = authors.collect(authors.field.all(root));
        if !names.is_empty() {
            out.authors = names;
        }
    }
    if let Some(tags) = &rule.tags {
        let tags = html_tags(tags, root);
        if !tags.is_empty() {
            out.tags = tags;
        }
    }
    if let Some(state) = &rule.state {
        out.state = state.resolve(state.field.first(root).as_deref()).or(out.state);
    }
    if let Some(rating) = &rule.rating {
        out.rating = rating
            .field
            .first(root)
            .and_then(|raw| rating.normalize(&raw))
            .or(out.rating);
    }
    Ok(out)
}

fn json_details(rule: &JsonDetails, body: &str, manga: &Manga, ctx: &SiteContext) -> Result<Manga> {
    let document: Value = serde_json::from_str(body)?;
    let root = json::select(&document, &rule.root)
        .ok_or_else(|| Error::parse(format!("details object `{}` not found", rule.root)))?;
    let mut out = manga.clone();

    if let Some(title) = rule.title.as_ref().and_then(|f| f.first(root)) {
        out.title = title;
    }
    if let Some(description) = rule.description.as_ref().and_then(|f| f.first(root)) {
        out.description = Some(description);
    }
    if let Some(cover) = rule.cover.as_ref().and_then(|f| f.first(root)) {
        out.cover_url = url::to_absolute(&cover, ctx.domain);
    }
    if let Some(alt) = &rule.alt_titles {
        let titles = alt.collect(alt.field.all(root));
        if !titles.is_empty() {
            out.alt_titles = titles;
        }
    }
    if let Some(authors) = &rule.authors {
        let names = authors.collect(authors.field.all(root));
        if !names.is_empty() {
            out.authors = names;
        }
    }
    if let Some(tags) = &rule.tags {
        let tags = json_tags(tags, root);
        if !tags.is_empty() {
            out.tags = tags;
        }
    }
    if let Some(state) = &rule.state {
        out.state = state.resolve(state.field.first(root).as_deref()).or(out.state);
    }
    if let Some(rating) = &rule.rating {
        out.rating = rating
            .field
            .first(root)
            .and_then(|raw| rating.normalize(&raw))
            .or(out.rating);
    }
    Ok(out)
}

/// A chapter as read from the document, before numbering and date parsing.
struct RawChapter {
    href: String,
    title: Option<String>,
    date: Option<String>,
    number: Option<f32>,
    scanlator: Option<String>,
}

fn html_chapters(rule: &HtmlChapters, document: &Html, ctx: &SiteContext) -> Result<Vec<Chapter>> {
    let item = html::selector(&rule.item)?;
    let number = rule.number.as_deref().map(field::pattern).transpose()?;
    let root = document.root_element();
    let scanlator = rule.scanlator.as_ref().and_then(|f| f.first(root));

    let raw = document
        .select(&item)
        .filter_map(|el| {
            let href = rule.href.first(el)?;
            let title = rule.title.first(el);
            let number = number
                .as_ref()
                .zip(title.as_deref())
                .and_then(|(re, title)| parse_number(re.captures(title)?.get(1)?.as_str()));
            Some(RawChapter {
                href,
                title,
                date: rule.date.as_ref().and_then(|f| f.first(el)),
                number,
                scanlator: scanlator.clone(),
            })
        })
        .collect();

    Ok(finish_chapters(raw, rule.newest_first, ctx))
}

fn json_chapters(rule: &JsonChapters, document: &Value, ctx: &SiteContext) -> Result<Vec<Chapter>> {
    let Some(items) = rule
        .items
        .iter()
        .find_map(|path| json::extract_array(document, path))
    else {
        trace!(source = ctx.source_id, "no chapter array in document");
        return Ok(Vec::new());
    };

    let raw = items
        .iter()
        .filter_map(|item| {
            Some(RawChapter {
                href: fill_template(&rule.url, item)?,
                title: rule.title.first(item),
                date: rule.date.as_ref().and_then(|f| f.first(item)),
                number: rule
                    .number
                    .as_ref()
                    .and_then(|f| f.first(item))
                    .and_then(|n| parse_number(&n)),
                scanlator: rule.scanlator.as_ref().and_then(|f| f.first(item)),
            })
        })
        .collect();

    Ok(finish_chapters(raw, rule.newest_first, ctx))
}

/// Puts chapters in reading order, drops duplicate URLs and fills in
/// numbers, titles and dates. Entries without a readable number are numbered
/// by their reading-order position starting at 1.
fn finish_chapters(mut raw: Vec<RawChapter>, newest_first: bool, ctx: &SiteContext) -> Vec<Chapter> {
    if newest_first {
        raw.reverse();
    }

    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|entry| (url::to_relative(&entry.href, ctx.domain), entry))
        .filter(|(relative, _)| seen.insert(relative.clone()))
        .enumerate()
        .map(|(index, (relative, entry))| {
            let number = entry.number.unwrap_or((index + 1) as f32);
            Chapter {
                id: stable_id(&relative),
                title: entry.title.unwrap_or_else(|| format_number(number)),
                number,
                url: relative,
                upload_date: ctx.dates.parse(entry.date.as_deref()).unwrap_or(0),
                scanlator: entry.scanlator,
                source_id: ctx.source_id.to_string(),
            }
        })
        .collect()
}

fn parse_number(text: &str) -> Option<f32> {
    text.trim()
        .replace(',', ".")
        .parse::<f32>()
        .ok()
        .filter(|n| n.is_finite())
}

fn format_number(number: f32) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// Parses the page images of a chapter, resolved to absolute URLs.
pub fn parse_pages(rule: &PagesRule, body: &str, ctx: &SiteContext) -> Result<Vec<Page>> {
    let urls: Vec<String> = match rule {
        PagesRule::Html { image, skip } => {
            let document = html::parse(body);
            image
                .all(document.root_element())
                .into_iter()
                .filter(|src| !skip.iter().any(|s| src.contains(s.as_str())))
                .collect()
        }
        PagesRule::Json { items, url } => {
            let document: Value = serde_json::from_str(body)?;
            if items.is_empty() {
                url.all(&document)
            } else {
                items
                    .iter()
                    .find_map(|path| json::extract_array(&document, path))
                    .map(|array| array.iter().filter_map(|item| url.first(item)).collect())
                    .unwrap_or_default()
            }
        }
    };

    let mut seen = HashSet::new();
    Ok(urls
        .into_iter()
        .map(|src| url::to_absolute(&src, ctx.domain))
        .filter(|src| !src.is_empty() && seen.insert(src.clone()))
        .map(|src| Page {
            id: stable_id(&src),
            url: src,
            source_id: ctx.source_id.to_string(),
        })
        .collect())
}

/// Parses the site's tag list from a fetched taxonomy document.
///
/// Static lists are returned as configured and `None` gives an empty list.
pub fn parse_tags(rule: &TaxonomyRule, body: &str) -> Result<Vec<TagRef>> {
    match rule {
        TaxonomyRule::None => Ok(Vec::new()),
        TaxonomyRule::Static { tags } => Ok(unique_tags(tags.iter().cloned())),
        TaxonomyRule::Html { tags, .. } => {
            let document = html::parse(body);
            Ok(html_tags(tags, document.root_element()))
        }
        TaxonomyRule::Json { tags, .. } => {
            let document: Value = serde_json::from_str(body)?;
            Ok(json_tags(tags, &document))
        }
    }
}
