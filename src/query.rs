//! Declarative listing URL construction.
//!
//! Every site exposes some mix of search, author, genre and browse pages, each
//! with its own way of spelling pages, sort orders and filters. [`SiteRules`]
//! describes those differences as data and [`build_url`] turns a generic
//! [`ListingFilter`] into the one URL the site expects.
//!
//! Branch precedence is fixed: **author > search > tag > browse**. Exactly one
//! branch is used per call, and a branch whose endpoint is not configured is
//! skipped.
//!
//! # Examples
//!
//! ```rust
//! use yomikomi::query::{build_url, Endpoint, SiteRules, TagParamStyle};
//! use yomikomi::types::{ListingFilter, SortOrder, TagRef};
//!
//! let mut rules = SiteRules::new(Endpoint::new("/tim-kiem-nang-cao"));
//! rules.browse.tags = true;
//! rules.tags = Some(TagParamStyle::Repeated { name: "genre[]".into() });
//!
//! let filter = ListingFilter::default()
//!     .include_tag(TagRef::new("a", "A"))
//!     .include_tag(TagRef::new("b", "B"));
//! let url = build_url("https://example.com", 1, Some(SortOrder::Updated), &filter, &rules);
//! assert_eq!(url, "https://example.com/tim-kiem-nang-cao?page=1&genre[]=a&genre[]=b");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    types::{ContentState, ListingFilter, SortOrder},
};

/// How the page number is written into the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Pagination {
    /// `?name=N`
    Query {
        name: String,
        #[serde(default)]
        skip_first: bool,
    },
    /// A path segment such as `page/{page}/`, substituted at `{paged}` in
    /// the endpoint path or appended to it.
    Path {
        segment: String,
        #[serde(default)]
        skip_first: bool,
    },
    /// The endpoint path carries `{page}` itself, or the site has a single
    /// page.
    None,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::Query {
            name: "page".to_string(),
            skip_first: false,
        }
    }
}

/// Serialization style for a list of tag keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum TagParamStyle {
    /// `name=a&name=b`
    Repeated { name: String },
    /// `name=a,b`
    CommaJoined { name: String },
    /// `name=a_b`
    UnderscoreJoined { name: String },
}

impl TagParamStyle {
    fn write(&self, query: &mut QueryString, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let encoded: Vec<String> = values.iter().map(|v| encode(v)).collect();
        match self {
            TagParamStyle::Repeated { name } => {
                for value in &encoded {
                    query.push(name, value);
                }
            }
            TagParamStyle::CommaJoined { name } => {
                query.push(name, &encoded.join(","));
            }
            TagParamStyle::UnderscoreJoined { name } => {
                query.push(name, &encoded.join("_"));
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            TagParamStyle::Repeated { name }
            | TagParamStyle::CommaJoined { name }
            | TagParamStyle::UnderscoreJoined { name } => name,
        }
    }
}

/// Sort order mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRules {
    /// Parameter name. Without one, tokens are literal `k=v&k2=v2` fragments.
    pub param: Option<String>,
    pub default: SortOrder,
    /// Orders offered to callers. Empty means "every mapped order".
    #[serde(default)]
    pub supported: Vec<SortOrder>,
    #[serde(default)]
    pub map: BTreeMap<SortOrder, String>,
}

impl SortRules {
    pub fn new(default: SortOrder) -> Self {
        Self {
            param: None,
            default,
            supported: Vec::new(),
            map: BTreeMap::new(),
        }
    }

    fn token(&self, order: SortOrder) -> Option<&str> {
        self.map
            .get(&order)
            .or_else(|| self.map.get(&self.default))
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    fn write(&self, query: &mut QueryString, order: SortOrder) {
        let Some(token) = self.token(order) else {
            return;
        };
        match &self.param {
            Some(name) => query.push(name, &encode(token)),
            None => query.push_raw(token),
        };
    }
}

/// Publication state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRules {
    pub param: TagParamStyle,
    #[serde(default)]
    pub map: BTreeMap<ContentState, String>,
    /// Only the first mapped state is sent.
    #[serde(default)]
    pub first_only: bool,
    /// Token sent when no state is selected.
    pub default: Option<String>,
}

impl StateRules {
    fn write(&self, query: &mut QueryString, states: &[ContentState]) {
        let mut tokens: Vec<String> = states
            .iter()
            .filter_map(|s| self.map.get(s).cloned())
            .collect();
        if self.first_only {
            tokens.truncate(1);
        }
        if tokens.is_empty() {
            if let Some(default) = &self.default {
                tokens.push(default.clone());
            }
        }
        self.param.write(query, &tokens);
    }
}

/// One kind of listing page on a site.
///
/// `path` is a template relative to the site root. Recognized placeholders:
/// `{page}`, `{paged}`, `{author}`, `{tag}` and `{query}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    /// Parameter carrying the search text
    pub query_param: Option<String>,
    /// Parameter carrying the author name
    pub author_param: Option<String>,
    /// Lower-case the author name and replace spaces with `-`
    #[serde(default)]
    pub author_slug: bool,
    /// Overrides the site pagination
    pub pagination: Option<Pagination>,
    #[serde(default = "default_true")]
    pub sort: bool,
    #[serde(default)]
    pub tags: bool,
    #[serde(default)]
    pub exclusions: bool,
    #[serde(default)]
    pub states: bool,
    /// Fixed parameters, written right after the search text
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

fn default_true() -> bool {
    true
}

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query_param: None,
            author_param: None,
            author_slug: false,
            pagination: None,
            sort: true,
            tags: false,
            exclusions: false,
            states: false,
            params: Vec::new(),
        }
    }
}

/// Declarative URL rules of one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRules {
    /// Added to the caller's one-based page number
    #[serde(default)]
    pub page_offset: i32,
    #[serde(default)]
    pub pagination: Pagination,
    pub sort: SortRules,
    pub author: Option<Endpoint>,
    pub search: Option<Endpoint>,
    pub tag: Option<Endpoint>,
    pub browse: Endpoint,
    /// Browse endpoints that replace `browse` for specific orders
    #[serde(default)]
    pub browse_by_order: BTreeMap<SortOrder, Endpoint>,
    pub tags: Option<TagParamStyle>,
    pub tags_exclude: Option<TagParamStyle>,
    pub states: Option<StateRules>,
}

impl SiteRules {
    pub fn new(browse: Endpoint) -> Self {
        Self {
            page_offset: 0,
            pagination: Pagination::default(),
            sort: SortRules::new(SortOrder::Updated),
            author: None,
            search: None,
            tag: None,
            browse,
            browse_by_order: BTreeMap::new(),
            tags: None,
            tags_exclude: None,
            states: None,
        }
    }

    /// The order actually applied: the requested one when supported,
    /// otherwise the site default.
    pub fn resolve_order(&self, order: Option<SortOrder>) -> SortOrder {
        order
            .filter(|o| self.supports(*o))
            .unwrap_or(self.sort.default)
    }

    fn supports(&self, order: SortOrder) -> bool {
        if self.sort.supported.is_empty() {
            order == self.sort.default
                || self.sort.map.contains_key(&order)
                || self.browse_by_order.contains_key(&order)
        } else {
            self.sort.supported.contains(&order)
        }
    }

    /// Orders callers may request, sorted.
    pub fn sort_orders(&self) -> Vec<SortOrder> {
        let mut orders = if self.sort.supported.is_empty() {
            let mut keys: Vec<_> = self.sort.map.keys().copied().collect();
            keys.extend(self.browse_by_order.keys().copied());
            keys
        } else {
            self.sort.supported.clone()
        };
        orders.push(self.sort.default);
        orders.sort();
        orders.dedup();
        orders
    }

    /// Checks the rule table for mistakes that would only surface as broken
    /// URLs at request time.
    pub fn validate(&self) -> Result<()> {
        if !self.sort.supported.is_empty() && !self.sort.supported.contains(&self.sort.default) {
            return Err(Error::config(format!(
                "default sort order `{}` is not in the supported list",
                self.sort.default
            )));
        }
        for style in [&self.tags, &self.tags_exclude].into_iter().flatten() {
            if style.name().is_empty() {
                return Err(Error::config("tag parameter name is empty"));
            }
        }

        let endpoints = [
            ("author", self.author.as_ref()),
            ("search", self.search.as_ref()),
            ("tag", self.tag.as_ref()),
            ("browse", Some(&self.browse)),
        ];
        for (name, endpoint) in endpoints {
            if let Some(endpoint) = endpoint {
                validate_endpoint(name, endpoint, self)?;
            }
        }
        for (order, endpoint) in &self.browse_by_order {
            validate_endpoint(order.as_str(), endpoint, self)?;
        }

        if let Some(search) = &self.search {
            if search.query_param.is_none() && !search.path.contains("{query}") {
                return Err(Error::config(
                    "search endpoint needs `query_param` or a `{query}` placeholder",
                ));
            }
        }
        if let Some(author) = &self.author {
            if author.author_param.is_none() && !author.path.contains("{author}") {
                return Err(Error::config(
                    "author endpoint needs `author_param` or an `{author}` placeholder",
                ));
            }
        }
        Ok(())
    }

    fn pagination_for<'a>(&'a self, endpoint: &'a Endpoint) -> &'a Pagination {
        endpoint.pagination.as_ref().unwrap_or(&self.pagination)
    }
}

fn validate_endpoint(name: &str, endpoint: &Endpoint, rules: &SiteRules) -> Result<()> {
    if !endpoint.path.starts_with('/') {
        return Err(Error::config(format!(
            "{name} endpoint path `{}` must start with `/`",
            endpoint.path
        )));
    }
    if endpoint.tags && rules.tags.is_none() && !endpoint.path.contains("{tag}") {
        return Err(Error::config(format!(
            "{name} endpoint sends tags but no tag parameter style is configured"
        )));
    }
    if endpoint.exclusions && rules.tags_exclude.is_none() {
        return Err(Error::config(format!(
            "{name} endpoint sends exclusions but `tags_exclude` is not configured"
        )));
    }
    if endpoint.states && rules.states.is_none() {
        return Err(Error::config(format!(
            "{name} endpoint sends states but `states` is not configured"
        )));
    }
    Ok(())
}

/// The listing branch chosen for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Dedicated author endpoint
    Author,
    /// Author name sent through the search endpoint's `author_param`
    AuthorSearch,
    Search,
    Tag,
    Browse,
}

/// Picks the listing branch for `filter` following the fixed precedence.
pub fn select_branch(filter: &ListingFilter, rules: &SiteRules) -> Branch {
    if filter.author_text().is_some() {
        if rules.author.is_some() {
            return Branch::Author;
        }
        if rules
            .search
            .as_ref()
            .is_some_and(|s| s.author_param.is_some())
        {
            return Branch::AuthorSearch;
        }
    }
    if filter.query_text().is_some() && rules.search.is_some() {
        return Branch::Search;
    }
    if !filter.tags.is_empty() && rules.tag.is_some() {
        return Branch::Tag;
    }
    Branch::Browse
}

/// Builds the listing URL for one page.
///
/// `page` is one-based. Pure: the same inputs always produce the same
/// string.
pub fn build_url(
    base_url: &str,
    page: u32,
    order: Option<SortOrder>,
    filter: &ListingFilter,
    rules: &SiteRules,
) -> String {
    let order = rules.resolve_order(order);
    let branch = select_branch(filter, rules);
    let endpoint = match branch {
        Branch::Author => rules.author.as_ref(),
        Branch::AuthorSearch | Branch::Search => rules.search.as_ref(),
        Branch::Tag => rules.tag.as_ref(),
        Branch::Browse => rules.browse_by_order.get(&order),
    }
    .unwrap_or(&rules.browse);

    let number = i64::from(page) + i64::from(rules.page_offset);
    let first = page <= 1;
    let pagination = rules.pagination_for(endpoint);

    let author = filter.author_text().map(|name| {
        if endpoint.author_slug {
            encode(&slugify(name))
        } else {
            encode(name)
        }
    });
    let query_text = filter.query_text().map(encode);
    let first_tag = filter.tags.first().map(|t| encode(&t.key));

    let paged = match pagination {
        Pagination::Path { segment, skip_first } if !(first && *skip_first) => {
            segment.replace("{page}", &number.to_string())
        }
        _ => String::new(),
    };

    let mut path = endpoint
        .path
        .replace("{page}", &number.to_string())
        .replace("{author}", author.as_deref().unwrap_or_default())
        .replace("{tag}", first_tag.as_deref().unwrap_or_default())
        .replace("{query}", query_text.as_deref().unwrap_or_default());
    if path.contains("{paged}") {
        path = path.replace("{paged}", &paged);
    } else if !paged.is_empty() {
        path = join_path(&path, &paged);
    }

    let mut query = QueryString::new(format!("{}{}", base_url.trim_end_matches('/'), path));

    match branch {
        Branch::Author | Branch::AuthorSearch => {
            if let (Some(name), Some(author)) = (&endpoint.author_param, &author) {
                query.push(name, author);
            }
            if branch == Branch::AuthorSearch {
                if let Some(name) = &endpoint.query_param {
                    query.push(name, "");
                }
            }
        }
        _ => {
            if let Some(name) = &endpoint.query_param {
                query.push(name, query_text.as_deref().unwrap_or_default());
            }
        }
    }

    for (name, value) in &endpoint.params {
        query.push(name, value);
    }
    if endpoint.sort {
        rules.sort.write(&mut query, order);
    }
    if let Pagination::Query { name, skip_first } = pagination {
        if !(first && *skip_first) {
            query.push(name, &number.to_string());
        }
    }

    let tag_keys = |tags: &[crate::types::TagRef]| -> Vec<String> {
        tags.iter().map(|t| t.key.clone()).collect()
    };
    if endpoint.tags {
        if let Some(style) = &rules.tags {
            style.write(&mut query, &tag_keys(&filter.tags));
        }
    }
    if endpoint.exclusions {
        if let Some(style) = &rules.tags_exclude {
            style.write(&mut query, &tag_keys(&filter.tags_exclude));
        }
    }
    if endpoint.states {
        if let Some(states) = &rules.states {
            states.write(&mut query, &filter.states);
        }
    }

    query.finish()
}

/// Appends query parameters to a URL, owning the `?`/`&` decision.
///
/// ```rust
/// use yomikomi::query::QueryString;
///
/// let mut q = QueryString::new("https://x.test/top?limit=18");
/// q.push("page", "2");
/// assert_eq!(q.finish(), "https://x.test/top?limit=18&page=2");
/// ```
#[derive(Debug, Clone)]
pub struct QueryString {
    url: String,
}

impl QueryString {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Pushes `name=value`. The value must already be encoded.
    pub fn push(&mut self, name: &str, value: &str) -> &mut Self {
        self.separator();
        self.url.push_str(name);
        self.url.push('=');
        self.url.push_str(value);
        self
    }

    /// Pushes a literal `k=v&k2=v2` fragment.
    pub fn push_raw(&mut self, fragment: &str) -> &mut Self {
        let fragment = fragment.trim_matches(|c| c == '&' || c == '?');
        if !fragment.is_empty() {
            self.separator();
            self.url.push_str(fragment);
        }
        self
    }

    fn separator(&mut self) {
        if !self.url.contains('?') {
            self.url.push('?');
        } else if !self.url.ends_with('?') && !self.url.ends_with('&') {
            self.url.push('&');
        }
    }

    pub fn finish(self) -> String {
        self.url
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn slugify(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn join_path(path: &str, segment: &str) -> String {
    match (path.ends_with('/'), segment.starts_with('/')) {
        (true, true) => format!("{}{}", path, &segment[1..]),
        (false, false) => format!("{path}/{segment}"),
        _ => format!("{path}{segment}"),
    }
}
