//! The generic, configuration-driven site source.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::{
    config::SiteConfig,
    date::DateGrammar,
    error::Result,
    extract::{self, ListingPage, SiteContext, TaxonomyRule},
    net::{Fetcher, HttpClient, RateLimiter, url},
    query,
    source::Source,
    types::{Chapter, ListingFilter, Manga, Page, SortOrder, TagRef},
};

/// A [`Source`] driven entirely by a [`SiteConfig`].
///
/// The engine owns the per-site state: the fetcher, the resolved date
/// grammar, the tag taxonomy cache and the optional page rate limiter.
///
/// ```rust,no_run
/// use yomikomi::prelude::*;
///
/// # async fn example(config: SiteConfig) -> yomikomi::Result<()> {
/// let engine = SiteEngine::new(config)?;
/// let page = engine
///     .get_list_page(1, Some(SortOrder::Popularity), &ListingFilter::from("isekai"))
///     .await?;
/// for manga in page.items() {
///     println!("{} -> {}", manga.title, manga.public_url);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SiteEngine {
    config: SiteConfig,
    domain: String,
    dates: DateGrammar,
    fetcher: Arc<dyn Fetcher>,
    default_client: bool,
    tags: OnceCell<Vec<TagRef>>,
    page_limiter: Option<Arc<RateLimiter>>,
}

impl SiteEngine {
    /// Builds an engine on the site's default domain, fetching over HTTP.
    pub fn new(config: SiteConfig) -> Result<Self> {
        config.validate()?;
        let domain = config.default_domain().to_string();
        let page_limiter = config
            .page_interval_ms
            .map(|ms| Arc::new(RateLimiter::new(ms)));

        Ok(Self {
            fetcher: Arc::new(http_client(&config, &domain)),
            dates: config.date.grammar(),
            default_client: true,
            tags: OnceCell::new(),
            config,
            domain,
            page_limiter,
        })
    }

    /// Replaces the fetcher, e.g. with an in-memory double.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self.default_client = false;
        self
    }

    /// Switches to another (mirror) domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        if self.default_client {
            self.fetcher = Arc::new(http_client(&self.config, &self.domain));
        }
        self
    }

    /// Gates chapter page fetches through `limiter`, which may be shared
    /// with other engines.
    pub fn with_page_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.page_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.domain)
    }

    /// Listing URL for one page. See [`query::build_url`].
    pub fn build_url(&self, page: u32, order: Option<SortOrder>, filter: &ListingFilter) -> String {
        query::build_url(&self.base_url(), page, order, filter, &self.config.rules)
    }

    /// Normalizes a date string with the site's grammar.
    pub fn parse_date(&self, text: Option<&str>) -> Option<i64> {
        self.dates.parse(text)
    }

    fn context(&self) -> SiteContext<'_> {
        SiteContext {
            source_id: &self.config.id,
            domain: &self.domain,
            content_rating: self.config.content_rating,
            dates: &self.dates,
        }
    }

    fn chapters_url(&self, template: &str, manga: &Manga) -> String {
        let slug = manga
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        let path = template.replace("{url}", &manga.url).replace("{slug}", slug);
        url::to_absolute(&path, &self.domain)
    }

    async fn fetch_tags(&self) -> Result<Vec<TagRef>> {
        let Some(path) = self.config.taxonomy.path() else {
            return Ok(Vec::new());
        };
        let body = self.fetcher.get_text(&url::to_absolute(path, &self.domain)).await?;
        let tags = extract::parse_tags(&self.config.taxonomy, &body)?;
        debug!(source = %self.config.id, count = tags.len(), "loaded tag taxonomy");
        Ok(tags)
    }
}

fn http_client(config: &SiteConfig, domain: &str) -> HttpClient {
    let headers = config.request_headers(domain);
    HttpClient::new(&config.id).with_headers(
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    )
}

#[async_trait]
impl Source for SiteEngine {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn sort_orders(&self) -> Vec<SortOrder> {
        self.config.rules.sort_orders()
    }

    fn default_sort_order(&self) -> SortOrder {
        self.config.rules.sort.default
    }

    #[instrument(skip(self, filter), fields(source = %self.config.id))]
    async fn get_list_page(
        &self,
        page: u32,
        order: Option<SortOrder>,
        filter: &ListingFilter,
    ) -> Result<ListingPage> {
        let page_url = self.build_url(page, order, filter);
        debug!(url = %page_url, "fetching listing");
        let body = self.fetcher.get_text(&page_url).await?;
        extract::parse_listing(&self.config.listing, &body, &self.context(), &page_url)
    }

    #[instrument(skip(self, manga), fields(source = %self.config.id, url = %manga.url))]
    async fn get_details(&self, manga: &Manga) -> Result<Manga> {
        let details_url = url::to_absolute(&manga.url, &self.domain);
        let rule = &self.config.details;

        match rule.chapters_endpoint() {
            Some(template) => {
                let chapters_url = self.chapters_url(template, manga);
                let (body, chapters) = futures::try_join!(
                    self.fetcher.get_text(&details_url),
                    self.fetcher.get_text(&chapters_url),
                )?;
                extract::parse_details(rule, &body, Some(&chapters), manga, &self.context())
            }
            None => {
                let body = self.fetcher.get_text(&details_url).await?;
                extract::parse_details(rule, &body, None, manga, &self.context())
            }
        }
    }

    #[instrument(skip(self, chapter), fields(source = %self.config.id, url = %chapter.url))]
    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        if let Some(limiter) = &self.page_limiter {
            limiter.wait().await;
        }
        let body = self
            .fetcher
            .get_text(&url::to_absolute(&chapter.url, &self.domain))
            .await?;
        extract::parse_pages(&self.config.pages, &body, &self.context())
    }

    async fn available_tags(&self) -> Result<Vec<TagRef>> {
        match &self.config.taxonomy {
            TaxonomyRule::None => Ok(Vec::new()),
            TaxonomyRule::Static { tags } => Ok(tags.clone()),
            _ => self
                .tags
                .get_or_try_init(|| self.fetch_tags())
                .await
                .cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(extra: &str) -> SiteEngine {
        let text = format!(
            r#"
            id = "t"
            name = "T"
            domains = ["t.example", "mirror.example"]
            {extra}

            [rules.sort]
            default = "updated"

            [rules.browse]
            path = "/list"

            [listing]
            format = "html"
            item = ".item"
            title = "a"

            [details]
            format = "html"

            [details.chapters]
            item = ".chapter"

            [pages]
            format = "html"
            image = "img"
            "#
        );
        SiteEngine::new(SiteConfig::from_toml_str(&text).unwrap()).unwrap()
    }

    #[test]
    fn chapters_url_fills_placeholders() {
        let engine = engine("");
        let manga = Manga {
            url: "/truyen/abc/".into(),
            ..Default::default()
        };
        assert_eq!(
            engine.chapters_url("{url}ajax/chapters/", &manga),
            "https://t.example/truyen/abc/ajax/chapters/"
        );
        assert_eq!(
            engine.chapters_url("/api/chapters?slug={slug}", &manga),
            "https://t.example/api/chapters?slug=abc"
        );
    }

    #[test]
    fn mirror_domain_changes_urls() {
        let engine = engine("").with_domain("mirror.example");
        assert_eq!(
            engine.build_url(2, None, &ListingFilter::default()),
            "https://mirror.example/list?page=2"
        );
        assert_eq!(engine.domain(), "mirror.example");
    }

    #[test]
    fn page_interval_creates_limiter() {
        assert!(engine("").page_limiter.is_none());
        let limited = engine("page_interval_ms = 5000");
        let limiter = limited.page_limiter.as_ref().unwrap();
        assert_eq!(limiter.interval(), std::time::Duration::from_millis(5000));
    }
}
