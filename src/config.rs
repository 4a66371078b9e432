//! Site configuration records.
//!
//! A site is fully described by one [`SiteConfig`]: its domains, request
//! headers, URL rules and extraction rules. Records are plain TOML:
//!
//! ```toml
//! id = "example"
//! name = "Example"
//! domains = ["example.com"]
//! content_rating = "adult"
//!
//! [rules.sort]
//! default = "updated"
//!
//! [rules.browse]
//! path = "/danh-sach"
//!
//! [listing]
//! format = "html"
//! item = ".item"
//! title = "h3 a"
//! ```
//!
//! Use [`SiteConfig::from_toml_str`] or [`SiteConfig::load`]; both validate the
//! record before returning it.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use crate::{
    date::DateConfig,
    error::{Error, Result},
    extract::{DetailsRule, ListingRule, PagesRule, TaxonomyRule},
    query::SiteRules,
    types::ContentRating,
};

/// Headers sent with every request to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPolicy {
    /// Send `Referer: https://{domain}/`
    #[serde(default = "default_true")]
    pub referer: bool,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            referer: true,
            user_agent: None,
            headers: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Complete description of one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    pub name: String,
    /// Known domains, the first one is the default
    pub domains: Vec<String>,
    #[serde(default)]
    pub content_rating: ContentRating,
    #[serde(default)]
    pub http: HttpPolicy,
    /// Minimum interval between chapter page requests
    pub page_interval_ms: Option<u64>,
    #[serde(default)]
    pub date: DateConfig,
    pub rules: SiteRules,
    pub listing: ListingRule,
    pub details: DetailsRule,
    pub pages: PagesRule,
    #[serde(default)]
    pub taxonomy: TaxonomyRule,
}

impl SiteConfig {
    /// Parses and validates a TOML record.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML record from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }

    pub fn default_domain(&self) -> &str {
        self.domains.first().map(String::as_str).unwrap_or_default()
    }

    /// Checks every rule set, failing on the first broken selector, pattern
    /// or URL rule.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("site id is empty"));
        }
        if self.domains.iter().all(|d| d.trim().is_empty()) {
            return Err(Error::config(format!("site `{}` has no domain", self.id)));
        }
        if let Some(domain) = self.domains.iter().find(|d| d.contains('/')) {
            return Err(Error::config(format!(
                "domain `{domain}` must be a bare host name"
            )));
        }

        let context = |e: Error| match e {
            Error::Config(msg) => Error::config(format!("{}: {msg}", self.id)),
            other => other,
        };
        self.rules.validate().map_err(context)?;
        self.listing.validate().map_err(context)?;
        self.details.validate().map_err(context)?;
        self.pages.validate().map_err(context)?;
        self.taxonomy.validate().map_err(context)?;
        Ok(())
    }

    /// Request headers for `domain`.
    pub fn request_headers(&self, domain: &str) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if self.http.referer {
            headers.push(("Referer".to_string(), format!("https://{domain}/")));
        }
        if let Some(agent) = &self.http.user_agent {
            headers.push(("User-Agent".to_string(), agent.clone()));
        }
        headers.extend(self.http.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        headers
    }
}
