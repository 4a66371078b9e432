//! Common test utilities
//!
//! Shared functionality used across all test modules.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use yomikomi::Error;
use yomikomi::net::Fetcher;

/// In-memory fetcher serving canned bodies by URL.
///
/// Every call is counted and recorded; unknown URLs answer with HTTP 404.
#[derive(Default)]
#[allow(dead_code)]
pub struct MockFetcher {
    bodies: HashMap<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    /// Every response is delayed by `delay` (tokio time, so paused clocks
    /// apply).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get_text(&self, url: &str) -> yomikomi::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.bodies.get(url).cloned().ok_or_else(|| Error::Http {
            src: "mock".to_string(),
            status: 404,
        })
    }
}

/// A small HTML site record used across tests.
#[allow(dead_code)]
pub const TEST_SITE: &str = r#"
id = "test"
name = "Test Site"
domains = ["test.example", "mirror.example"]
content_rating = "adult"

[date]
locale = "vi"

[rules.sort]
param = "sort"
default = "updated"

[rules.sort.map]
updated = "update"
popularity = "view"

[rules.tags]
style = "repeated"
name = "genre[]"

[rules.search]
path = "/tim-kiem"
query_param = "q"
tags = true

[rules.browse]
path = "/danh-sach"

[listing]
format = "html"
item = "div.list div.item"
container = "div.list"
empty_marker = "p.no-results"
href = { selector = "h3 a", attrs = ["href"] }
title = "h3 a"
cover = { selector = "img", attrs = ["data-src", "src"] }

[details]
format = "html"
description = "div.desc"

[details.state]
field = "span.status"

[details.state.map]
"Đang tiến hành" = "ongoing"
"Hoàn thành" = "finished"

[details.tags]
item = "div.genres a"

[details.chapters]
item = "ul.chapters li"
date = "span.time"
number = 'Chương\s*(\d+(?:\.\d+)?)'

[pages]
format = "html"
image = { selector = "div.reader img", attrs = ["data-src", "src"] }
skip = ["loading.gif"]

[taxonomy]
format = "html"
path = "/the-loai"

[taxonomy.tags]
item = "ul.genres a"
"#;

#[allow(dead_code)]
pub const LISTING_PAGE: &str = r#"
<html><body>
  <div class="list">
    <div class="item">
      <img data-src="//cdn.test.example/a.jpg" src="/lazy.gif">
      <h3><a href="https://test.example/truyen/truyen-a">Truyện A</a></h3>
    </div>
    <div class="item">
      <img src="/covers/b.jpg">
      <h3><a href="/truyen/truyen-b">Truyện B</a></h3>
    </div>
    <div class="item">
      <h3><a href="/truyen/truyen-a">Truyện A (again)</a></h3>
    </div>
  </div>
</body></html>
"#;

#[allow(dead_code)]
pub const EMPTY_LISTING_PAGE: &str = r#"
<html><body><div class="list"></div><p class="no-results">Không tìm thấy</p></body></html>
"#;

#[allow(dead_code)]
pub const REDESIGNED_PAGE: &str = r#"
<html><body><section class="grid"><article><a href="/truyen/x">X</a></article></section></body></html>
"#;

#[allow(dead_code)]
pub const DETAILS_PAGE: &str = r#"
<html><body>
  <div class="desc">Một câu chuyện.</div>
  <span class="status">Hoàn thành</span>
  <div class="genres"><a href="/the-loai/hanh-dong">Hành động</a><a href="/the-loai/hai-huoc/">Hài hước</a></div>
  <ul class="chapters">
    <li><a href="/truyen/truyen-a/chuong-2">Chương 2</a><span class="time">01/02/2024</span></li>
    <li><a href="/truyen/truyen-a/chuong-1">Chương 1</a><span class="time">15/01/2024</span></li>
  </ul>
</body></html>
"#;

#[allow(dead_code)]
pub const CHAPTER_PAGE: &str = r#"
<html><body><div class="reader">
  <img src="/img/loading.gif">
  <img data-src="https://img.example/1.jpg">
  <img src="/img/2.jpg">
</div></body></html>
"#;

#[allow(dead_code)]
pub const TAXONOMY_PAGE: &str = r#"
<html><body><ul class="genres">
  <a href="/the-loai/hanh-dong">Hành động</a>
  <a href="/the-loai/hai-huoc">Hài hước</a>
</ul></body></html>
"#;
