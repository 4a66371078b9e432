//! Engine tests
//!
//! Drive a configured site end to end against an in-memory fetcher.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use yomikomi::Error;
use yomikomi::prelude::*;

mod common;
use common::{
    CHAPTER_PAGE, DETAILS_PAGE, EMPTY_LISTING_PAGE, LISTING_PAGE, MockFetcher, REDESIGNED_PAGE,
    TAXONOMY_PAGE, TEST_SITE,
};

fn config() -> SiteConfig {
    SiteConfig::from_toml_str(TEST_SITE).unwrap()
}

fn engine_with(fetcher: Arc<MockFetcher>) -> SiteEngine {
    SiteEngine::new(config()).unwrap().with_fetcher(fetcher)
}

fn browse_url(page: u32) -> String {
    SiteEngine::new(config())
        .unwrap()
        .build_url(page, None, &ListingFilter::default())
}

#[cfg(test)]
mod listing_tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_items_are_normalized() {
        let fetcher = MockFetcher::new().with_body(&browse_url(1), LISTING_PAGE).shared();
        let engine = engine_with(fetcher.clone());

        let page = engine
            .get_list_page(1, None, &ListingFilter::default())
            .await
            .unwrap();
        let items = page.items();

        // Duplicate link is dropped, first occurrence wins
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Truyện A");
        assert_eq!(items[0].url, "/truyen/truyen-a");
        assert_eq!(items[0].public_url, "https://test.example/truyen/truyen-a");
        assert_eq!(items[0].cover_url, "https://cdn.test.example/a.jpg");
        assert_eq!(items[1].cover_url, "https://test.example/covers/b.jpg");
        assert_eq!(items[0].id, yomikomi::stable_id("/truyen/truyen-a"));
        assert!(items.iter().all(|m| m.source_id == "test"));
        assert!(items.iter().all(|m| m.content_rating == ContentRating::Adult));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_listing_reads_are_identical() {
        let fetcher = MockFetcher::new().with_body(&browse_url(1), LISTING_PAGE).shared();
        let engine = engine_with(fetcher.clone());
        let filter = ListingFilter::default();

        let first = engine.get_list_page(1, None, &filter).await.unwrap();
        let second = engine.get_list_page(1, None, &filter).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.items().len(), 2);
        // Listings are not cached
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_last_page_is_end() {
        let fetcher = MockFetcher::new()
            .with_body(&browse_url(9), EMPTY_LISTING_PAGE)
            .shared();
        let engine = engine_with(fetcher);

        let page = engine
            .get_list_page(9, None, &ListingFilter::default())
            .await
            .unwrap();
        assert!(page.is_end());
        assert!(page.items().is_empty());
    }

    #[tokio::test]
    async fn test_redesigned_page_is_layout_changed() {
        let url = browse_url(1);
        let fetcher = MockFetcher::new().with_body(&url, REDESIGNED_PAGE).shared();
        let engine = engine_with(fetcher);

        let err = engine
            .get_list_page(1, None, &ListingFilter::default())
            .await
            .unwrap_err();
        match err {
            Error::LayoutChanged { src, url: at } => {
                assert_eq!(src, "test");
                assert_eq!(at, url);
            }
            other => panic!("expected LayoutChanged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mirror_keeps_ids_stable() {
        let main = engine_with(
            MockFetcher::new()
                .with_body(&browse_url(1), LISTING_PAGE)
                .shared(),
        );
        let mirror_url = browse_url(1).replace("test.example", "mirror.example");
        let mirror_page = LISTING_PAGE.replace("https://test.example", "https://mirror.example");
        let mirror = SiteEngine::new(config())
            .unwrap()
            .with_domain("mirror.example")
            .with_fetcher(MockFetcher::new().with_body(&mirror_url, &mirror_page).shared());

        let filter = ListingFilter::default();
        let a = main.get_list_page(1, None, &filter).await.unwrap().into_items();
        let b = mirror.get_list_page(1, None, &filter).await.unwrap().into_items();

        let ids = |items: &[Manga]| items.iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(b[0].public_url, "https://mirror.example/truyen/truyen-a");
    }

    #[tokio::test]
    async fn test_http_errors_keep_their_status() {
        let engine = engine_with(MockFetcher::new().shared());
        let err = engine
            .get_list_page(1, None, &ListingFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 404, .. }));
        assert!(!err.is_retryable());
    }
}

#[cfg(test)]
mod details_tests {
    use super::*;

    fn listed() -> Manga {
        Manga {
            id: yomikomi::stable_id("/truyen/truyen-a"),
            title: "Truyện A".into(),
            url: "/truyen/truyen-a".into(),
            public_url: "https://test.example/truyen/truyen-a".into(),
            cover_url: "https://cdn.test.example/a.jpg".into(),
            source_id: "test".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_details_and_chapters() {
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/truyen/truyen-a", DETAILS_PAGE)
            .shared();
        let engine = engine_with(fetcher);

        let details = engine.get_details(&listed()).await.unwrap();
        assert_eq!(details.title, "Truyện A");
        assert_eq!(details.cover_url, "https://cdn.test.example/a.jpg");
        assert_eq!(details.description.as_deref(), Some("Một câu chuyện."));
        assert_eq!(details.state, Some(ContentState::Finished));
        assert_eq!(
            details.tags.iter().map(|t| t.key.as_str()).collect::<Vec<_>>(),
            vec!["hanh-dong", "hai-huoc"]
        );

        // Reading order, dates at site-local midnight (UTC+7)
        let chapters = details.chapters.unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].url, "/truyen/truyen-a/chuong-1");
        assert_eq!(chapters[0].number, 1.0);
        assert_eq!(chapters[0].upload_date, 1_705_251_600_000);
        assert_eq!(chapters[1].number, 2.0);
        assert_eq!(chapters[1].upload_date, 1_706_720_400_000);
        assert_eq!(chapters[1].id, yomikomi::stable_id("/truyen/truyen-a/chuong-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_chapter_list_is_fetched_concurrently() {
        let text = TEST_SITE.replace(
            "[details.chapters]\n",
            "[details.chapters]\nendpoint = \"{url}/danh-sach-chuong\"\n",
        );
        let config = SiteConfig::from_toml_str(&text).unwrap();
        let (info, list) = DETAILS_PAGE
            .split_once("<ul class=\"chapters\">")
            .unwrap();
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/truyen/truyen-a", info)
            .with_body(
                "https://test.example/truyen/truyen-a/danh-sach-chuong",
                &format!("<ul class=\"chapters\">{list}"),
            )
            .with_delay(Duration::from_millis(500))
            .shared();
        let engine = SiteEngine::new(config).unwrap().with_fetcher(fetcher.clone());

        let start = tokio::time::Instant::now();
        let details = engine.get_details(&listed()).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(details.chapters.map(|c| c.len()), Some(2));
        assert_eq!(details.description.as_deref(), Some("Một câu chuyện."));
    }

    #[tokio::test]
    async fn test_chapter_list_failure_fails_details() {
        let text = TEST_SITE.replace(
            "[details.chapters]\n",
            "[details.chapters]\nendpoint = \"{url}/danh-sach-chuong\"\n",
        );
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/truyen/truyen-a", DETAILS_PAGE)
            .shared();
        let engine = SiteEngine::new(SiteConfig::from_toml_str(&text).unwrap())
            .unwrap()
            .with_fetcher(fetcher);

        let err = engine.get_details(&listed()).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_pages_skip_placeholders() {
        let chapter = Chapter {
            url: "/truyen/truyen-a/chuong-1".into(),
            ..Default::default()
        };
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/truyen/truyen-a/chuong-1", CHAPTER_PAGE)
            .shared();
        let engine = engine_with(fetcher);

        let pages = engine.get_pages(&chapter).await.unwrap();
        assert_eq!(
            pages.iter().map(|p| p.url.as_str()).collect::<Vec<_>>(),
            vec!["https://img.example/1.jpg", "https://test.example/img/2.jpg"]
        );
        assert!(pages.iter().all(|p| p.source_id == "test"));
    }
}

#[cfg(test)]
mod shared_state_tests {
    use super::*;
    use yomikomi::net::RateLimiter;

    #[tokio::test(start_paused = true)]
    async fn test_tag_list_is_fetched_once() {
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/the-loai", TAXONOMY_PAGE)
            .with_delay(Duration::from_millis(200))
            .shared();
        let engine = engine_with(fetcher.clone());

        let shared = &engine;
        let results = join_all((0..8).map(move |_| shared.available_tags())).await;

        assert_eq!(fetcher.calls(), 1);
        for tags in results {
            let tags = tags.unwrap();
            assert_eq!(tags.len(), 2);
            assert_eq!(tags[0].key, "hanh-dong");
            assert_eq!(tags[1].title, "Hài hước");
        }

        engine.available_tags().await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_tag_fetch_is_not_cached() {
        let fetcher = MockFetcher::new().shared();
        let engine = engine_with(fetcher.clone());

        assert!(engine.available_tags().await.is_err());
        assert!(engine.available_tags().await.is_err());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_limiter_is_shared_between_engines() {
        let chapter = Chapter {
            url: "/c/1".into(),
            ..Default::default()
        };
        let fetcher = MockFetcher::new()
            .with_body("https://test.example/c/1", CHAPTER_PAGE)
            .shared();
        let limiter = Arc::new(RateLimiter::new(1000));
        let a = engine_with(fetcher.clone()).with_page_limiter(limiter.clone());
        let b = engine_with(fetcher.clone()).with_page_limiter(limiter);

        let start = tokio::time::Instant::now();
        let (engines, chapter) = ([&a, &b], &chapter);
        let requests = (0..4).map(move |i| engines[i % 2].get_pages(chapter));
        let results = join_all(requests).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(fetcher.calls(), 4);
        // First request passes immediately, the other three wait a slot each
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }
}

#[cfg(test)]
mod aggregation_tests {
    use super::*;

    fn named(id: &str, fetcher: Arc<MockFetcher>) -> SiteEngine {
        let text = TEST_SITE.replace("id = \"test\"", &format!("id = \"{id}\""));
        SiteEngine::new(SiteConfig::from_toml_str(&text).unwrap())
            .unwrap()
            .with_fetcher(fetcher)
    }

    #[tokio::test]
    async fn test_flat_listing_tolerates_partial_failure() {
        let mut sources = Sources::new();
        sources.add(named(
            "good",
            MockFetcher::new().with_body(&browse_url(1), LISTING_PAGE).shared(),
        ));
        sources.add(named("broken", MockFetcher::new().shared()));
        assert_eq!(sources.list_ids(), vec!["good", "broken"]);

        let filter = ListingFilter::default();
        let flat = sources.list_all_flat(1, None, &filter).await.unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|m| m.source_id == "good"));

        let grouped = sources.list_all_grouped(1, None, &filter).await;
        assert_eq!(grouped.len(), 2);
        assert!(grouped[0].1.is_ok());
        assert!(matches!(grouped[1].1, Err(Error::Http { .. })));
    }

    #[tokio::test]
    async fn test_flat_listing_fails_when_every_source_fails() {
        let mut sources = Sources::new();
        sources.add(named("a", MockFetcher::new().shared()));
        sources.add(named("b", MockFetcher::new().shared()));

        let err = sources.search("").flatten().await.unwrap_err();
        assert!(matches!(err, Error::Other(msg) if msg.starts_with("All sources failed")));
    }

    #[tokio::test]
    async fn test_search_routes_to_search_endpoint() {
        let fetcher = MockFetcher::new().shared();
        let mut sources = Sources::new();
        sources.add(named("test", fetcher.clone()));

        let _ = sources
            .search("one piece")
            .include_tag(TagRef::new("hanh-dong", "Hành động"))
            .sort_by(SortOrder::Popularity)
            .page(2)
            .from_source("test")
            .await;

        assert_eq!(
            fetcher.requested(),
            vec!["https://test.example/tim-kiem?q=one%20piece&sort=view&page=2&genre[]=hanh-dong"]
        );
    }

    #[tokio::test]
    async fn test_adding_same_id_replaces_source() {
        let mut sources = Sources::new();
        sources.add(named("dup", MockFetcher::new().shared()));
        sources.add(named("dup", MockFetcher::new().shared()));
        assert_eq!(sources.len(), 1);
        assert!(sources.get("dup").is_some());
        assert!(sources.get("missing").is_none());
    }
}
