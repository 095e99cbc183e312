use std::sync::Arc;
use std::time::{Duration, Instant};

use epistream_core::bootstrap::build_services;
use epistream_core::config::EndpointConfig;
use epistream_core::models::{MediaType, SchemaKind};
use epistream_core::{Config, MemoryCacheStore, NoopMetrics, ResolutionError, SourceResolver, UpstreamError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(name: &str, url: String, priority: u32, schema: SchemaKind) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        url,
        priority,
        schema,
        delivery: Default::default(),
    }
}

fn config(endpoints: Vec<EndpointConfig>) -> Config {
    let mut config = Config::default();
    config.providers.episode = endpoints;
    config.upstream.timeout_ms = 1_000;
    config.retry.max_retries = 1;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.retry.jitter = false;
    config
}

fn resolver(config: &Config) -> SourceResolver {
    build_services(config, Arc::new(MemoryCacheStore::new(100)), Arc::new(NoopMetrics))
        .unwrap()
        .resolver
}

fn primary(server: &MockServer) -> EndpointConfig {
    endpoint(
        "primary",
        format!("{}/episodes/{{id}}", server.uri()),
        0,
        SchemaKind::Primary,
    )
}

#[tokio::test]
async fn test_resolves_and_proxies_primary_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episodes/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [{"file": "http://cdn/x.m3u8", "quality": "1080p"}]
        })))
        .mount(&server)
        .await;

    let set = resolver(&config(vec![primary(&server)]))
        .resolve("abc123")
        .await
        .unwrap();

    assert_eq!(set.episode_id, "abc123");
    assert_eq!(set.provider, "primary");
    assert!(set.sources[0].url.starts_with("/proxy?url="));
    assert_eq!(set.sources[0].quality, "1080p");
    assert_eq!(set.sources[0].media_type, MediaType::Hls);

    let json = serde_json::to_value(&set.sources[0]).unwrap();
    assert_eq!(json["mediaType"], "hls");
}

#[tokio::test]
async fn test_second_resolution_within_ttl_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episodes/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Episode 1",
            "duration": 1420.5,
            "sources": [{"file": "http://cdn/x.m3u8", "quality": "1080p"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(&config(vec![primary(&server)]));
    let first = resolver.resolve("abc123").await.unwrap();
    let second = resolver.resolve("abc123").await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_all_endpoints_failing_with_5xx_is_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = config(vec![
        primary(&server),
        endpoint(
            "legacy",
            format!("{}/legacy/{{id}}", server.uri()),
            1,
            SchemaKind::Legacy,
        ),
    ]);
    let err = resolver(&config).resolve("abc123").await.unwrap_err();

    assert!(matches!(err, ResolutionError::UpstreamServerError(_)));
    assert_eq!(
        err.last_cause(),
        Some(&UpstreamError::Status {
            endpoint: "legacy".to_string(),
            status: 503
        })
    );
    // one initial request plus one retry per endpoint
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_timeouts_are_retried_with_backoff_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [{"url": "https://cdn/x.mp4"}]
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut config = config(vec![primary(&server)]);
    config.upstream.timeout_ms = 100;
    config.retry.max_retries = 3;
    config.retry.base_delay_ms = 40;
    let policy = config.retry_policy();

    let started = Instant::now();
    let set = resolver(&config).resolve("abc123").await.unwrap();

    assert_eq!(set.sources[0].media_type, MediaType::Mp4);
    // two timeouts, then the successful third request
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(started.elapsed() >= policy.delay_for(0) + policy.delay_for(1));
}

#[tokio::test]
async fn test_client_errors_fall_through_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episodes/abc123"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/legacy/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"name": "Pilot", "files": [{"link": "https://cdn/a.webm", "label": 480}]}
        })))
        .mount(&server)
        .await;

    let config = config(vec![
        primary(&server),
        endpoint(
            "legacy",
            format!("{}/legacy/{{id}}", server.uri()),
            1,
            SchemaKind::Legacy,
        ),
    ]);
    let set = resolver(&config).resolve("abc123").await.unwrap();

    assert_eq!(set.provider, "legacy");
    assert_eq!(set.title, "Pilot");
    assert_eq!(set.sources[0].quality, "480p");
    assert_eq!(set.sources[0].media_type, MediaType::Webm);
}

#[tokio::test]
async fn test_entries_without_url_are_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [
                {"quality": "720p"},
                {"file": null},
                {"file": "https://cdn/ok.mp4", "quality": "1080p"}
            ]
        })))
        .mount(&server)
        .await;

    let set = resolver(&config(vec![primary(&server)]))
        .resolve("abc123")
        .await
        .unwrap();
    assert_eq!(set.sources.len(), 1);
    assert_eq!(set.sources[0].quality, "1080p");
}

#[tokio::test]
async fn test_sources_repeating_a_field_under_two_aliases_are_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episodes/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [
                {"file": "http://cdn/x.m3u8", "url": "http://cdn/x.m3u8", "quality": "1080p"},
                {"file": "http://cdn/y.mp4", "quality": "720p", "label": "HD"}
            ]
        })))
        .mount(&server)
        .await;

    let set = resolver(&config(vec![primary(&server)]))
        .resolve("abc123")
        .await
        .unwrap();

    assert_eq!(set.sources.len(), 2);
    assert_eq!(set.sources[0].quality, "1080p");
    assert_eq!(set.sources[1].quality, "720p");
    assert_eq!(set.sources[1].media_type, MediaType::Mp4);
}

#[tokio::test]
async fn test_body_without_usable_sources_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sources": [{"quality": "720p"}]})))
        .mount(&server)
        .await;

    let err = resolver(&config(vec![primary(&server)]))
        .resolve("abc123")
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UpstreamNotFound(_)));
}

#[tokio::test]
async fn test_every_returned_url_points_at_the_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://site.example/watch/abc123",
            "sources": [
                {
                    "src": "//cdn.example/master.m3u8",
                    "captions": [
                        {"file": "/subs/en.vtt", "lang": "en", "default": true},
                        {"file": "https://subs.example/fr.vtt", "language": "fr", "label": "Français"},
                        {"lang": "de"}
                    ]
                },
                {"url": "relative/720.mp4", "resolution": "720p"}
            ]
        })))
        .mount(&server)
        .await;

    let set = resolver(&config(vec![primary(&server)]))
        .resolve("abc123")
        .await
        .unwrap();

    assert_eq!(set.sources.len(), 2);
    for source in &set.sources {
        assert!(source.url.starts_with("/proxy?url="), "{}", source.url);
        for track in &source.subtitles {
            assert!(track.url.starts_with("/proxy?url="), "{}", track.url);
        }
    }
    assert_eq!(set.sources[0].subtitles.len(), 2);
    assert!(set.sources[0].subtitles[0].is_default);
    assert_eq!(set.sources[0].subtitles[1].label, "Français");
    assert_eq!(
        set.canonical_page_url.as_deref(),
        Some("https://site.example/watch/abc123")
    );
}

#[tokio::test]
async fn test_malformed_ids_are_rejected_before_any_request() {
    let server = MockServer::start().await;
    let resolver = resolver(&config(vec![primary(&server)]));

    for id in ["", "../etc/passwd", "abc 123", "a/b"] {
        let err = resolver.resolve(id).await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidInput(_)), "{id}");
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_misses_share_one_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sources": [{"file": "https://cdn/x.m3u8"}]}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(&config(vec![primary(&server)]));
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("abc123").await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_no_configured_endpoints() {
    let err = resolver(&config(vec![])).resolve("abc123").await.unwrap_err();
    assert!(matches!(err, ResolutionError::NotConfigured(_)));
}
