use std::sync::Arc;

use epistream_core::bootstrap::build_services;
use epistream_core::config::EndpointConfig;
use epistream_core::models::{
    Capability, CapabilityPayload, CapabilityRequest, Delivery, SchemaKind,
};
use epistream_core::{CapabilityAggregator, Config, MemoryCacheStore, NoopMetrics, ResolutionError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(name: &str, url: String, priority: u32) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        url,
        priority,
        schema: SchemaKind::Primary,
        delivery: Delivery::Json,
    }
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.upstream.timeout_ms = 1_000;
    config.retry.max_retries = 0;
    config.retry.jitter = false;
    config
}

fn aggregator(config: &Config) -> CapabilityAggregator {
    build_services(config, Arc::new(MemoryCacheStore::new(100)), Arc::new(NoopMetrics))
        .unwrap()
        .aggregator
}

fn request() -> CapabilityRequest {
    CapabilityRequest::new("naruto", "12")
}

#[tokio::test]
async fn test_qualities_come_from_the_first_working_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary/qualities/naruto/12"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/legacy/qualities"))
        .and(query_param("anime", "naruto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"qualities": [1080, "720p"]}})))
        .mount(&server)
        .await;

    let mut config = base_config();
    let mut legacy = endpoint(
        "legacy",
        format!("{}/legacy/qualities?anime={{anime_id}}&ep={{episode}}", server.uri()),
        1,
    );
    legacy.schema = SchemaKind::Legacy;
    config.providers.qualities = vec![
        endpoint("primary", format!("{}/primary/qualities/{{anime_id}}/{{episode}}", server.uri()), 0),
        legacy,
    ];

    let result = aggregator(&config)
        .get_capability(Capability::Qualities, &request())
        .await
        .unwrap();

    assert_eq!(result.source, "legacy");
    assert_eq!(
        result.payload,
        CapabilityPayload::Qualities(vec!["1080p".to_string(), "720p".to_string()])
    );
}

#[tokio::test]
async fn test_qualities_have_no_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut config = base_config();
    config.providers.qualities = vec![endpoint("primary", format!("{}/q/{{anime_id}}", server.uri()), 0)];

    let err = aggregator(&config)
        .get_capability(Capability::Qualities, &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UpstreamServerError(_)));
}

#[tokio::test]
async fn test_voices_fall_back_to_static_default_and_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"voices": [{"name": "japanese"}]})))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut config = base_config();
    config.providers.voices = vec![endpoint("primary", format!("{}/voices/{{anime_id}}", server.uri()), 0)];
    let aggregator = aggregator(&config);

    let first = aggregator.get_capability(Capability::Voices, &request()).await.unwrap();
    assert!(first.is_fallback());
    assert_eq!(
        first.payload,
        CapabilityPayload::Voices(vec!["original".to_string(), "english".to_string()])
    );

    let second = aggregator.get_capability(Capability::Voices, &request()).await.unwrap();
    assert_eq!(second.source, "primary");
    assert_eq!(second.payload, CapabilityPayload::Voices(vec!["japanese".to_string()]));
}

#[tokio::test]
async fn test_voices_without_configured_fallback_propagate_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = base_config();
    config.providers.voices_fallback = None;
    config.providers.voices = vec![endpoint("primary", format!("{}/voices/{{anime_id}}", server.uri()), 0)];

    let err = aggregator(&config)
        .get_capability(Capability::Voices, &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UpstreamNotFound(_)));
}

#[tokio::test]
async fn test_subtitles_are_cached_per_language() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subtitles": [{"url": "https://subs.example/en.vtt", "lang": "en", "label": "English"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("lang", "fr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subtitles": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = base_config();
    config.providers.subtitles = vec![endpoint(
        "primary",
        format!("{}/subs/{{anime_id}}/{{episode}}?lang={{language}}", server.uri()),
        0,
    )];
    let aggregator = aggregator(&config);

    let en = request().with_language(Some("en".to_string()));
    let fr = request().with_language(Some("fr".to_string()));

    let first = aggregator.get_capability(Capability::Subtitles, &en).await.unwrap();
    let again = aggregator.get_capability(Capability::Subtitles, &en).await.unwrap();
    assert_eq!(first, again);
    let CapabilityPayload::Subtitles(tracks) = &first.payload else {
        panic!("expected subtitles");
    };
    assert!(tracks[0].url.starts_with("/proxy?url="));
    assert_eq!(tracks[0].label, "English");

    let french = aggregator.get_capability(Capability::Subtitles, &fr).await.unwrap();
    assert_eq!(french.payload, CapabilityPayload::Subtitles(vec![]));
    assert_eq!(french.source, "primary");
}

#[tokio::test]
async fn test_stream_url_is_proxied_and_keeps_delivery_mode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("quality", "720p"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "video_url": "https://cdn.example/s/720.m3u8"
        })))
        .mount(&server)
        .await;

    let mut config = base_config();
    let mut piped = endpoint(
        "direct",
        format!("{}/stream/{{anime_id}}/{{episode}}?quality={{quality}}&voice={{voice}}", server.uri()),
        0,
    );
    piped.delivery = Delivery::Pipe;
    config.providers.stream = vec![piped];

    let req = request()
        .with_quality(Some("720p".to_string()))
        .with_voice(Some("english".to_string()));
    let result = aggregator(&config)
        .get_capability(Capability::Stream, &req)
        .await
        .unwrap();

    let CapabilityPayload::Stream(info) = result.payload else {
        panic!("expected stream");
    };
    assert!(info.video_url.starts_with("/proxy?url=https%3A%2F%2Fcdn.example"));
    assert_eq!(info.upstream_url, "https://cdn.example/s/720.m3u8");
    assert_eq!(info.quality, "720p");
    assert_eq!(info.voice, "english");
    assert_eq!(info.delivery, Delivery::Pipe);
}

#[tokio::test]
async fn test_stream_quality_and_voice_are_cached_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://cdn.example/s/main.m3u8"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = base_config();
    config.providers.stream = vec![endpoint(
        "primary",
        format!("{}/stream/{{anime_id}}/{{episode}}?quality={{quality}}&voice={{voice}}", server.uri()),
        0,
    )];
    let aggregator = aggregator(&config);

    let by_quality = request().with_quality(Some("dub".to_string()));
    let first = aggregator.get_capability(Capability::Stream, &by_quality).await.unwrap();
    let by_voice = request().with_voice(Some("dub".to_string()));
    let second = aggregator.get_capability(Capability::Stream, &by_voice).await.unwrap();

    let (CapabilityPayload::Stream(first), CapabilityPayload::Stream(second)) =
        (first.payload, second.payload)
    else {
        panic!("expected stream payloads");
    };
    assert_eq!(first.quality, "dub");
    assert_eq!(second.voice, "dub");
    assert_ne!(second.quality, "dub");
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let aggregator = aggregator(&base_config());

    let err = aggregator
        .get_capability(Capability::Qualities, &CapabilityRequest::new("", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidInput(_)));

    let err = aggregator
        .get_capability(
            Capability::Subtitles,
            &request().with_language(Some("<script>".to_string())),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidInput(_)));

    let err = aggregator
        .get_capability(Capability::Sources, &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidInput(_)));
}

#[tokio::test]
async fn test_subtitles_fall_back_to_empty_list() {
    let mut config = base_config();
    config.providers.subtitles = vec![endpoint("dead", "http://127.0.0.1:9/subs/{anime_id}".to_string(), 0)];

    let result = aggregator(&config)
        .get_capability(Capability::Subtitles, &request())
        .await
        .unwrap();
    assert!(result.is_fallback());
    assert_eq!(result.payload, CapabilityPayload::Subtitles(vec![]));
}
