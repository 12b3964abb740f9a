// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_config, MockPlatform};
use vidscrape::{scrape_one, AccessTier, ErrorKind, ScraperEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_free_video_end_to_end() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("f001", "测试动画").await;
    let config = test_config().max_retries(2).rate_limit(5.0).build().unwrap();

    let descriptor = scrape_one(&platform.page_url("f001"), &config).await.unwrap();

    assert_eq!(descriptor.id, "f001");
    assert_eq!(descriptor.source_url, platform.page_url("f001"));
    assert_eq!(descriptor.title, "测试动画");
    assert_eq!(descriptor.description, "测试动画的简介");
    assert_eq!(descriptor.duration, 24 * 60 + 10);
    assert_eq!(descriptor.play_count, 32_000);
    assert_eq!(
        descriptor.publish_time.map(|t| t.to_rfc3339()),
        Some("2024-05-20T12:00:00+00:00".to_string())
    );
    assert_eq!(descriptor.access_tier, AccessTier::Free);
    assert_eq!(descriptor.tags, vec!["动画", "剧场版"]);
    assert_eq!(
        descriptor.thumbnail_url,
        format!("{}/img/f001.jpg", platform.server.uri())
    );
    assert!(!descriptor.resource_links.is_empty());
    assert_eq!(descriptor.resource_links[0].quality_label, "1080p");
    assert_eq!(descriptor.resource_links[0].format, "m3u8");
    assert!(descriptor.comments.is_empty());

    assert!(platform.page_requests("f001").await <= 3);
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let platform = MockPlatform::start().await;
    Mock::given(method("GET"))
        .and(path("/x/page/r001.html"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&platform.server)
        .await;
    platform.mount_free_video("r001", "重试").await;
    let engine = ScraperEngine::new(test_config().max_retries(2).build().unwrap()).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("r001")).await.unwrap();
    assert_eq!(descriptor.title, "重试");
    assert_eq!(platform.page_requests("r001").await, 2);
}

#[tokio::test]
async fn test_rate_limited_page_exhausts_retries() {
    let platform = MockPlatform::start().await;
    platform.mount_page_status("b001", 429).await;
    let engine = ScraperEngine::new(test_config().max_retries(1).build().unwrap()).unwrap();

    let record = engine
        .scrape_one(&platform.page_url("b001"))
        .await
        .unwrap_err();
    assert_eq!(record.kind, ErrorKind::RateLimited);
    assert_eq!(record.attempt_count, 2);
}

#[tokio::test]
async fn test_hls_master_manifest() {
    let platform = MockPlatform::start().await;
    platform
        .mount_page("h001", super::helpers::video_page("h001", "直播回放", false))
        .await;
    platform
        .mount_manifest(
            "h001",
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
             low/index.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
             high/index.m3u8\n"
                .to_string(),
        )
        .await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("h001")).await.unwrap();
    let labels: Vec<_> = descriptor
        .resource_links
        .iter()
        .map(|l| l.quality_label.as_str())
        .collect();
    assert_eq!(labels, vec!["360p", "1080p"]);
    assert_eq!(
        descriptor.resource_links[1].url,
        format!("{}/high/index.m3u8", platform.server.uri())
    );
}

#[tokio::test]
async fn test_unrecognised_page_is_parse_error() {
    let platform = MockPlatform::start().await;
    platform
        .mount_page("p001", "<html><body><h1>页面已改版</h1></body></html>".to_string())
        .await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let record = engine
        .scrape_one(&platform.page_url("p001"))
        .await
        .unwrap_err();
    assert_eq!(record.kind, ErrorKind::ParseError);
    assert_eq!(record.attempt_count, 1);
}

#[tokio::test]
async fn test_malformed_url_is_invalid_request() {
    let config = test_config().build().unwrap();
    let record = scrape_one("ftp://example.com/video", &config)
        .await
        .unwrap_err();
    assert_eq!(record.kind, ErrorKind::InvalidRequest);
    assert_eq!(record.attempt_count, 0);
}

#[tokio::test]
async fn test_repeated_scrapes_are_identical() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("d001", "幂等").await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let first = engine.scrape_one(&platform.page_url("d001")).await.unwrap();
    let second = engine.scrape_one(&platform.page_url("d001")).await.unwrap();
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}
