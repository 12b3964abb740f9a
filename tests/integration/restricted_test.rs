// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_config, video_page, MockPlatform, SignedQuery};
use std::sync::Arc;
use vidscrape::domain::services::strategies::HmacSha256Signer;
use vidscrape::{AccessTier, ErrorKind, ScraperEngine};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const EMPTY_VIP_MANIFEST: &str = r#"{"code": 0, "needVip": true, "data": {"streams": []}}"#;

#[tokio::test]
async fn test_placeholder_links_when_strategies_fail() {
    let platform = MockPlatform::start().await;
    platform.mount_vip_video("v001", "会员专享").await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("v001")).await.unwrap();

    assert_eq!(descriptor.access_tier, AccessTier::Restricted);
    assert_eq!(descriptor.resource_links.len(), 1);
    assert_eq!(
        descriptor.resource_links[0].url,
        "https://cdn.example.com/v001/trial.mp4"
    );
    assert_eq!(descriptor.title, "会员专享");
    assert!(engine.stats().strategy_wins.is_empty());
}

#[tokio::test]
async fn test_embedded_links_strategy_wins() {
    let platform = MockPlatform::start().await;
    let page = video_page("v002", "内嵌链接", true).replace(
        "<div id=\"app\"></div>",
        r#"<script>var backup = {"src": "https:\/\/cdn.example.com\/v002\/full_1080p.m3u8"};</script>"#,
    );
    platform.mount_page("v002", page).await;
    platform
        .mount_manifest("v002", super::helpers::preview_manifest("v002"))
        .await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("v002")).await.unwrap();

    assert_eq!(descriptor.access_tier, AccessTier::Restricted);
    assert_eq!(descriptor.resource_links.len(), 1);
    assert_eq!(
        descriptor.resource_links[0].url,
        "https://cdn.example.com/v002/full_1080p.m3u8"
    );
    assert_eq!(descriptor.resource_links[0].quality_label, "1080p");
    assert_eq!(engine.stats().strategy_wins.get("embedded_links"), Some(&1));
}

#[tokio::test]
async fn test_signed_request_after_other_strategies_fail() {
    let platform = MockPlatform::start().await;
    // 签名请求先挂载，优先于普通清单匹配
    Mock::given(method("GET"))
        .and(path("/playinfo"))
        .and(query_param("vid", "v003"))
        .and(SignedQuery)
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"code": 0, "data": {"streams": [
                {"definition": "fhd", "url": "https://cdn.example.com/v003/full.m3u8"}
            ]}}"#,
        ))
        .mount(&platform.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/backup"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&platform.server)
        .await;
    platform.mount_vip_video("v003", "签名").await;

    let config = test_config()
        .alternate_manifest_endpoints(vec!["{origin}/backup?vid={vid}".to_string()])
        .build()
        .unwrap();
    let engine = ScraperEngine::builder(config)
        .signer(Arc::new(HmacSha256Signer::new("k")))
        .build()
        .unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("v003")).await.unwrap();

    assert_eq!(descriptor.access_tier, AccessTier::Restricted);
    let urls: Vec<_> = descriptor
        .resource_links
        .iter()
        .map(|link| link.url.as_str())
        .collect();
    assert_eq!(urls, vec!["https://cdn.example.com/v003/full.m3u8"]);
    assert_eq!(engine.stats().strategy_wins.get("signed_request"), Some(&1));
    assert!(platform.requests_to("/backup").await >= 1);
}

#[tokio::test]
async fn test_no_obtainable_links_is_access_denied() {
    let platform = MockPlatform::start().await;
    platform
        .mount_page("v004", video_page("v004", "无链接", true))
        .await;
    platform
        .mount_manifest("v004", EMPTY_VIP_MANIFEST.to_string())
        .await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let record = engine
        .scrape_one(&platform.page_url("v004"))
        .await
        .unwrap_err();

    assert_eq!(record.kind, ErrorKind::AccessDenied);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.url, platform.page_url("v004"));
}
