// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_config, MockPlatform};
use vidscrape::ScraperEngine;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn comment_page(prefix: &str, count: usize, next: Option<&str>) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"nick": "用户{p}{i}", "content": "第{i}条 &amp; 评论", "time": 1716206400, "up": "12"}}"#,
                p = prefix,
                i = i
            )
        })
        .collect();
    format!(
        r#"{{"code": 0, "data": {{"list": [{}], "next_cursor": "{}", "has_more": {}}}}}"#,
        items.join(","),
        next.unwrap_or(""),
        next.is_some()
    )
}

#[tokio::test]
async fn test_comments_are_paginated() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("c001", "有评论").await;
    Mock::given(method("GET"))
        .and(path("/comments"))
        .and(query_param("cursor", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(comment_page("a", 2, Some("p2"))))
        .mount(&platform.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/comments"))
        .and(query_param("cursor", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(comment_page("b", 2, None)))
        .mount(&platform.server)
        .await;
    let config = test_config()
        .enable_comments(true)
        .max_comments(10)
        .comment_page_size(2)
        .build()
        .unwrap();
    let engine = ScraperEngine::new(config).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("c001")).await.unwrap();

    let authors: Vec<_> = descriptor
        .comments
        .iter()
        .map(|comment| comment.author.as_str())
        .collect();
    assert_eq!(authors, vec!["用户a0", "用户a1", "用户b0", "用户b1"]);
    assert_eq!(descriptor.comments[0].text, "第0条 & 评论");
    assert_eq!(descriptor.comments[0].like_count, 12);
    assert!(descriptor.comments[0].timestamp.is_some());
    assert_eq!(platform.requests_to("/comments").await, 2);
}

#[tokio::test]
async fn test_comments_respect_max_limit() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("c002", "评论上限").await;
    Mock::given(method("GET"))
        .and(path("/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_string(comment_page("x", 5, Some("next"))))
        .mount(&platform.server)
        .await;
    let config = test_config()
        .enable_comments(true)
        .max_comments(3)
        .build()
        .unwrap();
    let engine = ScraperEngine::new(config).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("c002")).await.unwrap();

    assert_eq!(descriptor.comments.len(), 3);
    assert_eq!(platform.requests_to("/comments").await, 1);
}

#[tokio::test]
async fn test_comment_failure_keeps_video() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("c003", "评论失败").await;
    Mock::given(method("GET"))
        .and(path("/comments"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&platform.server)
        .await;
    let config = test_config()
        .enable_comments(true)
        .max_comments(50)
        .build()
        .unwrap();
    let engine = ScraperEngine::new(config).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("c003")).await.unwrap();

    assert_eq!(descriptor.title, "评论失败");
    assert!(descriptor.comments.is_empty());
    assert!(!descriptor.resource_links.is_empty());
}

#[tokio::test]
async fn test_comments_disabled_makes_no_requests() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("c004", "未开启").await;
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let descriptor = engine.scrape_one(&platform.page_url("c004")).await.unwrap();

    assert!(descriptor.comments.is_empty());
    assert_eq!(platform.requests_to("/comments").await, 0);
}
