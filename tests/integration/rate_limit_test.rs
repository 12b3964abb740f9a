// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_config, MockPlatform};
use std::time::{Duration, Instant};
use vidscrape::engines::reqwest_engine::FetchClient;
use vidscrape::engines::traits::{FetchRequest, PageFetcher};

#[tokio::test]
async fn test_same_host_requests_are_spaced() {
    let platform = MockPlatform::start().await;
    platform.mount_page("rl01", "<html></html>".to_string()).await;
    let client = FetchClient::new(&test_config().rate_limit(10.0).build().unwrap()).unwrap();
    let url = platform.page_url("rl01");

    let started = Instant::now();
    for _ in 0..5 {
        let result = client.fetch(&FetchRequest::new(url.as_str())).await.unwrap();
        assert!(result.is_success());
    }

    // 首个请求立即放行，其余四个各间隔100毫秒
    assert!(started.elapsed() >= Duration::from_millis(395));
    assert_eq!(platform.page_requests("rl01").await, 5);
}

#[tokio::test]
async fn test_hosts_are_limited_independently() {
    let first = MockPlatform::start().await;
    let second = MockPlatform::start().await;
    first.mount_page("rl02", "<html></html>".to_string()).await;
    second.mount_page("rl02", "<html></html>".to_string()).await;
    let client = FetchClient::new(&test_config().rate_limit(5.0).build().unwrap()).unwrap();
    let first_url = first.page_url("rl02");
    let second_url = second.page_url("rl02");

    let started = Instant::now();
    let fetch_twice = |url: String| {
        let client = &client;
        async move {
            for _ in 0..2 {
                client.fetch(&FetchRequest::new(url.as_str())).await.unwrap();
            }
        }
    };
    futures::join!(fetch_twice(first_url), fetch_twice(second_url));

    // 共用一个令牌桶时四个请求至少需要600毫秒
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(first.page_requests("rl02").await, 2);
    assert_eq!(second.page_requests("rl02").await, 2);
}
