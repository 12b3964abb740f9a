// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{free_manifest, test_config, video_page, MockPlatform};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use vidscrape::{scrape_batch, ErrorKind, ScraperEngine};

#[tokio::test]
async fn test_batch_with_missing_item() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("a001", "第一集").await;
    platform.mount_page_status("a002", 404).await;
    platform.mount_free_video("a003", "第三集").await;
    let urls = vec![
        platform.page_url("a001"),
        platform.page_url("a002"),
        platform.page_url("a003"),
    ];

    let result = scrape_batch(&urls, &test_config().build().unwrap()).await;

    assert_eq!(result.len(), 3);
    let entries = result.entries();
    assert_eq!(entries[0].outcome.as_ref().unwrap().id, "a001");
    let record = entries[1].outcome.as_ref().unwrap_err();
    assert_eq!(record.kind, ErrorKind::NotFound);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.url, urls[1]);
    assert_eq!(entries[2].outcome.as_ref().unwrap().id, "a003");
    assert_eq!(platform.page_requests("a002").await, 1);
}

#[tokio::test]
async fn test_batch_order_follows_input() {
    let platform = MockPlatform::start().await;
    let delays = [("o001", 300), ("o002", 10), ("o003", 150), ("o004", 0)];
    for (vid, delay) in delays {
        platform
            .mount_page_delayed(vid, video_page(vid, vid, false), Duration::from_millis(delay))
            .await;
        platform.mount_manifest(vid, free_manifest(vid)).await;
    }
    let urls: Vec<String> = delays.iter().map(|(vid, _)| platform.page_url(vid)).collect();
    let engine = ScraperEngine::new(test_config().workers(4).build().unwrap()).unwrap();

    let result = engine.scrape_batch(&urls).await;

    let ids: Vec<_> = result
        .successes()
        .map(|descriptor| descriptor.id.as_str())
        .collect();
    assert_eq!(ids, vec!["o001", "o002", "o003", "o004"]);
    let order: Vec<_> = result.iter().map(|entry| entry.url.clone()).collect();
    assert_eq!(order, urls);
}

#[tokio::test]
async fn test_batch_report_summary() {
    let platform = MockPlatform::start().await;
    platform.mount_free_video("s001", "免费").await;
    platform.mount_vip_video("s002", "会员").await;
    platform.mount_page_status("s003", 404).await;
    let urls = vec![
        platform.page_url("s001"),
        platform.page_url("s002"),
        platform.page_url("s003"),
        "javascript:alert(1)".to_string(),
    ];
    let engine = ScraperEngine::new(test_config().build().unwrap()).unwrap();

    let (result, report) = engine.scrape_batch_with_report(&urls).await;

    assert_eq!(result.len(), 4);
    assert_eq!(report.total_urls, 4);
    assert_eq!(report.successful_count, 2);
    assert_eq!(report.failed_count, 2);
    assert_eq!(report.restricted_count, 1);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::NotFound), Some(&1));
    assert_eq!(report.failures_by_kind.get(&ErrorKind::InvalidRequest), Some(&1));
    assert!((report.success_rate - 0.5).abs() < f64::EPSILON);

    let stats = engine.stats();
    assert_eq!(stats.items, 4);
    assert_eq!(stats.restricted, 1);
}

#[tokio::test]
async fn test_batch_workers_bound_concurrency() {
    let platform = MockPlatform::start().await;
    let vids: Vec<String> = (0..4).map(|i| format!("w00{}", i)).collect();
    for vid in &vids {
        platform
            .mount_page_delayed(vid, video_page(vid, vid, false), Duration::from_millis(200))
            .await;
        platform.mount_manifest(vid, free_manifest(vid)).await;
    }
    let urls: Vec<String> = vids.iter().map(|vid| platform.page_url(vid)).collect();
    let engine = ScraperEngine::new(test_config().workers(2).build().unwrap()).unwrap();

    let started = Instant::now();
    let result = engine.scrape_batch(&urls).await;

    assert_eq!(result.successes().count(), 4);
    // 两个工作者处理四个各需200毫秒的页面，至少需要两轮
    assert!(started.elapsed() >= Duration::from_millis(390));
}

#[tokio::test]
async fn test_batch_timeout_returns_every_entry() {
    let platform = MockPlatform::start().await;
    let vids = ["t001", "t002", "t003"];
    for vid in vids {
        platform
            .mount_page_delayed(vid, video_page(vid, vid, false), Duration::from_millis(600))
            .await;
        platform.mount_manifest(vid, free_manifest(vid)).await;
    }
    let urls: Vec<String> = vids.iter().map(|vid| platform.page_url(vid)).collect();
    let config = test_config().workers(1).batch_timeout(0.2).build().unwrap();
    let engine = ScraperEngine::new(config).unwrap();

    let started = Instant::now();
    let result = engine
        .scrape_batch_with_cancel(&urls, CancellationToken::new())
        .await;

    // 已派发的一项等页面返回后在检查点停下，其余两项从未发出请求
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.len(), 3);
    for entry in result.iter() {
        let record = entry.outcome.as_ref().unwrap_err();
        assert_eq!(record.kind, ErrorKind::Cancelled);
    }
    assert_eq!(platform.page_requests("t001").await, 1);
    assert_eq!(platform.page_requests("t002").await, 0);
    assert_eq!(platform.page_requests("t003").await, 0);
}
