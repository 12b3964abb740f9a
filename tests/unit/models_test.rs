// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::json;
use std::time::Duration;
use vidscrape::domain::models::batch::BatchEntry;
use vidscrape::{
    AccessTier, BatchReport, BatchResult, ErrorKind, ErrorRecord, ResourceLink, ScrapeError,
    VideoDescriptor,
};

fn descriptor(id: &str, tier: AccessTier) -> VideoDescriptor {
    VideoDescriptor {
        id: id.to_string(),
        source_url: format!("https://v.example.com/x/page/{}.html", id),
        title: id.to_string(),
        description: String::new(),
        duration: 60,
        play_count: 0,
        publish_time: None,
        access_tier: tier,
        thumbnail_url: String::new(),
        tags: Vec::new(),
        resource_links: vec![ResourceLink::new("720p", "https://cdn.example.com/a.mp4")],
        comments: Vec::new(),
    }
}

fn failure(url: &str, kind: ErrorKind) -> BatchEntry {
    BatchEntry {
        url: url.to_string(),
        outcome: Err(ErrorRecord {
            url: url.to_string(),
            kind,
            message: kind.to_string(),
            attempt_count: 1,
        }),
    }
}

#[test]
fn test_resource_link_format_from_url() {
    assert_eq!(ResourceLink::new("1080p", "https://c.example.com/v/index.m3u8?t=1").format, "m3u8");
    assert_eq!(ResourceLink::new("720p", "https://c.example.com/v.MP4").format, "mp4");
    assert_eq!(ResourceLink::new("unknown", "https://c.example.com/play").format, "unknown");
}

#[test]
fn test_descriptor_serialization_shape() {
    let value = serde_json::to_value(descriptor("abc", AccessTier::Restricted)).unwrap();
    assert_eq!(value["access_tier"], json!("restricted"));
    assert_eq!(value["resource_links"][0]["format"], json!("mp4"));
    assert_eq!(value["publish_time"], json!(null));
}

#[test]
fn test_error_record_from_error() {
    let error = ScrapeError::NotFound {
        message: "页面不存在".to_string(),
        attempts: 2,
    };
    let record = ErrorRecord::from_error("https://v.example.com/x", &error);
    assert_eq!(record.kind, ErrorKind::NotFound);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(serde_json::to_value(&record).unwrap()["kind"], json!("not_found"));

    let cancelled = ErrorRecord::cancelled("https://v.example.com/y");
    assert_eq!(cancelled.kind, ErrorKind::Cancelled);
    assert_eq!(cancelled.attempt_count, 0);
}

#[test]
fn test_batch_report_counts() {
    let result = BatchResult::new(vec![
        BatchEntry {
            url: "u1".to_string(),
            outcome: Ok(descriptor("u1", AccessTier::Free)),
        },
        BatchEntry {
            url: "u2".to_string(),
            outcome: Ok(descriptor("u2", AccessTier::Restricted)),
        },
        failure("u3", ErrorKind::NotFound),
        failure("u4", ErrorKind::NotFound),
        failure("u5", ErrorKind::RateLimited),
    ]);

    let report = BatchReport::from_result(&result, Duration::from_secs(3));

    assert_eq!(report.total_urls, 5);
    assert_eq!(report.successful_count, 2);
    assert_eq!(report.failed_count, 3);
    assert_eq!(report.restricted_count, 1);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::NotFound), Some(&2));
    assert_eq!(report.failures_by_kind.get(&ErrorKind::RateLimited), Some(&1));
    assert!((report.success_rate - 0.4).abs() < 1e-9);
    assert!(result.get("u3").is_some_and(|outcome| outcome.is_err()));
    assert!(result.get("missing").is_none());
}

#[test]
fn test_empty_batch_report() {
    let report = BatchReport::from_result(&BatchResult::new(Vec::new()), Duration::ZERO);
    assert_eq!(report.total_urls, 0);
    assert_eq!(report.success_rate, 0.0);
    assert!(report.failures_by_kind.is_empty());
}
