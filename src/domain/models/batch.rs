// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScraperConfig;
use crate::domain::models::video::{AccessTier, VideoDescriptor};
use crate::utils::errors::{ErrorKind, ScrapeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// 抓取请求
///
/// 创建后不可修改，持有配置快照
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    url: String,
    options: Arc<ScraperConfig>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>, options: Arc<ScraperConfig>) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &ScraperConfig {
        &self.options
    }
}

/// 单项失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    pub kind: ErrorKind,
    pub message: String,
    pub attempt_count: u32,
}

impl ErrorRecord {
    pub fn from_error(url: impl Into<String>, error: &ScrapeError) -> Self {
        Self {
            url: url.into(),
            kind: error.kind(),
            message: error.to_string(),
            attempt_count: error.attempts(),
        }
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::from_error(url, &ScrapeError::Cancelled("批次已取消，未执行".to_string()))
    }
}

/// 单项结果
pub type ItemOutcome = Result<VideoDescriptor, ErrorRecord>;

/// 批量结果中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub url: String,
    pub outcome: ItemOutcome,
}

/// 批量结果
///
/// 顺序与输入顺序一致，长度恒等于输入URL数量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    /// 按URL查找第一项结果
    pub fn get(&self, url: &str) -> Option<&ItemOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.url == url)
            .map(|entry| &entry.outcome)
    }

    pub fn successes(&self) -> impl Iterator<Item = &VideoDescriptor> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().err())
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        self.entries
    }
}

impl IntoIterator for BatchResult {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// 批量任务报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_urls: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub restricted_count: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    pub total_duration: Duration,
    pub success_rate: f64,
}

impl BatchReport {
    pub fn from_result(result: &BatchResult, total_duration: Duration) -> Self {
        let successful_count = result.successes().count();
        let restricted_count = result
            .successes()
            .filter(|d| d.access_tier == AccessTier::Restricted)
            .count();

        let mut failures_by_kind = BTreeMap::new();
        for record in result.failures() {
            *failures_by_kind.entry(record.kind).or_insert(0) += 1;
        }

        let total_urls = result.len();
        Self {
            total_urls,
            successful_count,
            failed_count: total_urls - successful_count,
            restricted_count,
            failures_by_kind,
            total_duration,
            success_rate: if total_urls > 0 {
                successful_count as f64 / total_urls as f64
            } else {
                0.0
            },
        }
    }
}
