// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tracing::{info, warn};

/// 连续失败多少次后跳过该代理
const FAILURE_THRESHOLD: u32 = 3;

/// 代理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    Active,
    Failed,
    Banned,
}

#[derive(Debug)]
struct ProxyEntry {
    url: String,
    consecutive_failures: AtomicU32,
    banned: AtomicBool,
}

impl ProxyEntry {
    fn status(&self) -> ProxyStatus {
        if self.banned.load(Ordering::Acquire) {
            ProxyStatus::Banned
        } else if self.consecutive_failures.load(Ordering::Acquire) >= FAILURE_THRESHOLD {
            ProxyStatus::Failed
        } else {
            ProxyStatus::Active
        }
    }
}

/// 代理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    pub banned: usize,
}

/// 代理池
///
/// 轮询选择代理，跳过失败或被封禁的代理。选择过程只做一次原子自增，
/// 不会在网络调用期间持有任何锁
#[derive(Debug)]
pub struct ProxyPool {
    proxies: Vec<ProxyEntry>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(urls: &[String]) -> Self {
        Self {
            proxies: urls
                .iter()
                .map(|url| ProxyEntry {
                    url: url.clone(),
                    consecutive_failures: AtomicU32::new(0),
                    banned: AtomicBool::new(false),
                })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// 选择下一个代理的下标
    ///
    /// 所有代理都不可用时退回到完整列表轮询
    pub fn next(&self) -> Option<usize> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }

        for _ in 0..len {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            if self.proxies[index].status() == ProxyStatus::Active {
                return Some(index);
            }
        }

        warn!("没有可用的代理，回退到完整列表轮询");
        Some(self.cursor.fetch_add(1, Ordering::Relaxed) % len)
    }

    pub fn url(&self, index: usize) -> Option<&str> {
        self.proxies.get(index).map(|p| p.url.as_str())
    }

    pub fn status(&self, index: usize) -> Option<ProxyStatus> {
        self.proxies.get(index).map(ProxyEntry::status)
    }

    pub fn record_success(&self, index: usize) {
        if let Some(proxy) = self.proxies.get(index) {
            proxy.consecutive_failures.store(0, Ordering::Release);
        }
    }

    pub fn record_failure(&self, index: usize) {
        if let Some(proxy) = self.proxies.get(index) {
            let failures = proxy.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            if failures == FAILURE_THRESHOLD {
                warn!(proxy = %proxy.url, "代理因多次失败被标记为失败");
            }
        }
    }

    pub fn mark_banned(&self, index: usize) {
        if let Some(proxy) = self.proxies.get(index) {
            if !proxy.banned.swap(true, Ordering::AcqRel) {
                warn!(proxy = %proxy.url, "检测到IP封禁，代理已被标记");
            }
        }
    }

    /// 重置代理状态
    pub fn reset(&self, index: usize) {
        if let Some(proxy) = self.proxies.get(index) {
            proxy.consecutive_failures.store(0, Ordering::Release);
            proxy.banned.store(false, Ordering::Release);
            info!(proxy = %proxy.url, "代理状态已重置");
        }
    }

    pub fn stats(&self) -> ProxyStats {
        let mut stats = ProxyStats {
            total: self.proxies.len(),
            ..ProxyStats::default()
        };
        for proxy in &self.proxies {
            match proxy.status() {
                ProxyStatus::Active => stats.active += 1,
                ProxyStatus::Failed => stats.failed += 1,
                ProxyStatus::Banned => stats.banned += 1,
            }
        }
        stats
    }
}
