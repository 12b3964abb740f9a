// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScraperConfig;
use crate::utils::errors::{ErrorKind, ScrapeError};
use std::time::Duration;

/// 重试判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// 等待指定时间后再次尝试
    RetryAfter(Duration),
    /// 放弃
    GiveUp,
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（物理请求上限为 max_retries + 1）
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
    /// 可重试的错误分类
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
            retryable: vec![ErrorKind::NetworkError, ErrorKind::RateLimited],
        }
    }
}

impl RetryPolicy {
    /// 根据抓取配置构建重试策略
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
            enable_jitter: config.jitter_factor > 0.0,
            retryable: config.retryable.clone(),
        }
    }

    /// 不等待的策略，供测试使用
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            enable_jitter: false,
            ..Self::default()
        }
    }

    /// 单个逻辑请求允许的物理请求总数
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 计算第 `attempt` 次失败之后的退避时间（attempt 从1开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && self.jitter_factor > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            if jitter_range > 0.0 {
                let jitter = rand::random_range(-jitter_range..jitter_range);
                (capped_backoff + jitter).clamp(0.0, self.max_backoff.as_secs_f64())
            } else {
                capped_backoff
            }
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff.max(0.0))
    }

    /// 是否还有剩余的物理请求预算
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    pub fn is_retryable(&self, error: &ScrapeError) -> bool {
        self.retryable.contains(&error.kind())
    }

    /// 对第 `attempt` 次物理请求的失败做出判定
    ///
    /// 不可重试的错误立即放弃，不消耗剩余预算。`retry_after` 为服务端
    /// 建议的等待时间，作为退避下限但仍受 `max_backoff` 约束
    pub fn decide(
        &self,
        attempt: u32,
        error: &ScrapeError,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if !self.is_retryable(error) || !self.should_retry(attempt) {
            return RetryDecision::GiveUp;
        }

        let mut delay = self.calculate_backoff(attempt);
        if let Some(hint) = retry_after {
            delay = delay.max(hint.min(self.max_backoff));
        }
        RetryDecision::RetryAfter(delay)
    }
}
