// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::ConfigError;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// 按主机区分的令牌桶限流器
///
/// 每个主机独立计数，容量为 `burst`，以 `rate` 个/秒的速度补充。
/// 只会延迟请求，不会丢弃请求
pub struct HostRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    rate: f64,
    burst: u32,
}

impl HostRateLimiter {
    /// 创建限流器
    ///
    /// # 参数
    ///
    /// * `rate` - 每秒请求数，必须为正的有限数
    /// * `burst` - 令牌桶容量，至少为1
    pub fn new(rate: f64, burst: u32) -> Result<Self, ConfigError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::Invalid(format!("无效的速率: {}", rate)));
        }
        let period = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|e| ConfigError::Invalid(format!("速率 {} 无法换算为间隔: {}", rate, e)))?;
        let max_burst = NonZeroU32::new(burst)
            .ok_or_else(|| ConfigError::Invalid("burst 必须大于0".to_string()))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| ConfigError::Invalid(format!("速率 {} 过大", rate)))?
            .allow_burst(max_burst);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            rate,
            burst,
        })
    }

    /// 等待直到可以向 `host` 发出请求
    pub async fn acquire(&self, host: &str) {
        let key = host.to_ascii_lowercase();
        if self.limiter.check_key(&key).is_ok() {
            return;
        }
        debug!(host = %key, rate = self.rate, "速率限制触发，等待令牌");
        self.limiter.until_key_ready(&key).await;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// 清理长时间未使用的主机状态
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
