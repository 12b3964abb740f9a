// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::ScraperConfig;
use crate::engines::fingerprint::FingerprintRotator;
use crate::engines::proxy_pool::{ProxyPool, ProxyStats};
use crate::engines::rate_limiter::HostRateLimiter;
use crate::engines::traits::{FetchRequest, FetchResult, FetchStatus, PageFetcher};
use crate::utils::errors::{ConfigError, ScrapeError};
use crate::utils::retry_policy::{RetryDecision, RetryPolicy};
use crate::utils::url_utils::{host_key, origin_of, parse_target};
use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// 只检查较小的响应体，完整视频页面中出现这些词不代表被拦截
const BAN_PAGE_MAX_BYTES: usize = 4096;

const BAN_INDICATORS: &[&str] = &[
    "captcha",
    "验证码",
    "安全验证",
    "访问过于频繁",
    "访问受限",
    "请求过于频繁",
    "access denied",
    "too many requests",
    "unusual traffic",
];

/// 单次响应的分类
#[derive(Debug)]
enum ResponseClass {
    Ok,
    /// 被目标站点拦截，代理需要标记封禁
    Banned(ScrapeError),
    Failed(ScrapeError),
}

/// 页面获取客户端
///
/// 基于reqwest，负责限流、代理轮换、请求头指纹和重试。
/// 每个代理持有独立的连接池，直连客户端不读取系统代理环境变量
pub struct FetchClient {
    direct: reqwest::Client,
    proxied: Vec<reqwest::Client>,
    proxy_pool: ProxyPool,
    fingerprint: FingerprintRotator,
    rate_limiter: Arc<HostRateLimiter>,
    retry_policy: RetryPolicy,
}

impl FetchClient {
    /// 根据配置创建客户端
    pub fn new(config: &ScraperConfig) -> Result<Self, ConfigError> {
        let rate_limiter = Arc::new(HostRateLimiter::new(config.rate_limit, config.burst)?);
        Self::with_rate_limiter(config, rate_limiter)
    }

    /// 使用共享的限流器创建客户端
    pub fn with_rate_limiter(
        config: &ScraperConfig,
        rate_limiter: Arc<HostRateLimiter>,
    ) -> Result<Self, ConfigError> {
        let timeout = config.timeout_duration()?;
        let direct = build_client(timeout, None)?;
        let proxied = config
            .proxies
            .iter()
            .map(|proxy| build_client(timeout, Some(proxy)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            direct,
            proxied,
            proxy_pool: ProxyPool::new(&config.proxies),
            fingerprint: FingerprintRotator::new(&config.user_agents, &config.accept_languages),
            rate_limiter,
            retry_policy: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn proxy_stats(&self) -> ProxyStats {
        self.proxy_pool.stats()
    }

    /// 执行一次物理请求
    async fn attempt_once(&self, request: &FetchRequest, target: &Url) -> FetchResult {
        self.rate_limiter.acquire(&host_key(target)).await;

        let started = Instant::now();
        let proxy_index = self.proxy_pool.next();
        let client = proxy_index
            .and_then(|index| self.proxied.get(index))
            .unwrap_or(&self.direct);

        let referer = request
            .referer
            .clone()
            .unwrap_or_else(|| format!("{}/", origin_of(target)));
        let mut headers = self.fingerprint.next_headers(Some(&referer));
        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        let mut builder = client.get(target.clone()).headers(headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                if let Some(index) = proxy_index {
                    self.proxy_pool.record_failure(index);
                }
                return failed_result(0, transport_error(&e), None, started.elapsed());
            }
        };

        let http_status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = parse_retry_after(response.headers());

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                if let Some(index) = proxy_index {
                    self.proxy_pool.record_failure(index);
                }
                return failed_result(http_status, transport_error(&e), retry_after, started.elapsed());
            }
        };

        let class = classify_response(http_status, &body);
        if let Some(index) = proxy_index {
            match &class {
                ResponseClass::Ok => self.proxy_pool.record_success(index),
                ResponseClass::Banned(_) => self.proxy_pool.mark_banned(index),
                ResponseClass::Failed(ScrapeError::Network { .. }) => {
                    self.proxy_pool.record_failure(index)
                }
                ResponseClass::Failed(_) => {}
            }
        }

        let failure = match class {
            ResponseClass::Ok => None,
            ResponseClass::Banned(error) | ResponseClass::Failed(error) => Some(error),
        };

        FetchResult {
            status: if failure.is_none() {
                FetchStatus::Success
            } else {
                FetchStatus::Failure
            },
            body,
            http_status,
            attempt_count: 1,
            elapsed: started.elapsed(),
            content_type,
            retry_after,
            failure,
        }
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    /// 执行逻辑请求，按重试策略重复物理请求
    ///
    /// 物理请求总数不超过 `max_retries + 1`，不可重试的错误立即返回
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ScrapeError> {
        let target = parse_target(&request.url).map_err(ScrapeError::invalid)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut result = self.attempt_once(request, &target).await;
            result.attempt_count = attempt;
            counter!("vidscrape_fetch_attempts_total").increment(1);
            histogram!("vidscrape_fetch_duration_seconds").record(result.elapsed.as_secs_f64());

            let Some(error) = result.failure.take() else {
                debug!(
                    url = %request.url,
                    status = result.http_status,
                    attempt,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "请求成功"
                );
                return Ok(result);
            };

            counter!("vidscrape_fetch_failures_total", "kind" => error.kind().as_str())
                .increment(1);

            match self
                .retry_policy
                .decide(attempt, &error, result.retry_after)
            {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        url = %request.url,
                        attempt,
                        kind = %error.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "请求失败，准备重试: {}",
                        error
                    );
                    counter!("vidscrape_fetch_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        url = %request.url,
                        attempt,
                        kind = %error.kind(),
                        "请求最终失败: {}",
                        error
                    );
                    return Err(error.with_attempts(attempt));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true);

    builder = match proxy {
        Some(proxy_url) => {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ConfigError::Invalid(format!("无效的代理 {}: {}", proxy_url, e)))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("HTTP客户端创建失败: {}", e)))
}

fn transport_error(error: &reqwest::Error) -> ScrapeError {
    if error.is_timeout() {
        ScrapeError::timeout(format!("请求超时: {}", error))
    } else {
        ScrapeError::network(format!("请求失败: {}", error))
    }
}

fn failed_result(
    http_status: u16,
    error: ScrapeError,
    retry_after: Option<Duration>,
    elapsed: Duration,
) -> FetchResult {
    FetchResult {
        status: FetchStatus::Failure,
        body: Bytes::new(),
        http_status,
        attempt_count: 1,
        elapsed,
        content_type: None,
        retry_after,
        failure: Some(error),
    }
}

/// 只支持秒数形式的 Retry-After
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn looks_like_ban_page(body: &[u8]) -> bool {
    let head = &body[..body.len().min(BAN_PAGE_MAX_BYTES)];
    let text = String::from_utf8_lossy(head).to_lowercase();
    BAN_INDICATORS.iter().any(|indicator| text.contains(indicator))
}

fn classify_response(status: u16, body: &[u8]) -> ResponseClass {
    match status {
        200..=299 => {
            if body.len() <= BAN_PAGE_MAX_BYTES && looks_like_ban_page(body) {
                ResponseClass::Banned(ScrapeError::RateLimited {
                    message: "返回了人机验证页面".to_string(),
                    attempts: 1,
                })
            } else {
                ResponseClass::Ok
            }
        }
        403 | 429 | 503 => ResponseClass::Banned(ScrapeError::RateLimited {
            message: format!("HTTP {}", status),
            attempts: 1,
        }),
        404 | 410 => ResponseClass::Failed(ScrapeError::NotFound {
            message: format!("HTTP {}", status),
            attempts: 1,
        }),
        408 | 500..=599 => ResponseClass::Failed(ScrapeError::Network {
            message: format!("HTTP {}", status),
            timeout: status == 408,
            attempts: 1,
        }),
        400..=499 => ResponseClass::Failed(ScrapeError::InvalidRequest {
            message: format!("HTTP {}", status),
            attempts: 1,
        }),
        _ => ResponseClass::Failed(ScrapeError::network(format!("意外的HTTP状态 {}", status))),
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
