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

use crate::utils::errors::{ConfigError, ErrorKind};
use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// 输出格式，仅由外部序列化组件使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Xml,
}

/// 清单中出现相同画质标签时的取舍规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTieBreak {
    /// 保留首次出现的条目
    #[default]
    FirstSeen,
    /// 保留最后出现的条目（位置仍为首次出现的位置）
    LastSeen,
    /// 全部保留
    KeepAll,
}

/// 抓取配置
///
/// 通过 [`ScraperConfig::builder`] 或 [`ScraperConfig::validated`] 构造，
/// 非法取值直接返回错误，不做静默修正
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScraperConfig {
    /// 每个主机每秒请求数
    pub rate_limit: f64,
    /// 单次请求超时（秒）
    pub timeout: f64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 是否抓取评论
    pub enable_comments: bool,
    /// 最多抓取的评论数
    pub max_comments: u32,
    /// 代理列表
    #[validate(custom(function = "validate_proxies"))]
    pub proxies: Vec<String>,
    /// 输出格式
    pub output_format: OutputFormat,
    /// 批量抓取的工作者数量
    #[validate(range(min = 1, max = 1024))]
    pub workers: usize,
    /// 令牌桶容量
    #[validate(range(min = 1))]
    pub burst: u32,
    /// 自定义 User-Agent 轮换列表，为空时使用内置列表
    pub user_agents: Vec<String>,
    /// Accept-Language 轮换列表，为空时使用内置列表
    pub accept_languages: Vec<String>,
    /// 播放清单地址模板
    #[validate(custom(function = "validate_endpoint_template"))]
    pub manifest_endpoint: String,
    /// 备用播放清单地址模板，按优先级排列
    pub alternate_manifest_endpoints: Vec<String>,
    /// 评论接口地址模板
    #[validate(custom(function = "validate_endpoint_template"))]
    pub comment_endpoint: String,
    /// 每页评论数
    #[validate(range(min = 1, max = 100))]
    pub comment_page_size: u32,
    /// 相同画质的取舍规则
    pub quality_tie_break: QualityTieBreak,
    /// 初始退避（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避（毫秒）
    pub max_backoff_ms: u64,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子
    pub jitter_factor: f64,
    /// 可重试的错误分类
    pub retryable: Vec<ErrorKind>,
    /// 批次超时（秒）
    pub batch_timeout: Option<f64>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            rate_limit: 1.0,
            timeout: 30.0,
            max_retries: 3,
            enable_comments: false,
            max_comments: 100,
            proxies: Vec::new(),
            output_format: OutputFormat::Json,
            workers: 4,
            burst: 1,
            user_agents: Vec::new(),
            accept_languages: Vec::new(),
            manifest_endpoint: "{origin}/playinfo?vid={vid}".to_string(),
            alternate_manifest_endpoints: Vec::new(),
            comment_endpoint: "{origin}/comments?vid={vid}&cursor={cursor}&count={count}"
                .to_string(),
            comment_page_size: 20,
            quality_tie_break: QualityTieBreak::FirstSeen,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable: vec![ErrorKind::NetworkError, ErrorKind::RateLimited],
            batch_timeout: None,
        }
    }
}

#[allow(clippy::ptr_arg)]
fn validate_proxies(proxies: &Vec<String>) -> Result<(), ValidationError> {
    for proxy in proxies {
        let parsed = url::Url::parse(proxy).ok();
        let valid = parsed.as_ref().is_some_and(|url| {
            matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") && url.host().is_some()
        });
        if !valid {
            let mut err = ValidationError::new("invalid_proxy");
            err.message = Some(Cow::Owned(format!("无效的代理地址: {}", proxy)));
            return Err(err);
        }
    }
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn validate_endpoint_template(template: &String) -> Result<(), ValidationError> {
    if !template.contains("{vid}") {
        let mut err = ValidationError::new("invalid_endpoint_template");
        err.message = Some(Cow::Owned(format!("地址模板缺少 {{vid}} 占位符: {}", template)));
        return Err(err);
    }
    Ok(())
}

fn check_positive_finite(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} 必须是大于0的有限数值, 实际为 {}",
            name, value
        )))
    }
}

/// 秒数还必须能表示为 [`Duration`]
fn check_seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    check_positive_finite(name, value)?;
    Duration::try_from_secs_f64(value).map_err(|e| {
        ConfigError::Invalid(format!("{} 超出可表示的时长范围 ({}): {}", name, value, e))
    })
}

impl ScraperConfig {
    pub fn builder() -> ScraperConfigBuilder {
        ScraperConfigBuilder::default()
    }

    /// 校验所有字段，成功时返回自身
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.check()?;
        Ok(self)
    }

    /// 校验所有字段
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        check_positive_finite("rate_limit", self.rate_limit)?;
        check_seconds("timeout", self.timeout)?;
        if let Some(batch_timeout) = self.batch_timeout {
            check_seconds("batch_timeout", batch_timeout)?;
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier 必须 >= 1, 实际为 {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::Invalid(format!(
                "jitter_factor 必须位于 [0, 1], 实际为 {}",
                self.jitter_factor
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "initial_backoff_ms ({}) 不能大于 max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        for template in &self.alternate_manifest_endpoints {
            validate_endpoint_template(template)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.user_agents.iter().any(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Invalid("user_agents 不能包含空字符串".to_string()));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Result<Duration, ConfigError> {
        check_seconds("timeout", self.timeout)
    }

    /// 无法表示的取值在 [`ScraperConfig::check`] 中已被拒绝，这里按不限时处理
    pub fn batch_timeout_duration(&self) -> Option<Duration> {
        self.batch_timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// [`ScraperConfig`] 构建器
#[derive(Debug, Clone, Default)]
pub struct ScraperConfigBuilder {
    inner: ScraperConfig,
}

impl ScraperConfigBuilder {
    pub fn rate_limit(mut self, rate_limit: f64) -> Self {
        self.inner.rate_limit = rate_limit;
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.inner.timeout = seconds;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.inner.max_retries = max_retries;
        self
    }

    pub fn enable_comments(mut self, enabled: bool) -> Self {
        self.inner.enable_comments = enabled;
        self
    }

    pub fn max_comments(mut self, max_comments: u32) -> Self {
        self.inner.max_comments = max_comments;
        self
    }

    pub fn proxies(mut self, proxies: Vec<String>) -> Self {
        self.inner.proxies = proxies;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.inner.output_format = format;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.inner.workers = workers;
        self
    }

    pub fn burst(mut self, burst: u32) -> Self {
        self.inner.burst = burst;
        self
    }

    pub fn user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.inner.user_agents = user_agents;
        self
    }

    pub fn manifest_endpoint(mut self, template: impl Into<String>) -> Self {
        self.inner.manifest_endpoint = template.into();
        self
    }

    pub fn alternate_manifest_endpoints(mut self, templates: Vec<String>) -> Self {
        self.inner.alternate_manifest_endpoints = templates;
        self
    }

    pub fn comment_endpoint(mut self, template: impl Into<String>) -> Self {
        self.inner.comment_endpoint = template.into();
        self
    }

    pub fn comment_page_size(mut self, size: u32) -> Self {
        self.inner.comment_page_size = size;
        self
    }

    pub fn quality_tie_break(mut self, rule: QualityTieBreak) -> Self {
        self.inner.quality_tie_break = rule;
        self
    }

    /// 设置退避参数（毫秒）
    pub fn backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.inner.initial_backoff_ms = initial_ms;
        self.inner.max_backoff_ms = max_ms;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.inner.jitter_factor = factor;
        self
    }

    pub fn retryable(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.inner.retryable = kinds;
        self
    }

    pub fn batch_timeout(mut self, seconds: f64) -> Self {
        self.inner.batch_timeout = Some(seconds);
        self
    }

    pub fn build(self) -> Result<ScraperConfig, ConfigError> {
        self.inner.validated()
    }
}

/// 应用程序配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// 抓取配置
    #[serde(default)]
    pub scraper: ScraperConfig,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 以及
    /// `VIDSCRAPE__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载并校验的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("VIDSCRAPE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scraper.proxies")
                    .with_list_parse_key("scraper.user_agents"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.scraper.check()?;
        Ok(settings)
    }

    /// 从指定文件加载配置
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings: Settings = Config::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("配置文件格式错误 {}", path.display()))?;
        settings.scraper.check()?;
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
