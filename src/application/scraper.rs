// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::settings::ScraperConfig;
use crate::domain::models::batch::{
    BatchEntry, BatchReport, BatchResult, ErrorRecord, ItemOutcome, ScrapeRequest,
};
use crate::domain::models::video::{AccessTier, VideoDescriptor};
use crate::domain::services::access_resolver::{AccessResolver, Resolution};
use crate::domain::services::extraction_service::{check_cancelled, ExtractionPipeline};
use crate::domain::services::strategies::{RequestSigner, ResolutionContext, ResolutionStrategy};
use crate::engines::reqwest_engine::FetchClient;
use crate::engines::traits::{FetchRequest, PageFetcher};
use crate::utils::errors::{ConfigError, ErrorKind, ScrapeError};
use crate::utils::url_utils::parse_target;
use crate::workers::coordinator::ConcurrencyCoordinator;

// === Section: Statistics ===

/// 引擎累计统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub items: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub restricted: u64,
    /// 各备用策略成功解析的次数
    pub strategy_wins: BTreeMap<String, u64>,
}

#[derive(Default)]
struct StatsCounters {
    items: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    restricted: AtomicU64,
    strategy_wins: DashMap<&'static str, u64>,
}

impl StatsCounters {
    fn record(&self, outcome: &Result<Resolution, ErrorRecord>) {
        self.items.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(resolution) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                let label = if resolution.descriptor.access_tier == AccessTier::Restricted {
                    self.restricted.fetch_add(1, Ordering::Relaxed);
                    "restricted"
                } else {
                    "free"
                };
                counter!("vidscrape_items_total", "outcome" => label).increment(1);
                if let Some(strategy) = resolution.winning_strategy {
                    *self.strategy_wins.entry(strategy).or_insert(0) += 1;
                }
            }
            Err(record) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                counter!("vidscrape_items_total", "outcome" => record.kind.as_str()).increment(1);
            }
        }
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            items: self.items.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            restricted: self.restricted.load(Ordering::Relaxed),
            strategy_wins: self
                .strategy_wins
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

// === Section: Engine Definition ===

struct EngineInner {
    config: Arc<ScraperConfig>,
    fetcher: Arc<dyn PageFetcher>,
    resolver: AccessResolver,
    coordinator: ConcurrencyCoordinator,
    stats: StatsCounters,
}

/// 抓取引擎
///
/// 组合获取客户端、抽取流水线、访问解析器和并发协调器。
/// 克隆开销很小，所有克隆共享同一个限流器、代理池和统计
#[derive(Clone)]
pub struct ScraperEngine {
    inner: Arc<EngineInner>,
}

/// [`ScraperEngine`] 构建器
pub struct ScraperEngineBuilder {
    config: ScraperConfig,
    fetcher: Option<Arc<dyn PageFetcher>>,
    strategies: Option<Vec<Arc<dyn ResolutionStrategy>>>,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl ScraperEngineBuilder {
    /// 替换默认的 HTTP 获取客户端
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// 替换默认的备用解析策略列表
    pub fn strategies(mut self, strategies: Vec<Arc<dyn ResolutionStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// 启用签名请求策略
    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ScraperEngine, ConfigError> {
        let config = self.config.validated()?;
        let fetcher: Arc<dyn PageFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(FetchClient::new(&config)?),
        };
        let resolver = match self.strategies {
            Some(strategies) => AccessResolver::new(strategies),
            None => AccessResolver::with_default_strategies(self.signer),
        };

        info!(
            fetcher = fetcher.name(),
            strategies = ?resolver.strategy_names(),
            workers = config.workers,
            rate_limit = config.rate_limit,
            "抓取引擎已创建"
        );

        Ok(ScraperEngine {
            inner: Arc::new(EngineInner {
                coordinator: ConcurrencyCoordinator::new(config.workers),
                config: Arc::new(config),
                fetcher,
                resolver,
                stats: StatsCounters::default(),
            }),
        })
    }
}

// === Section: Implementation ===

impl ScraperEngine {
    /// 使用默认组件创建引擎，配置非法时返回错误
    pub fn new(config: ScraperConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ScraperConfig) -> ScraperEngineBuilder {
        ScraperEngineBuilder {
            config,
            fetcher: None,
            strategies: None,
            signer: None,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.snapshot()
    }

    /// 抓取单个视频页面
    pub async fn scrape_one(&self, url: &str) -> ItemOutcome {
        let request = ScrapeRequest::new(url, self.inner.config.clone());
        self.scrape_request(request, CancellationToken::new()).await
    }

    /// 执行一个抓取请求：获取页面，抽取，判定访问等级
    #[instrument(skip(self, request, cancel), fields(url = %request.url()))]
    pub async fn scrape_request(&self, request: ScrapeRequest, cancel: CancellationToken) -> ItemOutcome {
        let started = Instant::now();
        let outcome = self.run_pipeline(&request, &cancel).await;
        self.inner.stats.record(&outcome);

        match &outcome {
            Ok(resolution) => info!(
                tier = ?resolution.descriptor.access_tier,
                links = resolution.descriptor.resource_links.len(),
                strategy = resolution.winning_strategy.unwrap_or("-"),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "抓取成功"
            ),
            Err(record) => warn!(
                kind = %record.kind,
                attempts = record.attempt_count,
                "抓取失败: {}",
                record.message
            ),
        }

        outcome.map(|resolution| resolution.descriptor)
    }

    async fn run_pipeline(
        &self,
        request: &ScrapeRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ErrorRecord> {
        let url = request.url();
        let config = request.options();
        let fetcher = self.inner.fetcher.as_ref();

        parse_target(url)
            .map_err(ScrapeError::invalid)
            .and_then(|_| check_cancelled(cancel, "开始"))
            .map_err(|e| ErrorRecord::from_error(url, &e))?;
        let page = fetcher
            .fetch(&FetchRequest::new(url))
            .await
            .map_err(|e| ErrorRecord::from_error(url, &e))?;

        // 解析类错误不携带请求次数，沿用页面请求的次数
        let page_attempts = page.attempt_count;
        let to_record = |e: ScrapeError| {
            let mut record = ErrorRecord::from_error(url, &e);
            if e.attempts() == 0 {
                record.attempt_count = page_attempts;
            }
            record
        };

        check_cancelled(cancel, "页面获取").map_err(to_record)?;
        let body = page.text();
        let draft = ExtractionPipeline::new(config)
            .extract(fetcher, url, &body, cancel)
            .await
            .map_err(to_record)?;

        let ctx = ResolutionContext {
            fetcher,
            config,
            cancel,
        };
        self.inner
            .resolver
            .resolve_with_outcome(draft, &ctx)
            .await
            .map_err(to_record)
    }

    /// 批量抓取，结果顺序与输入一致
    pub async fn scrape_batch(&self, urls: &[String]) -> BatchResult {
        self.scrape_batch_with_cancel(urls, CancellationToken::new())
            .await
    }

    /// 可取消的批量抓取
    ///
    /// 取消或批次超时后不再派发新请求，未完成的项记为 `Cancelled`
    #[instrument(skip(self, urls, cancel), fields(total = urls.len()))]
    pub async fn scrape_batch_with_cancel(
        &self,
        urls: &[String],
        cancel: CancellationToken,
    ) -> BatchResult {
        let batch_token = cancel.child_token();
        let timer = self.inner.config.batch_timeout_duration().map(|limit| {
            let token = batch_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(timeout_secs = limit.as_secs_f64(), "批次超时，取消剩余任务");
                token.cancel();
            })
        });

        let requests = urls
            .iter()
            .map(|url| ScrapeRequest::new(url.as_str(), self.inner.config.clone()))
            .collect();
        let engine = self.clone();
        let result = self
            .inner
            .coordinator
            .run_batch(requests, batch_token, move |request, token| {
                let engine = engine.clone();
                async move { engine.scrape_request(request, token).await }
            })
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }
        result
    }

    /// 批量抓取并生成汇总报告
    pub async fn scrape_batch_with_report(&self, urls: &[String]) -> (BatchResult, BatchReport) {
        let started = Instant::now();
        let result = self.scrape_batch(urls).await;
        let report = BatchReport::from_result(&result, started.elapsed());
        info!(
            total = report.total_urls,
            succeeded = report.successful_count,
            failed = report.failed_count,
            restricted = report.restricted_count,
            "批量抓取完成"
        );
        (result, report)
    }
}

// === Section: Convenience Functions ===

fn config_error_record(url: &str, error: &ConfigError) -> ErrorRecord {
    ErrorRecord {
        url: url.to_string(),
        kind: ErrorKind::InvalidRequest,
        message: error.to_string(),
        attempt_count: 0,
    }
}

/// 使用给定配置抓取单个URL
pub async fn scrape_one(url: &str, config: &ScraperConfig) -> Result<VideoDescriptor, ErrorRecord> {
    match ScraperEngine::new(config.clone()) {
        Ok(engine) => engine.scrape_one(url).await,
        Err(e) => Err(config_error_record(url, &e)),
    }
}

/// 使用给定配置批量抓取
///
/// 配置非法时每个URL都得到一条 `InvalidRequest` 记录
pub async fn scrape_batch(urls: &[String], config: &ScraperConfig) -> BatchResult {
    match ScraperEngine::new(config.clone()) {
        Ok(engine) => engine.scrape_batch(urls).await,
        Err(e) => BatchResult::new(
            urls.iter()
                .map(|url| BatchEntry {
                    url: url.clone(),
                    outcome: Err(config_error_record(url, &e)),
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
#[path = "scraper_test.rs"]
mod tests;
