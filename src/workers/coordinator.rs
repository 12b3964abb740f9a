// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::batch::{BatchEntry, BatchResult, ErrorRecord, ItemOutcome, ScrapeRequest};
use crate::utils::errors::ScrapeError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 并发协调器
///
/// 用信号量限制同时执行的抓取项数量，结果按输入位置写入预先分配的槽位，
/// 因此返回顺序与输入顺序一致，与完成顺序无关
#[derive(Debug, Clone)]
pub struct ConcurrencyCoordinator {
    workers: usize,
}

impl ConcurrencyCoordinator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 执行一个批次
    ///
    /// 每个请求调用一次 `job`。单项失败只记录在对应槽位，不会中止批次。
    /// 取消后不再派发新请求，未派发的槽位记为已取消；已派发的请求照常收尾，
    /// 在下一个阶段检查点返回取消或直接返回自身结果
    pub async fn run_batch<F, Fut>(
        &self,
        requests: Vec<ScrapeRequest>,
        cancel: CancellationToken,
        job: F,
    ) -> BatchResult
    where
        F: Fn(ScrapeRequest, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome> + Send + 'static,
    {
        let total = requests.len();
        let urls: Vec<String> = requests.iter().map(|r| r.url().to_string()).collect();
        let mut slots: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();

        info!(total, workers = self.workers, "开始批量抓取");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let job = Arc::new(job);
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(dispatched = index, total, "批次已取消，停止派发");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = job.clone();
            let token = cancel.clone();
            let url = urls[index].clone();
            tasks.spawn(async move {
                let _permit = permit;
                // 执行中的请求自行在阶段检查点响应取消，这里只负责兜住 panic
                let outcome = match tokio::spawn(job(request, token)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(url = %url, "抓取任务异常终止: {}", e);
                        Err(ErrorRecord::from_error(
                            url,
                            &ScrapeError::parse(format!("抓取任务异常终止: {}", e)),
                        ))
                    }
                };
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("抓取任务异常终止: {}", e),
            }
        }

        let entries: Vec<BatchEntry> = urls
            .into_iter()
            .zip(slots)
            .map(|(url, slot)| {
                let outcome = slot.unwrap_or_else(|| Err(ErrorRecord::cancelled(url.clone())));
                BatchEntry { url, outcome }
            })
            .collect();

        let failed = entries.iter().filter(|e| e.outcome.is_err()).count();
        debug!(total, failed, "批量抓取结束");
        BatchResult::new(entries)
    }
}
