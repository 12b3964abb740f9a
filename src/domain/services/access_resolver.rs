// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::video::{AccessTier, DraftDescriptor, ResourceLink, VideoDescriptor};
use crate::domain::services::extraction_service::check_cancelled;
use crate::domain::services::strategies::{
    AlternateEndpointStrategy, EmbeddedLinksStrategy, RequestSigner, ResolutionContext,
    ResolutionStrategy, SignedRequestStrategy,
};
use crate::utils::errors::ScrapeError;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 访问等级判定结果
#[derive(Debug, Clone)]
pub struct Resolution {
    pub descriptor: VideoDescriptor,
    /// 产出链接的备用策略，未受限或全部失败时为 `None`
    pub winning_strategy: Option<&'static str>,
}

/// 访问解析器
///
/// 判定草稿的访问等级。受限内容按顺序尝试备用策略，第一个产出链接的策略生效
pub struct AccessResolver {
    strategies: Vec<Arc<dyn ResolutionStrategy>>,
}

impl AccessResolver {
    pub fn new(strategies: Vec<Arc<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    /// 内置策略：页面内嵌链接，备用清单地址，以及提供签名器时的签名请求
    pub fn with_default_strategies(signer: Option<Arc<dyn RequestSigner>>) -> Self {
        let mut strategies: Vec<Arc<dyn ResolutionStrategy>> = vec![
            Arc::new(EmbeddedLinksStrategy::new()),
            Arc::new(AlternateEndpointStrategy::new()),
        ];
        if let Some(signer) = signer {
            strategies.push(Arc::new(SignedRequestStrategy::new(signer)));
        }
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(
        &self,
        draft: DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<VideoDescriptor, ScrapeError> {
        self.resolve_with_outcome(draft, ctx)
            .await
            .map(|resolution| resolution.descriptor)
    }

    pub async fn resolve_with_outcome(
        &self,
        draft: DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Resolution, ScrapeError> {
        if !draft.is_restricted() {
            let mut descriptor = draft.descriptor;
            if descriptor.resource_links.is_empty() {
                return Err(ScrapeError::parse("清单中没有可播放链接"));
            }
            descriptor.access_tier = AccessTier::Free;
            return Ok(Resolution {
                descriptor,
                winning_strategy: None,
            });
        }

        debug!(id = %draft.descriptor.id, "内容受限，尝试备用策略");
        for strategy in &self.strategies {
            check_cancelled(ctx.cancel, "访问解析")?;
            let name = strategy.name();

            let outcome = strategy.attempt(&draft, ctx).await;
            match outcome {
                Ok(Some(links)) if !links.is_empty() => {
                    counter!("vidscrape_strategy_attempts_total", "strategy" => name, "outcome" => "success")
                        .increment(1);
                    info!(strategy = name, links = links.len(), "备用策略获取链接成功");

                    let mut descriptor = draft.descriptor;
                    descriptor.access_tier = AccessTier::Restricted;
                    descriptor.resource_links = links;
                    return Ok(Resolution {
                        descriptor,
                        winning_strategy: Some(name),
                    });
                }
                Ok(_) => {
                    counter!("vidscrape_strategy_attempts_total", "strategy" => name, "outcome" => "empty")
                        .increment(1);
                    debug!(strategy = name, "备用策略没有找到链接");
                }
                Err(e) => {
                    counter!("vidscrape_strategy_attempts_total", "strategy" => name, "outcome" => "error")
                        .increment(1);
                    warn!(strategy = name, "备用策略失败: {}", e);
                }
            }
        }

        let links = obtainable_links(&draft);
        if links.is_empty() {
            return Err(ScrapeError::AccessDenied(format!(
                "所有备用策略均未获取到 {} 的播放链接",
                draft.descriptor.id
            )));
        }

        let mut descriptor = draft.descriptor;
        descriptor.access_tier = AccessTier::Restricted;
        descriptor.resource_links = links;
        Ok(Resolution {
            descriptor,
            winning_strategy: None,
        })
    }
}

/// 清单中已有的链接和占位链接，按地址去重
fn obtainable_links(draft: &DraftDescriptor) -> Vec<ResourceLink> {
    let mut seen = HashSet::new();
    draft
        .manifest
        .links
        .iter()
        .chain(&draft.manifest.placeholder_links)
        .filter(|link| seen.insert(link.url.as_str()))
        .cloned()
        .collect()
}
