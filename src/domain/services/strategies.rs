// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 受限内容的备用解析策略
//!
//! 每个策略独立尝试为受限视频找到可播放链接，由 [`AccessResolver`] 按顺序调用。
//! 新的限制方案只需新增或替换一个策略。
//!
//! [`AccessResolver`]: crate::domain::services::access_resolver::AccessResolver

use crate::config::settings::ScraperConfig;
use crate::domain::models::video::{DraftDescriptor, ResourceLink};
use crate::domain::services::manifest::{
    apply_tie_break, decode_manifest, infer_quality_from_url, is_playable_url,
};
use crate::engines::traits::{FetchRequest, PageFetcher};
use crate::utils::errors::ScrapeError;
use crate::utils::url_utils::{expand_template, origin_of, parse_target};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

static EMBEDDED_MEDIA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>\\]+?\.(?:m3u8|mp4|flv)(?:\?[^\s"'<>\\]*)?"#)
        .expect("valid regex")
});

/// 策略执行错误
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("请求失败: {0}")]
    Fetch(#[from] ScrapeError),

    #[error("策略不适用: {0}")]
    NotApplicable(String),

    #[error("签名失败: {0}")]
    Signing(String),
}

/// 策略执行时可用的共享资源
pub struct ResolutionContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub config: &'a ScraperConfig,
    pub cancel: &'a CancellationToken,
}

/// 备用解析策略
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// 策略名称，用于日志和统计
    fn name(&self) -> &'static str;

    /// 尝试获取可播放链接
    ///
    /// `Ok(None)` 表示策略执行成功但没有找到链接
    async fn attempt(
        &self,
        draft: &DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Vec<ResourceLink>>, StrategyError>;
}

/// 重新扫描原始页面中直接嵌入的播放地址
#[derive(Debug, Default)]
pub struct EmbeddedLinksStrategy;

impl EmbeddedLinksStrategy {
    pub fn new() -> Self {
        Self
    }

    /// 从页面文本中提取播放地址，跳过占位链接
    pub fn scan(body: &str, excluded: &HashSet<&str>) -> Vec<ResourceLink> {
        let unescaped = body
            .replace("\\u002F", "/")
            .replace("\\u002f", "/")
            .replace("\\/", "/");

        EMBEDDED_MEDIA_RE
            .find_iter(&unescaped)
            .map(|m| m.as_str())
            .filter(|raw| !excluded.contains(raw))
            .filter(|raw| Url::parse(raw).is_ok_and(|url| is_playable_url(&url)))
            .map(|raw| ResourceLink::new(infer_quality_from_url(raw), raw))
            .collect()
    }
}

#[async_trait]
impl ResolutionStrategy for EmbeddedLinksStrategy {
    fn name(&self) -> &'static str {
        "embedded_links"
    }

    async fn attempt(
        &self,
        draft: &DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Vec<ResourceLink>>, StrategyError> {
        let excluded: HashSet<&str> = draft
            .manifest
            .placeholder_links
            .iter()
            .map(|link| link.url.as_str())
            .collect();

        let links = apply_tie_break(
            Self::scan(&draft.page_body, &excluded),
            ctx.config.quality_tie_break,
        );
        debug!(found = links.len(), "页面内嵌链接扫描完成");
        Ok((!links.is_empty()).then_some(links))
    }
}

/// 依次请求调用方配置的备用清单地址
#[derive(Debug, Default)]
pub struct AlternateEndpointStrategy;

impl AlternateEndpointStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResolutionStrategy for AlternateEndpointStrategy {
    fn name(&self) -> &'static str {
        "alternate_endpoint"
    }

    async fn attempt(
        &self,
        draft: &DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Vec<ResourceLink>>, StrategyError> {
        let templates = &ctx.config.alternate_manifest_endpoints;
        if templates.is_empty() {
            return Err(StrategyError::NotApplicable("未配置备用清单地址".to_string()));
        }

        let page_url = parse_target(&draft.descriptor.source_url).map_err(StrategyError::NotApplicable)?;
        let origin = origin_of(&page_url);
        let mut last_error = None;

        for template in templates {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let endpoint = expand_template(
                template,
                &[("origin", origin.as_str()), ("vid", draft.descriptor.id.as_str())],
            );
            match fetch_links(ctx, &endpoint, page_url.as_str()).await {
                Ok(links) if !links.is_empty() => return Ok(Some(links)),
                Ok(_) => debug!(endpoint = %endpoint, "备用清单没有可播放链接"),
                Err(e) => {
                    debug!(endpoint = %endpoint, "备用清单请求失败: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// 请求签名器
///
/// 密钥和算法由调用方提供，引擎只负责把签名附加到请求上
pub trait RequestSigner: Send + Sync {
    fn sign(&self, video_id: &str, timestamp: i64) -> Result<String, StrategyError>;
}

/// HMAC-SHA256 签名，消息格式为 `{timestamp}.{video_id}`
pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl HmacSha256Signer {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl RequestSigner for HmacSha256Signer {
    fn sign(&self, video_id: &str, timestamp: i64) -> Result<String, StrategyError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| StrategyError::Signing(e.to_string()))?;
        mac.update(format!("{}.{}", timestamp, video_id).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// 携带签名参数重新请求清单
pub struct SignedRequestStrategy {
    signer: Arc<dyn RequestSigner>,
}

impl SignedRequestStrategy {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Self {
        Self { signer }
    }

    /// 在地址后追加 `ts` 和 `sign` 参数
    pub fn signed_url(&self, base: &str, video_id: &str, timestamp: i64) -> Result<String, StrategyError> {
        let signature = self.signer.sign(video_id, timestamp)?;
        let query = serde_urlencoded::to_string([
            ("ts", timestamp.to_string()),
            ("sign", signature),
        ])
        .map_err(|e| StrategyError::Signing(e.to_string()))?;
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", base, separator, query))
    }
}

#[async_trait]
impl ResolutionStrategy for SignedRequestStrategy {
    fn name(&self) -> &'static str {
        "signed_request"
    }

    async fn attempt(
        &self,
        draft: &DraftDescriptor,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Vec<ResourceLink>>, StrategyError> {
        let page_url = parse_target(&draft.descriptor.source_url).map_err(StrategyError::NotApplicable)?;
        let base = if draft.manifest.url.is_empty() {
            let origin = origin_of(&page_url);
            expand_template(
                &ctx.config.manifest_endpoint,
                &[("origin", origin.as_str()), ("vid", draft.descriptor.id.as_str())],
            )
        } else {
            draft.manifest.url.clone()
        };

        let timestamp = chrono::Utc::now().timestamp();
        let endpoint = self.signed_url(&base, &draft.descriptor.id, timestamp)?;
        let links = fetch_links(ctx, &endpoint, page_url.as_str()).await?;
        Ok((!links.is_empty()).then_some(links))
    }
}

/// 请求并解码一个清单，只返回完整的可播放链接
async fn fetch_links(
    ctx: &ResolutionContext<'_>,
    endpoint: &str,
    referer: &str,
) -> Result<Vec<ResourceLink>, ScrapeError> {
    let response = ctx
        .fetcher
        .fetch(&FetchRequest::new(endpoint).with_referer(referer))
        .await?;
    let manifest = decode_manifest(&response.text(), endpoint, ctx.config.quality_tie_break)?;
    Ok(manifest.links)
}
