// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScraperConfig;
use crate::domain::models::video::{AccessTier, Comment, DraftDescriptor, Manifest, VideoDescriptor};
use crate::domain::services::comment_service;
use crate::domain::services::field_mapping::{map_page_fields, parse_tags, PageFields};
use crate::domain::services::manifest::decode_manifest;
use crate::engines::traits::{FetchRequest, PageFetcher};
use crate::utils::errors::ScrapeError;
use crate::utils::url_utils::{expand_template, origin_of, parse_target, resolve_url, video_id_from_url};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// 页面脚本中的数据赋值标记，按优先级排列
const ASSIGNMENT_MARKERS: &[&str] = &[
    "window.__INITIAL_STATE__",
    "window.__PINIA__",
    "window.videoInfo",
    "var videoData",
];

static NEXT_DATA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").expect("valid selector"));
static OG_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid selector"));
static DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));
static KEYWORDS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="keywords"]"#).expect("valid selector"));
static OG_IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector"));

/// JS 对象字面量里的 undefined 不是合法 JSON
static UNDEFINED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([:\[,]\s*)undefined\b").expect("valid regex"));
static TITLE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[-_|]\s*(腾讯视频|在线观看|高清完整版).*$").expect("valid regex"));

/// 检查批次是否已取消，在阶段边界调用
pub fn check_cancelled(cancel: &CancellationToken, stage: &str) -> Result<(), ScrapeError> {
    if cancel.is_cancelled() {
        Err(ScrapeError::Cancelled(format!("批次已取消，在{}阶段放弃", stage)))
    } else {
        Ok(())
    }
}

/// 阶段1：定位页面内嵌数据
///
/// 依次尝试 `__NEXT_DATA__` 脚本和若干全局变量赋值，第一个能解码的生效
pub fn locate_embedded_data(body: &str) -> Result<Value, ScrapeError> {
    if body.contains("__NEXT_DATA__") {
        let document = Html::parse_document(body);
        if let Some(script) = document.select(&NEXT_DATA_SELECTOR).next() {
            let text: String = script.text().collect();
            if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
                if value.is_object() {
                    debug!("使用 __NEXT_DATA__ 数据");
                    return Ok(value);
                }
            }
        }
    }

    for marker in ASSIGNMENT_MARKERS {
        let mut offset = 0;
        while let Some(found) = body[offset..].find(marker) {
            let after = offset + found + marker.len();
            if let Some(value) = decode_assignment(&body[after..]) {
                debug!(marker, "使用脚本赋值数据");
                return Ok(value);
            }
            offset = after;
        }
    }

    Err(ScrapeError::parse("页面中未找到内嵌数据"))
}

fn decode_assignment(rest: &str) -> Option<Value> {
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    if !rest.starts_with('{') {
        return None;
    }
    first_json_object(rest).or_else(|| {
        let sanitized = UNDEFINED_RE.replace_all(rest, "${1}null");
        first_json_object(&sanitized)
    })
}

fn first_json_object(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
        .filter(Value::is_object)
}

/// 页面 `<head>` 中的元信息，用于补全内嵌数据缺失的字段
#[derive(Debug, Default)]
struct PageMeta {
    title: Option<String>,
    description: Option<String>,
    keywords: Vec<String>,
    image: Option<String>,
}

impl PageMeta {
    fn from_html(body: &str) -> Self {
        let document = Html::parse_document(body);
        let content = |selector: &Selector| {
            document
                .select(selector)
                .next()
                .and_then(|e| e.value().attr("content"))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        };

        let title = content(&*OG_TITLE_SELECTOR).or_else(|| {
            document
                .select(&TITLE_SELECTOR)
                .next()
                .map(|e| e.text().collect::<String>())
                .map(|t| TITLE_SUFFIX_RE.replace(t.trim(), "").to_string())
                .filter(|t| !t.is_empty())
        });

        Self {
            title,
            description: content(&*DESCRIPTION_SELECTOR),
            keywords: content(&*KEYWORDS_SELECTOR)
                .map(|k| parse_tags(&Value::String(k)))
                .unwrap_or_default(),
            image: content(&*OG_IMAGE_SELECTOR),
        }
    }
}

/// 抽取流水线
///
/// 四个阶段依次执行：定位内嵌数据，字段映射，解析清单，拉取评论。
/// 前三个阶段失败即整项失败，评论失败只会得到空列表
pub struct ExtractionPipeline<'a> {
    config: &'a ScraperConfig,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(config: &'a ScraperConfig) -> Self {
        Self { config }
    }

    pub fn locate_embedded_data(&self, body: &str) -> Result<Value, ScrapeError> {
        locate_embedded_data(body)
    }

    /// 阶段2：字段映射，缺失的展示字段用页面元信息补全
    pub fn map_fields(
        &self,
        data: &Value,
        body: &str,
        page_url: &Url,
    ) -> Result<PageFields, ScrapeError> {
        let url_vid = video_id_from_url(page_url);
        let mut fields = map_page_fields(data, url_vid.as_deref())?;

        if fields.title.is_empty()
            || fields.description.is_empty()
            || fields.thumbnail_url.is_empty()
            || fields.tags.is_empty()
        {
            let meta = PageMeta::from_html(body);
            if fields.title.is_empty() {
                fields.title = meta.title.unwrap_or_default();
            }
            if fields.description.is_empty() {
                fields.description = meta.description.unwrap_or_default();
            }
            if fields.thumbnail_url.is_empty() {
                fields.thumbnail_url = meta.image.unwrap_or_default();
            }
            if fields.tags.is_empty() {
                fields.tags = meta.keywords;
            }
        }

        if !fields.thumbnail_url.is_empty() {
            if let Ok(absolute) = resolve_url(page_url, &fields.thumbnail_url) {
                fields.thumbnail_url = absolute.to_string();
            }
        }
        Ok(fields)
    }

    /// 清单地址：页面给出的优先，否则按模板构造
    pub fn manifest_url(&self, fields: &PageFields, page_url: &Url) -> Result<String, ScrapeError> {
        match &fields.manifest_url {
            Some(raw) => resolve_url(page_url, raw)
                .map(|u| u.to_string())
                .map_err(|e| ScrapeError::parse(format!("清单地址无效 {}: {}", raw, e))),
            None => {
                let origin = origin_of(page_url);
                Ok(expand_template(
                    &self.config.manifest_endpoint,
                    &[("origin", origin.as_str()), ("vid", fields.id.as_str())],
                ))
            }
        }
    }

    /// 阶段3：获取并解码清单
    pub async fn resolve_manifest(
        &self,
        fetcher: &dyn PageFetcher,
        fields: &PageFields,
        page_url: &Url,
    ) -> Result<Manifest, ScrapeError> {
        let manifest_url = self.manifest_url(fields, page_url)?;
        let response = fetcher
            .fetch(&FetchRequest::new(manifest_url.clone()).with_referer(page_url.as_str()))
            .await?;
        let manifest = decode_manifest(&response.text(), &manifest_url, self.config.quality_tie_break)?;

        if manifest.links.is_empty() && !manifest.indicates_restriction() && !fields.restricted {
            return Err(ScrapeError::parse("清单中没有可播放链接"));
        }
        Ok(manifest)
    }

    /// 阶段4：拉取评论
    pub async fn fetch_comments(
        &self,
        fetcher: &dyn PageFetcher,
        fields: &PageFields,
        page_url: &Url,
    ) -> Vec<Comment> {
        if !self.config.enable_comments {
            return Vec::new();
        }
        comment_service::fetch_comments(
            fetcher,
            self.config,
            &origin_of(page_url),
            &fields.id,
            page_url.as_str(),
        )
        .await
    }

    /// 执行完整的抽取流程，返回交给访问解析器的草稿
    #[instrument(skip(self, fetcher, body, cancel), fields(url = %page_url))]
    pub async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        page_url: &str,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<DraftDescriptor, ScrapeError> {
        let url = parse_target(page_url).map_err(ScrapeError::invalid)?;

        let data = self.locate_embedded_data(body)?;
        let fields = self.map_fields(&data, body, &url)?;
        check_cancelled(cancel, "字段映射")?;

        let manifest = self.resolve_manifest(fetcher, &fields, &url).await?;
        check_cancelled(cancel, "清单解析")?;

        let comments = self.fetch_comments(fetcher, &fields, &url).await;

        debug!(
            id = %fields.id,
            links = manifest.links.len(),
            comments = comments.len(),
            page_restricted = fields.restricted,
            "抽取完成"
        );

        Ok(DraftDescriptor {
            descriptor: VideoDescriptor {
                id: fields.id,
                source_url: page_url.to_string(),
                title: fields.title,
                description: fields.description,
                duration: fields.duration,
                play_count: fields.play_count,
                publish_time: fields.publish_time,
                access_tier: AccessTier::Free,
                thumbnail_url: fields.thumbnail_url,
                tags: fields.tags,
                resource_links: manifest.links.clone(),
                comments,
            },
            manifest,
            page_restricted: fields.restricted,
            page_body: body.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
