// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 访问等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    #[default]
    Free,
    Restricted,
}

/// 播放资源链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    /// 画质标签，如 "1080p"
    pub quality_label: String,
    /// 播放地址
    pub url: String,
    /// 容器格式 (m3u8, mp4, flv, webm, unknown)
    pub format: String,
    /// 地址过期时间
    pub expiry_time: Option<DateTime<Utc>>,
}

impl ResourceLink {
    pub fn new(quality_label: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            quality_label: quality_label.into(),
            format: determine_format(&url).to_string(),
            url,
            expiry_time: None,
        }
    }

    pub fn with_expiry(mut self, expiry_time: Option<DateTime<Utc>>) -> Self {
        self.expiry_time = expiry_time;
        self
    }
}

/// 根据地址判断容器格式
pub fn determine_format(url: &str) -> &'static str {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();

    if path.contains(".m3u8") {
        "m3u8"
    } else if path.ends_with(".mp4") || path.contains(".mp4/") {
        "mp4"
    } else if path.ends_with(".flv") {
        "flv"
    } else if path.ends_with(".webm") {
        "webm"
    } else {
        "unknown"
    }
}

/// 评论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub reply_count: u64,
}

/// 视频描述
///
/// 由抽取流水线逐步填充，返回调用方后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub description: String,
    /// 时长（秒）
    pub duration: u64,
    pub play_count: u64,
    pub publish_time: Option<DateTime<Utc>>,
    pub access_tier: AccessTier,
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    pub resource_links: Vec<ResourceLink>,
    pub comments: Vec<Comment>,
}

/// 清单解码结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// 清单地址
    pub url: String,
    /// 可播放链接
    pub links: Vec<ResourceLink>,
    /// 试看/占位链接
    pub placeholder_links: Vec<ResourceLink>,
    /// 清单中存在显式受限标记
    pub restriction_marker: bool,
}

impl Manifest {
    /// 清单是否表明内容受限
    ///
    /// 存在显式标记，或只返回了占位链接
    pub fn indicates_restriction(&self) -> bool {
        self.restriction_marker || (self.links.is_empty() && !self.placeholder_links.is_empty())
    }
}

/// 抽取流水线产出的草稿
///
/// 交给访问解析器判定访问等级后才会变成最终的 [`VideoDescriptor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftDescriptor {
    pub descriptor: VideoDescriptor,
    pub manifest: Manifest,
    /// 页面数据中的付费/会员标记
    pub page_restricted: bool,
    /// 原始页面内容，供备用策略再次扫描
    pub page_body: String,
}

impl DraftDescriptor {
    pub fn is_restricted(&self) -> bool {
        self.page_restricted || self.manifest.indicates_restriction()
    }
}
