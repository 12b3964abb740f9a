// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::QualityTieBreak;
use crate::domain::models::video::{determine_format, Manifest, ResourceLink};
use crate::domain::services::field_mapping::{
    first_value, is_truthy, parse_time_value, string_field,
};
use crate::utils::errors::ScrapeError;
use crate::utils::url_utils::resolve_url;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

const URL_KEYS: &[&str] = &["url", "playUrl", "play_url", "src", "hlsUrl"];
const QUALITY_KEYS: &[&str] = &["quality", "definition", "defn", "name", "cname", "label"];
const EXPIRY_KEYS: &[&str] = &["expire", "expires", "expiry", "expires_at", "expireTime"];
const PLACEHOLDER_KEYS: &[&str] = &["preview", "placeholder", "trial", "isPreview", "is_preview"];
const RESTRICTION_KEYS: &[&str] = &[
    "restricted",
    "needVip",
    "need_vip",
    "vipOnly",
    "vip_only",
    "isPreview",
    "previewOnly",
    "preview_only",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
const IMAGE_PATH_HINTS: &[&str] = &["poster", "thumb", "cover", "/image/"];

/// 未能识别画质时使用的标签
pub const UNKNOWN_QUALITY: &str = "unknown";

static QUALITY_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{3,4})\s*p").expect("valid regex"));
static URL_QUALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9])(2160|1080|720|480|360|240)p?(?:[^0-9]|$)").expect("valid regex")
});
static URL_QUALITY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[._/\-=](uhd|fhd|shd|hd|sd)(?:[._/\-&]|$)").expect("valid regex"));
static RESOLUTION_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3,4}p$").expect("valid regex"));
static HLS_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#).expect("valid regex"));

/// 画质标签归一化
///
/// 平台代号 (fhd/shd/hd/sd/uhd) 和中文名称统一为 `NNNp`，无法识别的原样小写保留
pub fn normalize_quality(raw: &str) -> String {
    let label = raw.trim().to_lowercase();
    let alias = match label.as_str() {
        "" => return UNKNOWN_QUALITY.to_string(),
        "uhd" | "4k" | "2160" | "2160p" => Some("2160p"),
        "fhd" | "1080" | "1080p" | "蓝光" => Some("1080p"),
        "shd" | "720" | "720p" | "超清" => Some("720p"),
        "hd" | "480" | "480p" | "高清" => Some("480p"),
        "sd" | "360" | "360p" | "标清" => Some("360p"),
        "240" | "240p" | "流畅" => Some("240p"),
        _ => None,
    };
    if let Some(alias) = alias {
        return alias.to_string();
    }
    if let Some(caps) = QUALITY_NUMBER_RE.captures(&label) {
        return format!("{}p", &caps[1]);
    }
    for (word, normalized) in [
        ("蓝光", "1080p"),
        ("超清", "720p"),
        ("高清", "480p"),
        ("标清", "360p"),
    ] {
        if label.contains(word) {
            return normalized.to_string();
        }
    }
    label
}

/// 从地址推断画质
pub fn infer_quality_from_url(url: &str) -> String {
    if let Some(caps) = URL_QUALITY_RE.captures(url) {
        return format!("{}p", &caps[1]);
    }
    URL_QUALITY_TOKEN_RE
        .captures(url)
        .map(|caps| normalize_quality(&caps[1]))
        .unwrap_or_else(|| UNKNOWN_QUALITY.to_string())
}

/// 是否为可播放的媒体地址
pub fn is_playable_url(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let path = url.path().to_ascii_lowercase();
    !IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        && !IMAGE_PATH_HINTS.iter().any(|hint| path.contains(hint))
}

/// 按规则处理同一画质的重复条目，`unknown` 条目总是全部保留
pub fn apply_tie_break(links: Vec<ResourceLink>, rule: QualityTieBreak) -> Vec<ResourceLink> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut selected: Vec<ResourceLink> = Vec::with_capacity(links.len());
    for link in links {
        if !seen_urls.insert(link.url.clone()) {
            continue;
        }
        let duplicate = selected.iter().position(|existing| {
            existing.quality_label == link.quality_label && link.quality_label != UNKNOWN_QUALITY
        });
        match (rule, duplicate) {
            (QualityTieBreak::KeepAll, _) | (_, None) => selected.push(link),
            (QualityTieBreak::FirstSeen, Some(_)) => {
                debug!(quality = %link.quality_label, url = %link.url, "同画质条目已存在，忽略");
            }
            (QualityTieBreak::LastSeen, Some(index)) => selected[index] = link,
        }
    }
    selected
}

/// 解析可能带有 JSONP 包装的 JSON 文本
pub fn parse_json_lenient(body: &str) -> Option<Value> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    // QZOutputJson={...}; 或 callback({...})
    let start = trimmed.find(['{', '['])?;
    serde_json::Deserializer::from_str(&trimmed[start..])
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// 解码清单内容
///
/// 支持 JSON 清单（流条目可以出现在文档任意位置）和 HLS 主播放列表
pub fn decode_manifest(
    body: &str,
    manifest_url: &str,
    tie_break: QualityTieBreak,
) -> Result<Manifest, ScrapeError> {
    let base = Url::parse(manifest_url)
        .map_err(|e| ScrapeError::parse(format!("清单地址无效 {}: {}", manifest_url, e)))?;

    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let mut manifest = if trimmed.starts_with("#EXTM3U") {
        decode_hls(trimmed, &base)
    } else {
        let root = parse_json_lenient(trimmed)
            .ok_or_else(|| ScrapeError::parse("清单既不是JSON也不是HLS播放列表"))?;
        decode_json(&root, &base)
    };

    manifest.links = apply_tie_break(manifest.links, tie_break);
    manifest.placeholder_links = apply_tie_break(manifest.placeholder_links, tie_break);
    debug!(
        url = manifest_url,
        links = manifest.links.len(),
        placeholders = manifest.placeholder_links.len(),
        restricted = manifest.restriction_marker,
        "清单解码完成"
    );
    Ok(manifest)
}

fn decode_json(root: &Value, base: &Url) -> Manifest {
    let mut manifest = Manifest {
        url: base.to_string(),
        ..Manifest::default()
    };
    collect_streams(root, base, &mut manifest);
    manifest
}

/// 深度优先遍历，保持文档顺序
fn collect_streams(value: &Value, base: &Url, manifest: &mut Manifest) {
    match value {
        Value::Object(object) => {
            if RESTRICTION_KEYS
                .iter()
                .any(|key| object.get(*key).is_some_and(is_truthy))
            {
                manifest.restriction_marker = true;
            }
            if let Some((link, placeholder)) = stream_entry(object, base) {
                if placeholder {
                    manifest.placeholder_links.push(link);
                } else {
                    manifest.links.push(link);
                }
                return;
            }
            for child in object.values() {
                collect_streams(child, base, manifest);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_streams(item, base, manifest);
            }
        }
        _ => {}
    }
}

fn stream_entry(object: &Map<String, Value>, base: &Url) -> Option<(ResourceLink, bool)> {
    let raw_url = URL_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())?;
    let url = resolve_url(base, raw_url.trim()).ok()?;
    if !is_playable_url(&url) {
        return None;
    }

    let declared = string_field(object, QUALITY_KEYS)
        .map(|q| normalize_quality(&q))
        .filter(|q| q != UNKNOWN_QUALITY);
    // 无扩展名的地址必须带有可识别的画质，避免把页面链接当作视频流
    if determine_format(url.as_str()) == "unknown"
        && !declared.as_deref().is_some_and(|q| RESOLUTION_LABEL_RE.is_match(q))
    {
        return None;
    }
    let quality = declared.unwrap_or_else(|| infer_quality_from_url(url.as_str()));
    let expiry = first_value(object, EXPIRY_KEYS).and_then(parse_time_value);
    let placeholder = PLACEHOLDER_KEYS
        .iter()
        .any(|key| object.get(*key).is_some_and(is_truthy));

    Some((
        ResourceLink::new(quality, url.to_string()).with_expiry(expiry),
        placeholder,
    ))
}

fn decode_hls(body: &str, base: &Url) -> Manifest {
    let mut manifest = Manifest {
        url: base.to_string(),
        ..Manifest::default()
    };

    let mut pending_label: Option<String> = None;
    let mut saw_variant = false;
    for line in body.lines().map(str::trim) {
        if let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            saw_variant = true;
            pending_label = Some(hls_variant_label(attributes));
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else if let Some(label) = pending_label.take() {
            if let Ok(url) = resolve_url(base, line) {
                if is_playable_url(&url) {
                    manifest.links.push(ResourceLink::new(label, url.to_string()));
                }
            }
        }
    }

    // 媒体播放列表本身即可播放
    if !saw_variant {
        manifest.links.push(ResourceLink::new(
            infer_quality_from_url(base.as_str()),
            base.to_string(),
        ));
    }
    manifest
}

fn hls_variant_label(attributes: &str) -> String {
    let mut name = None;
    let mut resolution = None;
    let mut bandwidth = None;
    for caps in HLS_ATTR_RE.captures_iter(attributes) {
        let value = caps[2].trim_matches('"').to_string();
        match &caps[1] {
            "NAME" => name = Some(value),
            "RESOLUTION" => resolution = Some(value),
            "BANDWIDTH" => bandwidth = Some(value),
            _ => {}
        }
    }

    if let Some(name) = name.map(|n| normalize_quality(&n)).filter(|n| n != UNKNOWN_QUALITY) {
        return name;
    }
    if let Some(height) = resolution.and_then(|r| r.split_once('x').map(|(_, h)| h.to_string())) {
        return format!("{}p", height);
    }
    if let Some(kbps) = bandwidth.and_then(|b| b.parse::<u64>().ok()) {
        return format!("{}k", kbps / 1000);
    }
    UNKNOWN_QUALITY.to_string()
}
