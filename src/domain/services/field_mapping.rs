// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 页面内嵌数据的字段映射
//!
//! 平台会不定期调整字段名，这里集中维护别名表和数值归一化规则

use crate::utils::errors::ScrapeError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::VecDeque;

pub const ID_KEYS: &[&str] = &["vid", "videoId", "video_id"];
pub const TITLE_KEYS: &[&str] = &["title", "videoTitle", "video_title", "name"];
pub const DESCRIPTION_KEYS: &[&str] = &["desc", "description", "intro", "brief"];
pub const DURATION_KEYS: &[&str] = &["duration", "durationSec", "duration_sec", "length"];
pub const PLAY_COUNT_KEYS: &[&str] = &[
    "playCount",
    "play_count",
    "viewCount",
    "view_count",
    "view_all_count",
];
pub const PUBLISH_KEYS: &[&str] = &[
    "publishDate",
    "publish_date",
    "publishTime",
    "publish_time",
    "createTime",
    "create_time",
];
pub const THUMBNAIL_KEYS: &[&str] = &["pic", "cover", "poster", "thumbnail", "thumbnailUrl"];
pub const TAG_KEYS: &[&str] = &["tags", "tagList", "tag_list", "keywords"];
pub const MANIFEST_KEYS: &[&str] = &["manifestUrl", "manifest_url", "playInfoUrl", "vinfoUrl"];
pub const RESTRICTION_KEYS: &[&str] = &[
    "isVip", "is_vip", "isSvip", "vipOnly", "vip_only", "isPaid", "is_paid", "needPay",
    "need_pay", "needVip", "need_vip",
];

/// 常见的视频信息容器键
const CONTAINER_KEYS: &[&str] = &["videoInfo", "currentVideo", "curVideo", "videoData", "video"];

/// 没有时区信息的时间按平台所在时区（UTC+8）解释
const PLATFORM_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// 大于该值的时间戳按毫秒处理
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(亿|万|千|w|k|m)?").expect("valid regex"));
static CN_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\s*(?:小时|时))?\s*(?:(\d+)\s*分钟?)?\s*(?:(\d+)\s*秒)?$")
        .expect("valid regex")
});
static FIRST_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

/// 映射后的页面字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration: u64,
    pub play_count: u64,
    pub publish_time: Option<DateTime<Utc>>,
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    /// 页面数据中带有会员/付费标记
    pub restricted: bool,
    /// 页面直接给出的清单地址
    pub manifest_url: Option<String>,
}

/// 按别名顺序取第一个非 null 的值
pub fn first_value<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// 按别名顺序取第一个非空字符串，数字也会转成字符串
pub fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(value_as_string)
}

pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

/// 解析播放量文本，支持 千/万/亿/k/w/m 后缀
pub fn parse_count_text(text: &str) -> u64 {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && *c != '，' && !c.is_whitespace())
        .collect();
    let Some(caps) = COUNT_RE.captures(&cleaned) else {
        return 0;
    };
    let number: f64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit == "亿" => 1e8,
        Some(unit) if unit == "万" || unit == "w" => 1e4,
        Some(unit) if unit == "m" => 1e6,
        Some(unit) if unit == "千" || unit == "k" => 1e3,
        _ => 1.0,
    };
    (number * multiplier).round() as u64
}

pub fn parse_count_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => parse_count_text(s),
        _ => 0,
    }
}

/// 解析时长文本为秒数，支持 `HH:MM:SS`、`MM:SS`、`1小时2分3秒` 和纯数字
pub fn parse_duration_text(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    if text.contains(':') {
        let parts: Option<Vec<u64>> = text.split(':').map(|p| p.trim().parse().ok()).collect();
        if let Some(parts) = parts.filter(|p| p.len() <= 3) {
            // 超出范围的数值按缺失处理
            return parts
                .iter()
                .try_fold(0u64, |acc, part| acc.checked_mul(60)?.checked_add(*part))
                .unwrap_or(0);
        }
    }

    if let Some(caps) = CN_DURATION_RE.captures(text) {
        let unit = |i: usize| -> Option<u64> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };
        let (hours, minutes, seconds) = (unit(1), unit(2), unit(3));
        if hours.is_some() || minutes.is_some() || seconds.is_some() {
            return hours
                .unwrap_or(0)
                .checked_mul(3600)
                .and_then(|total| total.checked_add(minutes.unwrap_or(0).checked_mul(60)?))
                .and_then(|total| total.checked_add(seconds.unwrap_or(0)))
                .unwrap_or(0);
        }
    }

    if let Ok(seconds) = text.parse::<f64>() {
        return if seconds > 0.0 { seconds.round() as u64 } else { 0 };
    }

    FIRST_NUMBER_RE
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn parse_duration_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => parse_duration_text(s),
        _ => 0,
    }
}

fn from_unix(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp <= 0 {
        return None;
    }
    if timestamp >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(timestamp).single()
    } else {
        Utc.timestamp_opt(timestamp, 0).single()
    }
}

fn from_platform_local(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    FixedOffset::east_opt(PLATFORM_UTC_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 解析时间文本
///
/// 相对时间（如 "3天前"）不解析，返回 None
pub fn parse_time_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok().and_then(from_unix);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return from_platform_local(naive);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).and_then(from_platform_local);
        }
    }
    None
}

pub fn parse_time_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_unix),
        Value::String(s) => parse_time_text(s),
        _ => None,
    }
}

/// 标签可以是字符串数组、对象数组或逗号分隔的字符串
pub fn parse_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => string_field(obj, &["name", "tag", "text", "title"]),
                other => value_as_string(other),
            })
            .collect(),
        Value::String(s) => s.split([',', '，', '|']).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn has_any(object: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| object.get(*key).is_some_and(|v| !v.is_null()))
}

/// 广度优先查找第一个满足条件的对象
pub fn find_object<'a, F>(root: &'a Value, predicate: F) -> Option<&'a Map<String, Value>>
where
    F: Fn(&Map<String, Value>) -> bool,
{
    let mut queue = VecDeque::from([root]);
    while let Some(value) = queue.pop_front() {
        match value {
            Value::Object(object) => {
                if predicate(object) {
                    return Some(object);
                }
                queue.extend(object.values());
            }
            Value::Array(items) => queue.extend(items.iter()),
            _ => {}
        }
    }
    None
}

/// 定位描述当前视频的对象
///
/// 依次尝试：常见容器键下的对象，ID与地址中一致的对象，同时带有ID和标题的对象
pub fn locate_video_object<'a>(
    root: &'a Value,
    url_vid: Option<&str>,
) -> Option<&'a Map<String, Value>> {
    let id_matches = |object: &Map<String, Value>| match (url_vid, string_field(object, ID_KEYS)) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => true,
    };

    let container = find_object(root, |object| {
        CONTAINER_KEYS.iter().any(|key| {
            object.get(*key).and_then(Value::as_object).is_some_and(|inner| {
                (has_any(inner, ID_KEYS) || has_any(inner, TITLE_KEYS)) && id_matches(inner)
            })
        })
    })
    .and_then(|parent| {
        CONTAINER_KEYS
            .iter()
            .filter_map(|key| parent.get(*key).and_then(Value::as_object))
            .find(|inner| (has_any(inner, ID_KEYS) || has_any(inner, TITLE_KEYS)) && id_matches(inner))
    });
    if container.is_some() {
        return container;
    }

    if let Some(expected) = url_vid {
        if let Some(found) =
            find_object(root, |object| string_field(object, ID_KEYS).as_deref() == Some(expected))
        {
            return Some(found);
        }
    }

    find_object(root, |object| has_any(object, ID_KEYS) && has_any(object, TITLE_KEYS))
}

/// 将内嵌数据映射为页面字段
pub fn map_page_fields(root: &Value, url_vid: Option<&str>) -> Result<PageFields, ScrapeError> {
    let object = locate_video_object(root, url_vid)
        .ok_or_else(|| ScrapeError::parse("页面数据中未找到视频信息"))?;

    let id = string_field(object, ID_KEYS)
        .or_else(|| url_vid.map(str::to_string))
        .ok_or_else(|| ScrapeError::parse("无法确定视频ID"))?;

    Ok(PageFields {
        id,
        title: string_field(object, TITLE_KEYS).unwrap_or_default(),
        description: string_field(object, DESCRIPTION_KEYS).unwrap_or_default(),
        duration: first_value(object, DURATION_KEYS).map_or(0, parse_duration_value),
        play_count: first_value(object, PLAY_COUNT_KEYS).map_or(0, parse_count_value),
        publish_time: first_value(object, PUBLISH_KEYS).and_then(parse_time_value),
        thumbnail_url: string_field(object, THUMBNAIL_KEYS).unwrap_or_default(),
        tags: first_value(object, TAG_KEYS).map(parse_tags).unwrap_or_default(),
        restricted: RESTRICTION_KEYS
            .iter()
            .any(|key| object.get(*key).is_some_and(is_truthy)),
        manifest_url: string_field(object, MANIFEST_KEYS),
    })
}
