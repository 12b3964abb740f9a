// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use url::{ParseError, Url};

/// 路径最后一段去掉扩展名后的视频ID，如 `/x/cover/abc/v0012ab.html`
static PATH_VID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([A-Za-z0-9_-]{4,})(?:\.html?)?/?$").expect("valid regex"));

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 解析并校验抓取目标，只接受带主机名的 http/https 地址
pub fn parse_target(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("无法解析URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("不支持的协议: {}", other)),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("URL缺少主机名: {}", raw));
    }
    Ok(url)
}

/// 限流使用的主机键，包含非默认端口
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// 返回 `scheme://host[:port]`
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// 从页面地址推断视频ID
///
/// 优先查询参数 `vid`，其次路径最后一段
pub fn video_id_from_url(url: &Url) -> Option<String> {
    if let Some((_, vid)) = url.query_pairs().find(|(k, v)| k == "vid" && !v.is_empty()) {
        return Some(vid.into_owned());
    }
    PATH_VID_RE
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 展开端点模板中的 `{name}` 占位符
///
/// `{origin}` 原样替换，其余值做URL编码
pub fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut expanded = template.to_string();
    for (name, value) in values {
        let placeholder = format!("{{{}}}", name);
        if *name == "origin" {
            expanded = expanded.replace(&placeholder, value);
        } else {
            expanded = expanded.replace(&placeholder, &urlencoding::encode(value));
        }
    }
    expanded
}
