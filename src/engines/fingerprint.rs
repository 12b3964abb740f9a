// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const DEFAULT_ACCEPT_LANGUAGES: &[&str] = &[
    "zh-CN,zh;q=0.9,en;q=0.8",
    "zh-CN,zh;q=0.9",
    "zh-CN,zh-TW;q=0.9,en-US;q=0.8,en;q=0.7",
    "en-US,en;q=0.9,zh-CN;q=0.8",
];

const BASE_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("dnt", "1"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("cache-control", "max-age=0"),
];

/// 请求头指纹轮换器
///
/// 轮换 User-Agent、Accept-Language 并生成与之匹配的客户端提示头。
/// 轮换依赖原子计数器，并发安全且结果可复现
#[derive(Debug)]
pub struct FingerprintRotator {
    user_agents: Vec<String>,
    accept_languages: Vec<String>,
    counter: AtomicUsize,
}

impl FingerprintRotator {
    /// 创建轮换器，空列表使用内置默认值
    pub fn new(user_agents: &[String], accept_languages: &[String]) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents.to_vec()
        };
        let accept_languages = if accept_languages.is_empty() {
            DEFAULT_ACCEPT_LANGUAGES.iter().map(|s| s.to_string()).collect()
        } else {
            accept_languages.to_vec()
        };

        Self {
            user_agents,
            accept_languages,
            counter: AtomicUsize::new(0),
        }
    }

    /// 生成下一组请求头
    pub fn next_headers(&self, referer: Option<&str>) -> HeaderMap {
        let turn = self.counter.fetch_add(1, Ordering::Relaxed);
        let user_agent = &self.user_agents[turn % self.user_agents.len()];
        let language = &self.accept_languages[turn % self.accept_languages.len()];

        let mut headers = HeaderMap::new();
        for &(name, value) in BASE_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if let Ok(value) = HeaderValue::from_str(language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        if let Some(referer) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(REFERER, referer);
        }
        for (name, value) in client_hints(user_agent) {
            headers.insert(HeaderName::from_static(name), value);
        }

        headers
    }
}

/// Chromium 系浏览器才会发送客户端提示头
fn client_hints(user_agent: &str) -> Vec<(&'static str, HeaderValue)> {
    if !user_agent.contains("Chrome/") {
        return Vec::new();
    }

    let brand = if user_agent.contains("Edg/") {
        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Microsoft Edge\";v=\"120\""
    } else {
        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\""
    };
    let platform = if user_agent.contains("Windows") {
        "\"Windows\""
    } else if user_agent.contains("Macintosh") {
        "\"macOS\""
    } else {
        "\"Linux\""
    };
    let mobile = if user_agent.contains("Mobile") { "?1" } else { "?0" };

    vec![
        ("sec-ch-ua", HeaderValue::from_static(brand)),
        ("sec-ch-ua-mobile", HeaderValue::from_static(mobile)),
        ("sec-ch-ua-platform", HeaderValue::from_static(platform)),
    ]
}
