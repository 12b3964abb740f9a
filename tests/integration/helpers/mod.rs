// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 模拟视频平台
//!
//! 页面地址形如 `/x/page/{vid}.html`，清单和评论接口使用默认地址模板

use std::time::Duration;
use vidscrape::config::settings::ScraperConfigBuilder;
use vidscrape::ScraperConfig;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub struct MockPlatform {
    pub server: MockServer,
}

/// 匹配带有签名参数的请求
pub struct SignedQuery;

impl Match for SignedQuery {
    fn matches(&self, request: &Request) -> bool {
        let mut pairs = request.url.query_pairs();
        pairs.any(|(key, _)| key == "sign")
    }
}

/// 快速失败、无抖动的测试配置
pub fn test_config() -> ScraperConfigBuilder {
    ScraperConfig::builder()
        .rate_limit(1000.0)
        .timeout(5.0)
        .max_retries(1)
        .backoff(10, 50)
        .jitter_factor(0.0)
}

pub fn video_page(vid: &str, title: &str, vip: bool) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title} - 腾讯视频</title>
    <meta name="keywords" content="动画,剧场版">
    <meta property="og:image" content="/img/{vid}.jpg">
</head>
<body>
    <div id="app"></div>
    <script>
        window.__INITIAL_STATE__ = {{"global": {{"site": "v"}}, "videoInfo": {{
            "vid": "{vid}", "title": "{title}", "desc": "{title}的简介",
            "duration": "00:24:10", "view_all_count": "3.2万",
            "publish_date": "2024-05-20 20:00:00", "isVip": {vip}
        }}}};
    </script>
</body>
</html>"#,
        vid = vid,
        title = title,
        vip = vip
    )
}

pub fn free_manifest(vid: &str) -> String {
    format!(
        r#"{{"code": 0, "data": {{"streams": [
            {{"definition": "fhd", "url": "https://cdn.example.com/{vid}/1080.m3u8"}},
            {{"definition": "shd", "url": "https://cdn.example.com/{vid}/720.mp4"}}
        ]}}}}"#,
        vid = vid
    )
}

pub fn preview_manifest(vid: &str) -> String {
    format!(
        r#"{{"code": 0, "needVip": true, "data": {{"streams": [
            {{"definition": "sd", "url": "https://cdn.example.com/{vid}/trial.mp4", "preview": true}}
        ]}}}}"#,
        vid = vid
    )
}

impl MockPlatform {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn page_url(&self, vid: &str) -> String {
        format!("{}/x/page/{}.html", self.server.uri(), vid)
    }

    pub async fn mount_page(&self, vid: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/x/page/{}.html", vid)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_page_delayed(&self, vid: &str, body: String, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(format!("/x/page/{}.html", vid)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(body)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_page_status(&self, vid: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/x/page/{}.html", vid)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_manifest(&self, vid: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/playinfo"))
            .and(query_param("vid", vid))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// 挂载一个免费视频：页面加两档画质的清单
    pub async fn mount_free_video(&self, vid: &str, title: &str) {
        self.mount_page(vid, video_page(vid, title, false)).await;
        self.mount_manifest(vid, free_manifest(vid)).await;
    }

    /// 挂载一个会员视频：页面带会员标记，清单只有试看链接
    pub async fn mount_vip_video(&self, vid: &str, title: &str) {
        self.mount_page(vid, video_page(vid, title, true)).await;
        self.mount_manifest(vid, preview_manifest(vid)).await;
    }

    pub async fn page_requests(&self, vid: &str) -> usize {
        let target = format!("/x/page/{}.html", vid);
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| {
                requests.iter().filter(|r| r.url.path() == target).count()
            })
    }

    pub async fn requests_to(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.iter().filter(|r| r.url.path() == route).count())
    }
}
