// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单元测试使用的脚本化获取器

use crate::engines::traits::{FetchRequest, FetchResult, FetchStatus, PageFetcher};
use crate::utils::errors::ScrapeError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::time::Duration;

/// 按URL子串匹配预设响应，并记录所有请求
#[derive(Default)]
pub struct StubFetcher {
    routes: Vec<(String, Result<String, ScrapeError>)>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, fragment: &str, body: impl Into<String>) -> Self {
        self.routes.push((fragment.to_string(), Ok(body.into())));
        self
    }

    pub fn fail(mut self, fragment: &str, error: ScrapeError) -> Self {
        self.routes.push((fragment.to_string(), Err(error)));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ScrapeError> {
        self.requests.lock().unwrap().push(request.url.clone());
        let route = self
            .routes
            .iter()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()));
        match route {
            Some((_, Ok(body))) => Ok(FetchResult {
                status: FetchStatus::Success,
                body: Bytes::from(body.clone()),
                http_status: 200,
                attempt_count: 1,
                elapsed: Duration::from_millis(1),
                content_type: Some("application/json; charset=utf-8".to_string()),
                retry_after: None,
                failure: None,
            }),
            Some((_, Err(error))) => Err(error.clone()),
            None => Err(ScrapeError::NotFound {
                message: format!("未配置的地址 {}", request.url),
                attempts: 1,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
