// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::utils::errors::ScrapeError;
use crate::utils::text_encoding::decode_body;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// 获取请求
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 来源页面
    pub referer: Option<String>,
    /// 附加请求头，覆盖指纹生成的同名头
    pub headers: HashMap<String, String>,
    /// 单次请求超时，缺省使用客户端配置
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// 获取状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    Failure,
}

/// 单次物理请求的结果
///
/// 逻辑请求成功时返回最后一次物理请求的结果，`attempt_count` 为累计次数
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: FetchStatus,
    /// 原始响应体
    pub body: Bytes,
    /// HTTP状态码，连接失败时为0
    pub http_status: u16,
    pub attempt_count: u32,
    pub elapsed: Duration,
    pub content_type: Option<String>,
    /// 服务端要求的最短等待时间
    pub retry_after: Option<Duration>,
    /// 失败原因，成功时为空
    pub failure: Option<ScrapeError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// 按响应字符集解码后的文本
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// 页面获取特质
///
/// 实现者负责重试、限流和代理轮换，调用方只看到逻辑请求的结果
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 执行一次逻辑请求
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ScrapeError>;

    /// 获取器名称
    fn name(&self) -> &'static str;
}
