// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 单个抓取项的错误分类
///
/// 同一分类既用于重试判定，也用于最终的 `ErrorRecord`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 连接失败、超时、5xx 等网络层错误
    NetworkError,
    /// 目标站点显式限流或反爬拦截
    RateLimited,
    /// 受限内容在所有备用策略后仍无法解析
    AccessDenied,
    /// 页面或清单结构无法识别
    ParseError,
    /// 404 / 410
    NotFound,
    /// 非法URL或其它不可重试的 4xx
    InvalidRequest,
    /// 批次取消导致未执行或被放弃
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 抓取错误
///
/// `attempts` 记录产生该错误的逻辑请求实际执行了多少次物理请求
#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    #[error("网络错误: {message}")]
    Network {
        message: String,
        timeout: bool,
        attempts: u32,
    },

    #[error("请求被限流: {message}")]
    RateLimited { message: String, attempts: u32 },

    #[error("访问受限: {0}")]
    AccessDenied(String),

    #[error("解析错误: {0}")]
    Parse(String),

    #[error("资源不存在: {message}")]
    NotFound { message: String, attempts: u32 },

    #[error("无效请求: {message}")]
    InvalidRequest { message: String, attempts: u32 },

    #[error("已取消: {0}")]
    Cancelled(String),
}

impl ScrapeError {
    pub fn network(message: impl Into<String>) -> Self {
        ScrapeError::Network {
            message: message.into(),
            timeout: false,
            attempts: 1,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ScrapeError::Network {
            message: message.into(),
            timeout: true,
            attempts: 1,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ScrapeError::Parse(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ScrapeError::InvalidRequest {
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Network { .. } => ErrorKind::NetworkError,
            ScrapeError::RateLimited { .. } => ErrorKind::RateLimited,
            ScrapeError::AccessDenied(_) => ErrorKind::AccessDenied,
            ScrapeError::Parse(_) => ErrorKind::ParseError,
            ScrapeError::NotFound { .. } => ErrorKind::NotFound,
            ScrapeError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ScrapeError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// 产生该错误时已执行的物理请求次数
    ///
    /// 解析、受限和取消类错误不携带计数，返回0
    pub fn attempts(&self) -> u32 {
        match self {
            ScrapeError::Network { attempts, .. }
            | ScrapeError::RateLimited { attempts, .. }
            | ScrapeError::NotFound { attempts, .. }
            | ScrapeError::InvalidRequest { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// 返回一个替换了请求次数的副本
    pub fn with_attempts(mut self, count: u32) -> Self {
        match &mut self {
            ScrapeError::Network { attempts, .. }
            | ScrapeError::RateLimited { attempts, .. }
            | ScrapeError::NotFound { attempts, .. }
            | ScrapeError::InvalidRequest { attempts, .. } => *attempts = count,
            _ => {}
        }
        self
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Network { timeout: true, .. })
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置值无效: {0}")]
    Invalid(String),

    #[error("配置加载失败: {0}")]
    Load(#[from] config::ConfigError),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigError::Invalid(errors.to_string())
    }
}
