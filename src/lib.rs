// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 抓取引擎和便捷入口函数
pub mod application;

/// 配置模块
///
/// 处理抓取配置和环境变量
pub mod config;

/// 领域模块
///
/// 包含视频描述模型、抽取流水线和访问解析
pub mod domain;

/// 引擎模块
///
/// HTTP 获取客户端及其限流、代理和请求头轮换
pub mod engines;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 批量任务的并发协调
pub mod workers;

pub use application::{scrape_batch, scrape_one, ScraperEngine};
pub use config::settings::{QualityTieBreak, ScraperConfig};
pub use domain::models::{
    AccessTier, BatchReport, BatchResult, Comment, ErrorRecord, ResourceLink, VideoDescriptor,
};
pub use utils::errors::{ConfigError, ErrorKind, ScrapeError};
