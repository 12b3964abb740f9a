// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 视频（video）：视频描述、资源链接、评论以及抽取阶段的草稿
/// - 批次（batch）：抓取请求、错误记录、批量结果和报告
pub mod batch;
pub mod video;

pub use batch::{BatchEntry, BatchReport, BatchResult, ErrorRecord, ItemOutcome, ScrapeRequest};
pub use video::{AccessTier, Comment, ResourceLink, VideoDescriptor};
