// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 抓取流程的核心逻辑：
/// - 抽取流水线（extraction_service）：定位内嵌数据、映射字段、解析清单、拉取评论
/// - 字段映射（field_mapping）：字段别名与数值、时长、时间的归一化
/// - 清单解码（manifest）：JSON 清单与 HLS 主播放列表
/// - 评论服务（comment_service）：分页拉取评论
/// - 访问解析（access_resolver）与备用策略（strategies）：受限内容的访问等级判定
pub mod access_resolver;
pub mod comment_service;
pub mod extraction_service;
pub mod field_mapping;
pub mod manifest;
pub mod strategies;
