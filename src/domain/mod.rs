// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：视频描述与批次结果等数据结构
/// - 服务（services）：抽取、清单解码和访问解析逻辑
///
/// 领域层只依赖获取器抽象，不关心具体的 HTTP 实现
pub mod models;
pub mod services;
