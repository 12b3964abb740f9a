// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供错误类型、重试策略、遥测初始化、文本编码和URL处理
pub mod errors;
pub mod retry_policy;
pub mod telemetry;
pub mod text_encoding;
pub mod url_utils;
