// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 批量抓取的并发控制
pub mod coordinator;

pub use coordinator::ConcurrencyCoordinator;
