// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,vidscrape=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// 初始化人类可读格式的日志输出
///
/// 日志级别由 `RUST_LOG` 控制。库内部只发出事件，不会自行初始化；
/// 重复调用不会 panic，返回是否由本次调用完成了初始化
pub fn init_telemetry() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// 初始化 JSON 格式的日志输出，适合采集到日志系统
pub fn init_telemetry_json() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok()
}
