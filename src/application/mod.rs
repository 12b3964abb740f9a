// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 对外的抓取入口，组合获取、抽取、访问解析和并发协调
pub mod scraper;

pub use self::scraper::{scrape_batch, scrape_one, EngineStats, ScraperEngine, ScraperEngineBuilder};
