// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod fingerprint;
pub mod proxy_pool;
pub mod rate_limiter;
pub mod reqwest_engine;
#[cfg(test)]
pub mod stub_fetcher;
pub mod traits;
