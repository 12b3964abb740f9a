// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

/// 从 Content-Type 中取出 charset
fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// 将响应体解码为 UTF-8 文本
///
/// 顺序：Content-Type 声明的字符集，合法 UTF-8，最后交给 chardetng 猜测
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        let (text, _, had_errors) = encoding.decode(body);
        if had_errors {
            debug!(encoding = encoding.name(), "按声明字符集解码时出现替换字符");
        }
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(body) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    debug!(encoding = encoding.name(), "根据内容检测字符集");
    encoding.decode(body).0.into_owned()
}
