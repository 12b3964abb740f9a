// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScraperConfig;
use crate::domain::models::video::Comment;
use crate::domain::services::field_mapping::{
    find_object, first_value, is_truthy, parse_count_value, parse_time_value, string_field,
    value_as_string,
};
use crate::domain::services::manifest::parse_json_lenient;
use crate::engines::traits::{FetchRequest, PageFetcher};
use crate::utils::errors::ScrapeError;
use crate::utils::url_utils::expand_template;
use metrics::counter;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const LIST_KEYS: &[&str] = &["comments", "commentList", "comment_list", "list", "items", "data"];
const CURSOR_KEYS: &[&str] = &["next_cursor", "nextCursor", "cursor", "last", "last_id"];
const HAS_MORE_KEYS: &[&str] = &["has_more", "hasMore", "hasNext", "has_next"];
const AUTHOR_KEYS: &[&str] = &["author", "username", "userName", "nick", "nickname", "name"];
const USER_KEYS: &[&str] = &["user", "userinfo", "userInfo"];
const TEXT_KEYS: &[&str] = &["content", "text", "comment", "message", "body"];
const TIME_KEYS: &[&str] = &["time", "timestamp", "publishTime", "publish_time", "createTime", "create_time", "date"];
const LIKE_KEYS: &[&str] = &["likes", "likeCount", "like_count", "up", "praise"];
const REPLY_KEYS: &[&str] = &["replies", "replyCount", "reply_count", "replynum", "orireplynum"];

/// 作者缺失时的默认名称
pub const ANONYMOUS_AUTHOR: &str = "匿名用户";

/// 单页评论
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// 解析单页评论响应
pub fn parse_comment_page(body: &str) -> Result<CommentPage, ScrapeError> {
    let root = parse_json_lenient(body).ok_or_else(|| ScrapeError::parse("评论响应不是JSON"))?;

    let items = comment_array(&root).ok_or_else(|| ScrapeError::parse("评论响应中没有评论列表"))?;
    let comments = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(parse_comment)
        .collect();

    let meta = find_object(&root, |object| {
        CURSOR_KEYS.iter().any(|k| object.contains_key(*k))
            || HAS_MORE_KEYS.iter().any(|k| object.contains_key(*k))
    });
    let next_cursor = meta
        .and_then(|object| string_field(object, CURSOR_KEYS))
        .filter(|cursor| cursor != "0");
    let has_more = meta
        .and_then(|object| first_value(object, HAS_MORE_KEYS))
        .map(is_truthy)
        .unwrap_or(next_cursor.is_some());

    Ok(CommentPage {
        comments,
        next_cursor,
        has_more,
    })
}

/// 顶层数组，或别名键下的对象数组
fn comment_array(root: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(items) = root {
        return Some(items);
    }
    let holder = find_object(root, |object| {
        LIST_KEYS
            .iter()
            .any(|key| object.get(*key).is_some_and(Value::is_array))
    })?;
    LIST_KEYS
        .iter()
        .find_map(|key| holder.get(*key).and_then(Value::as_array))
}

fn parse_comment(object: &Map<String, Value>) -> Option<Comment> {
    let text = first_value(object, TEXT_KEYS)
        .and_then(value_as_string)
        .map(|raw| clean_text(&raw))
        .filter(|text| !text.is_empty())?;

    let author = string_field(object, AUTHOR_KEYS)
        .or_else(|| {
            USER_KEYS
                .iter()
                .filter_map(|key| object.get(*key))
                .find_map(|user| match user {
                    Value::Object(user) => string_field(user, AUTHOR_KEYS),
                    other => value_as_string(other),
                })
        })
        .map(|name| clean_text(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());

    let reply_count = match first_value(object, REPLY_KEYS) {
        Some(Value::Array(replies)) => replies.len() as u64,
        Some(value) => parse_count_value(value),
        None => 0,
    };

    Some(Comment {
        author,
        text,
        timestamp: first_value(object, TIME_KEYS).and_then(parse_time_value),
        like_count: first_value(object, LIKE_KEYS).map_or(0, parse_count_value),
        reply_count,
    })
}

/// 解码HTML实体并折叠空白
fn clean_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 分页拉取评论
///
/// 评论是尽力而为的附加数据：任何一页失败都返回空列表，不影响视频本身
pub async fn fetch_comments(
    fetcher: &dyn PageFetcher,
    config: &ScraperConfig,
    origin: &str,
    video_id: &str,
    referer: &str,
) -> Vec<Comment> {
    let limit = config.max_comments as usize;
    if limit == 0 {
        return Vec::new();
    }

    match collect_pages(fetcher, config, origin, video_id, referer, limit).await {
        Ok(comments) => {
            debug!(video_id, count = comments.len(), "评论获取完成");
            comments
        }
        Err(e) => {
            warn!(video_id, "评论获取失败，返回空列表: {}", e);
            counter!("vidscrape_comment_failures_total").increment(1);
            Vec::new()
        }
    }
}

async fn collect_pages(
    fetcher: &dyn PageFetcher,
    config: &ScraperConfig,
    origin: &str,
    video_id: &str,
    referer: &str,
    limit: usize,
) -> Result<Vec<Comment>, ScrapeError> {
    let mut comments: Vec<Comment> = Vec::new();
    let mut cursor = String::new();

    while comments.len() < limit {
        let count = (limit - comments.len()).min(config.comment_page_size as usize);
        let count_text = count.to_string();
        let url = expand_template(
            &config.comment_endpoint,
            &[
                ("origin", origin),
                ("vid", video_id),
                ("cursor", cursor.as_str()),
                ("count", count_text.as_str()),
            ],
        );

        let response = fetcher
            .fetch(&FetchRequest::new(url).with_referer(referer))
            .await?;
        let page = parse_comment_page(&response.text())?;
        let received = page.comments.len();
        comments.extend(page.comments);

        let next = match page.next_cursor {
            Some(next) if page.has_more && received > 0 && next != cursor => next,
            _ => break,
        };
        cursor = next;
    }

    comments.truncate(limit);
    Ok(comments)
}
