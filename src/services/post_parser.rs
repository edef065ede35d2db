//! 帖子解析
//!
//! 从渲染后的 article 节点中取出帖子 id、正文、作者和链接。纯函数，不做 I/O。

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{RawPost, RenderedContent, RenderedItem};

static POST_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/posts/(\d+)").expect("valid regex"));
static DATA_FT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-ft="([^"]*)""#).expect("valid regex"));
static TOP_LEVEL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""top_level_post_id"\s*:\s*"(\d+)""#).expect("valid regex")
});
static PERMALINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"permalink/(\d+)").expect("valid regex"));
static POST_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="([^"]*(?:/posts/|permalink/)\d+[^"]*)""#).expect("valid regex")
});
static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:h2|h3|strong)[^>]*>(?:\s*<[^>]+>)*\s*([^<]+?)\s*<").expect("valid regex")
});

const SOURCE_ORIGIN: &str = "https://www.facebook.com";

/// 依次尝试：帖子路径、data-ft 中的 top_level_post_id、permalink
pub fn extract_post_id(html: &str) -> Option<String> {
    if let Some(caps) = POST_PATH_RE.captures(html) {
        return Some(caps[1].to_string());
    }
    if let Some(data_ft) = DATA_FT_RE.captures(html) {
        // data-ft 里的引号是 HTML 实体
        let decoded = data_ft[1].replace("&quot;", "\"");
        if let Some(caps) = TOP_LEVEL_ID_RE.captures(&decoded) {
            return Some(caps[1].to_string());
        }
    }
    PERMALINK_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
}

/// 帖子链接（补全为绝对地址，去掉查询参数）
pub fn extract_permalink(html: &str) -> Option<String> {
    let href = POST_HREF_RE.captures(html)?[1].replace("&amp;", "&");
    let href = href.split('?').next().unwrap_or_default();
    if href.starts_with("http") {
        Some(href.to_string())
    } else if href.starts_with('/') {
        Some(format!("{SOURCE_ORIGIN}{href}"))
    } else {
        None
    }
}

pub fn extract_author(html: &str) -> Option<String> {
    AUTHOR_RE
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn parse_item(item: &RenderedItem) -> Option<RawPost> {
    let post_id = extract_post_id(&item.html)?;
    Some(RawPost {
        post_id,
        text: item.text.trim().to_string(),
        author: extract_author(&item.html),
        permalink: extract_permalink(&item.html),
    })
}

/// 解析一次抓取的全部条目，没有 id 的条目被跳过
pub fn parse_rendered(content: &RenderedContent) -> Vec<RawPost> {
    content.items.iter().filter_map(parse_item).collect()
}
