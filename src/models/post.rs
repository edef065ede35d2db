use serde::{Deserialize, Serialize};

/// 页面上解析出的一条候选帖子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub post_id: String,
    pub text: String,
    pub author: Option<String>,
    pub permalink: Option<String>,
}

/// 渲染后页面中的一个条目（article 节点）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedItem {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
}

/// 一次抓取得到的渲染内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedContent {
    pub url: String,
    pub items: Vec<RenderedItem>,
}
