//! 平台描述：URL 模板、登录页与页面选择器

/// 一个来源平台的静态描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub id: String,
    /// 含 `{group_id}` 占位符
    pub group_url_template: String,
    pub home_url: String,
    pub login_url: String,
    /// 登录成功后页面上会出现的元素
    pub logged_in_selector: String,
    /// 帖子节点
    pub item_selector: String,
    /// 地址中出现这些片段说明来源拒绝了会话
    pub rejection_markers: Vec<String>,
}

impl PlatformProfile {
    pub fn facebook() -> Self {
        Self {
            id: "facebook".to_string(),
            group_url_template: "https://www.facebook.com/groups/{group_id}".to_string(),
            home_url: "https://www.facebook.com/".to_string(),
            login_url: "https://www.facebook.com/login".to_string(),
            logged_in_selector: "div[role='feed'], a[aria-label*='profile'], a[href*='/me/'], div[aria-label*='Account'], div[aria-label*='account']".to_string(),
            item_selector: "div[role='article']".to_string(),
            rejection_markers: vec![
                "/login".to_string(),
                "checkpoint".to_string(),
                "/recover".to_string(),
            ],
        }
    }

    pub fn group_url(&self, group_id: &str) -> String {
        self.group_url_template.replace("{group_id}", group_id)
    }

    /// 抓取后的地址是否表示会话被拒绝
    pub fn is_rejection_url(&self, url: &str) -> bool {
        self.rejection_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }
}
