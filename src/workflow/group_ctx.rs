//! 小组处理上下文
//!
//! 封装"我正在为哪个用户抓哪个小组"这一信息

use std::fmt::Display;

use crate::models::GroupTarget;
use crate::platform::PlatformProfile;

/// 小组处理上下文
#[derive(Debug, Clone)]
pub struct GroupCtx {
    pub platform: String,

    /// 所属用户（邮箱）
    pub user: String,

    pub group_id: String,

    /// 小组名称（仅用于日志显示）
    pub group_name: String,

    /// 小组页面地址
    pub url: String,
}

impl GroupCtx {
    pub fn new(profile: &PlatformProfile, target: &GroupTarget) -> Self {
        Self {
            platform: profile.id.clone(),
            user: target.user_email.clone(),
            group_id: target.group_id.clone(),
            group_name: target.display_name().to_string(),
            url: profile.group_url(&target.group_id),
        }
    }
}

impl Display for GroupCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} 小组 {}#{}]",
            self.user, self.group_name, self.group_id
        )
    }
}
