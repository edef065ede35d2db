//! 账号、小组、会话记录

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GroupEntry, Options, UserEntry};
use crate::session::SessionState;

/// 抓取账号
///
/// 首次同步配置或首次登录成功时创建，从不被隐式删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub platform: String,
    pub email: String,
    pub password: Option<String>,
    pub active: bool,
    /// 用户级配置层
    pub settings: Options,
    pub session_blob: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserAccount {
    pub fn new(platform: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            email: email.into(),
            password: None,
            active: true,
            settings: Options::new(),
            session_blob: None,
            last_login: None,
        }
    }

    pub fn from_entry(platform: &str, entry: &UserEntry) -> Self {
        Self {
            password: entry.password.clone().filter(|p| !p.is_empty()),
            active: entry.active,
            settings: entry.settings.clone(),
            ..Self::new(platform, entry.email.trim())
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.password.as_ref().map(|password| Credentials {
            email: self.email.clone(),
            password: password.clone(),
        })
    }
}

/// 登录凭据
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// 用户监控的一个小组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTarget {
    pub platform: String,
    pub user_email: String,
    pub group_id: String,
    pub name: Option<String>,
    /// 小组级覆盖层
    pub config: Options,
}

impl GroupTarget {
    pub fn from_entry(platform: &str, user_email: &str, entry: &GroupEntry) -> Self {
        Self {
            platform: platform.to_string(),
            user_email: user_email.to_string(),
            group_id: entry.group_id.trim().to_string(),
            name: entry.name.clone(),
            config: entry.config.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.group_id)
    }
}

/// 小组同步结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSyncStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl std::ops::AddAssign for GroupSyncStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

/// 持久化的会话记录
///
/// PENDING 只存在于进程内，不落库。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionRecord {
    pub blob: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub expired: bool,
}

impl SessionRecord {
    pub fn state(&self) -> SessionState {
        match (&self.blob, self.expired) {
            (None, _) => SessionState::Absent,
            (Some(_), true) => SessionState::Expired,
            (Some(_), false) => SessionState::Active,
        }
    }
}
