//! 持久化存储
//!
//! 账号、小组、会话、已处理帖子、房源都经由 [`Store`] 读写。
//! 所有写操作按 key 独立：会话记录后写者胜，已处理帖子只追加。

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ExtractedListing, GroupSyncStats, GroupTarget, SessionRecord, UserAccount};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// 新增或更新账号；已有的会话数据不会被覆盖，
    /// 配置里没有密码时保留已存的密码
    async fn upsert_user(&self, user: &UserAccount) -> StoreResult<()>;

    async fn get_user(&self, platform: &str, email: &str) -> StoreResult<Option<UserAccount>>;

    async fn get_active_users(&self, platform: &str) -> StoreResult<Vec<UserAccount>>;

    async fn get_groups(&self, platform: &str, email: &str) -> StoreResult<Vec<GroupTarget>>;

    /// 用给定列表替换该用户的小组，未列出的会被删除
    async fn replace_groups(
        &self,
        platform: &str,
        email: &str,
        groups: &[GroupTarget],
    ) -> StoreResult<GroupSyncStats>;

    async fn get_session(&self, platform: &str, email: &str) -> StoreResult<Option<SessionRecord>>;

    async fn save_session(
        &self,
        platform: &str,
        email: &str,
        blob: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn expire_session(&self, platform: &str, email: &str) -> StoreResult<()>;

    async fn get_processed_ids(&self, group_id: &str) -> StoreResult<HashSet<String>>;

    /// 幂等，返回前已持久化
    async fn mark_processed(&self, group_id: &str, post_id: &str) -> StoreResult<()>;

    /// 记录一次分类失败，返回该帖子累计失败次数
    async fn record_failure(&self, group_id: &str, post_id: &str) -> StoreResult<u32>;

    /// 按 (group_id, post_id) 覆盖写入
    async fn save_listing(&self, listing: &ExtractedListing) -> StoreResult<()>;
}
