//! 会话数据的持久化入口
//!
//! 会话 blob 对本模块是不透明的字符串，只负责按 (平台, 用户) 读写。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::SessionRecord;
use crate::store::Store;
use crate::utils::retry::{retry_async, RetryPolicy};

#[derive(Clone)]
pub struct SessionStore {
    platform: String,
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl SessionStore {
    pub fn new(platform: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self {
            platform: platform.into(),
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub async fn load(&self, user: &str) -> Result<Option<SessionRecord>, StoreError> {
        let record = self.store.get_session(&self.platform, user).await?;
        debug!(
            "[{}] 会话记录: {}",
            user,
            record
                .as_ref()
                .map_or("无".to_string(), |r| r.state().to_string())
        );
        Ok(record)
    }

    /// 保存登录后的会话，同时更新 last_login
    pub async fn persist(&self, user: &str, blob: &str) -> Result<(), StoreError> {
        let label = format!("[{}] 保存会话", user);
        retry_async(self.retry, &label, || {
            self.store.save_session(&self.platform, user, blob, Utc::now())
        })
        .await
    }

    pub async fn expire(&self, user: &str) -> Result<(), StoreError> {
        let label = format!("[{}] 标记会话过期", user);
        retry_async(self.retry, &label, || self.store.expire_session(&self.platform, user))
            .await
            .inspect_err(|e| warn!("⚠️ {} 失败: {}", label, e))
    }
}
