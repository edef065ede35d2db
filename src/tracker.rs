//! 已处理帖子追踪
//!
//! 每个周期开始时为小组一次性加载已处理 id 集合（[`TrackerView`]），
//! 之后的去重检查都在内存中完成。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::Store;
use crate::utils::retry::{retry_async, RetryPolicy};

/// 小组已处理 id 的内存视图
#[derive(Debug, Clone, Default)]
pub struct TrackerView {
    group_id: String,
    ids: HashSet<String>,
}

impl TrackerView {
    pub fn new(group_id: impl Into<String>, ids: HashSet<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ids,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.ids.contains(post_id)
    }

    /// 本地记录一次已提交的标记
    pub fn insert(&mut self, post_id: &str) {
        self.ids.insert(post_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// 已处理帖子的读写入口，写操作按重试策略退避重试
#[derive(Clone)]
pub struct PostTracker {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl PostTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn load_view(&self, group_id: &str) -> Result<TrackerView, StoreError> {
        let ids = self.store.get_processed_ids(group_id).await?;
        debug!("[{}] 已加载 {} 条已处理记录", group_id, ids.len());
        Ok(TrackerView::new(group_id, ids))
    }

    pub async fn is_processed(&self, group_id: &str, post_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get_processed_ids(group_id).await?.contains(post_id))
    }

    /// 幂等；返回 Ok 时已持久化
    pub async fn mark_processed(&self, group_id: &str, post_id: &str) -> Result<(), StoreError> {
        let label = format!("[{}] 标记帖子 {}", group_id, post_id);
        retry_async(self.retry, &label, || self.store.mark_processed(group_id, post_id))
            .await
            .inspect_err(|e| warn!("❌ {} 失败: {}", label, e))
    }

    /// 记录一次分类失败，返回累计次数
    pub async fn record_failure(&self, group_id: &str, post_id: &str) -> Result<u32, StoreError> {
        let label = format!("[{}] 记录帖子 {} 的失败", group_id, post_id);
        retry_async(self.retry, &label, || self.store.record_failure(group_id, post_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn view_reflects_prior_marks() {
        let store = Arc::new(MemoryStore::new());
        let tracker = PostTracker::new(store.clone()).with_retry(RetryPolicy::once());

        tracker.mark_processed("g1", "p1").await.unwrap();
        tracker.mark_processed("g1", "p1").await.unwrap();

        let view = tracker.load_view("g1").await.unwrap();
        assert!(view.contains("p1"));
        assert_eq!(view.len(), 1);
        assert!(tracker.is_processed("g1", "p1").await.unwrap());
        assert!(!tracker.is_processed("g2", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn failure_count_is_returned() {
        let store = Arc::new(MemoryStore::new());
        let tracker = PostTracker::new(store).with_retry(RetryPolicy::new(2, Duration::ZERO));
        assert_eq!(tracker.record_failure("g1", "p1").await.unwrap(), 1);
        assert_eq!(tracker.record_failure("g1", "p1").await.unwrap(), 2);
    }
}
