//! 集成测试用的假浏览器、假分类器和可注入故障的存储

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use group_harvester::browser::{
    BrowserDriver, BrowserTab, FetchRequest, LaunchOptions, SessionResource,
};
use group_harvester::config::ScraperDocument;
use group_harvester::error::{ClassifyError, FetchError, SessionError};
use group_harvester::models::{
    Credentials, ExtractedListing, GroupSyncStats, GroupTarget, ListingFields, RenderedContent,
    RenderedItem, SessionRecord, UserAccount,
};
use group_harvester::orchestrator::{GroupPlatformManager, ManagerDeps};
use group_harvester::platform::PlatformProfile;
use group_harvester::services::{ClassifiedItem, Classifier};
use group_harvester::store::{MemoryStore, Store, StoreResult};

pub const LOGIN_WALL: &str = "https://www.facebook.com/login/?next=groups";

pub fn group_url(group_id: &str) -> String {
    PlatformProfile::facebook().group_url(group_id)
}

/// 一条能被解析出 id 的帖子节点
pub fn post_item(post_id: &str, text: &str) -> RenderedItem {
    RenderedItem {
        html: format!(r#"<div role="article"><a href="/groups/g/posts/{post_id}/">link</a></div>"#),
        text: text.to_string(),
    }
}

pub fn document(json: &str) -> Arc<ScraperDocument> {
    Arc::new(ScraperDocument::from_json_str(json, Path::new("test.json")).unwrap())
}

#[derive(Default)]
pub struct DriverState {
    pages: Mutex<HashMap<String, Vec<RenderedItem>>>,
    rejected: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    login_fails: AtomicBool,
    restore_fails: AtomicBool,
    pub launches: AtomicUsize,
    pub logins: AtomicUsize,
    pub restores: AtomicUsize,
    open_sessions: Mutex<HashMap<String, usize>>,
    peak_sessions: Mutex<HashMap<String, usize>>,
    open_tabs: Mutex<HashMap<String, usize>>,
    peak_tabs: Mutex<HashMap<String, usize>>,
}

fn bump(open: &Mutex<HashMap<String, usize>>, peak: &Mutex<HashMap<String, usize>>, user: &str) {
    let now = {
        let mut open = open.lock();
        let entry = open.entry(user.to_string()).or_default();
        *entry += 1;
        *entry
    };
    let mut peak = peak.lock();
    let entry = peak.entry(user.to_string()).or_default();
    *entry = (*entry).max(now);
}

fn drop_one(open: &Mutex<HashMap<String, usize>>, user: &str) {
    if let Some(entry) = open.lock().get_mut(user) {
        *entry = entry.saturating_sub(1);
    }
}

/// 按小组地址返回预设帖子的假浏览器
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub state: Arc<DriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_posts(&self, group_id: &str, items: Vec<RenderedItem>) {
        self.state.pages.lock().insert(group_url(group_id), items);
    }

    /// 打开该小组时被重定向到登录页
    pub fn reject_group(&self, group_id: &str) {
        self.state.rejected.lock().insert(group_url(group_id));
    }

    /// 打开该小组后页面一直不返回
    pub fn hang_group(&self, group_id: &str) {
        self.state.hanging.lock().insert(group_url(group_id));
    }

    pub fn accept_all(&self) {
        self.state.rejected.lock().clear();
    }

    pub fn fail_logins(&self, fail: bool) {
        self.state.login_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restores(&self, fail: bool) {
        self.state.restore_fails.store(fail, Ordering::SeqCst);
    }

    pub fn open_sessions(&self, user: &str) -> usize {
        self.state.open_sessions.lock().get(user).copied().unwrap_or(0)
    }

    pub fn peak_sessions(&self, user: &str) -> usize {
        self.state.peak_sessions.lock().get(user).copied().unwrap_or(0)
    }

    pub fn open_tabs(&self, user: &str) -> usize {
        self.state.open_tabs.lock().get(user).copied().unwrap_or(0)
    }

    pub fn peak_tabs(&self, user: &str) -> usize {
        self.state.peak_tabs.lock().get(user).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(
        &self,
        user: &str,
        _options: &LaunchOptions,
    ) -> Result<Box<dyn SessionResource>, SessionError> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        bump(&self.state.open_sessions, &self.state.peak_sessions, user);
        Ok(Box::new(FakeSession {
            user: user.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    user: String,
    state: Arc<DriverState>,
}

#[async_trait]
impl SessionResource for FakeSession {
    async fn restore(&self, blob: &str) -> Result<(), SessionError> {
        self.state.restores.fetch_add(1, Ordering::SeqCst);
        if self.state.restore_fails.load(Ordering::SeqCst) || blob.is_empty() {
            return Err(SessionError::HydrationFailed {
                user: self.user.clone(),
                reason: "cookie 已失效".to_string(),
            });
        }
        Ok(())
    }

    async fn login(
        &self,
        _credentials: Option<&Credentials>,
        _timeout: Duration,
    ) -> Result<(), SessionError> {
        self.state.logins.fetch_add(1, Ordering::SeqCst);
        if self.state.login_fails.load(Ordering::SeqCst) {
            return Err(SessionError::login_failed(&self.user, "密码错误"));
        }
        Ok(())
    }

    async fn export(&self) -> Result<String, SessionError> {
        Ok(format!("session-{}", self.user))
    }

    async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, SessionError> {
        bump(&self.state.open_tabs, &self.state.peak_tabs, &self.user);
        Ok(Box::new(FakeTab {
            user: self.user.clone(),
            state: self.state.clone(),
            current: Mutex::new(String::new()),
        }))
    }

    async fn close(&self) {
        drop_one(&self.state.open_sessions, &self.user);
    }
}

struct FakeTab {
    user: String,
    state: Arc<DriverState>,
    current: Mutex<String>,
}

#[async_trait]
impl BrowserTab for FakeTab {
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedContent, FetchError> {
        if let FetchRequest::Load { url } = request {
            *self.current.lock() = url.clone();
        }
        let url = self.current.lock().clone();
        if self.state.rejected.lock().contains(&url) {
            return Err(FetchError::Rejected(LOGIN_WALL.to_string()));
        }
        let hangs = self.state.hanging.lock().contains(&url);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        // 让出一次调度，模拟真实的异步 I/O
        tokio::task::yield_now().await;
        let items = self.state.pages.lock().get(&url).cloned().unwrap_or_default();
        Ok(RenderedContent { url, items })
    }

    async fn close(&self) {
        drop_one(&self.state.open_tabs, &self.user);
    }
}

/// 文本含 "FAIL" 的条目单条失败，含 "NOT" 的判为非房源，含 "HANG" 的整批不返回
#[derive(Default)]
pub struct FakeClassifier {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_containing(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|batch| batch.iter().any(|t| t.contains(marker)))
            .count()
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<ClassifiedItem>, ClassifyError> {
        self.calls.lock().push(texts.to_vec());
        if texts.iter().any(|t| t.contains("HANG")) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                if text.contains("FAIL") {
                    (index, Err("模型输出无法解析".to_string()))
                } else {
                    (
                        index,
                        Ok(ListingFields {
                            text: Some(text.clone()),
                            price: Some("4500".to_string()),
                            is_valid: !text.contains("NOT"),
                            ..Default::default()
                        }),
                    )
                }
            })
            .collect())
    }
}

/// 包装 MemoryStore，可以让 mark_processed 失败（模拟分类后、标记前崩溃），
/// 也可以让接下来的若干次 save_session 失败
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_marks: AtomicBool,
    pub failing_session_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_marks: AtomicBool::new(false),
            failing_session_saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn upsert_user(&self, user: &UserAccount) -> StoreResult<()> {
        self.inner.upsert_user(user).await
    }

    async fn get_user(&self, platform: &str, email: &str) -> StoreResult<Option<UserAccount>> {
        self.inner.get_user(platform, email).await
    }

    async fn get_active_users(&self, platform: &str) -> StoreResult<Vec<UserAccount>> {
        self.inner.get_active_users(platform).await
    }

    async fn get_groups(&self, platform: &str, email: &str) -> StoreResult<Vec<GroupTarget>> {
        self.inner.get_groups(platform, email).await
    }

    async fn replace_groups(
        &self,
        platform: &str,
        email: &str,
        groups: &[GroupTarget],
    ) -> StoreResult<GroupSyncStats> {
        self.inner.replace_groups(platform, email, groups).await
    }

    async fn get_session(&self, platform: &str, email: &str) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_session(platform, email).await
    }

    async fn save_session(
        &self,
        platform: &str,
        email: &str,
        blob: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let failing = self
            .failing_session_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(group_harvester::error::StoreError::Database(
                "database is locked".to_string(),
            ));
        }
        self.inner.save_session(platform, email, blob, at).await
    }

    async fn expire_session(&self, platform: &str, email: &str) -> StoreResult<()> {
        self.inner.expire_session(platform, email).await
    }

    async fn get_processed_ids(&self, group_id: &str) -> StoreResult<HashSet<String>> {
        self.inner.get_processed_ids(group_id).await
    }

    async fn mark_processed(&self, group_id: &str, post_id: &str) -> StoreResult<()> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(group_harvester::error::StoreError::Database(
                "进程在标记前退出".to_string(),
            ));
        }
        self.inner.mark_processed(group_id, post_id).await
    }

    async fn record_failure(&self, group_id: &str, post_id: &str) -> StoreResult<u32> {
        self.inner.record_failure(group_id, post_id).await
    }

    async fn save_listing(&self, listing: &ExtractedListing) -> StoreResult<()> {
        self.inner.save_listing(listing).await
    }
}

/// 一个平台管理器和它的假依赖
pub struct Harness {
    pub driver: FakeDriver,
    pub classifier: Arc<FakeClassifier>,
    pub manager: Arc<GroupPlatformManager>,
}

impl Harness {
    pub fn new(store: Arc<dyn Store>, document: Arc<ScraperDocument>) -> Self {
        Self::with_filter(store, document, None)
    }

    pub fn with_filter(
        store: Arc<dyn Store>,
        document: Arc<ScraperDocument>,
        user_filter: Option<&str>,
    ) -> Self {
        let driver = FakeDriver::new();
        let classifier = Arc::new(FakeClassifier::new());
        let deps = ManagerDeps {
            store,
            driver: Arc::new(driver.clone()),
            classifier: classifier.clone(),
            document,
            user_filter: user_filter.map(str::to_string),
        };
        let manager = Arc::new(GroupPlatformManager::new(PlatformProfile::facebook(), deps));
        Self {
            driver,
            classifier,
            manager,
        }
    }
}
