//! 共享浏览器管理器
//!
//! 每个用户在进程内最多一个会话资源（浏览器进程），由该用户的所有小组共享；
//! 每个小组拿到一个独立的 [`SubContext`]（标签页）。
//!
//! 释放顺序由类型保证：`SubContext<'a>` 借用 `BrowserHandle`，
//! 而 `release` 按值消费 `BrowserHandle`，所以子上下文全部结束前无法释放会话。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::driver::{BrowserDriver, BrowserTab, FetchRequest, LaunchOptions, SessionResource};
use crate::error::{FetchError, SessionError};
use crate::models::{Credentials, RenderedContent, SessionOutcome, UserAccount};
use crate::session::{SessionEvent, SessionLifecycle, SessionState, SessionStore};

/// 获取会话时的参数
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub launch: LaunchOptions,
    /// 有凭据时的自动登录超时
    pub login_timeout: Duration,
    /// 无凭据时等待手动登录的超时
    pub manual_login_timeout: Duration,
}

impl AcquireOptions {
    fn timeout_for(&self, credentials: Option<&Credentials>) -> Duration {
        if credentials.is_some() {
            self.login_timeout
        } else {
            self.manual_login_timeout
        }
    }
}

struct SessionSlot {
    user: String,
    resource: Box<dyn SessionResource>,
    lifecycle: Mutex<SessionLifecycle>,
    credentials: Option<Credentials>,
    options: AcquireOptions,
    refs: AtomicUsize,
    open_tabs: AtomicUsize,
    peak_tabs: AtomicUsize,
    rejected: AtomicBool,
    logged_in: AtomicBool,
}

impl SessionSlot {
    fn apply(&self, event: SessionEvent) -> Result<SessionState, SessionError> {
        let next = self.lifecycle.lock().apply(event)?;
        debug!("[{}] 会话状态 -> {}", self.user, next);
        Ok(next)
    }
}

/// 某个用户会话资源的句柄
///
/// 不可克隆；每次 `acquire` 得到一个新句柄，必须交还给 `release`。
pub struct BrowserHandle {
    slot: Arc<SessionSlot>,
}

impl BrowserHandle {
    pub fn user(&self) -> &str {
        &self.slot.user
    }

    pub fn state(&self) -> SessionState {
        self.slot.lifecycle.lock().state()
    }

    pub fn history(&self) -> Vec<SessionState> {
        self.slot.lifecycle.lock().history().to_vec()
    }

    /// 来源是否拒绝了该会话
    pub fn is_rejected(&self) -> bool {
        self.slot.rejected.load(Ordering::SeqCst)
    }

    /// 标记会话被拒绝；同一用户的其他小组随后会中止
    pub fn mark_rejected(&self) {
        if !self.slot.rejected.swap(true, Ordering::SeqCst) {
            warn!("[{}] 🚫 来源拒绝了当前会话", self.slot.user);
        }
        if let Err(e) = self.slot.apply(SessionEvent::Rejected) {
            debug!("[{}] {}", self.slot.user, e);
        }
    }

    pub fn open_sub_contexts(&self) -> usize {
        self.slot.open_tabs.load(Ordering::SeqCst)
    }

    pub fn peak_sub_contexts(&self) -> usize {
        self.slot.peak_tabs.load(Ordering::SeqCst)
    }

    /// 本次获取是新登录还是复用了保存的会话
    pub fn session_outcome(&self) -> SessionOutcome {
        if self.slot.logged_in.load(Ordering::SeqCst) {
            SessionOutcome::LoggedIn
        } else {
            SessionOutcome::Restored
        }
    }
}

/// 小组使用的隔离上下文（标签页），借用所属会话的句柄
///
/// 优先调用 [`SubContext::close`]；如果被直接丢弃，Drop 会在后台关闭标签页。
pub struct SubContext<'a> {
    handle: &'a BrowserHandle,
    tab: Option<Box<dyn BrowserTab>>,
}

impl<'a> SubContext<'a> {
    pub fn handle(&self) -> &'a BrowserHandle {
        self.handle
    }

    pub fn is_session_rejected(&self) -> bool {
        self.handle.is_rejected()
    }

    pub fn mark_session_rejected(&self) {
        self.handle.mark_rejected();
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<RenderedContent, FetchError> {
        match &self.tab {
            Some(tab) => tab.fetch(request).await,
            None => Err(FetchError::Transient("标签页已关闭".to_string())),
        }
    }

    pub async fn close(mut self) {
        if let Some(tab) = self.tab.take() {
            tab.close().await;
            self.handle.slot.open_tabs.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SubContext<'_> {
    fn drop(&mut self) {
        let Some(tab) = self.tab.take() else {
            return;
        };
        self.handle.slot.open_tabs.fetch_sub(1, Ordering::SeqCst);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { tab.close().await });
            }
            Err(_) => warn!("[{}] 运行时不可用，标签页未能关闭", self.handle.user()),
        }
    }
}

/// 进程内的用户 → 会话资源注册表
pub struct SharedBrowserManager {
    driver: Arc<dyn BrowserDriver>,
    sessions: SessionStore,
    slots: Mutex<HashMap<String, Arc<SessionSlot>>>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    transitions: Mutex<HashMap<String, Vec<SessionState>>>,
    open_sessions: AtomicUsize,
    peak_sessions: AtomicUsize,
}

impl SharedBrowserManager {
    pub fn new(driver: Arc<dyn BrowserDriver>, sessions: SessionStore) -> Self {
        Self {
            driver,
            sessions,
            slots: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
            open_sessions: AtomicUsize::new(0),
            peak_sessions: AtomicUsize::new(0),
        }
    }

    fn existing_handle(&self, user: &str) -> Option<BrowserHandle> {
        let slots = self.slots.lock();
        slots.get(user).map(|slot| {
            slot.refs.fetch_add(1, Ordering::SeqCst);
            BrowserHandle { slot: slot.clone() }
        })
    }

    fn user_lock(&self, user: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .lock()
            .entry(user.to_string())
            .or_default()
            .clone()
    }

    /// 获取用户的会话资源
    ///
    /// 进程内已有则直接复用；否则启动新资源，优先用保存的会话恢复，
    /// 恢复不了再走登录流程。登录失败时资源被关闭并返回错误。
    pub async fn acquire(
        &self,
        user: &UserAccount,
        options: &AcquireOptions,
    ) -> Result<BrowserHandle, SessionError> {
        if let Some(handle) = self.existing_handle(&user.email) {
            return Ok(handle);
        }

        let lock = self.user_lock(&user.email);
        let _guard = lock.lock().await;
        if let Some(handle) = self.existing_handle(&user.email) {
            return Ok(handle);
        }

        let email = user.email.as_str();
        let record = self.sessions.load(email).await?;
        let mut lifecycle = SessionLifecycle::from_record(email, record.as_ref());

        let resource = self.driver.launch(email, &options.launch).await?;
        let open = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_sessions.fetch_max(open, Ordering::SeqCst);

        if lifecycle.state() == SessionState::Active {
            let blob = record.and_then(|r| r.blob).unwrap_or_default();
            match resource.restore(&blob).await {
                Ok(()) => {
                    lifecycle.apply(SessionEvent::HydrationSucceeded)?;
                }
                Err(e) => {
                    warn!("[{}] ⚠️ 保存的会话已失效: {}", email, e);
                    lifecycle.apply(SessionEvent::HydrationFailed)?;
                    // 失败只记日志，接下来会重新登录
                    let _ = self.sessions.expire(email).await;
                }
            }
        }

        let credentials = user.credentials();
        let mut logged_in = false;
        if lifecycle.state() != SessionState::Active {
            lifecycle.apply(SessionEvent::LoginStarted)?;
            let timeout = options.timeout_for(credentials.as_ref());
            match self
                .login_resource(email, resource.as_ref(), credentials.as_ref(), timeout)
                .await
            {
                Ok(()) => {
                    lifecycle.apply(SessionEvent::LoginSucceeded)?;
                    logged_in = true;
                }
                Err(e) => {
                    lifecycle.apply(SessionEvent::LoginFailed)?;
                    error!("[{}] ❌ {}", email, e);
                    resource.close().await;
                    self.open_sessions.fetch_sub(1, Ordering::SeqCst);
                    self.record_transitions(email, lifecycle.history());
                    return Err(e);
                }
            }
        }

        let slot = Arc::new(SessionSlot {
            user: email.to_string(),
            resource,
            lifecycle: Mutex::new(lifecycle),
            credentials,
            options: options.clone(),
            refs: AtomicUsize::new(1),
            open_tabs: AtomicUsize::new(0),
            peak_tabs: AtomicUsize::new(0),
            rejected: AtomicBool::new(false),
            logged_in: AtomicBool::new(logged_in),
        });
        self.slots.lock().insert(email.to_string(), slot.clone());
        Ok(BrowserHandle { slot })
    }

    /// 登录并保存会话
    async fn login_resource(
        &self,
        user: &str,
        resource: &dyn SessionResource,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        resource.login(credentials, timeout).await?;
        match resource.export().await {
            Ok(blob) => {
                if let Err(e) = self.sessions.persist(user, &blob).await {
                    warn!("[{}] ⚠️ 会话保存失败，下次启动需重新登录: {}", user, e);
                }
            }
            Err(e) => warn!("[{}] ⚠️ 导出会话失败: {}", user, e),
        }
        Ok(())
    }

    /// 打开一个隔离的子上下文
    pub async fn open_sub_context<'a>(
        &self,
        handle: &'a BrowserHandle,
    ) -> Result<SubContext<'a>, SessionError> {
        let tab = handle.slot.resource.open_tab().await?;
        let open = handle.slot.open_tabs.fetch_add(1, Ordering::SeqCst) + 1;
        handle.slot.peak_tabs.fetch_max(open, Ordering::SeqCst);
        Ok(SubContext {
            handle,
            tab: Some(tab),
        })
    }

    /// 会话被拒绝后：标记过期并立即尝试重新登录
    ///
    /// 会话未被拒绝时什么也不做。
    pub async fn renew(&self, handle: &BrowserHandle) -> Result<(), SessionError> {
        if !handle.is_rejected() {
            return Ok(());
        }
        let slot = &handle.slot;
        info!("[{}] 🔄 会话已过期，尝试重新登录", slot.user);
        // 失败只记日志
        let _ = self.sessions.expire(&slot.user).await;

        slot.apply(SessionEvent::LoginStarted)?;
        let timeout = slot.options.timeout_for(slot.credentials.as_ref());
        match self
            .login_resource(
                &slot.user,
                slot.resource.as_ref(),
                slot.credentials.as_ref(),
                timeout,
            )
            .await
        {
            Ok(()) => {
                slot.apply(SessionEvent::LoginSucceeded)?;
                slot.rejected.store(false, Ordering::SeqCst);
                slot.logged_in.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                slot.apply(SessionEvent::LoginFailed)?;
                Err(e)
            }
        }
    }

    /// 交还句柄；最后一个句柄交还时关闭会话资源
    pub async fn release(&self, handle: BrowserHandle) -> Result<(), SessionError> {
        let slot = handle.slot;
        let open = slot.open_tabs.load(Ordering::SeqCst);
        if open > 0 {
            return Err(SessionError::SubContextsOpen {
                user: slot.user.clone(),
                open,
            });
        }
        if slot.refs.fetch_sub(1, Ordering::SeqCst) > 1 {
            return Ok(());
        }

        {
            let mut slots = self.slots.lock();
            if slots
                .get(&slot.user)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                slots.remove(&slot.user);
            }
        }
        self.close_slot(&slot).await;
        Ok(())
    }

    /// 关闭所有仍在运行的会话资源（进程退出前调用）
    pub async fn release_all(&self) {
        let remaining: Vec<Arc<SessionSlot>> = self.slots.lock().drain().map(|(_, s)| s).collect();
        if !remaining.is_empty() {
            info!("🧹 关闭剩余的 {} 个浏览器会话", remaining.len());
        }
        for slot in remaining {
            self.close_slot(&slot).await;
        }
    }

    async fn close_slot(&self, slot: &SessionSlot) {
        let history = slot.lifecycle.lock().history().to_vec();
        self.record_transitions(&slot.user, &history);
        slot.resource.close().await;
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!("[{}] 会话资源已释放", slot.user);
    }

    /// 只保留每个用户最近一次会话的状态历史
    fn record_transitions(&self, user: &str, history: &[SessionState]) {
        self.transitions
            .lock()
            .insert(user.to_string(), history.to_vec());
    }

    /// 用户最近一次会话经历的状态；会话仍打开时返回当前会话的
    pub fn session_transitions(&self, user: &str) -> Vec<SessionState> {
        if let Some(slot) = self.slots.lock().get(user) {
            return slot.lifecycle.lock().history().to_vec();
        }
        self.transitions
            .lock()
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub fn open_session_count(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn peak_session_count(&self) -> usize {
        self.peak_sessions.load(Ordering::SeqCst)
    }
}
