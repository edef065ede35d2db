//! 平台管理器 - 编排层
//!
//! ## 职责
//!
//! 1. **配置同步**：把配置文件里的用户和小组写入存储（幂等）
//! 2. **并发控制**：每个用户一个任务，用 Semaphore 限制同时运行的用户数
//! 3. **会话管理**：为用户获取共享会话，组内小组各开一个子上下文
//! 4. **向下委托**：委托 `GroupScraper` 处理单个小组
//!
//! 单个用户的失败不影响其他用户，单个小组的失败不影响同用户的其他小组。

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::browser::{
    AcquireOptions, BrowserDriver, BrowserHandle, LaunchOptions, SharedBrowserManager,
};
use crate::config::{resolve, EffectiveConfig, Options, ScraperDocument};
use crate::error::AppResult;
use crate::models::{
    CycleReport, FailureKind, GroupSyncStats, GroupTarget, PlatformReport, SessionOutcome,
    UserAccount, UserReport,
};
use crate::platform::PlatformProfile;
use crate::services::Classifier;
use crate::session::SessionStore;
use crate::store::Store;
use crate::tracker::PostTracker;
use crate::workflow::{GroupCtx, GroupScraper};

/// 构造平台管理器所需的共享依赖
#[derive(Clone)]
pub struct ManagerDeps {
    pub store: Arc<dyn Store>,
    pub driver: Arc<dyn BrowserDriver>,
    pub classifier: Arc<dyn Classifier>,
    pub document: Arc<ScraperDocument>,
    /// 只处理这个用户（邮箱）
    pub user_filter: Option<String>,
}

impl ManagerDeps {
    fn accepts(&self, email: &str) -> bool {
        self.user_filter
            .as_deref()
            .map_or(true, |only| only.eq_ignore_ascii_case(email))
    }
}

/// 配置同步结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub users: usize,
    pub groups: GroupSyncStats,
    /// 写入失败的用户数
    pub failed: usize,
}

#[async_trait]
pub trait PlatformManager: Send + Sync {
    fn platform(&self) -> &str;

    /// 处理存储中所有启用的用户
    async fn run_db_users(&self) -> PlatformReport;

    /// 直接处理配置文件中的用户，不读存储中的用户列表
    async fn run_config_users(&self) -> PlatformReport;

    /// 把配置中的用户和小组同步到存储，不抓取
    async fn init_users_from_config(&self) -> AppResult<SyncReport>;

    /// 关闭仍在运行的浏览器会话
    async fn shutdown(&self);
}

/// 基于小组页面抓取的平台管理器
pub struct GroupPlatformManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    profile: PlatformProfile,
    deps: ManagerDeps,
    browsers: SharedBrowserManager,
    scraper: GroupScraper,
}

impl GroupPlatformManager {
    pub fn new(profile: PlatformProfile, deps: ManagerDeps) -> Self {
        let store_retry = platform_config(&deps.document, &profile.id)
            .scrape_settings()
            .store_retry;
        let sessions =
            SessionStore::new(profile.id.clone(), deps.store.clone()).with_retry(store_retry);
        let browsers = SharedBrowserManager::new(deps.driver.clone(), sessions);
        let scraper = GroupScraper::new(deps.store.clone(), deps.classifier.clone());
        Self {
            inner: Arc::new(ManagerInner {
                profile,
                deps,
                browsers,
                scraper,
            }),
        }
    }

    /// 会话管理器（用于查看会话状态和资源计数）
    pub fn browsers(&self) -> &SharedBrowserManager {
        &self.inner.browsers
    }

    async fn run_users(&self, work: Vec<(UserAccount, Vec<GroupTarget>)>, report: &mut PlatformReport) {
        if work.is_empty() {
            warn!("[{}] ⚠️ 没有需要处理的用户", self.inner.profile.id);
            return;
        }

        let limit = self.inner.platform_config().max_concurrent_users();
        let semaphore = Arc::new(Semaphore::new(limit));
        info!(
            "[{}] 👥 {} 个用户，最多同时处理 {} 个",
            self.inner.profile.id,
            work.len(),
            limit
        );

        let mut handles = Vec::new();
        for (user, groups) in work {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("[{}] 获取并发许可失败: {}", user.email, e);
                    report.errors.push(format!("[{}] {}", user.email, e));
                    continue;
                }
            };
            let inner = self.inner.clone();
            let email = user.email.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                inner.run_user(user, groups).await
            });
            handles.push((email, handle));
        }

        for (email, handle) in handles {
            match handle.await {
                Ok(user_report) => report.users.push(user_report),
                Err(e) => {
                    error!("[{}] 任务执行失败: {}", email, e);
                    report.errors.push(format!("[{}] 任务执行失败: {}", email, e));
                }
            }
        }
    }
}

fn platform_defaults(document: &ScraperDocument, platform: &str) -> Options {
    document
        .platform(platform)
        .map(|section| section.defaults.clone())
        .unwrap_or_default()
}

/// 平台级配置（全局层 + 平台默认）
fn platform_config(document: &ScraperDocument, platform: &str) -> EffectiveConfig {
    let global = document.global_layer();
    resolve(Some(&global), Some(&platform_defaults(document, platform)), None, None)
}

impl ManagerInner {
    fn platform_defaults(&self) -> Options {
        platform_defaults(&self.deps.document, &self.profile.id)
    }

    fn platform_config(&self) -> EffectiveConfig {
        platform_config(&self.deps.document, &self.profile.id)
    }

    async fn run_user(&self, user: UserAccount, groups: Vec<GroupTarget>) -> UserReport {
        let mut report = UserReport::new(&user.email);
        let global = self.deps.document.global_layer();
        let platform = self.platform_defaults();
        let user_config = resolve(Some(&global), Some(&platform), Some(&user.settings), None);

        let options = AcquireOptions {
            launch: LaunchOptions {
                headless: user_config.headless(),
                profile: self.profile.clone(),
            },
            login_timeout: user_config.login_timeout(),
            manual_login_timeout: user_config.manual_login_timeout(),
        };

        info!("[{}] 👤 开始处理 {} 个小组", user.email, groups.len());
        let handle = match self.browsers.acquire(&user, &options).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("[{}] ❌ 会话不可用，本周期跳过: {}", user.email, e);
                let reason = e.to_string();
                report.groups = groups
                    .iter()
                    .map(|g| CycleReport::skipped(&g.group_id, FailureKind::LoginFailure, &reason))
                    .collect();
                report.session = SessionOutcome::LoginFailed(reason);
                return report;
            }
        };
        report.session = handle.session_outcome();

        let concurrency = user_config.group_concurrency(groups.len()).max(1);
        let runs: Vec<_> = groups
            .iter()
            .map(|target| self.run_group(&handle, &global, &platform, &user, target))
            .collect();
        report.groups = stream::iter(runs).buffered(concurrency).collect().await;

        if handle.is_rejected() {
            report.session = match self.browsers.renew(&handle).await {
                Ok(()) => SessionOutcome::Renewed,
                Err(e) => {
                    error!("[{}] ❌ 重新登录失败: {}", user.email, e);
                    SessionOutcome::RenewFailed(e.to_string())
                }
            };
        }

        if let Err(e) = self.browsers.release(handle).await {
            error!("[{}] 释放会话失败: {}", user.email, e);
        }
        report
    }

    async fn run_group(
        &self,
        handle: &BrowserHandle,
        global: &Options,
        platform: &Options,
        user: &UserAccount,
        target: &GroupTarget,
    ) -> CycleReport {
        let ctx = GroupCtx::new(&self.profile, target);
        if handle.is_rejected() {
            return CycleReport::skipped(
                &target.group_id,
                FailureKind::SessionRejected,
                "会话被来源拒绝",
            );
        }

        let config = resolve(
            Some(global),
            Some(platform),
            Some(&user.settings),
            Some(&target.config),
        );
        let tracker = PostTracker::new(self.deps.store.clone())
            .with_retry(config.scrape_settings().store_retry);
        let view = match tracker.load_view(&target.group_id).await {
            Ok(view) => view,
            Err(e) => {
                error!("{} ❌ 读取已处理记录失败: {}", ctx, e);
                return CycleReport::skipped(
                    &target.group_id,
                    FailureKind::StoreReadFailure,
                    e.to_string(),
                );
            }
        };

        let sub = match self.browsers.open_sub_context(handle).await {
            Ok(sub) => sub,
            Err(e) => {
                error!("{} ❌ 打开标签页失败: {}", ctx, e);
                return CycleReport::skipped(
                    &target.group_id,
                    FailureKind::TransientFetch,
                    e.to_string(),
                );
            }
        };
        let report = self.scraper.run(&ctx, &sub, &config, view).await;
        sub.close().await;
        report
    }
}

#[async_trait]
impl PlatformManager for GroupPlatformManager {
    fn platform(&self) -> &str {
        &self.inner.profile.id
    }

    async fn run_db_users(&self) -> PlatformReport {
        let inner = &self.inner;
        let platform = inner.profile.id.as_str();
        let mut report = PlatformReport::new(platform);

        let users = match inner.deps.store.get_active_users(platform).await {
            Ok(users) => users,
            Err(e) => {
                error!("[{}] ❌ 读取用户失败: {}", platform, e);
                report.errors.push(format!("读取用户失败: {}", e));
                return report;
            }
        };

        let mut work = Vec::new();
        for user in users.into_iter().filter(|u| inner.deps.accepts(&u.email)) {
            match inner.deps.store.get_groups(platform, &user.email).await {
                Ok(groups) if groups.is_empty() => {
                    warn!("[{}] ⚠️ 没有配置小组，跳过", user.email);
                }
                Ok(groups) => work.push((user, groups)),
                Err(e) => {
                    error!("[{}] ❌ 读取小组失败: {}", user.email, e);
                    report.errors.push(format!("[{}] 读取小组失败: {}", user.email, e));
                }
            }
        }

        self.run_users(work, &mut report).await;
        report
    }

    async fn run_config_users(&self) -> PlatformReport {
        let inner = &self.inner;
        let platform = inner.profile.id.as_str();
        let mut report = PlatformReport::new(platform);
        let Some(section) = inner.deps.document.platform(platform) else {
            return report;
        };

        let work: Vec<(UserAccount, Vec<GroupTarget>)> = section
            .users
            .iter()
            .filter(|entry| entry.active && inner.deps.accepts(&entry.email))
            .filter_map(|entry| {
                let account = UserAccount::from_entry(platform, entry);
                let groups: Vec<GroupTarget> = entry
                    .groups
                    .iter()
                    .map(|g| GroupTarget::from_entry(platform, &account.email, g))
                    .collect();
                if groups.is_empty() {
                    warn!("[{}] ⚠️ 没有配置小组，跳过", account.email);
                    None
                } else {
                    Some((account, groups))
                }
            })
            .collect();

        self.run_users(work, &mut report).await;
        report
    }

    async fn init_users_from_config(&self) -> AppResult<SyncReport> {
        let inner = &self.inner;
        let platform = inner.profile.id.as_str();
        let mut sync = SyncReport::default();
        let Some(section) = inner.deps.document.platform(platform) else {
            return Ok(sync);
        };

        for entry in section.users.iter().filter(|e| inner.deps.accepts(&e.email)) {
            let account = UserAccount::from_entry(platform, entry);
            let targets: Vec<GroupTarget> = entry
                .groups
                .iter()
                .map(|g| GroupTarget::from_entry(platform, &account.email, g))
                .collect();

            let synced = async {
                inner.deps.store.upsert_user(&account).await?;
                inner
                    .deps
                    .store
                    .replace_groups(platform, &account.email, &targets)
                    .await
            }
            .await;

            match synced {
                Ok(stats) => {
                    info!(
                        "[{}] ✓ 已同步: 新增 {} / 更新 {} / 删除 {} 个小组",
                        account.email, stats.added, stats.updated, stats.removed
                    );
                    sync.users += 1;
                    sync.groups += stats;
                }
                Err(e) => {
                    error!("[{}] ❌ 同步失败: {}", account.email, e);
                    sync.failed += 1;
                }
            }
        }
        Ok(sync)
    }

    async fn shutdown(&self) {
        self.inner.browsers.release_all().await;
    }
}
