//! chromiumoxide 实现
//!
//! 每个用户一个 Chrome 进程（独立的用户数据目录），每个小组一个 Page。
//! 会话 blob 是序列化后的 cookie 列表。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, TimeSinceEpoch};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::driver::{BrowserDriver, BrowserTab, FetchRequest, LaunchOptions, SessionResource};
use super::js_executor::JsExecutor;
use crate::error::{FetchError, SessionError};
use crate::models::{Credentials, RenderedContent};
use crate::platform::PlatformProfile;

const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PAGE_SETTLE: Duration = Duration::from_millis(1500);

/// 会话 blob 中的一条 cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            http_only: cookie.http_only,
            secure: cookie.secure,
        }
    }
}

impl StoredCookie {
    fn to_param(&self) -> Result<CookieParam, String> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure);
        // 会话 cookie 的 expires 为 -1
        if self.expires > 0.0 {
            builder = builder.expires(TimeSinceEpoch::new(self.expires));
        }
        builder.build()
    }
}

pub fn encode_cookies(cookies: &[StoredCookie]) -> Result<String, SessionError> {
    serde_json::to_string(cookies).map_err(|e| SessionError::Serialization(e.to_string()))
}

pub fn decode_cookies(blob: &str) -> Result<Vec<StoredCookie>, SessionError> {
    serde_json::from_str(blob).map_err(|e| SessionError::Serialization(e.to_string()))
}

/// 启动本地 Chrome 的驱动
pub struct ChromeDriver {
    executable: Option<PathBuf>,
    profile_root: PathBuf,
}

impl ChromeDriver {
    pub fn new(executable: Option<PathBuf>, profile_root: PathBuf) -> Self {
        Self {
            executable,
            profile_root,
        }
    }

    /// 每个用户独立的用户数据目录
    ///
    /// 目录名是清洗后的邮箱加原始邮箱的短哈希，清洗后相同的两个邮箱不会共用目录。
    fn profile_dir(&self, user: &str) -> PathBuf {
        let sanitized: String = user
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = Sha256::digest(user.as_bytes());
        let short = hex::encode(&digest[..4]);
        self.profile_root.join(format!("{sanitized}-{short}"))
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn launch(
        &self,
        user: &str,
        options: &LaunchOptions,
    ) -> Result<Box<dyn SessionResource>, SessionError> {
        info!("[{}] 🚀 启动浏览器 (headless: {})", user, options.headless);

        let mut builder = BrowserConfig::builder();
        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .user_data_dir(self.profile_dir(user))
            .window_size(1280, 900)
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-notifications",
            ])
            .build()
            .map_err(|e| {
                error!("[{}] 配置浏览器失败: {}", user, e);
                SessionError::launch_failed(user, e)
            })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("[{}] 启动浏览器失败: {}", user, e);
            SessionError::launch_failed(user, e)
        })?;

        // 在后台处理浏览器事件
        let tag = user.to_string();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("[{}] 浏览器事件错误: {}", tag, e);
                }
            }
        });

        // 等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        let control = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::launch_failed(user, e))?;

        Ok(Box::new(ChromeSession {
            user: user.to_string(),
            profile: options.profile.clone(),
            browser: Mutex::new(browser),
            handler_task,
            control: JsExecutor::new(control),
        }))
    }
}

/// 一个用户的浏览器进程
struct ChromeSession {
    user: String,
    profile: PlatformProfile,
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    /// 登录、cookie 导入导出用的页面
    control: JsExecutor,
}

impl ChromeSession {
    async fn wait_for_login(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.control.exists(&self.profile.logged_in_selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("[{}] 检查登录状态失败: {}", self.user, e),
            }
            sleep(LOGIN_POLL_INTERVAL).await;
        }
        false
    }
}

#[async_trait]
impl SessionResource for ChromeSession {
    async fn restore(&self, blob: &str) -> Result<(), SessionError> {
        let hydration_failed = |reason: String| SessionError::HydrationFailed {
            user: self.user.clone(),
            reason,
        };

        let params = decode_cookies(blob)?
            .iter()
            .filter_map(|cookie| cookie.to_param().ok())
            .collect::<Vec<_>>();
        if params.is_empty() {
            return Err(hydration_failed("会话中没有可用的 cookie".to_string()));
        }

        let page = self.control.page();
        page.set_cookies(params)
            .await
            .map_err(|e| hydration_failed(e.to_string()))?;
        page.goto(self.profile.home_url.as_str())
            .await
            .map_err(|e| hydration_failed(e.to_string()))?;

        if self.wait_for_login(PAGE_SETTLE * 4).await {
            info!("[{}] ♻️ 已用保存的会话恢复登录", self.user);
            Ok(())
        } else {
            Err(hydration_failed("恢复 cookie 后仍未登录".to_string()))
        }
    }

    async fn login(
        &self,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let page = self.control.page();
        page.goto(self.profile.login_url.as_str())
            .await
            .map_err(|e| SessionError::login_failed(&self.user, e))?;
        sleep(PAGE_SETTLE).await;

        match credentials {
            Some(creds) => {
                info!("[{}] 🔑 自动登录中...", self.user);
                let submitted = self
                    .control
                    .submit_login_form(creds)
                    .await
                    .map_err(|e| SessionError::login_failed(&self.user, e))?;
                if !submitted {
                    warn!("[{}] ⚠️ 未找到登录表单，等待页面跳转", self.user);
                }
            }
            None => {
                info!(
                    "[{}] 👤 未配置密码，请在浏览器窗口中手动登录（{} 秒内）",
                    self.user,
                    timeout.as_secs()
                );
            }
        }

        if self.wait_for_login(timeout).await {
            info!("[{}] ✅ 登录成功", self.user);
            Ok(())
        } else {
            Err(SessionError::login_failed(
                &self.user,
                format!("{} 秒内未检测到登录状态", timeout.as_secs()),
            ))
        }
    }

    async fn export(&self) -> Result<String, SessionError> {
        let cookies = self
            .control
            .page()
            .get_cookies()
            .await
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let stored: Vec<StoredCookie> = cookies.iter().map(StoredCookie::from).collect();
        debug!("[{}] 导出 {} 个 cookie", self.user, stored.len());
        encode_cookies(&stored)
    }

    async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, SessionError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::sub_context_failed(&self.user, e))?;
        Ok(Box::new(ChromeTab {
            executor: JsExecutor::new(page),
            profile: self.profile.clone(),
        }))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("[{}] 关闭浏览器失败: {}", self.user, e);
        }
        if let Err(e) = browser.wait().await {
            debug!("[{}] 等待浏览器退出失败: {}", self.user, e);
        }
        self.handler_task.abort();
        info!("[{}] 🛑 浏览器已关闭", self.user);
    }
}

/// 一个小组使用的标签页
struct ChromeTab {
    executor: JsExecutor,
    profile: PlatformProfile,
}

impl ChromeTab {
    async fn current_url(&self) -> String {
        self.executor
            .page()
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}

fn transient(e: impl std::fmt::Display) -> FetchError {
    FetchError::Transient(e.to_string())
}

#[async_trait]
impl BrowserTab for ChromeTab {
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedContent, FetchError> {
        let page: &Page = self.executor.page();
        match request {
            FetchRequest::Load { url } => {
                page.goto(url.as_str()).await.map_err(transient)?;
                if let Err(e) = page.wait_for_navigation().await {
                    debug!("等待导航完成失败: {}", e);
                }
                sleep(PAGE_SETTLE).await;
            }
            FetchRequest::Scroll { pixels, settle } => {
                self.executor.scroll_by(*pixels).await.map_err(transient)?;
                sleep(*settle).await;
            }
        }

        let url = self.current_url().await;
        if self.profile.is_rejection_url(&url) {
            return Err(FetchError::Rejected(url));
        }

        let items = self
            .executor
            .capture_items(&self.profile.item_selector)
            .await
            .map_err(transient)?;
        Ok(RenderedContent { url, items })
    }

    async fn close(&self) {
        if let Err(e) = self.executor.page().clone().close().await {
            debug!("关闭标签页失败: {}", e);
        }
    }
}
