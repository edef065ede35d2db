//! 浏览器能力接口
//!
//! 编排层只通过这三个 trait 使用浏览器：
//! - [`BrowserDriver`] 为用户启动会话资源（一个浏览器进程）
//! - [`SessionResource`] 负责登录、导入导出会话、开标签页
//! - [`BrowserTab`] 只会“抓取渲染后的内容”

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, SessionError};
use crate::models::{Credentials, RenderedContent};
use crate::platform::PlatformProfile;

/// 启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub profile: PlatformProfile,
}

/// 一次抓取请求
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    /// 导航到地址并读取页面
    Load { url: String },
    /// 向下滚动后等待加载，再读取页面
    Scroll { pixels: u64, settle: Duration },
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(
        &self,
        user: &str,
        options: &LaunchOptions,
    ) -> Result<Box<dyn SessionResource>, SessionError>;
}

#[async_trait]
pub trait SessionResource: Send + Sync {
    /// 用保存的会话 blob 恢复登录态
    async fn restore(&self, blob: &str) -> Result<(), SessionError>;

    /// 有凭据时自动登录，否则等待手动登录，最长 `timeout`
    async fn login(
        &self,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<(), SessionError>;

    /// 导出当前登录态
    async fn export(&self) -> Result<String, SessionError>;

    async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, SessionError>;

    async fn close(&self);
}

#[async_trait]
pub trait BrowserTab: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedContent, FetchError>;

    async fn close(&self);
}
