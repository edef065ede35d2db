//! 错误类型
//!
//! 按失败范围划分：配置 / 会话 / 抓取 / 分类 / 存储。
//! 只有启动阶段的 [`ConfigError`] 会终止进程，其余错误都在
//! 小组 < 用户 < 平台 的最小范围内被隔离并写入周期报告。

use std::path::PathBuf;

use thiserror::Error;

/// 应用程序根错误
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("会话错误: {0}")]
    Session(#[from] SessionError),

    #[error("抓取错误: {0}")]
    Fetch(#[from] FetchError),

    #[error("分类错误: {0}")]
    Classify(#[from] ClassifyError),

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 配置文件错误，启动阶段出现即终止
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件失败 ({path}): {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    #[error("配置项无效 ({key}): {reason}")]
    InvalidValue { key: String, reason: String },
}

/// 会话（浏览器资源 + 登录态）错误
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("[{user}] 启动浏览器失败: {reason}")]
    LaunchFailed { user: String, reason: String },

    #[error("[{user}] 登录失败: {reason}")]
    LoginFailed { user: String, reason: String },

    #[error("[{user}] 恢复会话失败: {reason}")]
    HydrationFailed { user: String, reason: String },

    #[error("[{user}] 创建标签页失败: {reason}")]
    SubContextFailed { user: String, reason: String },

    #[error("[{user}] 仍有 {open} 个标签页未关闭，无法释放会话")]
    SubContextsOpen { user: String, open: usize },

    #[error("[{user}] 会话状态迁移非法: {from:?} -> {event}")]
    InvalidTransition {
        user: String,
        from: crate::session::SessionState,
        event: String,
    },

    #[error("会话数据序列化失败: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 单次抓取的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 可重试（网络、渲染、脚本执行失败）
    #[error("临时抓取失败: {0}")]
    Transient(String),

    #[error("抓取超时 ({secs}s)")]
    Timeout { secs: u64 },

    /// 来源拒绝了当前会话（跳转到登录页 / 安全检查）
    #[error("来源拒绝当前会话: {0}")]
    Rejected(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Rejected(_))
    }
}

/// 分类服务错误（整批失败）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("分类接口调用失败: {0}")]
    Api(String),

    #[error("分类超时 ({secs}s)")]
    Timeout { secs: u64 },

    #[error("分类结果无法解析: {0}")]
    InvalidResponse(String),
}

/// 持久化存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("数据库连接失败: {0}")]
    Connection(String),

    #[error("数据库操作失败: {0}")]
    Database(String),

    #[error("数据序列化失败: {0}")]
    Serialization(String),

    #[error("后台任务失败: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl SessionError {
    pub fn login_failed(user: impl Into<String>, reason: impl ToString) -> Self {
        SessionError::LoginFailed {
            user: user.into(),
            reason: reason.to_string(),
        }
    }

    pub fn launch_failed(user: impl Into<String>, reason: impl ToString) -> Self {
        SessionError::LaunchFailed {
            user: user.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sub_context_failed(user: impl Into<String>, reason: impl ToString) -> Self {
        SessionError::SubContextFailed {
            user: user.into(),
            reason: reason.to_string(),
        }
    }
}

impl ConfigError {
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Other(e.to_string())
    }
}

/// 应用程序结果类型
pub type AppResult<T> = std::result::Result<T, AppError>;
