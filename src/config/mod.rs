//! 配置层
//!
//! - `document` - 声明式配置文件（TOML / JSON）
//! - `resolver` - 四层配置合并
//! - `effective` - 合并结果与强类型访问
//! - `runtime` - 环境变量中的进程级参数

pub mod document;
pub mod effective;
pub mod resolver;
pub mod runtime;

pub use document::{GroupEntry, PlatformSection, ScraperDocument, UserEntry};
pub use effective::{builtin_defaults, EffectiveConfig, ScrapeSettings};
pub use resolver::{merge_layers, resolve, Options};
pub use runtime::RuntimeSettings;
