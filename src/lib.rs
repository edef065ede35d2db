//! # Group Harvester
//!
//! 多账号、多小组的帖子采集引擎：按用户共享浏览器会话，按小组抓取、
//! 去重、批量分类，结果和去重状态都持久化，重启后不重复处理。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Browser / Store）
//! - `browser/` - 浏览器驱动接口、Chrome 实现、按用户共享的会话管理
//! - `store/` - 持久化接口，内存实现与 SQLite 实现
//! - `session/` - 会话状态机与会话存取
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 分类（LLM）、帖子解析、关键词过滤
//! - `tracker` - 已处理帖子记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个小组一个周期"的完整处理流程
//! - `GroupCtx` - 上下文封装（用户 + 小组）
//! - `GroupScraper` - 流程编排（抓取 → 去重 → 分类 → 落库）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/platform_manager` - 单个平台的用户调度
//! - `orchestrator/runner` - 周期驱动与资源清理
//!
//! ## 模块结构

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod services;
pub mod session;
pub mod store;
pub mod tracker;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{ChromeDriver, SharedBrowserManager};
pub use config::{resolve, EffectiveConfig, RuntimeSettings, ScraperDocument};
pub use error::{AppError, AppResult};
pub use orchestrator::{PlatformRegistry, RunMode, RunSource, ScraperRunner};
pub use workflow::{GroupCtx, GroupScraper};
