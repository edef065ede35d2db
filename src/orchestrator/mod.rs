//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责并发调度和资源管理，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! runner (按周期驱动所有平台)
//!     ↓
//! platform_manager (处理 Vec<User>，每个用户一个任务)
//!     ↓
//! workflow::GroupScraper (处理单个小组)
//!     ↓
//! services (能力层：分类 / 解析 / 过滤)
//!     ↓
//! browser (基础设施：会话与标签页)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：runner 管周期，platform_manager 管用户
//! 2. **资源隔离**：只有编排层持有会话资源
//! 3. **向下依赖**：编排层 → workflow → services → browser
//! 4. **无业务逻辑**：只做调度和统计

pub mod platform_manager;
pub mod registry;
pub mod runner;

pub use platform_manager::{GroupPlatformManager, ManagerDeps, PlatformManager, SyncReport};
pub use registry::{ManagerConstructor, PlatformRegistry};
pub use runner::{RunMode, RunSource, RunSummary, ScraperRunner};
