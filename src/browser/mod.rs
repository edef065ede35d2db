//! 浏览器层：驱动接口、Chrome 实现、按用户共享的会话管理

pub mod chrome;
pub mod driver;
pub mod js_executor;
pub mod shared_manager;

pub use chrome::ChromeDriver;
pub use driver::{BrowserDriver, BrowserTab, FetchRequest, LaunchOptions, SessionResource};
pub use js_executor::JsExecutor;
pub use shared_manager::{AcquireOptions, BrowserHandle, SharedBrowserManager, SubContext};
