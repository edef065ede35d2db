//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化 tracing；`RUST_LOG` 优先，否则按 `verbose` 选择 debug / info
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},chromiumoxide=warn,hyper=warn")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
