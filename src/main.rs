use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use group_harvester::browser::ChromeDriver;
use group_harvester::cli::{Cli, Command};
use group_harvester::config::{RuntimeSettings, ScraperDocument};
use group_harvester::logger;
use group_harvester::orchestrator::{ManagerDeps, PlatformRegistry, RunMode, RunSource, ScraperRunner};
use group_harvester::services::LlmService;
use group_harvester::store::{MemoryStore, SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 初始化日志
    logger::init(cli.verbose);

    // 加载配置
    let mut settings = RuntimeSettings::from_env();
    if let Some(path) = &cli.config {
        settings.config_path = path.clone();
    }
    if let Some(url) = &cli.database {
        settings.database_url = url.clone();
    }

    let document = match ScraperDocument::load(&settings.config_path).await {
        Ok(document) => Arc::new(document),
        Err(e) => {
            error!("❌ 配置错误，程序无法启动: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn Store> = if cli.dry_store {
        warn!("⚠️ 使用内存存储，结果不会保存");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&settings.database_url)?)
    };

    let deps = ManagerDeps {
        store,
        driver: Arc::new(ChromeDriver::new(
            settings.chrome_executable.clone(),
            settings.profile_root.clone(),
        )),
        classifier: Arc::new(LlmService::new(&settings)),
        document,
        user_filter: cli.user.clone(),
    };
    let runner = ScraperRunner::new(&PlatformRegistry::with_defaults(), deps);

    match cli.resolved_command() {
        Command::Init => {
            let report = runner.init_only().await;
            if report.failed > 0 {
                anyhow::bail!("{} 个用户同步失败", report.failed);
            }
        }
        Command::Run(args) => {
            let mode = RunMode {
                source: if args.from_config {
                    RunSource::Config
                } else {
                    RunSource::Store
                },
                cycles: args.cycles,
                sync: !args.skip_sync,
            };
            tokio::select! {
                summary = runner.run(mode) => {
                    info!("✅ 运行结束: {} 个周期，保存 {} 条房源", summary.cycles, summary.totals.saved);
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("🛑 收到中断信号，正在关闭浏览器...");
                    runner.cleanup().await;
                }
            }
        }
    }

    Ok(())
}
