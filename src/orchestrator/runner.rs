//! 采集运行器 - 编排层顶层
//!
//! 构造所有启用的平台管理器，按周期驱动它们，结束时释放所有浏览器资源。

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use super::platform_manager::{ManagerDeps, PlatformManager, SyncReport};
use super::registry::PlatformRegistry;
use crate::config::ScraperDocument;
use crate::models::{CycleTotals, PlatformReport};
use crate::utils::logging::{log_cycle_start, log_platform_report, log_startup, print_cycle_stats};

/// 用户列表的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSource {
    /// 存储中的启用用户（默认）
    #[default]
    Store,
    /// 直接使用配置文件中的用户
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunMode {
    pub source: RunSource,
    /// `None` 表示持续运行
    pub cycles: Option<u32>,
    /// 运行前先把配置同步到存储
    pub sync: bool,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cycles: u32,
    pub totals: CycleTotals,
    /// 最后一个周期各平台的报告
    pub last_reports: Vec<PlatformReport>,
}

pub struct ScraperRunner {
    document: Arc<ScraperDocument>,
    managers: Vec<Arc<dyn PlatformManager>>,
}

impl ScraperRunner {
    pub fn new(registry: &PlatformRegistry, deps: ManagerDeps) -> Self {
        let managers = registry.build_enabled(&deps);
        Self::from_managers(deps.document, managers)
    }

    pub fn from_managers(
        document: Arc<ScraperDocument>,
        managers: Vec<Arc<dyn PlatformManager>>,
    ) -> Self {
        Self { document, managers }
    }

    pub fn platforms(&self) -> Vec<String> {
        self.managers
            .iter()
            .map(|m| m.platform().to_string())
            .collect()
    }

    /// 只同步配置，不抓取
    pub async fn init_only(&self) -> SyncReport {
        let report = self.sync_config().await;
        info!(
            "✓ 配置同步完成: {} 个用户，新增 {} / 更新 {} / 删除 {} 个小组",
            report.users, report.groups.added, report.groups.updated, report.groups.removed
        );
        report
    }

    async fn sync_config(&self) -> SyncReport {
        let mut total = SyncReport::default();
        for manager in &self.managers {
            match manager.init_users_from_config().await {
                Ok(report) => {
                    total.users += report.users;
                    total.groups += report.groups;
                    total.failed += report.failed;
                }
                Err(e) => {
                    error!("[{}] ❌ 配置同步失败: {}", manager.platform(), e);
                    total.failed += 1;
                }
            }
        }
        total
    }

    /// 所有平台并发跑一个周期
    pub async fn run_cycle(&self, source: RunSource) -> Vec<PlatformReport> {
        join_all(self.managers.iter().map(|manager| async move {
            match source {
                RunSource::Store => manager.run_db_users().await,
                RunSource::Config => manager.run_config_users().await,
            }
        }))
        .await
    }

    /// 按模式运行，结束时总会释放资源
    pub async fn run(&self, mode: RunMode) -> RunSummary {
        let mut summary = RunSummary::default();
        if self.managers.is_empty() {
            warn!("⚠️ 没有启用的平台，程序结束");
            return summary;
        }
        log_startup(&self.platforms(), mode.cycles);

        if mode.sync {
            self.sync_config().await;
        }

        let interval = self.document.global_config().fetch_interval();
        let mut cycle = 0u32;
        while mode.cycles.map_or(true, |limit| cycle < limit) {
            cycle += 1;
            log_cycle_start(cycle, mode.cycles);
            let started = Instant::now();

            let reports = self.run_cycle(mode.source).await;
            let mut totals = CycleTotals::default();
            for report in &reports {
                log_platform_report(report);
                totals.merge(report.totals());
            }
            print_cycle_stats(cycle, &totals);

            summary.cycles = cycle;
            summary.totals.merge(totals);
            summary.last_reports = reports;

            if mode.cycles.is_some_and(|limit| cycle >= limit) {
                break;
            }
            // 只等待间隔的剩余部分
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                info!("⏳ {} 秒后开始下一个周期", rest.as_secs());
                sleep(rest).await;
            }
        }

        self.cleanup().await;
        summary
    }

    /// 释放所有平台持有的浏览器会话
    pub async fn cleanup(&self) {
        for manager in &self.managers {
            manager.shutdown().await;
        }
    }
}
