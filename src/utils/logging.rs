/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::{info, warn};

use crate::models::{CycleTotals, GroupOutcome, PlatformReport, SessionOutcome};

/// 记录程序启动信息
///
/// # 参数
/// - `platforms`: 已启用的平台
/// - `cycles`: 周期数，`None` 表示持续运行
pub fn log_startup(platforms: &[String], cycles: Option<u32>) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 小组帖子采集");
    info!("📡 启用平台: {}", platforms.join(", "));
    match cycles {
        Some(n) => info!("🔁 运行 {} 个周期", n),
        None => info!("🔁 持续运行，直到收到中断信号"),
    }
    info!("{}", "=".repeat(60));
}

/// 记录周期开始信息
pub fn log_cycle_start(cycle: u32, cycles: Option<u32>) {
    info!("\n{}", "=".repeat(60));
    match cycles {
        Some(total) => info!("📦 开始第 {}/{} 个周期", cycle, total),
        None => info!("📦 开始第 {} 个周期", cycle),
    }
    info!(
        "开始时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 记录单个平台的周期报告
pub fn log_platform_report(report: &PlatformReport) {
    info!("\n{}", "─".repeat(60));
    info!("📋 平台 {}: {} 个用户", report.platform, report.users.len());
    for user in &report.users {
        match &user.session {
            SessionOutcome::LoginFailed(reason) | SessionOutcome::RenewFailed(reason) => {
                warn!("  [{}] ❌ 会话失败: {}", user.user, reason)
            }
            outcome => info!("  [{}] 会话: {:?}", user.user, outcome),
        }
        for group in &user.groups {
            let marker = match group.outcome {
                GroupOutcome::Completed => "✓",
                GroupOutcome::Abandoned => "⚠️",
                GroupOutcome::SessionRejected => "🚫",
                GroupOutcome::Skipped => "⏭️",
            };
            info!(
                "    {} [{}] 抓取 {} / 去重 {} / 过滤 {} / 分类 {} / 保存 {} / 失败 {}",
                marker,
                group.group_id,
                group.fetched,
                group.deduped,
                group.filtered,
                group.classified,
                group.saved,
                group.failed
            );
        }
    }
    for error in &report.errors {
        warn!("  ❌ {}", error);
    }
    info!("{}", "─".repeat(60));
}

/// 打印周期统计信息
///
/// # 参数
/// - `cycle`: 周期编号
/// - `totals`: 所有平台的汇总
pub fn print_cycle_stats(cycle: u32, totals: &CycleTotals) {
    info!("\n{}", "=".repeat(60));
    info!("📊 第 {} 个周期完成统计", cycle);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "📁 小组: {} (异常 {})",
        totals.groups, totals.groups_failed
    );
    info!("📥 抓取: {}", totals.fetched);
    info!("🧠 分类: {}", totals.classified);
    info!("✅ 保存: {}", totals.saved);
    info!("❌ 失败: {}", totals.failed);
    if totals.login_failures > 0 {
        info!("🔒 登录失败用户: {}", totals.login_failures);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
