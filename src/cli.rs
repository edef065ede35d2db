//! 命令行参数

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// 多账号小组帖子采集
#[derive(Parser, Debug)]
#[command(name = "group_harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 配置文件路径（.toml 或 .json），默认读取 SCRAPER_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite 数据库路径，默认读取 DATABASE_URL
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// 只处理指定用户（邮箱）
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// 使用内存存储，不写数据库
    #[arg(long, global = true)]
    pub dry_store: bool,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 运行采集（默认）
    Run(RunArgs),
    /// 只把配置中的用户和小组同步到存储
    Init,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// 运行的周期数，不指定则持续运行
    #[arg(long)]
    pub cycles: Option<u32>,

    /// 直接使用配置文件中的用户
    #[arg(long)]
    pub from_config: bool,

    /// 运行前不同步配置
    #[arg(long)]
    pub skip_sync: bool,
}

impl Cli {
    pub fn resolved_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }
}
