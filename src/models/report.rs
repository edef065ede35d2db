//! 周期报告
//!
//! 每个小组每个周期产出一份 [`CycleReport`]，逐级汇总为用户 / 平台 / 运行报告。

use std::fmt;

use serde::Serialize;

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    TransientFetch,
    SessionRejected,
    LoginFailure,
    ClassificationFailure,
    StoreWriteFailure,
    StoreReadFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TransientFetch => "TransientFetch",
            FailureKind::SessionRejected => "SessionRejected",
            FailureKind::LoginFailure => "LoginFailure",
            FailureKind::ClassificationFailure => "ClassificationFailure",
            FailureKind::StoreWriteFailure => "StoreWriteFailure",
            FailureKind::StoreReadFailure => "StoreReadFailure",
        };
        f.write_str(name)
    }
}

/// 一条失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleFailure {
    pub kind: FailureKind,
    pub post_id: Option<String>,
    pub message: String,
}

/// 小组周期的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GroupOutcome {
    #[default]
    Completed,
    /// 抓取重试耗尽，本周期放弃
    Abandoned,
    /// 会话被来源拒绝，本周期中止
    SessionRejected,
    /// 因存储或会话问题未能开始
    Skipped,
}

/// 单个小组单个周期的报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub group_id: String,
    pub outcome: GroupOutcome,
    /// 本周期见到的不重复帖子数
    pub fetched: usize,
    /// 已处理过而被跳过的
    pub deduped: usize,
    /// 未通过关键词过滤的
    pub filtered: usize,
    /// 已分类并标记为已处理的
    pub classified: usize,
    /// 保存为房源的
    pub saved: usize,
    /// 分类了但不是房源的
    pub not_listing: usize,
    /// 分类失败的
    pub failed: usize,
    /// 多次失败后放弃的
    pub poisoned: usize,
    /// 分类调用次数
    pub classify_calls: usize,
    pub failures: Vec<CycleFailure>,
}

impl CycleReport {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn skipped(group_id: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        let mut report = Self::new(group_id);
        report.outcome = if kind == FailureKind::SessionRejected {
            GroupOutcome::SessionRejected
        } else {
            GroupOutcome::Skipped
        };
        report.record(kind, None, message);
        report
    }

    pub fn record(&mut self, kind: FailureKind, post_id: Option<&str>, message: impl Into<String>) {
        self.failures.push(CycleFailure {
            kind,
            post_id: post_id.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn has_failure(&self, kind: FailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

/// 用户会话在本周期的结果
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SessionOutcome {
    /// 复用已保存的会话
    #[default]
    Restored,
    /// 新登录成功
    LoggedIn,
    /// 登录失败，本周期跳过该用户
    LoginFailed(String),
    /// 会话被拒绝后重新登录成功
    Renewed,
    /// 会话被拒绝且重新登录失败
    RenewFailed(String),
}

/// 单个用户单个周期的报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserReport {
    pub user: String,
    pub session: SessionOutcome,
    pub groups: Vec<CycleReport>,
}

impl UserReport {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn group(&self, group_id: &str) -> Option<&CycleReport> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }
}

/// 单个平台单个周期的报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformReport {
    pub platform: String,
    pub users: Vec<UserReport>,
    /// 平台级错误（例如读取用户列表失败）
    pub errors: Vec<String>,
}

impl PlatformReport {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            ..Default::default()
        }
    }

    pub fn user(&self, email: &str) -> Option<&UserReport> {
        self.users.iter().find(|u| u.user == email)
    }

    pub fn totals(&self) -> CycleTotals {
        let mut totals = CycleTotals::default();
        for user in &self.users {
            if matches!(
                user.session,
                SessionOutcome::LoginFailed(_) | SessionOutcome::RenewFailed(_)
            ) {
                totals.login_failures += 1;
            }
            for group in &user.groups {
                totals.add(group);
            }
        }
        totals
    }
}

/// 汇总计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleTotals {
    pub groups: usize,
    pub groups_failed: usize,
    pub fetched: usize,
    pub classified: usize,
    pub saved: usize,
    pub failed: usize,
    pub login_failures: usize,
}

impl CycleTotals {
    fn add(&mut self, group: &CycleReport) {
        self.groups += 1;
        if group.outcome != GroupOutcome::Completed {
            self.groups_failed += 1;
        }
        self.fetched += group.fetched;
        self.classified += group.classified;
        self.saved += group.saved;
        self.failed += group.failed;
    }

    pub fn merge(&mut self, other: CycleTotals) {
        self.groups += other.groups;
        self.groups_failed += other.groups_failed;
        self.fetched += other.fetched;
        self.classified += other.classified;
        self.saved += other.saved;
        self.failed += other.failed;
        self.login_failures += other.login_failures;
    }
}
