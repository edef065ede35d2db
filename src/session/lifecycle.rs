//! 会话状态机
//!
//! ```text
//! ABSENT  --登录开始-->   PENDING
//! PENDING --登录成功-->   ACTIVE
//! PENDING --登录失败-->   ABSENT
//! ACTIVE  --恢复成功-->   ACTIVE
//! ACTIVE  --恢复失败/来源拒绝--> EXPIRED
//! EXPIRED --登录开始-->   PENDING
//! ```
//! 没有终止状态，登录一直失败也只是被报告。

use std::fmt;

use serde::Serialize;

use crate::error::SessionError;
use crate::models::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Absent,
    Pending,
    Active,
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Absent => "ABSENT",
            SessionState::Pending => "PENDING",
            SessionState::Active => "ACTIVE",
            SessionState::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoginStarted,
    LoginSucceeded,
    LoginFailed,
    HydrationSucceeded,
    HydrationFailed,
    Rejected,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 纯状态迁移函数，非法迁移返回 None
pub fn transition(from: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent::*;
    use SessionState::*;

    match (from, event) {
        (Absent | Expired, LoginStarted) => Some(Pending),
        (Pending, LoginSucceeded) => Some(Active),
        (Pending, LoginFailed) => Some(Absent),
        (Active, HydrationSucceeded) => Some(Active),
        (Active, HydrationFailed | Rejected) => Some(Expired),
        // 多个小组同时发现被拒绝
        (Expired, Rejected) => Some(Expired),
        _ => None,
    }
}

/// 单个用户会话的进程内状态，附带迁移历史
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    user: String,
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionLifecycle {
    pub fn new(user: impl Into<String>, initial: SessionState) -> Self {
        Self {
            user: user.into(),
            state: initial,
            history: vec![initial],
        }
    }

    /// 根据持久化记录确定初始状态
    pub fn from_record(user: impl Into<String>, record: Option<&SessionRecord>) -> Self {
        let initial = record.map_or(SessionState::Absent, SessionRecord::state);
        Self::new(user, initial)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, SessionError> {
        let next = transition(self.state, event).ok_or_else(|| SessionError::InvalidTransition {
            user: self.user.clone(),
            from: self.state,
            event: event.to_string(),
        })?;
        if next != self.state {
            self.history.push(next);
        }
        self.state = next;
        Ok(next)
    }
}
