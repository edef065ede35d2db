//! 平台注册表：平台 id → 管理器构造函数

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::platform_manager::{GroupPlatformManager, ManagerDeps, PlatformManager};
use crate::platform::PlatformProfile;

pub type ManagerConstructor = fn(ManagerDeps) -> Arc<dyn PlatformManager>;

fn facebook_manager(deps: ManagerDeps) -> Arc<dyn PlatformManager> {
    Arc::new(GroupPlatformManager::new(PlatformProfile::facebook(), deps))
}

/// 显式注册的平台列表
#[derive(Default)]
pub struct PlatformRegistry {
    constructors: BTreeMap<String, ManagerConstructor>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置平台
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("facebook", facebook_manager);
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, constructor: ManagerConstructor) {
        self.constructors.insert(id.into(), constructor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// 为配置中所有启用的平台构造管理器；未注册的平台跳过
    pub fn build_enabled(&self, deps: &ManagerDeps) -> Vec<Arc<dyn PlatformManager>> {
        let mut managers = Vec::new();
        for (id, _) in deps.document.enabled_platforms() {
            match self.constructors.get(id) {
                Some(constructor) => {
                    info!("✓ 启用平台: {}", id);
                    managers.push(constructor(deps.clone()));
                }
                None => warn!("⚠️ 未知平台 {}，已跳过", id),
            }
        }
        managers
    }
}
