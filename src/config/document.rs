//! 声明式配置文件
//!
//! 结构：
//! ```toml
//! [global]            # headless / fetch_interval / max_items_per_cycle ...
//! [system_defaults]   # 所有平台共用的抓取默认值
//! [facebook]          # 每个平台一节
//! enabled = true
//! [facebook.defaults]
//! [[facebook.users]]
//! email = "a@x.com"
//! [[facebook.users.groups]]
//! group_id = "123"
//! ```
//! 按扩展名选择格式：`.json` 走 serde_json，其余按 TOML 解析。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::effective::{builtin_defaults, EffectiveConfig};
use super::resolver::{merge_layers, Options};
use crate::error::ConfigError;

/// 顶层配置文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScraperDocument {
    #[serde(default)]
    pub global: Options,

    #[serde(default)]
    pub system_defaults: Options,

    /// 平台 id → 平台配置
    #[serde(flatten)]
    pub platforms: BTreeMap<String, PlatformSection>,
}

/// 单个平台的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub defaults: Options,

    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// 配置文件中的用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub email: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub settings: Options,

    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

/// 配置文件中的小组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub group_id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub config: Options,
}

fn default_active() -> bool {
    true
}

/// group_id 在 JSON 里常被写成数字
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "group_id 必须是字符串或数字，实际为: {}",
            other
        ))),
    }
}

impl ScraperDocument {
    /// 从文件加载配置
    ///
    /// 文件不存在时生成默认配置（启用 facebook，无用户）；
    /// 文件存在但格式错误返回 [`ConfigError`]。
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            warn!("⚠️ 配置文件不存在: {}，使用默认配置", path.display());
            return Ok(Self::synthesized_default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let document = if is_json {
            Self::from_json_str(&content, path)?
        } else {
            Self::from_toml_str(&content, path)?
        };

        info!(
            "📄 已加载配置: {} (平台 {} 个)",
            path.display(),
            document.platforms.len()
        );
        Ok(document)
    }

    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let document: Self = toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        document.validate()?;
        Ok(document)
    }

    pub fn from_json_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let document: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        document.validate()?;
        Ok(document)
    }

    /// 配置文件缺失时使用的默认配置
    pub fn synthesized_default() -> Self {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "facebook".to_string(),
            PlatformSection {
                enabled: true,
                ..Default::default()
            },
        );
        Self {
            global: Options::new(),
            system_defaults: Options::new(),
            platforms,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (platform, section) in &self.platforms {
            for (idx, user) in section.users.iter().enumerate() {
                if user.email.trim().is_empty() {
                    return Err(ConfigError::invalid_value(
                        format!("{platform}.users[{idx}].email"),
                        "邮箱不能为空",
                    ));
                }
                for group in &user.groups {
                    if group.group_id.trim().is_empty() {
                        return Err(ConfigError::invalid_value(
                            format!("{platform}.users[{idx}].groups.group_id"),
                            "group_id 不能为空",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// 最底层配置：内置默认 < system_defaults < global
    pub fn global_layer(&self) -> Options {
        let builtin = builtin_defaults();
        merge_layers([&builtin, &self.system_defaults, &self.global])
    }

    /// 只含全局层的配置，供运行器读取 fetch_interval 等
    pub fn global_config(&self) -> EffectiveConfig {
        EffectiveConfig::new(self.global_layer())
    }

    pub fn platform(&self, id: &str) -> Option<&PlatformSection> {
        self.platforms.get(id)
    }

    pub fn enabled_platforms(&self) -> impl Iterator<Item = (&str, &PlatformSection)> {
        self.platforms
            .iter()
            .filter(|(_, section)| section.enabled)
            .map(|(id, section)| (id.as_str(), section))
    }
}
