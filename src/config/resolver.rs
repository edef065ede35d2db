//! 配置分层合并
//!
//! 四层：系统默认 < 平台默认 < 用户设置 < 小组覆盖，
//! 后面的层按 key 覆盖前面的层，未知 key 原样透传。

use std::collections::BTreeMap;

use serde_json::Value;

use super::effective::EffectiveConfig;

/// 单层配置：option → value
pub type Options = BTreeMap<String, Value>;

/// 合并四层配置得到某个 (用户, 小组) 的最终配置
///
/// 纯函数，缺失的层按空表处理。
///
/// # 参数
/// - `global_defaults`: 系统默认（内置默认 + 配置文件 global / system_defaults）
/// - `platform_defaults`: 平台默认
/// - `user_config`: 用户级设置
/// - `group_override`: 小组级覆盖
pub fn resolve(
    global_defaults: Option<&Options>,
    platform_defaults: Option<&Options>,
    user_config: Option<&Options>,
    group_override: Option<&Options>,
) -> EffectiveConfig {
    let layers = [global_defaults, platform_defaults, user_config, group_override];
    EffectiveConfig::new(merge_layers(layers.into_iter().flatten()))
}

/// 从左到右按 key 覆盖
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a Options>) -> Options {
    let mut merged = Options::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
