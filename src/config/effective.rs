//! 最终生效的配置
//!
//! `EffectiveConfig` 不可变、不持久化，每个周期重新计算并按值传递。

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::resolver::Options;
use crate::utils::retry::RetryPolicy;

/// 内置系统默认值
pub fn builtin_defaults() -> Options {
    let pairs = [
        ("headless", json!(true)),
        ("fetch_interval", json!(300)),
        ("max_items_per_cycle", json!(30)),
        ("scroll_times", json!(2)),
        ("scroll_delay_secs", json!(1.5)),
        ("scroll_min_px", json!(400)),
        ("scroll_max_px", json!(800)),
        ("batch_size", json!(10)),
        ("new_items_only", json!(true)),
        ("fetch_attempts", json!(3)),
        ("fetch_backoff_ms", json!(1000)),
        ("fetch_timeout_secs", json!(60)),
        ("classify_timeout_secs", json!(120)),
        ("max_classify_attempts", json!(3)),
        ("store_write_attempts", json!(3)),
        ("store_backoff_ms", json!(200)),
        ("group_concurrency", json!(0)),
        ("max_concurrent_users", json!(4)),
        ("login_timeout_secs", json!(60)),
        ("manual_login_timeout", json!(120)),
        ("relevance_filter", json!(true)),
    ];
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// 某个 (用户, 小组) 的最终配置
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectiveConfig {
    values: Arc<Options>,
}

impl EffectiveConfig {
    pub fn new(values: Options) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn values(&self) -> &Options {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// 非负整数，兼容 "10" 这种字符串写法
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_u64().map(|v| v != 0),
            _ => None,
        }
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get_u64(key).unwrap_or(default)
    }

    /// 抓取循环使用的强类型设置
    pub fn scrape_settings(&self) -> ScrapeSettings {
        let max_items = self
            .get_u64("num_posts_to_fetch")
            .or_else(|| self.get_u64("max_items_per_cycle"))
            .unwrap_or(30);
        let scroll_min_px = self.u64_or("scroll_min_px", 400);
        let scroll_max_px = self.u64_or("scroll_max_px", 800).max(scroll_min_px);

        ScrapeSettings {
            num_posts_to_fetch: max_items as usize,
            scroll_times: self.u64_or("scroll_times", 2) as u32,
            scroll_delay: Duration::from_secs_f64(
                self.get_f64("scroll_delay_secs")
                    .or_else(|| self.get_f64("scroll_delay"))
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .unwrap_or(1.5),
            ),
            scroll_min_px,
            scroll_max_px,
            batch_size: self.u64_or("batch_size", 10).max(1) as usize,
            fetch_retry: RetryPolicy::new(
                self.u64_or("fetch_attempts", 3).max(1) as u32,
                Duration::from_millis(self.u64_or("fetch_backoff_ms", 1000)),
            ),
            fetch_timeout: Duration::from_secs(self.u64_or("fetch_timeout_secs", 60).max(1)),
            classify_timeout: Duration::from_secs(
                self.u64_or("classify_timeout_secs", 120).max(1),
            ),
            max_classify_attempts: self.u64_or("max_classify_attempts", 3).max(1) as u32,
            store_retry: RetryPolicy::new(
                self.u64_or("store_write_attempts", 3).max(1) as u32,
                Duration::from_millis(self.u64_or("store_backoff_ms", 200)),
            ),
            relevance_filter: self.get_bool("relevance_filter").unwrap_or(true),
            extra_keywords: self.get_string_list("extra_keywords"),
        }
    }

    /// 同一用户下并发抓取的小组数，0 表示全部同时进行
    pub fn group_concurrency(&self, group_count: usize) -> usize {
        match self.u64_or("group_concurrency", 0) as usize {
            0 => group_count.max(1),
            n => n,
        }
    }

    pub fn max_concurrent_users(&self) -> usize {
        self.u64_or("max_concurrent_users", 4).max(1) as usize
    }

    pub fn headless(&self) -> bool {
        self.get_bool("headless").unwrap_or(true)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.u64_or("fetch_interval", 300))
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.u64_or("login_timeout_secs", 60).max(1))
    }

    pub fn manual_login_timeout(&self) -> Duration {
        Duration::from_secs(self.u64_or("manual_login_timeout", 120).max(1))
    }
}

/// 单个小组抓取循环的参数
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub num_posts_to_fetch: usize,
    pub scroll_times: u32,
    pub scroll_delay: Duration,
    pub scroll_min_px: u64,
    pub scroll_max_px: u64,
    pub batch_size: usize,
    pub fetch_retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub classify_timeout: Duration,
    pub max_classify_attempts: u32,
    pub store_retry: RetryPolicy,
    pub relevance_filter: bool,
    pub extra_keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, Value)]) -> EffectiveConfig {
        let mut values = builtin_defaults();
        for (k, v) in pairs {
            values.insert(k.to_string(), v.clone());
        }
        EffectiveConfig::new(values)
    }

    #[test]
    fn defaults_produce_usable_settings() {
        let settings = config(&[]).scrape_settings();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.num_posts_to_fetch, 30);
        assert_eq!(settings.scroll_times, 2);
        assert_eq!(settings.max_classify_attempts, 3);
        assert!(settings.relevance_filter);
    }

    #[test]
    fn num_posts_to_fetch_takes_precedence_over_max_items() {
        let settings = config(&[
            ("max_items_per_cycle", json!(50)),
            ("num_posts_to_fetch", json!(7)),
        ])
        .scrape_settings();
        assert_eq!(settings.num_posts_to_fetch, 7);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let settings = config(&[("batch_size", json!(0))]).scrape_settings();
        assert_eq!(settings.batch_size, 1);
    }

    #[test]
    fn string_values_are_coerced() {
        let cfg = config(&[
            ("batch_size", json!("4")),
            ("headless", json!("false")),
            ("extra_keywords", json!("loft, studio")),
        ]);
        assert_eq!(cfg.scrape_settings().batch_size, 4);
        assert!(!cfg.headless());
        assert_eq!(cfg.get_string_list("extra_keywords"), vec!["loft", "studio"]);
    }

    #[test]
    fn group_concurrency_zero_means_all_groups() {
        assert_eq!(config(&[]).group_concurrency(3), 3);
        assert_eq!(config(&[("group_concurrency", json!(1))]).group_concurrency(3), 1);
    }
}
