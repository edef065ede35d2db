//! 关键词相关性过滤：不含任何房源关键词的帖子不送去分类

use phf::phf_set;

static LISTING_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "דירה",
    "להשכרה",
    "חדר",
    "סאבלט",
    "שכירות",
    "apartment",
    "for rent",
    "sublet",
    "room",
    "rental",
};

#[derive(Debug, Clone, Default)]
pub struct RelevanceFilter {
    enabled: bool,
    extra: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(enabled: bool, extra_keywords: &[String]) -> Self {
        Self {
            enabled,
            extra: extra_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// 关闭过滤时所有帖子都相关
    pub fn is_relevant(&self, text: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let lowered = text.to_lowercase();
        LISTING_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
            || self.extra.iter().any(|keyword| lowered.contains(keyword.as_str()))
    }
}
