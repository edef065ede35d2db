//! 分类结果与最终房源记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::post::RawPost;

/// 分类服务为单条帖子返回的结构化字段
///
/// 模型输出并不规整：价格可能是数字、电话可能是单个字符串，
/// 这里统一宽松解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingFields {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub post_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub phone_numbers: Vec<String>,
    #[serde(default, alias = "image_urls", deserialize_with = "lenient_list")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub mentions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default = "default_valid", deserialize_with = "lenient_bool")]
    pub is_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Default for ListingFields {
    fn default() -> Self {
        Self {
            user: None,
            timestamp: None,
            post_link: None,
            text: None,
            price: None,
            location: None,
            phone_numbers: Vec::new(),
            images: Vec::new(),
            mentions: Vec::new(),
            summary: None,
            is_valid: true,
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "no" | "0"),
        Value::Number(n) => n.as_i64() != Some(0),
        Value::Null => true,
        _ => true,
    })
}

impl ListingFields {
    /// 分类结果是否是一条房源（`is_valid = false` 表示已分类但不是房源）
    pub fn is_listing(&self) -> bool {
        self.is_valid
    }

    /// 用抓取阶段得到的元数据补齐模型没返回的字段
    pub fn enrich_from(&mut self, post: &RawPost) {
        if self.user.is_none() {
            self.user = post.author.clone();
        }
        if self.post_link.is_none() {
            self.post_link = post.permalink.clone();
        }
        if self.text.is_none() && !post.text.is_empty() {
            self.text = Some(post.text.clone());
        }
    }
}

/// 最终输出的房源记录，按 (group_id, post_id) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedListing {
    pub platform: String,
    pub group_id: String,
    pub post_id: String,
    pub fields: ListingFields,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedListing {
    pub fn new(platform: &str, group_id: &str, post: &RawPost, mut fields: ListingFields) -> Self {
        fields.enrich_from(post);
        Self {
            platform: platform.to_string(),
            group_id: group_id.to_string(),
            post_id: post.post_id.clone(),
            fields,
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_loose_model_output() {
        let fields: ListingFields = serde_json::from_value(json!({
            "price": 4500,
            "location": "  Florentin ",
            "phone_numbers": "050-1234567",
            "image_urls": ["a.jpg", ""],
            "is_valid": "true"
        }))
        .unwrap();

        assert_eq!(fields.price.as_deref(), Some("4500"));
        assert_eq!(fields.location.as_deref(), Some("Florentin"));
        assert_eq!(fields.phone_numbers, vec!["050-1234567"]);
        assert_eq!(fields.images, vec!["a.jpg"]);
        assert!(fields.is_listing());
    }

    #[test]
    fn invalid_flag_marks_non_listing() {
        let fields: ListingFields = serde_json::from_value(json!({"is_valid": false})).unwrap();
        assert!(!fields.is_listing());
    }

    #[test]
    fn missing_validity_defaults_to_listing() {
        let fields: ListingFields = serde_json::from_value(json!({"price": null})).unwrap();
        assert!(fields.is_listing());
        assert!(fields.price.is_none());
    }

    #[test]
    fn enrichment_fills_only_missing_fields() {
        let post = RawPost {
            post_id: "1".into(),
            text: "room for rent".into(),
            author: Some("Dana".into()),
            permalink: Some("https://www.facebook.com/groups/g1/posts/1/".into()),
        };
        let fields = ListingFields {
            user: Some("Model Name".into()),
            ..Default::default()
        };

        let listing = ExtractedListing::new("facebook", "g1", &post, fields);

        assert_eq!(listing.fields.user.as_deref(), Some("Model Name"));
        assert_eq!(listing.fields.post_link, post.permalink);
        assert_eq!(listing.fields.text.as_deref(), Some("room for rent"));
    }
}
