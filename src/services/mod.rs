//! 业务能力层：分类、帖子解析、相关性过滤

use async_trait::async_trait;

use crate::error::ClassifyError;
use crate::models::ListingFields;

pub mod llm_service;
pub mod post_parser;
pub mod relevance;

pub use llm_service::LlmService;
pub use relevance::RelevanceFilter;

/// 批次中单条文本的分类结果：(批次内下标, 字段或失败原因)
pub type ClassifiedItem = (usize, Result<ListingFields, String>);

/// 内容分类器
///
/// 整批失败返回 `Err`；单条失败放在对应下标的结果里，不影响同批其他条目。
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, texts: &[String]) -> Result<Vec<ClassifiedItem>, ClassifyError>;
}
