//! LLM 服务 - 业务能力层
//!
//! 只负责"从帖子文本中抽取结构化字段"，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（DeepSeek 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ClassifiedItem, Classifier};
use crate::config::RuntimeSettings;
use crate::error::ClassifyError;
use crate::models::ListingFields;
use crate::utils::logging::truncate_text;

const LISTING_SYSTEM_PROMPT: &str = "You are an intelligent text analyzer that extracts key data from posts. \
I will provide you with an array of post texts from apartment rental groups. \
Your job is to analyze each text and return an array of structured JSON objects IN THE SAME ORDER as the input array. \
The length of your output array must match the length of the input array. \
For each post text in the input array, extract the following information as a JSON object:\n\n\
1. user: The full name of the user who posted.\n\
2. timestamp: The date and time the post was uploaded.\n\
3. post_link: A direct permalink to the post if available.\n\
4. text: The full human-readable content of the post, same content but better organized (ignore layout, comments, ads).\n\
5. price: The rent price or total cost if mentioned (in NIS).\n\
6. location: The location of the apartment if mentioned.\n\
7. phone_numbers: An array of phone numbers in the post (e.g. 05XXXXXXXX).\n\
8. images: An array of image URLs that are part of the post content.\n\
9. mentions: List of specific keywords like 'סאבלט', 'שכירות'.\n\
10. summary: A brief natural language summary (in Hebrew) of the post intent or offer.\n\
11. is_valid: true if the user is offering an apartment, false otherwise.\n\
Return ONLY a JSON object of the form {\"output\": [...]} with one object per input text, in the same order. \
If any field cannot be found, set it to null or an empty string/array.";

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 抽取房源字段
/// - 提供通用的 LLM 调用接口
/// - 不出现 group_id / post_id
/// - 不关心流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(settings: &RuntimeSettings) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&settings.llm_api_key)
            .with_api_base(&settings.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: settings.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, ClassifyError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let api = |e: async_openai::error::OpenAIError| ClassifyError::Api(e.to_string());

        let mut messages = Vec::new();
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(api)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(api)?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(4096u32)
            .build()
            .map_err(api)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            api(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ClassifyError::InvalidResponse("LLM 返回内容为空".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Classifier for LlmService {
    async fn classify(&self, texts: &[String]) -> Result<Vec<ClassifiedItem>, ClassifyError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_string(texts)
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
        debug!(
            "📤 分类 {} 条帖子，首条: {}",
            texts.len(),
            truncate_text(&texts[0], 80)
        );

        let response = self
            .send_to_llm(&payload, Some(LISTING_SYSTEM_PROMPT))
            .await?;
        debug!("🔍 LLM 原始响应: {}", truncate_text(&response, 200));

        parse_classifier_response(&response, texts.len())
    }
}

/// 去掉 ```json 代码块包裹
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// 把模型输出对齐到输入批次
///
/// 接受 JSON 数组、`{"output": [...]}` 或单个对象。结果少于输入时，
/// 缺失的条目记为单条失败；多于输入时截断。
pub fn parse_classifier_response(
    response: &str,
    expected: usize,
) -> Result<Vec<ClassifiedItem>, ClassifyError> {
    let body = strip_code_fence(response);
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        ClassifyError::InvalidResponse(format!("{}: {}", e, truncate_text(body, 200)))
    })?;

    let mut entries = match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("output") {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(ClassifyError::InvalidResponse(format!(
                "期望数组或对象，实际为: {}",
                truncate_text(&other.to_string(), 100)
            )))
        }
    };

    if entries.len() != expected {
        warn!(
            "⚠️ 分类结果数量不一致: 得到 {}，期望 {}",
            entries.len(),
            expected
        );
        entries.truncate(expected);
    }

    let mut results: Vec<ClassifiedItem> = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let fields = match entry {
                Value::Object(_) => {
                    serde_json::from_value::<ListingFields>(entry).map_err(|e| e.to_string())
                }
                other => Err(format!("条目不是对象: {}", truncate_text(&other.to_string(), 60))),
            };
            (index, fields)
        })
        .collect();

    for index in results.len()..expected {
        results.push((index, Err("分类结果缺失".to_string())));
    }
    Ok(results)
}
