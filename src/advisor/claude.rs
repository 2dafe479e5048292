//! Claude API 决策服务客户端
//!
//! 通过 reqwest 调用 Anthropic messages 端点；系统提示词从文件加载并替换
//! {CIV_NAME} / {LEADER_NAME} 占位符，模型输出经多级策略抽取 JSON
//! （```json 代码块 -> 裸代码块 -> 首个配平的 {...} -> 去空白兜底）。

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use crate::advisor::{AdvisorClient, ServiceError};

/// Anthropic API 版本头
const API_VERSION: &str = "2023-06-01";
/// 连通性自检的 max_tokens
const TEST_MAX_TOKENS: u32 = 100;
/// 日志中响应预览的最大长度
const RESPONSE_PREVIEW_LEN: usize = 512;

/// 系统提示词文件缺失时的内置兜底
const FALLBACK_SYSTEM_PROMPT: &str = "You are an AI playing a turn-based strategy game as {LEADER_NAME} of {CIV_NAME}. \
     Respond with a JSON object containing an 'actions' array. \
     Valid actions: move_unit, attack, found_city, build, research, civic, \
     change_government, set_policies, diplomacy, end_turn. \
     Always end with {\"action\": \"end_turn\"}. \
     Respond ONLY with JSON, no explanation.";

/// Claude 客户端：持有 reqwest::Client 与模型配置
pub struct ClaudeAdvisor {
    http: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: String,
    /// 可选：系统提示词文件路径（支持占位符）
    system_prompt_path: Option<PathBuf>,
}

impl ClaudeAdvisor {
    /// 创建客户端；API Key 从 ANTHROPIC_API_KEY 环境变量读取
    pub fn new(
        base_url: &str,
        model: &str,
        max_tokens: u32,
        request_timeout: Duration,
        system_prompt_path: Option<PathBuf>,
    ) -> Result<Self, ServiceError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ServiceError::Api("ANTHROPIC_API_KEY not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
            api_key,
            system_prompt_path,
        })
    }

    async fn post_messages(&self, body: serde_json::Value) -> Result<serde_json::Value, ServiceError> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if text.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }

        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                status = %status,
                preview = preview(&text),
                "Failed to parse API response"
            );
            ServiceError::BadFormat(e.to_string())
        })?;

        if let Some(message) = parsed
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return Err(ServiceError::Api(message.to_string()));
        }

        Ok(parsed)
    }

    /// 取响应 content[0].text
    fn extract_content(parsed: &serde_json::Value) -> Result<String, ServiceError> {
        parsed
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::BadFormat("missing content[0].text".to_string()))
    }

    fn build_system_prompt(&self, civ_name: &str, leader_name: &str) -> String {
        let mut prompt = String::new();

        if let Some(path) = &self.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    tracing::debug!(path = %path.display(), "Loaded system prompt from file");
                    prompt = text;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not read system prompt file");
                }
            }
        }

        if prompt.is_empty() {
            prompt = FALLBACK_SYSTEM_PROMPT.to_string();
        }

        prompt
            .replace("{CIV_NAME}", civ_name)
            .replace("{LEADER_NAME}", leader_name)
    }
}

#[async_trait::async_trait]
impl AdvisorClient for ClaudeAdvisor {
    async fn decide(&self, payload: &str) -> Result<String, ServiceError> {
        let (civ_name, leader_name) = extract_civ_info(payload);
        tracing::info!(civ = %civ_name, leader = %leader_name, "Requesting decision");

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": self.build_system_prompt(&civ_name, &leader_name),
            "messages": [{
                "role": "user",
                "content": format!("Current game state:\n{payload}\n\nWhat is your next action?"),
            }],
        });

        let parsed = self.post_messages(body).await?;
        let content = Self::extract_content(&parsed)?;
        tracing::debug!(preview = preview(&content), "Raw decision text");

        let extracted = extract_json_from_response(&content);

        // 抽取结果必须是合法 JSON，否则用 end_turn 兜底（回合永不卡死）
        match serde_json::from_str::<serde_json::Value>(&extracted) {
            Ok(value) => Ok(value.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Extracted text was not valid JSON, falling back to end_turn");
                Ok(r#"{"action":"end_turn","reason":"Invalid JSON from decision service"}"#.to_string())
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ServiceError> {
        let body = json!({
            "model": self.model,
            "max_tokens": TEST_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": "Reply with exactly: CONNECTION_OK",
            }],
        });

        let parsed = self.post_messages(body).await?;
        let content = Self::extract_content(&parsed)?;
        tracing::info!(response = %content, "Connection test succeeded");
        Ok(())
    }
}

/// 日志预览截断：退到字符边界，多字节字符不会被切开
fn preview(text: &str) -> &str {
    let mut end = text.len().min(RESPONSE_PREVIEW_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// 从模型输出中抽取 JSON
///
/// 依次尝试：```json 代码块、无语言标注的 ``` 代码块、首个配平的 {...} 对象
/// （需通过解析校验），最后回落到去除首尾空白的原文。
pub fn extract_json_from_response(content: &str) -> String {
    let mut trimmed = content;

    let fenced = content
        .find("```json")
        .map(|start| (start, "```json"))
        .or_else(|| content.find("```").map(|start| (start, "```")));

    if let Some((block_start, _)) = fenced {
        if let Some(newline) = content[block_start..].find('\n') {
            let body_start = block_start + newline + 1;
            if let Some(end) = content[body_start..].find("```") {
                trimmed = &content[body_start..body_start + end];
                tracing::debug!("Extracted JSON from fenced code block");
            }
        }
    }

    if let Some(object) = find_balanced_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(object).is_ok() {
            return object.to_string();
        }
        tracing::debug!("Found braces but content was not valid JSON");
    }

    trimmed.trim().to_string()
}

/// 找到首个花括号配平的子串
fn find_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;

    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 从局面快照中提取文明与领袖名（用于提示词占位符）；缺失时为 "Unknown"
pub fn extract_civ_info(payload: &str) -> (String, String) {
    let parsed: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Could not extract civ info from game state");
            return ("Unknown".to_string(), "Unknown".to_string());
        }
    };

    let player = parsed.get("player");
    let civ = player
        .and_then(|p| p.get("civilizationType"))
        .and_then(|v| v.as_str())
        .map(|s| prettify_type_name(s, "CIVILIZATION_"))
        .unwrap_or_else(|| "Unknown".to_string());
    let leader = player
        .and_then(|p| p.get("leaderType"))
        .and_then(|v| v.as_str())
        .map(|s| prettify_type_name(s, "LEADER_"))
        .unwrap_or_else(|| "Unknown".to_string());

    (civ, leader)
}

/// 类型名转显示名：去前缀、按下划线分词、首字母大写（CIVILIZATION_ROME -> Rome）
fn prettify_type_name(raw: &str, prefix: &str) -> String {
    let stripped = raw.strip_prefix(prefix).unwrap_or(raw);
    stripped
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}
