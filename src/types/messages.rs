use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// 发往服务器的请求，`type` 字段标明消息类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    ClientJoinedRequest,
    PollOpenModelRequest {
        #[serde(rename = "modelId")]
        model_id: String,
        attempt: u32,
    },
    StartSessionRequest {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    QueryRequest {
        #[serde(rename = "modelId")]
        model_id: String,
        #[serde(rename = "sessionUUID")]
        session_uuid: String,
        #[serde(rename = "topK")]
        top_k: u32,
        #[serde(rename = "maxLength")]
        max_length: u32,
        text: String,
    },
    PollQueryResultRequest {
        #[serde(rename = "modelId")]
        model_id: String,
        #[serde(rename = "queryUUID")]
        query_uuid: String,
        attempt: u32,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::ClientJoinedRequest => "ClientJoinedRequest",
            Request::PollOpenModelRequest { .. } => "PollOpenModelRequest",
            Request::StartSessionRequest { .. } => "StartSessionRequest",
            Request::QueryRequest { .. } => "QueryRequest",
            Request::PollQueryResultRequest { .. } => "PollQueryResultRequest",
        }
    }

    pub fn to_json(&self) -> Value {
        // 仅含字符串和整数字段，序列化不会失败
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// 服务器响应，`TYPE` 是响应中 `type` 字段的期望值
pub trait Response: DeserializeOwned {
    const TYPE: &'static str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollOpenModelResponse {
    pub ready: bool,
}

impl Response for PollOpenModelResponse {
    const TYPE: &'static str = "PollOpenModelResponse";
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionResponse {
    #[serde(rename = "sessionUUID")]
    pub session_uuid: String,
}

impl Response for StartSessionResponse {
    const TYPE: &'static str = "StartSessionResponse";
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "queryUUID")]
    pub query_uuid: String,
}

impl Response for QueryResponse {
    const TYPE: &'static str = "QueryResponse";
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollQueryResultResponse {
    pub ready: bool,
    /// 尚未生成任何内容时可能为 null；`ready == true` 时缺少则是协议错误
    #[serde(default)]
    pub text: Option<String>,
}

impl Response for PollQueryResultResponse {
    const TYPE: &'static str = "PollQueryResultResponse";
}

/// 把传输层返回的 JSON 解码为具体响应
///
/// 缺少字段或 `type` 与预期不符都算协议错误；未知字段（如 `tokens`）忽略。
pub fn decode<R: Response>(request: &'static str, value: Value) -> Result<R> {
    if let Some(tag) = value.get("type").and_then(Value::as_str) {
        if tag != R::TYPE {
            return Err(ClientError::protocol(
                request,
                format!("期望 {}，实际为 {}", R::TYPE, tag),
            ));
        }
    }

    serde_json::from_value(value).map_err(|e| ClientError::protocol(request, e.to_string()))
}
