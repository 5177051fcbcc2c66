use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::TransportError;
use crate::types::Request;

/// 把单个请求发送到固定端点并返回 JSON 对象
///
/// 实现不得重试；重试策略只属于结果轮询。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Value, TransportError>;
}

/// 基于 reqwest 的 HTTP POST 传输
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ServerConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(HttpTransport {
            client,
            endpoint: config.endpoint_url(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Value, TransportError> {
        debug!(request = request.name(), endpoint = %self.endpoint, "发送请求");

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(&request.to_json())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidBody(format!("{}，原始内容：{}", e, text)))?;

        if !value.is_object() {
            return Err(TransportError::InvalidBody(text));
        }

        Ok(value)
    }
}
