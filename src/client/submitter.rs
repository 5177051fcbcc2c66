use tracing::{debug, warn};

use crate::config::QueryConfig;
use crate::error::{ClientError, Result};
use crate::types::{decode, QueryResponse, Request};

use super::events::{ChatEvent, EventSink};
use super::state::{Query, SessionState};
use super::transport::Transport;

/// 提交用户查询，拿到 queryUUID 后交给结果轮询
pub struct QuerySubmitter<'a> {
    transport: &'a dyn Transport,
    config: &'a QueryConfig,
}

impl<'a> QuerySubmitter<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a QueryConfig) -> Self {
        QuerySubmitter { transport, config }
    }

    /// 成功时会话进入 AwaitingResult；失败时恢复为可发送
    ///
    /// 不可发送或输入为空时直接返回错误，不产生任何请求或状态变化。
    pub async fn submit(
        &self,
        state: &mut SessionState,
        text: &str,
        sink: &mut dyn EventSink,
    ) -> Result<Query> {
        if !state.send_enabled() {
            return Err(ClientError::SendDisabled);
        }
        if text.trim().is_empty() {
            return Err(ClientError::EmptyQuery);
        }

        let (model_id, session_id) = state.begin_submission()?;
        sink.emit(ChatEvent::UserMessage(text.to_string()));

        match self.send_query(&model_id, &session_id, text).await {
            Ok(query_id) => {
                let query = Query {
                    query_id,
                    text: text.to_string(),
                    model_id,
                    session_id,
                    top_k: self.config.top_k,
                    max_length: self.config.max_length,
                };
                debug!(query = %query.query_id, "查询已受理");
                state.await_result(query.clone())?;
                sink.emit(ChatEvent::PendingResponse);
                Ok(query)
            }
            Err(e) => {
                warn!(error = %e, "提交查询失败");
                state.submission_failed();
                Err(e)
            }
        }
    }

    async fn send_query(&self, model_id: &str, session_id: &str, text: &str) -> Result<String> {
        let request = Request::QueryRequest {
            model_id: model_id.to_string(),
            session_uuid: session_id.to_string(),
            top_k: self.config.top_k,
            max_length: self.config.max_length,
            text: text.to_string(),
        };
        let value = self.transport.send(&request).await?;
        let response: QueryResponse = decode(request.name(), value)?;

        if response.query_uuid.trim().is_empty() {
            return Err(ClientError::protocol(request.name(), "queryUUID 为空"));
        }

        Ok(response.query_uuid)
    }
}
