use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{ClientError, Result};
use crate::types::{decode, ModelCatalog, PollOpenModelResponse, Request, StartSessionResponse};

use super::selector::ModelSelector;
use super::state::SessionState;
use super::transport::Transport;

/// 获取模型目录（ClientJoinedRequest）
pub async fn join(transport: &dyn Transport) -> Result<ModelCatalog> {
    let request = Request::ClientJoinedRequest;
    let value = transport.send(&request).await?;
    let catalog = ModelCatalog::from_json(&value)?;
    debug!(models = catalog.entries().len(), "收到模型目录");
    Ok(catalog)
}

/// 启动流程：获取目录、选择模型、等待模型加载、开启会话
///
/// 严格顺序执行，任一步失败都立即返回，会话保持不可发送。
pub struct SessionNegotiator<'a> {
    transport: &'a dyn Transport,
    selector: &'a dyn ModelSelector,
    polling: &'a PollingConfig,
    wait_for_model: bool,
}

impl<'a> SessionNegotiator<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        selector: &'a dyn ModelSelector,
        polling: &'a PollingConfig,
        wait_for_model: bool,
    ) -> Self {
        SessionNegotiator {
            transport,
            selector,
            polling,
            wait_for_model,
        }
    }

    pub async fn negotiate(&self, state: &mut SessionState) -> Result<ModelCatalog> {
        state.begin_negotiation()?;

        let catalog = join(self.transport).await.map_err(|e| {
            warn!(error = %e, "获取模型目录失败");
            e
        })?;

        let model_id = self
            .selector
            .select(&catalog)
            .ok_or(ClientError::ModelNotSelected)?;
        info!(model = %model_id, "已选择模型");

        self.open_model(&model_id).await?;
        let session_id = self.start_session(&model_id).await?;

        state.establish(model_id.clone(), session_id.clone())?;
        info!(model = %model_id, session = %session_id, "会话已建立");

        Ok(catalog)
    }

    /// 轮询 PollOpenModelRequest 直到服务器报告模型就绪，编号从 0 开始
    async fn open_model(&self, model_id: &str) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            let request = Request::PollOpenModelRequest {
                model_id: model_id.to_string(),
                attempt: attempts,
            };
            let value = self.transport.send(&request).await?;
            attempts += 1;
            let response: PollOpenModelResponse = decode(request.name(), value)?;

            if response.ready {
                debug!(model = %model_id, attempts, "模型已就绪");
                return Ok(());
            }

            if !self.wait_for_model {
                debug!(model = %model_id, "不等待模型加载，直接开启会话");
                return Ok(());
            }

            if let Some(max) = self.polling.max_attempts {
                if attempts >= max {
                    return Err(ClientError::ModelNotReady {
                        model_id: model_id.to_string(),
                        attempts,
                    });
                }
            }

            debug!(model = %model_id, attempts, "模型加载中");
            sleep(self.polling.interval()).await;
        }
    }

    async fn start_session(&self, model_id: &str) -> Result<String> {
        let request = Request::StartSessionRequest {
            model_id: model_id.to_string(),
        };
        let value = self.transport.send(&request).await?;
        let response: StartSessionResponse = decode(request.name(), value)?;

        if response.session_uuid.trim().is_empty() {
            return Err(ClientError::protocol(request.name(), "sessionUUID 为空"));
        }

        Ok(response.session_uuid)
    }
}
