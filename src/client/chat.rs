use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::types::ModelCatalog;

use super::events::EventSink;
use super::negotiator::{self, SessionNegotiator};
use super::poller::{Completion, ResultPoller};
use super::selector::{self, ModelSelector};
use super::state::{Query, SessionState};
use super::submitter::QuerySubmitter;
use super::transcript::{Transcript, TranscriptStore, Turn};
use super::transport::{HttpTransport, Transport};

/// 聊天客户端：把协商、提交、轮询串成一个会话
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    selector: Box<dyn ModelSelector>,
    config: Config,
    state: SessionState,
    catalog: Option<ModelCatalog>,
    transcript: Option<Transcript>,
    store: TranscriptStore,
    asked_at: Option<DateTime<Utc>>,
}

impl ChatClient {
    /// 使用 HTTP 传输
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.server)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        ChatClient {
            selector: selector::from_config(&config.model),
            store: TranscriptStore::new(config.transcript.storage_path.clone()),
            transport,
            config,
            state: SessionState::new(),
            catalog: None,
            transcript: None,
            asked_at: None,
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn ModelSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 最近一次协商得到的模型目录
    pub fn catalog(&self) -> Option<&ModelCatalog> {
        self.catalog.as_ref()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// 只获取模型目录，不建立会话
    pub async fn fetch_catalog(&self) -> Result<ModelCatalog> {
        negotiator::join(self.transport.as_ref()).await
    }

    /// 建立会话；失败时保持不可发送
    ///
    /// 有在途查询时直接拒绝，当前会话和对话记录都保持不变。
    pub async fn connect(&mut self) -> Result<()> {
        self.state.ensure_negotiable()?;
        self.save_transcript_quietly();
        self.transcript = None;

        let catalog = SessionNegotiator::new(
            self.transport.as_ref(),
            self.selector.as_ref(),
            &self.config.polling,
            self.config.model.wait_for_model,
        )
        .negotiate(&mut self.state)
        .await?;

        if let (Some(model_id), Some(session_id)) = (self.state.model_id(), self.state.session_id())
        {
            self.transcript = Some(Transcript::new(session_id, model_id));
        }
        self.catalog = Some(catalog);
        Ok(())
    }

    /// 提交查询并轮询到结束
    pub async fn ask(
        &mut self,
        text: &str,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        QuerySubmitter::new(self.transport.as_ref(), &self.config.query)
            .submit(&mut self.state, text, sink)
            .await?;
        self.asked_at = Some(Utc::now());

        self.poll(sink, cancel).await
    }

    /// 继续轮询在途查询（轮询出错、取消或达到上限之后）
    pub async fn resume(
        &mut self,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        if self.state.outstanding_query().is_none() {
            return Err(ClientError::IllegalTransition {
                from: self.state.phase().name(),
                action: "恢复轮询",
            });
        }
        self.poll(sink, cancel).await
    }

    /// 放弃在途查询，重新开放发送
    pub fn abandon(&mut self) -> Result<Query> {
        let query = self.state.abandon()?;
        self.asked_at = None;
        Ok(query)
    }

    /// 结束会话，保存对话记录
    pub fn disconnect(&mut self) {
        self.save_transcript_quietly();
        self.transcript = None;
        self.state.reset();
    }

    /// 手动保存；没有记录时返回 None
    pub fn save_transcript(&self) -> anyhow::Result<Option<PathBuf>> {
        match &self.transcript {
            Some(t) if !t.is_empty() => Ok(Some(self.store.save(t)?)),
            _ => Ok(None),
        }
    }

    async fn poll(&mut self, sink: &mut dyn EventSink, cancel: &CancellationToken) -> Result<Completion> {
        let completion = ResultPoller::new(self.transport.as_ref(), &self.config.polling)
            .run(&mut self.state, sink, cancel)
            .await?;

        let answered_at = Utc::now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(Turn {
                query_id: completion.query.query_id.clone(),
                prompt: completion.query.text.clone(),
                response: completion.text.clone(),
                asked_at: self.asked_at.take().unwrap_or(answered_at),
                answered_at,
            });
        }
        if self.config.transcript.auto_save {
            self.save_transcript_quietly();
        }

        Ok(completion)
    }

    fn save_transcript_quietly(&self) {
        if let Err(e) = self.save_transcript() {
            warn!(error = %e, "保存对话记录失败");
        }
    }
}
