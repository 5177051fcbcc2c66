use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{ClientError, Result};
use crate::types::{decode, PollQueryResultResponse, Request};

use super::events::{ChatEvent, EventSink};
use super::state::{Query, SessionState};
use super::transport::Transport;

/// 一次查询的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub query: Query,
    pub text: String,
    /// 本次查询累计发送的轮询次数
    pub attempts: u32,
}

/// 结果轮询：POLLING -> DONE
///
/// 每次请求都在上一次响应处理完之后才发出。只有 `ready == false` 会触发下一次轮询；
/// 传输或协议错误直接返回，查询仍保持在途，可以从同一个编号恢复。
pub struct ResultPoller<'a> {
    transport: &'a dyn Transport,
    polling: &'a PollingConfig,
}

impl<'a> ResultPoller<'a> {
    pub fn new(transport: &'a dyn Transport, polling: &'a PollingConfig) -> Self {
        ResultPoller { transport, polling }
    }

    /// `max_attempts` 限制的是本次调用发出的请求数
    pub async fn run(
        &self,
        state: &mut SessionState,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let mut sent = 0u32;

        loop {
            let poll = state.next_poll()?;
            let model_id = state
                .outstanding_query()
                .map(|q| q.model_id.clone())
                .unwrap_or_default();

            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled {
                    query_id: poll.query_id,
                });
            }

            let request = Request::PollQueryResultRequest {
                model_id,
                query_uuid: poll.query_id.clone(),
                attempt: poll.attempt,
            };
            debug!(query = %poll.query_id, attempt = poll.attempt, "轮询结果");

            let value = self.transport.send(&request).await.map_err(|e| {
                warn!(query = %poll.query_id, attempt = poll.attempt, error = %e, "轮询失败");
                ClientError::from(e)
            })?;
            sent += 1;
            let response: PollQueryResultResponse = decode(request.name(), value)?;

            if response.ready {
                let Some(text) = response.text else {
                    return Err(ClientError::protocol(request.name(), "ready 为 true 但缺少 text"));
                };
                sink.emit(ChatEvent::Final(text.clone()));
                let query = state.finish(&poll.query_id)?;
                info!(query = %query.query_id, attempts = poll.attempt + 1, "查询完成");
                return Ok(Completion {
                    query,
                    text,
                    attempts: poll.attempt + 1,
                });
            }

            sink.emit(ChatEvent::Incremental(response.text.unwrap_or_default()));
            state.record_not_ready(&poll.query_id)?;

            if let Some(max) = self.polling.max_attempts {
                if sent >= max {
                    return Err(ClientError::PollLimitReached {
                        query_id: poll.query_id,
                        attempts: poll.attempt + 1,
                    });
                }
            }

            tokio::select! {
                _ = sleep(self.polling.interval()) => {}
                _ = cancel.cancelled() => {
                    return Err(ClientError::Cancelled { query_id: poll.query_id });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::state::TurnPhase;
    use crate::client::transport::scripted::ScriptedTransport;
    use crate::error::TransportError;
    use serde_json::json;
    use std::time::Duration;

    fn awaiting_state() -> SessionState {
        let mut state = SessionState::new();
        state.establish("m1".into(), "abc".into()).unwrap();
        state.begin_submission().unwrap();
        state
            .await_result(Query {
                query_id: "q1".into(),
                text: "hello".into(),
                model_id: "m1".into(),
                session_id: "abc".into(),
                top_k: 40,
                max_length: 30,
            })
            .unwrap();
        state
    }

    fn attempts(transport: &ScriptedTransport) -> Vec<u32> {
        transport
            .sent()
            .into_iter()
            .map(|r| match r {
                Request::PollQueryResultRequest { attempt, .. } => attempt,
                other => panic!("unexpected request {:?}", other),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn emits_partials_then_final_and_reenables_send() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": "partial0"}))
            .reply(json!({"ready": false, "text": "partial1"}))
            .reply(json!({"ready": false, "text": "partial2"}))
            .reply(json!({"ready": true, "text": "final"}));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let completion = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            events,
            vec![
                ChatEvent::Incremental("partial0".into()),
                ChatEvent::Incremental("partial1".into()),
                ChatEvent::Incremental("partial2".into()),
                ChatEvent::Final("final".into()),
            ]
        );
        assert_eq!(completion.text, "final");
        assert_eq!(completion.attempts, 4);
        assert_eq!(attempts(&transport), vec![0, 1, 2, 3]);
        assert!(state.send_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_fixed_interval_between_attempts() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": "a"}))
            .reply(json!({"ready": false, "text": "ab"}))
            .reply(json!({"ready": true, "text": "abc"}));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let started = tokio::time::Instant::now();
        ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_keeps_query_outstanding() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": "par"}))
            .fail(TransportError::Network("reset".into()));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(!state.send_enabled());
        assert!(matches!(
            state.phase(),
            TurnPhase::AwaitingResult { next_attempt: 1, .. }
        ));
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::Final(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_continues_from_the_failed_attempt() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": "p"}))
            .fail(TransportError::Network("reset".into()))
            .reply(json!({"ready": true, "text": "done"}));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();
        let poller = ResultPoller::new(&transport, &polling);
        let cancel = CancellationToken::new();

        assert!(poller.run(&mut state, &mut events, &cancel).await.is_err());
        let completion = poller.run(&mut state, &mut events, &cancel).await.unwrap();

        assert_eq!(completion.text, "done");
        assert_eq!(attempts(&transport), vec![0, 1, 1]);
        assert!(state.send_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_poll_response_is_a_protocol_error() {
        let transport = ScriptedTransport::new().reply(json!({"text": "no ready flag"}));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_protocol());
        assert!(state.outstanding_query().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn final_reply_without_text_is_a_protocol_error() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": null}))
            .reply(json!({"ready": true}));
        let polling = PollingConfig::default();
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_protocol());
        assert_eq!(events, vec![ChatEvent::Incremental(String::new())]);
        assert!(matches!(
            state.phase(),
            TurnPhase::AwaitingResult { next_attempt: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_stops_polling() {
        let transport = ScriptedTransport::new()
            .reply(json!({"ready": false, "text": "a"}))
            .reply(json!({"ready": false, "text": "b"}));
        let polling = PollingConfig {
            interval_ms: 500,
            max_attempts: Some(2),
        };
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::PollLimitReached { attempts: 2, .. }));
        assert_eq!(transport.sent().len(), 2);
        assert!(state.outstanding_query().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let transport = ScriptedTransport::new().reply(json!({"ready": false, "text": "a"}));
        let polling = PollingConfig {
            interval_ms: 60_000,
            max_attempts: None,
        };
        let mut state = awaiting_state();
        let mut events: Vec<ChatEvent> = Vec::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Cancelled { .. }));
        assert_eq!(transport.sent().len(), 1);
        assert!(!state.send_enabled());
    }

    #[tokio::test]
    async fn polling_without_outstanding_query_is_illegal() {
        let transport = ScriptedTransport::new();
        let polling = PollingConfig::default();
        let mut state = SessionState::new();
        let mut events: Vec<ChatEvent> = Vec::new();

        let err = ResultPoller::new(&transport, &polling)
            .run(&mut state, &mut events, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::IllegalTransition { .. }));
        assert!(transport.sent().is_empty());
    }
}
