use crate::error::{ClientError, Result};

/// 一次已提交的查询，提交后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub query_id: String,
    pub text: String,
    pub model_id: String,
    pub session_id: String,
    pub top_k: u32,
    pub max_length: u32,
}

/// 单次轮询的编号，从 0 开始逐次加一
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollAttempt {
    pub query_id: String,
    pub attempt: u32,
}

/// 轮流发言的状态机
///
/// `Disconnected -> Idle -> Submitting -> AwaitingResult -> Idle`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// 会话尚未建立
    Disconnected,
    /// 可以发送新查询
    Idle,
    /// QueryRequest 已发出，尚未拿到 queryUUID
    Submitting,
    /// 正在等待结果；`next_attempt` 是下一次轮询的编号
    AwaitingResult { query: Query, next_attempt: u32 },
}

impl TurnPhase {
    pub fn name(&self) -> &'static str {
        match self {
            TurnPhase::Disconnected => "Disconnected",
            TurnPhase::Idle => "Idle",
            TurnPhase::Submitting => "Submitting",
            TurnPhase::AwaitingResult { .. } => "AwaitingResult",
        }
    }
}

/// 会话状态：当前模型、会话 ID 与发送闸门
///
/// 只有 `establish` 能进入 `Idle`，因此可发送时两个 ID 必然都已设置。
#[derive(Debug, Clone)]
pub struct SessionState {
    model_id: Option<String>,
    session_id: Option<String>,
    phase: TurnPhase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            model_id: None,
            session_id: None,
            phase: TurnPhase::Disconnected,
        }
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn send_enabled(&self) -> bool {
        matches!(self.phase, TurnPhase::Idle) && self.model_id.is_some() && self.session_id.is_some()
    }

    /// 在途查询（含轮询失败后等待恢复的查询）
    pub fn outstanding_query(&self) -> Option<&Query> {
        match &self.phase {
            TurnPhase::AwaitingResult { query, .. } => Some(query),
            _ => None,
        }
    }

    fn illegal(&self, action: &'static str) -> ClientError {
        ClientError::IllegalTransition {
            from: self.phase.name(),
            action,
        }
    }

    /// 只有没有在途查询时才能（重新）协商
    pub(crate) fn ensure_negotiable(&self) -> Result<()> {
        match self.phase {
            TurnPhase::Disconnected | TurnPhase::Idle => Ok(()),
            _ => Err(self.illegal("协商会话")),
        }
    }

    /// 开始（重新）协商：清空已有会话
    pub(crate) fn begin_negotiation(&mut self) -> Result<()> {
        self.ensure_negotiable()?;
        self.reset();
        Ok(())
    }

    pub(crate) fn establish(&mut self, model_id: String, session_id: String) -> Result<()> {
        if self.phase != TurnPhase::Disconnected {
            return Err(self.illegal("建立会话"));
        }
        self.model_id = Some(model_id);
        self.session_id = Some(session_id);
        self.phase = TurnPhase::Idle;
        Ok(())
    }

    /// Idle -> Submitting，返回 (modelId, sessionId)
    pub(crate) fn begin_submission(&mut self) -> Result<(String, String)> {
        if !self.send_enabled() {
            return Err(ClientError::SendDisabled);
        }
        let (Some(model_id), Some(session_id)) = (self.model_id.clone(), self.session_id.clone())
        else {
            return Err(ClientError::SendDisabled);
        };
        self.phase = TurnPhase::Submitting;
        Ok((model_id, session_id))
    }

    /// 提交失败：Submitting -> Idle，用户可以手动重试
    pub(crate) fn submission_failed(&mut self) {
        if self.phase == TurnPhase::Submitting {
            self.phase = TurnPhase::Idle;
        }
    }

    pub(crate) fn await_result(&mut self, query: Query) -> Result<()> {
        if self.phase != TurnPhase::Submitting {
            return Err(self.illegal("等待结果"));
        }
        self.phase = TurnPhase::AwaitingResult {
            query,
            next_attempt: 0,
        };
        Ok(())
    }

    pub(crate) fn next_poll(&self) -> Result<PollAttempt> {
        match &self.phase {
            TurnPhase::AwaitingResult {
                query,
                next_attempt,
            } => Ok(PollAttempt {
                query_id: query.query_id.clone(),
                attempt: *next_attempt,
            }),
            _ => Err(self.illegal("轮询结果")),
        }
    }

    pub(crate) fn record_not_ready(&mut self, query_id: &str) -> Result<()> {
        if let TurnPhase::AwaitingResult {
            query,
            next_attempt,
        } = &mut self.phase
        {
            if query.query_id == query_id {
                *next_attempt += 1;
                return Ok(());
            }
        }
        Err(self.illegal("记录未就绪"))
    }

    /// AwaitingResult -> Idle，唯一重新开放发送的正常路径
    pub(crate) fn finish(&mut self, query_id: &str) -> Result<Query> {
        match &self.phase {
            TurnPhase::AwaitingResult { query, .. } if query.query_id == query_id => {
                let query = query.clone();
                self.phase = TurnPhase::Idle;
                Ok(query)
            }
            _ => Err(self.illegal("完成查询")),
        }
    }

    /// 放弃在途查询，由用户显式触发
    pub fn abandon(&mut self) -> Result<Query> {
        match &self.phase {
            TurnPhase::AwaitingResult { query, .. } => {
                let query = query.clone();
                self.phase = TurnPhase::Idle;
                Ok(query)
            }
            _ => Err(self.illegal("放弃查询")),
        }
    }

    /// 结束会话
    pub fn reset(&mut self) {
        self.model_id = None;
        self.session_id = None;
        self.phase = TurnPhase::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: &str) -> Query {
        Query {
            query_id: id.to_string(),
            text: "hi".to_string(),
            model_id: "m1".to_string(),
            session_id: "abc".to_string(),
            top_k: 40,
            max_length: 30,
        }
    }

    fn ready_state() -> SessionState {
        let mut state = SessionState::new();
        state.establish("m1".to_string(), "abc".to_string()).unwrap();
        state
    }

    #[test]
    fn new_state_cannot_send() {
        let state = SessionState::new();
        assert!(!state.send_enabled());
        assert_eq!(state.model_id(), None);
        assert_eq!(state.session_id(), None);
    }

    #[test]
    fn establish_enables_send_with_both_ids() {
        let state = ready_state();
        assert!(state.send_enabled());
        assert_eq!(state.model_id(), Some("m1"));
        assert_eq!(state.session_id(), Some("abc"));
    }

    #[test]
    fn full_turn_returns_to_idle() {
        let mut state = ready_state();
        let (model, session) = state.begin_submission().unwrap();
        assert_eq!((model.as_str(), session.as_str()), ("m1", "abc"));
        assert!(!state.send_enabled());

        state.await_result(query("q1")).unwrap();
        assert_eq!(state.next_poll().unwrap().attempt, 0);
        state.record_not_ready("q1").unwrap();
        state.record_not_ready("q1").unwrap();
        assert_eq!(state.next_poll().unwrap().attempt, 2);
        assert!(!state.send_enabled());

        let finished = state.finish("q1").unwrap();
        assert_eq!(finished.query_id, "q1");
        assert!(state.send_enabled());
    }

    #[test]
    fn second_submission_is_rejected_while_awaiting() {
        let mut state = ready_state();
        state.begin_submission().unwrap();
        state.await_result(query("q1")).unwrap();

        assert!(matches!(
            state.begin_submission(),
            Err(ClientError::SendDisabled)
        ));
        assert_eq!(state.outstanding_query().unwrap().query_id, "q1");
    }

    #[test]
    fn failed_submission_restores_send() {
        let mut state = ready_state();
        state.begin_submission().unwrap();
        state.submission_failed();
        assert!(state.send_enabled());
    }

    #[test]
    fn finishing_another_query_is_illegal() {
        let mut state = ready_state();
        state.begin_submission().unwrap();
        state.await_result(query("q1")).unwrap();

        assert!(matches!(
            state.finish("q2"),
            Err(ClientError::IllegalTransition { .. })
        ));
        assert!(!state.send_enabled());
    }

    #[test]
    fn abandon_requires_outstanding_query() {
        let mut state = ready_state();
        assert!(state.abandon().is_err());

        state.begin_submission().unwrap();
        state.await_result(query("q1")).unwrap();
        assert_eq!(state.abandon().unwrap().query_id, "q1");
        assert!(state.send_enabled());
    }

    #[test]
    fn negotiation_is_rejected_during_a_turn() {
        let mut state = ready_state();
        state.begin_submission().unwrap();
        assert!(state.ensure_negotiable().is_err());
        assert!(state.begin_negotiation().is_err());
        assert_eq!(state.session_id(), Some("abc"));
    }

    #[test]
    fn renegotiation_clears_previous_session() {
        let mut state = ready_state();
        state.begin_negotiation().unwrap();
        assert!(!state.send_enabled());
        assert_eq!(state.session_id(), None);
    }
}
