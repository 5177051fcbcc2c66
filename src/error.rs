//! 错误类型
//!
//! `TransportError` 只表示基础设施故障（网络、HTTP 状态、非 JSON 响应），
//! `ClientError` 覆盖协议与会话层面的失败。

use thiserror::Error;

/// 传输层错误，不做任何重试
#[derive(Error, Debug)]
pub enum TransportError {
    /// 网络不可达、连接中断、超时
    #[error("网络错误：{0}")]
    Network(String),

    /// 服务器返回非 2xx 状态
    #[error("服务器返回 HTTP {status}：{body}")]
    Status { status: u16, body: String },

    /// 响应体不是 JSON 对象
    #[error("响应不是合法的 JSON 对象：{0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 响应是合法 JSON，但缺少字段或类型不符
    #[error("{request} 的响应无效：{detail}")]
    Protocol { request: &'static str, detail: String },

    #[error("输入为空")]
    EmptyQuery,

    /// 当前不允许发送（会话未建立或已有查询在途）
    #[error("当前不可发送")]
    SendDisabled,

    #[error("非法状态转换：在 {from} 状态下无法 {action}")]
    IllegalTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("模型目录中没有可选的模型")]
    ModelNotSelected,

    #[error("模型 {model_id} 在 {attempts} 次轮询后仍未就绪")]
    ModelNotReady { model_id: String, attempts: u32 },

    #[error("查询 {query_id} 在 {attempts} 次轮询后仍未完成")]
    PollLimitReached { query_id: String, attempts: u32 },

    #[error("查询 {query_id} 的轮询已取消")]
    Cancelled { query_id: String },
}

impl ClientError {
    pub(crate) fn protocol(request: &'static str, detail: impl Into<String>) -> Self {
        ClientError::Protocol {
            request,
            detail: detail.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
