use tokio::sync::mpsc::UnboundedSender;

/// 聊天行的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// 核心交给展示层的输出事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// 用户输入，发出任何网络请求之前产生
    UserMessage(String),
    /// 查询已被受理，等待第一段输出
    PendingResponse,
    /// 未完成的部分结果
    Incremental(String),
    /// 最终结果
    Final(String),
}

impl ChatEvent {
    /// 展示用文本，部分结果带省略号
    pub fn display_text(&self) -> String {
        match self {
            ChatEvent::UserMessage(text) | ChatEvent::Final(text) => text.clone(),
            ChatEvent::PendingResponse => "...".to_string(),
            ChatEvent::Incremental(text) => format!("{}...", text),
        }
    }
}

/// 事件接收端
pub trait EventSink: Send {
    fn emit(&mut self, event: ChatEvent);
}

impl EventSink for Vec<ChatEvent> {
    fn emit(&mut self, event: ChatEvent) {
        self.push(event);
    }
}

impl EventSink for UnboundedSender<ChatEvent> {
    fn emit(&mut self, event: ChatEvent) {
        // 接收端关闭说明展示层已退出，丢弃即可
        let _ = self.send(event);
    }
}

/// 展示层提供的两个渲染入口
pub trait ChatView {
    /// 追加一行聊天记录
    fn append_row(&mut self, role: Role, text: &str);
    /// 原地更新最后一行模型输出
    fn update_last_output(&mut self, text: &str);
}

/// 把事件映射到 `ChatView` 的渲染入口
pub struct ViewSink<V> {
    view: V,
}

impl<V: ChatView> ViewSink<V> {
    pub fn new(view: V) -> Self {
        ViewSink { view }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn into_inner(self) -> V {
        self.view
    }
}

impl<V: ChatView + Send> EventSink for ViewSink<V> {
    fn emit(&mut self, event: ChatEvent) {
        let text = event.display_text();
        match event {
            ChatEvent::UserMessage(_) => self.view.append_row(Role::User, &text),
            ChatEvent::PendingResponse => self.view.append_row(Role::Model, &text),
            ChatEvent::Incremental(_) | ChatEvent::Final(_) => self.view.update_last_output(&text),
        }
    }
}
