pub mod chat;
pub mod events;
pub mod negotiator;
pub mod poller;
pub mod selector;
pub mod state;
pub mod submitter;
pub mod transcript;
pub mod transport;

pub use chat::ChatClient;
pub use events::{ChatEvent, ChatView, EventSink, Role, ViewSink};
pub use negotiator::SessionNegotiator;
pub use poller::{Completion, ResultPoller};
pub use selector::{FirstAvailable, FixedModel, ModelSelector};
pub use state::{PollAttempt, Query, SessionState, TurnPhase};
pub use submitter::QuerySubmitter;
pub use transcript::{Transcript, TranscriptStore, TranscriptSummary, Turn};
pub use transport::{HttpTransport, Transport};
