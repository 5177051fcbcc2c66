mod catalog;
mod messages;

pub use catalog::{ModelCatalog, ModelEntry, ModelNode};
pub use messages::{
    decode, PollOpenModelResponse, PollQueryResultResponse, QueryResponse, Request,
    Response, StartSessionResponse,
};
