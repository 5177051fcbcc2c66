use crate::config::{ModelConfig, ModelSelection};
use crate::types::ModelCatalog;

/// 模型选择策略
pub trait ModelSelector: Send + Sync {
    fn select(&self, catalog: &ModelCatalog) -> Option<String>;
}

/// 始终选择同一个模型，不检查目录
pub struct FixedModel(pub String);

impl ModelSelector for FixedModel {
    fn select(&self, _catalog: &ModelCatalog) -> Option<String> {
        Some(self.0.clone())
    }
}

/// 选择目录中第一个未禁用的模型
pub struct FirstAvailable;

impl ModelSelector for FirstAvailable {
    fn select(&self, catalog: &ModelCatalog) -> Option<String> {
        catalog.available().into_iter().next().map(|e| e.id)
    }
}

pub fn from_config(config: &ModelConfig) -> Box<dyn ModelSelector> {
    match config.selection {
        ModelSelection::Fixed => Box::new(FixedModel(config.default_model.clone())),
        ModelSelection::FirstAvailable => Box::new(FirstAvailable),
    }
}
