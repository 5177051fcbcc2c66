use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认模型（服务器端目录路径）
pub const DEFAULT_MODEL: &str = "OpenAI/GPT 2/SMALL";

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".oag")
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub endpoint_path: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            base_url: std::env::var("OAG_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            endpoint_path: "/open-all-gpt".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// 完整的请求地址
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint_path.trim_start_matches('/')
        )
    }
}

/// 查询参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: u32,
    pub max_length: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            top_k: 40,
            max_length: 30,
        }
    }
}

/// 轮询策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// 不设置则无限轮询，直到服务器返回 ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval_ms: 500,
            max_attempts: None,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSelection {
    Fixed,
    FirstAvailable,
}

/// 模型选择配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub default_model: String,
    pub selection: ModelSelection,
    /// 为 false 时把第一次 PollOpenModel 的响应视为最终结果
    pub wait_for_model: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            default_model: std::env::var("OAG_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            selection: ModelSelection::Fixed,
            wait_for_model: true,
        }
    }
}

/// 对话记录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub storage_path: PathBuf,
    pub auto_save: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        TranscriptConfig {
            storage_path: base_dir().join("transcripts"),
            auto_save: true,
        }
    }
}

/// 统一配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub query: QueryConfig,
    pub polling: PollingConfig,
    pub model: ModelConfig,
    pub transcript: TranscriptConfig,
}

impl Config {
    /// 从文件加载配置，文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败：{}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败：{}", path.display()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        base_dir().join("config.toml")
    }

    /// 从默认位置加载配置
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    /// 确保对话记录目录存在
    pub fn ensure_transcripts(&self) -> Result<()> {
        fs::create_dir_all(&self.transcript.storage_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.query.top_k, 40);
        assert_eq!(config.query.max_length, 30);
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.polling.max_attempts, None);
        assert_eq!(config.server.endpoint_path, "/open-all-gpt");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[polling]\nmax_attempts = 20\n\n[model]\nselection = \"first-available\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.polling.max_attempts, Some(20));
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.model.selection, ModelSelection::FirstAvailable);
        assert!(config.model.wait_for_model);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.server.base_url = "http://gpt.example:9000".to_string();
        config.log_level = Some("debug".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.base_url, "http://gpt.example:9000");
        assert_eq!(loaded.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let server = ServerConfig {
            base_url: "http://localhost:8080/".to_string(),
            endpoint_path: "/open-all-gpt".to_string(),
            request_timeout_secs: 5,
        };
        assert_eq!(server.endpoint_url(), "http://localhost:8080/open-all-gpt");
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[polling\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
