use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 一问一答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query_id: String,
    pub prompt: String,
    pub response: String,
    pub asked_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
}

/// 一个服务器会话内的对话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(session_id: &str, model_id: &str) -> Self {
        let now = Utc::now();
        Transcript {
            session_id: session_id.to_string(),
            model_id: model_id.to_string(),
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    pub fn record(&mut self, turn: Turn) {
        self.updated_at = turn.answered_at;
        self.turns.push(turn);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// 列表展示用的摘要
#[derive(Debug, Clone)]
pub struct TranscriptSummary {
    pub session_id: String,
    pub model_id: String,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
}

/// 以 `<session_id>.json` 形式存放对话记录
pub struct TranscriptStore {
    root: PathBuf,
}

impl TranscriptStore {
    pub fn new(root: PathBuf) -> Self {
        TranscriptStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 会话 ID 来自服务器或命令行，只接受能直接作为文件名的值
    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        let plain = !session_id.is_empty()
            && !session_id.starts_with('.')
            && !session_id.contains(['/', '\\', '\0']);
        if !plain {
            return Err(anyhow!("非法的会话 ID：{:?}", session_id));
        }
        Ok(self.root.join(format!("{}.json", session_id)))
    }

    pub fn save(&self, transcript: &Transcript) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("创建目录失败：{}", self.root.display()))?;

        let path = self.path_for(&transcript.session_id)?;
        fs::write(&path, serde_json::to_string_pretty(transcript)?)
            .with_context(|| format!("写入对话记录失败：{}", path.display()))?;
        Ok(path)
    }

    /// 按会话 ID 或唯一前缀加载
    pub fn load(&self, id: &str) -> Result<Transcript> {
        let exact = self.path_for(id)?;
        let path = if exact.exists() {
            exact
        } else {
            let matches: Vec<String> = self
                .ids()?
                .into_iter()
                .filter(|sid| sid.starts_with(id))
                .collect();
            match matches.as_slice() {
                [single] => self.path_for(single)?,
                [] => return Err(anyhow!("对话记录不存在：{}", id)),
                _ => return Err(anyhow!("前缀 {} 匹配到多个对话记录", id)),
            }
        };

        let content = fs::read_to_string(&path)?;
        let transcript = serde_json::from_str(&content)
            .with_context(|| format!("解析对话记录失败：{}", path.display()))?;
        Ok(transcript)
    }

    /// 所有记录的摘要，最近更新的在前；无法解析的文件跳过
    pub fn list(&self) -> Result<Vec<TranscriptSummary>> {
        let mut summaries = Vec::new();
        for id in self.ids()? {
            if let Ok(t) = self.load(&id) {
                summaries.push(TranscriptSummary {
                    session_id: t.session_id,
                    model_id: t.model_id,
                    updated_at: t.updated_at,
                    turn_count: t.turns.len(),
                });
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }
}
