use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ClientError, Result};

/// 模型目录中的一个节点：文件夹或叶子模型
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub folders: Option<BTreeMap<String, ModelNode>>,
}

impl ModelNode {
    fn is_leaf(&self) -> bool {
        self.folders.as_ref().map_or(true, |f| f.is_empty())
    }
}

/// 展开后的叶子模型，`id` 为从根开始以 `/` 连接的路径
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub id: String,
    pub order: i64,
    pub date: Option<String>,
    pub size: Option<String>,
    /// 自身或任一上级文件夹被禁用
    pub disabled: bool,
}

/// ClientJoinedResponse 携带的模型目录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCatalog {
    roots: BTreeMap<String, ModelNode>,
}

impl ModelCatalog {
    pub fn new(roots: BTreeMap<String, ModelNode>) -> Self {
        ModelCatalog { roots }
    }

    /// 从 ClientJoinedResponse 解析目录
    ///
    /// `models` 通常是文件夹树；也接受模型 ID 字符串数组。
    pub fn from_json(value: &Value) -> Result<Self> {
        const REQUEST: &str = "ClientJoinedRequest";

        if let Some(tag) = value.get("type").and_then(Value::as_str) {
            if tag != "ClientJoinedResponse" {
                return Err(ClientError::protocol(
                    REQUEST,
                    format!("期望 ClientJoinedResponse，实际为 {}", tag),
                ));
            }
        }

        match value.get("models") {
            Some(Value::Object(_)) => {
                let roots: BTreeMap<String, ModelNode> =
                    serde_json::from_value(value["models"].clone())
                        .map_err(|e| ClientError::protocol(REQUEST, e.to_string()))?;
                Ok(ModelCatalog { roots })
            }
            Some(Value::Array(items)) => {
                let mut roots = BTreeMap::new();
                for (index, item) in items.iter().enumerate() {
                    let id = item
                        .as_str()
                        .ok_or_else(|| ClientError::protocol(REQUEST, "models 数组只能包含字符串"))?;
                    roots.insert(
                        id.to_string(),
                        ModelNode {
                            order: index as i64,
                            ..ModelNode::default()
                        },
                    );
                }
                Ok(ModelCatalog { roots })
            }
            Some(_) => Err(ClientError::protocol(REQUEST, "models 字段类型无效")),
            None => Err(ClientError::protocol(REQUEST, "缺少 models 字段")),
        }
    }

    /// 按 order、名称排序的全部叶子模型
    pub fn entries(&self) -> Vec<ModelEntry> {
        let mut out = Vec::new();
        collect(&self.roots, "", false, &mut out);
        out
    }

    /// 未被禁用的叶子模型
    pub fn available(&self) -> Vec<ModelEntry> {
        self.entries().into_iter().filter(|e| !e.disabled).collect()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries().iter().any(|e| e.id == model_id)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// 缩进的树形文本，用于命令行展示
    pub fn render_tree(&self) -> Vec<String> {
        let mut lines = Vec::new();
        render(&self.roots, 0, &mut lines);
        lines
    }
}

fn sorted(nodes: &BTreeMap<String, ModelNode>) -> Vec<(&String, &ModelNode)> {
    let mut items: Vec<_> = nodes.iter().collect();
    items.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
    items
}

fn collect(
    nodes: &BTreeMap<String, ModelNode>,
    prefix: &str,
    parent_disabled: bool,
    out: &mut Vec<ModelEntry>,
) {
    for (name, node) in sorted(nodes) {
        let id = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        let disabled = parent_disabled || node.disabled;

        match &node.folders {
            Some(children) if !node.is_leaf() => collect(children, &id, disabled, out),
            _ => out.push(ModelEntry {
                id,
                order: node.order,
                date: node.date.clone(),
                size: node.size.clone(),
                disabled,
            }),
        }
    }
}

fn render(nodes: &BTreeMap<String, ModelNode>, depth: usize, lines: &mut Vec<String>) {
    for (name, node) in sorted(nodes) {
        let mut line = format!("{}{}", "  ".repeat(depth), name);
        if node.is_leaf() {
            let details: Vec<&str> = [node.size.as_deref(), node.date.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if !details.is_empty() {
                line.push_str(&format!(" ({})", details.join(", ")));
            }
        }
        if node.disabled {
            line.push_str(" [禁用]");
        }
        lines.push(line);

        if let Some(children) = &node.folders {
            render(children, depth + 1, lines);
        }
    }
}
