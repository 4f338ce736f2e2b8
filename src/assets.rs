//! Read-only asset index: record search plus template loading for
//! instantiation.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::scene::{ComponentTemplate, NodeTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub name: String,
    #[serde(rename = "path", alias = "assetPath")]
    pub path: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssetOrder {
    #[default]
    Name,
    Date,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetQuery {
    pub pattern: Option<String>,
    pub category: Option<String>,
    pub path_prefix: Option<String>,
    pub modified_after: Option<DateTime<Utc>>,
    pub order_by: AssetOrder,
}

impl AssetQuery {
    pub fn matches(&self, record: &AssetRecord) -> bool {
        if let Some(pattern) = self.pattern.as_deref().map(str::trim) {
            if !pattern.is_empty()
                && !wildcard_match(pattern, &record.name)
                && !wildcard_match(pattern, &record.path)
            {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !record.category.eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            let prefix = prefix.trim().trim_end_matches('/');
            if !record.path.starts_with(prefix) {
                return false;
            }
        }
        if let Some(after) = self.modified_after {
            if !record.last_modified.is_some_and(|m| m > after) {
                return false;
            }
        }
        true
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

/// `*` matches any run of characters; without a `*` the pattern is a
/// case-insensitive substring.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('*') {
        return text.contains(&pattern);
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut rest = text.as_str();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == last {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}

pub trait AssetIndex: Send + Sync {
    /// Filtered, ordered and de-duplicated by path. Paging is the caller's.
    fn search(&self, query: &AssetQuery) -> Vec<AssetRecord>;

    fn record(&self, path: &str) -> Option<AssetRecord>;

    fn load(&self, path: &str) -> Option<NodeTemplate>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogItem {
    #[serde(flatten)]
    record: AssetRecord,
    #[serde(default)]
    template: Option<NodeTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<CatalogItem>,
}

/// Asset index backed by a JSON file of records with optional spawn
/// templates.
#[derive(Debug, Clone, Default)]
pub struct PrefabCatalog {
    items: Vec<CatalogItem>,
}

impl PrefabCatalog {
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&text).map_err(|e| {
            BridgeError::collaborator(format!("Invalid prefab catalog {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), items = file.items.len(), "prefab catalog loaded");
        Ok(Self { items: file.items })
    }

    pub fn insert(&mut self, record: AssetRecord, template: Option<NodeTemplate>) {
        self.items.push(CatalogItem { record, template });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The stock robot and environment prefabs available without a
    /// catalog file.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        let axes: Vec<String> = (1..=6).map(|i| format!("A{i}")).collect();
        let robot = NodeTemplate {
            name: "Robot01".to_string(),
            components: vec![ComponentTemplate {
                type_name: "RobotIK".to_string(),
                properties: serde_json::json!({ "axes": axes })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            }],
            children: vec![NodeTemplate {
                name: "Base".to_string(),
                components: vec![
                    ComponentTemplate {
                        type_name: "Mesh".to_string(),
                        properties: serde_json::Map::new(),
                    },
                    ComponentTemplate {
                        type_name: "Renderer".to_string(),
                        properties: serde_json::Map::new(),
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        catalog.insert(
            AssetRecord {
                name: "Robot01".to_string(),
                path: "Prefabs/Robots/Robot01.prefab".to_string(),
                category: "Prefab".to_string(),
                tags: vec!["robot".to_string()],
                last_modified: None,
            },
            Some(robot),
        );
        catalog.insert(
            AssetRecord {
                name: "MotionEnvironment".to_string(),
                path: "Prefabs/Environment/MotionEnvironment.prefab".to_string(),
                category: "Prefab".to_string(),
                tags: vec!["environment".to_string()],
                last_modified: None,
            },
            Some(NodeTemplate {
                name: "MotionEnvironment".to_string(),
                components: vec![ComponentTemplate {
                    type_name: "MotionController".to_string(),
                    properties: serde_json::Map::new(),
                }],
                ..Default::default()
            }),
        );
        catalog
    }
}

impl AssetIndex for PrefabCatalog {
    fn search(&self, query: &AssetQuery) -> Vec<AssetRecord> {
        let mut seen = HashSet::new();
        let mut found: Vec<AssetRecord> = self
            .items
            .iter()
            .map(|item| &item.record)
            .filter(|record| query.matches(record))
            .filter(|record| seen.insert(record.path.clone()))
            .cloned()
            .collect();
        match query.order_by {
            AssetOrder::Name => found.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
            AssetOrder::Date => found.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
        }
        found
    }

    fn record(&self, path: &str) -> Option<AssetRecord> {
        self.items
            .iter()
            .find(|item| item.record.path == path.trim())
            .map(|item| item.record.clone())
    }

    fn load(&self, path: &str) -> Option<NodeTemplate> {
        self.items
            .iter()
            .find(|item| item.record.path == path.trim())
            .and_then(|item| item.template.clone())
    }
}
