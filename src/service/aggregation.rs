//! Vendor aggregation file ingestion.
//!
//! Vendor exports differ in shape, so the document is searched for any object
//! carrying a `Barcode` and a `level`. Nesting between such objects defines
//! the packaging tree (items inside boxes inside pallets).

use crate::error::OmsError;
use crate::service::gs1::normalize_code;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::{fs, path::Path};
use tracing::{debug, warn};

/// Highest packaging level kept (0 = item, 1 = box, 2 = pallet).
pub const MAX_LEVEL: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationNode {
    pub code: String,
    pub level: u8,
    /// Capacity declared by the vendor file, if any.
    pub capacity: Option<u32>,
    pub children: Vec<AggregationNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBuckets {
    pub level0: Vec<String>,
    pub level1: Vec<String>,
    pub level2: Vec<String>,
}

impl LevelBuckets {
    pub fn total(&self) -> usize {
        self.level0.len() + self.level1.len() + self.level2.len()
    }
}

#[derive(Debug, Clone)]
pub struct ParsedAggregation {
    pub file_name: String,
    pub raw_json: String,
    pub nodes: Vec<AggregationNode>,
    pub buckets: LevelBuckets,
}

/// Read and parse an aggregation file from disk.
pub fn ingest_file(path: &Path) -> Result<ParsedAggregation, OmsError> {
    let text = fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    ingest_str(name, &text)
}

/// Parse aggregation JSON already in memory.
pub fn ingest_str(file_name: impl Into<String>, text: &str) -> Result<ParsedAggregation, OmsError> {
    let file_name = file_name.into();
    let value: Value = serde_json::from_str(text)?;
    let nodes = extract_nodes(&value);
    if nodes.is_empty() {
        return Err(OmsError::Validation(format!(
            "{file_name}: no objects with Barcode and level found"
        )));
    }
    let buckets = bucket_levels(&nodes);
    debug!(
        file = %file_name,
        level0 = buckets.level0.len(),
        level1 = buckets.level1.len(),
        level2 = buckets.level2.len(),
        "aggregation file parsed"
    );
    Ok(ParsedAggregation {
        file_name,
        raw_json: text.to_string(),
        nodes,
        buckets,
    })
}

/// Collect the outermost Barcode/level objects of a document; each carries
/// its nearest nested Barcode/level objects as children.
pub fn extract_nodes(value: &Value) -> Vec<AggregationNode> {
    match value {
        Value::Object(map) => match node_header(map) {
            Some((code, level)) => vec![AggregationNode {
                code,
                level,
                capacity: declared_capacity(map),
                children: map.values().flat_map(extract_nodes).collect(),
            }],
            None => map.values().flat_map(extract_nodes).collect(),
        },
        Value::Array(items) => items.iter().flat_map(extract_nodes).collect(),
        _ => Vec::new(),
    }
}

/// Flatten the tree into per-level code lists, de-duplicated in document order.
pub fn bucket_levels(nodes: &[AggregationNode]) -> LevelBuckets {
    let mut buckets = LevelBuckets::default();
    let mut seen = HashSet::new();
    let mut stack: Vec<&AggregationNode> = nodes.iter().rev().collect();

    while let Some(node) = stack.pop() {
        stack.extend(node.children.iter().rev());
        if !seen.insert((node.level, node.code.as_str())) {
            continue;
        }
        let bucket = match node.level {
            0 => &mut buckets.level0,
            1 => &mut buckets.level1,
            2 => &mut buckets.level2,
            other => {
                warn!(code = %node.code, level = other, "aggregation level above {MAX_LEVEL} ignored");
                continue;
            }
        };
        bucket.push(node.code.clone());
    }
    buckets
}

fn field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn node_header(map: &Map<String, Value>) -> Option<(String, u8)> {
    let code = field(map, "barcode")?.as_str()?;
    let level = as_u64(field(map, "level")?)?;
    let code = normalize_code(code);
    if code.is_empty() {
        return None;
    }
    // Levels that do not fit are still nodes so their children are not lost;
    // bucket_levels reports them.
    Some((code, u8::try_from(level).unwrap_or(u8::MAX)))
}

fn declared_capacity(map: &Map<String, Value>) -> Option<u32> {
    ["capacity", "quantity"]
        .iter()
        .find_map(|name| field(map, name))
        .and_then(as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "document": {
                "header": {"created": "2024-05-01", "line": 3},
                "pallets": [{
                    "Barcode": "(00)146000000000000017",
                    "level": 2,
                    "boxes": [
                        {
                            "Barcode": "046000000000001",
                            "Level": "1",
                            "Capacity": 2,
                            "items": [
                                {"Barcode": "0104604060005904215abc\u{1d}91EE05", "level": 0},
                                {"Barcode": "0104604060005904215abd\\u001d91EE05", "level": 0}
                            ]
                        },
                        {
                            "barcode": "046000000000002",
                            "level": 1,
                            "wrapper": {"items": [{"Barcode": "0104604060005904215abe", "level": 0}]}
                        }
                    ]
                }]
            }
        })
    }

    #[test]
    fn finds_nodes_at_any_depth() {
        let nodes = extract_nodes(&sample());
        assert_eq!(nodes.len(), 1);
        let pallet = &nodes[0];
        assert_eq!(pallet.level, 2);
        assert_eq!(pallet.children.len(), 2);
        assert_eq!(pallet.children[0].capacity, Some(2));
        assert_eq!(pallet.children[0].children.len(), 2);
        assert_eq!(pallet.children[1].children.len(), 1);
    }

    #[test]
    fn buckets_by_level_with_normalized_codes() {
        let buckets = bucket_levels(&extract_nodes(&sample()));
        assert_eq!(
            buckets.level0,
            vec![
                "0104604060005904215abc<GS>91EE05",
                "0104604060005904215abd<GS>91EE05",
                "0104604060005904215abe",
            ]
        );
        assert_eq!(buckets.level1, vec!["046000000000001", "046000000000002"]);
        assert_eq!(buckets.level2, vec!["(00)146000000000000017"]);
        assert_eq!(buckets.total(), 6);
    }

    #[test]
    fn duplicates_and_deep_levels_are_dropped() {
        let doc = json!([
            {"Barcode": "A", "level": 0},
            {"Barcode": "A", "level": 0},
            {"Barcode": "B", "level": 5},
            {"Barcode": "C", "level": -1},
            {"Barcode": "", "level": 0}
        ]);
        let buckets = bucket_levels(&extract_nodes(&doc));
        assert_eq!(buckets.level0, vec!["A"]);
        assert!(buckets.level1.is_empty());
        assert!(buckets.level2.is_empty());
    }

    #[test]
    fn document_without_nodes_is_rejected() {
        let err = ingest_str("empty.json", r#"{"items": [{"code": "x"}]}"#).unwrap_err();
        assert!(matches!(err, OmsError::Validation(_)));
        assert!(ingest_str("broken.json", "{").is_err());
    }

    #[test]
    fn keeps_raw_json() {
        let text = sample().to_string();
        let parsed = ingest_str("vendor.json", &text).unwrap();
        assert_eq!(parsed.raw_json, text);
        assert_eq!(parsed.file_name, "vendor.json");
    }
}
