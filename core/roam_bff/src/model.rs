use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A block record as returned inside a pull result tuple.
#[derive(Debug, Default, Deserialize)]
pub struct PulledBlock {
    #[serde(rename = ":block/uid")]
    pub uid: Option<String>,
    #[serde(rename = ":node/uid")]
    pub node_uid: Option<String>,
    #[serde(rename = ":block/string")]
    pub string: Option<String>,
    #[serde(rename = ":node/title")]
    pub title: Option<String>,
    #[serde(rename = ":block/order")]
    pub order: Option<i64>,
    #[serde(rename = ":block/children", default)]
    pub children: Vec<PulledBlock>,
}

/// Unpacks `{"result": [[block], [block], ...]}`, skipping tuples that are not block records.
pub fn pulled_blocks(response: &Value) -> Vec<PulledBlock> {
    let Some(rows) = response.get("result").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| row.as_array()?.first())
        .filter_map(|block| serde_json::from_value(block.clone()).ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    pub content: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: u64,
    pub category_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsNode {
    pub name: String,
    pub own_duration_minutes: u64,
    pub total_duration_minutes: u64,
    pub percentage: u32,
    pub children: Vec<StatsNode>,
}

/// `[[Name]]` and `Name` compare equal after this.
pub fn bare_name(name: &str) -> String {
    name.replace("[[", "").replace("]]", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_name_strips_every_bracket_pair() {
        assert_eq!(bare_name("[[Work]]"), "Work");
        assert_eq!(bare_name("[[P/[[Nested]]]]"), "P/Nested");
        assert_eq!(bare_name("Life"), "Life");
    }

    #[test]
    fn pulled_blocks_skips_malformed_rows() {
        let response = json!({
            "result": [
                [{":block/uid": "a", ":block/string": "A"}],
                [],
                "oops",
                [{":block/uid": 7}],
                [{":block/uid": "b", ":block/children": [{":block/uid": "c"}]}]
            ]
        });
        let blocks = pulled_blocks(&response);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].uid.as_deref(), Some("a"));
        assert_eq!(blocks[1].children.len(), 1);
    }

    #[test]
    fn missing_result_is_empty() {
        assert!(pulled_blocks(&json!({})).is_empty());
        assert!(pulled_blocks(&json!({"result": null})).is_empty());
    }

    #[test]
    fn stats_node_serializes_camel_case() {
        let node = StatsNode {
            name: "Work".into(),
            own_duration_minutes: 1,
            total_duration_minutes: 2,
            percentage: 100,
            children: Vec::new(),
        };
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["ownDurationMinutes"], 1);
        assert_eq!(v["totalDurationMinutes"], 2);
    }
}
