use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{bare_name, pulled_blocks, CategoryNode, PageRef, PulledBlock, TimelineEntry};

// "09:08 - 09:47 (**39'**) - content"; content may carry images on further lines.
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(\d{2}:\d{2})\s*-\s*(\d{2}:\d{2})\s*\(\*\*(.+?)\*\*\)\s*-\s*(.*)$")
        .expect("entry pattern")
});
static HOURS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)h").expect("hours pattern"));
static MINUTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)'").expect("minutes pattern"));
static BRACKET_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\[\[([^\]]+)\]\]").expect("bracket tag pattern"));
static BARE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([^\s#]+)").expect("tag pattern"));

/// Rebuilds the category forest from a pull over every block of the categories page.
///
/// The query returns parents and descendants alike as top-level tuples; any block
/// that shows up inside another block's children is dropped from the roots.
pub fn build_category_tree(response: &Value, container_title: &str) -> Vec<CategoryNode> {
    let mut blocks = pulled_blocks(response);
    blocks.sort_by_key(|b| b.order.unwrap_or(i64::MAX));
    let nodes: Vec<CategoryNode> = blocks
        .iter()
        .filter_map(category_node)
        .collect();

    let mut nested = HashSet::new();
    for node in &nodes {
        collect_descendant_ids(node, &mut nested);
    }

    let container = bare_name(container_title);
    nodes
        .into_iter()
        .filter(|n| !nested.contains(&n.id))
        .filter(|n| bare_name(&n.name) != container)
        .collect()
}

fn category_node(block: &PulledBlock) -> Option<CategoryNode> {
    let id = block.uid.as_deref().filter(|s| !s.is_empty())?;
    let name = block.string.as_deref().filter(|s| !s.is_empty())?;

    let mut children: Vec<&PulledBlock> = block.children.iter().collect();
    children.sort_by_key(|c| c.order.unwrap_or(i64::MAX));

    Some(CategoryNode {
        id: id.to_string(),
        name: name.to_string(),
        children: children.into_iter().filter_map(category_node).collect(),
    })
}

fn collect_descendant_ids(node: &CategoryNode, out: &mut HashSet<String>) {
    for child in &node.children {
        out.insert(child.id.clone());
        collect_descendant_ids(child, out);
    }
}

/// Pages keyed by title; the first uid seen for a title wins.
pub fn parse_pages(response: &Value) -> Vec<PageRef> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages = Vec::new();
    for block in pulled_blocks(response) {
        let Some(title) = block
            .title
            .clone()
            .or_else(|| block.string.clone())
            .filter(|t| !t.is_empty())
        else {
            continue;
        };
        if !seen.insert(title.clone()) {
            continue;
        }
        let id = block
            .node_uid
            .or(block.uid)
            .unwrap_or_else(|| title.clone());
        pages.push(PageRef {
            id,
            name: format!("[[{title}]]"),
        });
    }
    pages
}

/// `1h30'` -> 90, `39'` -> 39, `2h` -> 120. Anything else contributes nothing.
pub fn parse_duration(s: &str) -> u64 {
    let capture = |re: &Regex| {
        re.captures(s)
            .and_then(|c| c[1].parse::<u64>().ok())
            .unwrap_or(0)
    };
    capture(&HOURS_RE)
        .saturating_mul(60)
        .saturating_add(capture(&MINUTES_RE))
}

pub fn format_duration(minutes: u64) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    if h > 0 {
        format!("{h}h{m}'")
    } else {
        format!("{m}'")
    }
}

/// `#[[Multi Word]]` tags first, then bare `#tag`s, de-duplicated in first-seen order.
pub fn extract_categories(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    for c in BRACKET_TAG_RE.captures_iter(content) {
        push(&c[1]);
    }
    for c in BARE_TAG_RE.captures_iter(content) {
        // `#[[A B]]` also matches here as `[[A`; it was taken above.
        if !c[1].contains("[[") {
            push(&c[1]);
        }
    }
    tags
}

pub fn parse_timeline_entry(text: &str) -> Option<TimelineEntry> {
    let c = ENTRY_RE.captures(text)?;
    let content = c[4].to_string();
    Some(TimelineEntry {
        uid: None,
        order: None,
        start_time: c[1].to_string(),
        end_time: c[2].to_string(),
        duration_minutes: parse_duration(&c[3]),
        category_tags: extract_categories(&content),
        content,
    })
}

/// Timeline entries of a pull over a container's children, in block order.
pub fn parse_timeline_blocks(response: &Value) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = pulled_blocks(response)
        .into_iter()
        .filter_map(|block| {
            let mut entry = parse_timeline_entry(block.string.as_deref()?)?;
            entry.uid = block.uid;
            entry.order = block.order;
            Some(entry)
        })
        .collect();
    entries.sort_by_key(|e| e.order.unwrap_or(i64::MAX));
    entries
}
