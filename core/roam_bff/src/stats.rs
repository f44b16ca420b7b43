use std::collections::HashMap;

use tracing::debug;

use crate::{
    config::CategoryMatch,
    model::{bare_name, CategoryNode, StatsNode, TimelineEntry},
};

/// Attributes every tagged entry to its category and rolls the minutes up the tree.
///
/// Own minutes land only on the matched node; ancestors see them through
/// `total = own + sum(children.total)`. An entry counts once per matched tag.
pub fn aggregate(
    forest: &[CategoryNode],
    entries: &[TimelineEntry],
    policy: CategoryMatch,
) -> Vec<StatsNode> {
    let mut own: HashMap<&str, u64> = HashMap::new();
    for entry in entries {
        for tag in &entry.category_tags {
            let tag = bare_name(tag);
            match find_category(forest, &tag, policy, "") {
                Some(id) => *own.entry(id).or_default() += entry.duration_minutes,
                None => debug!("no category matches tag {tag:?}"),
            }
        }
    }

    let mut roots: Vec<StatsNode> = forest.iter().map(|c| stats_node(c, &own)).collect();
    let grand_total: u64 = roots.iter().map(|n| n.total_duration_minutes).sum();
    for root in &mut roots {
        apply_percentages(root, grand_total);
    }
    roots
}

/// First node in depth-first order matching `tag` (already bracket-stripped).
fn find_category<'a>(
    nodes: &'a [CategoryNode],
    tag: &str,
    policy: CategoryMatch,
    parent_path: &str,
) -> Option<&'a str> {
    for node in nodes {
        let name = bare_name(&node.name);
        let path = if parent_path.is_empty() {
            name.clone()
        } else {
            format!("{parent_path}/{name}")
        };
        let hit = match policy {
            CategoryMatch::Leaf => name == tag,
            CategoryMatch::Path => path == tag,
        };
        if hit {
            return Some(node.id.as_str());
        }
        if let Some(id) = find_category(&node.children, tag, policy, &path) {
            return Some(id);
        }
    }
    None
}

fn stats_node(category: &CategoryNode, own: &HashMap<&str, u64>) -> StatsNode {
    let children: Vec<StatsNode> = category
        .children
        .iter()
        .map(|c| stats_node(c, own))
        .collect();
    let own_minutes = own.get(category.id.as_str()).copied().unwrap_or(0);
    let total = children
        .iter()
        .map(|c| c.total_duration_minutes)
        .fold(own_minutes, u64::saturating_add);
    StatsNode {
        name: category.name.clone(),
        own_duration_minutes: own_minutes,
        total_duration_minutes: total,
        percentage: 0,
        children,
    }
}

fn apply_percentages(node: &mut StatsNode, grand_total: u64) {
    node.percentage = percentage(node.total_duration_minutes, grand_total);
    for child in &mut node.children {
        apply_percentages(child, grand_total);
    }
}

/// `round(100 * part / whole)`, halves rounded up; 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    let scaled = (part as u128 * 200 + whole as u128) / (whole as u128 * 2);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}
