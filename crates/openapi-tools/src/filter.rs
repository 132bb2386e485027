//! Tool selection by operation id and tag.

use crate::config::ToolFilter;
use crate::convert::OperationMap;
use rmcp::model::Tool;
use std::collections::{BTreeMap, HashSet};

/// Restrict `tools` (and the operation map alongside) to what `filter` selects.
///
/// Operation filters pick ids directly (`include_operations`, or everything but
/// `exclude_operations`). Tag filters do the same on the operations carrying those tags. The
/// two selections are unioned. Tool order is kept.
///
/// The operation map always ends up with exactly the kept tools, including when nothing is kept,
/// so a filtered-out operation can't be called by name.
#[must_use]
pub fn filter_tools(tools: Vec<Tool>, operation_map: OperationMap, filter: &ToolFilter) -> (Vec<Tool>, OperationMap) {
    if filter.is_empty() {
        return (tools, operation_map);
    }

    let all: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();

    let mut operations_by_tag: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (operation_id, details) in &operation_map {
        for tag in &details.tags {
            operations_by_tag
                .entry(tag.as_str())
                .or_default()
                .push(operation_id.as_str());
        }
    }

    let mut selected: HashSet<String> = HashSet::new();

    if let Some(include) = &filter.include_operations {
        selected.extend(include.iter().cloned());
    } else if let Some(exclude) = &filter.exclude_operations {
        let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        selected.extend(all.iter().filter(|n| !excluded.contains(n.as_str())).cloned());
    }

    if let Some(include) = &filter.include_tags {
        for tag in include {
            if let Some(ops) = operations_by_tag.get(tag.as_str()) {
                selected.extend(ops.iter().map(|s| (*s).to_string()));
            }
        }
    } else if let Some(exclude) = &filter.exclude_tags {
        let excluded: HashSet<&str> = exclude
            .iter()
            .filter_map(|tag| operations_by_tag.get(tag.as_str()))
            .flatten()
            .copied()
            .collect();
        selected.extend(all.iter().filter(|n| !excluded.contains(n.as_str())).cloned());
    }

    let tools: Vec<Tool> = tools.into_iter().filter(|t| selected.contains(&*t.name)).collect();
    let kept: HashSet<&str> = tools.iter().map(|t| &*t.name).collect();
    let operation_map = operation_map
        .into_iter()
        .filter(|(name, _)| kept.contains(name.as_str()))
        .collect();

    tracing::debug!(kept = tools.len(), total = all.len(), "filtered tools");
    (tools, operation_map)
}
