//! Dashboard Snapshots
//!
//! Read-only views over the [`CommandLog`]: a process-wide overview and a
//! paged, searchable, sortable listing for one caller. Both serialize with
//! camelCase keys for the dashboard front end.

use crate::profiler::storage::{CommandLog, CommandLogEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rows per page in [`fetch_resource`].
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub resources: Vec<String>,
    pub total_commands: usize,
    pub slow_commands: usize,
    pub total_time: f64,
    pub chart_data: ChartData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub commands: usize,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Command,
    ExecutionTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SortKey {
    pub id: SortField,
    #[serde(default)]
    pub desc: bool,
}

/// A page request from the dashboard. Only the first sort key is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub resource: String,
    #[serde(default)]
    pub page_index: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePage {
    pub commands: Vec<CommandLogEntry>,
    pub page_count: usize,
    pub resource_commands_count: usize,
    pub resource_slow_commands: usize,
    pub resource_time: f64,
}

/// Totals across every caller, plus one chart point per caller.
pub fn overview(log: &CommandLog) -> Overview {
    let mut overview = Overview::default();

    for (caller, entries) in log.snapshot() {
        let time: f64 = entries.iter().map(|e| e.execution_time_ms).sum();

        overview.total_commands += entries.len();
        overview.slow_commands += entries.iter().filter(|e| e.slow).count();
        overview.total_time += time;
        overview.chart_data.labels.push(caller.clone());
        overview.chart_data.data.push(ChartPoint {
            commands: entries.len(),
            time,
        });
        overview.resources.push(caller);
    }

    overview
}

/// One page of a caller's log. `None` when the caller has no log.
///
/// The counters describe the filtered set, so a search narrows them too.
pub fn fetch_resource(log: &CommandLog, query: &ResourceQuery) -> Option<ResourcePage> {
    let mut entries = log.entries(&query.resource)?;

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        entries.retain(|e| e.command.to_lowercase().contains(&needle));
    }

    let resource_commands_count = entries.len();
    let resource_slow_commands = entries.iter().filter(|e| e.slow).count();
    let resource_time = entries.iter().map(|e| e.execution_time_ms).sum();
    let page_count = resource_commands_count.div_ceil(PAGE_SIZE);

    if let Some(key) = query.sort_by.first() {
        entries.sort_by(|a, b| compare(a, b, key.id));
        if key.desc {
            entries.reverse();
        }
    }

    let commands = entries
        .into_iter()
        .skip(query.page_index.saturating_mul(PAGE_SIZE))
        .take(PAGE_SIZE)
        .collect();

    Some(ResourcePage {
        commands,
        page_count,
        resource_commands_count,
        resource_slow_commands,
        resource_time,
    })
}

fn compare(a: &CommandLogEntry, b: &CommandLogEntry, field: SortField) -> Ordering {
    match field {
        SortField::Command => a.command.cmp(&b.command),
        SortField::ExecutionTime => a.execution_time_ms.total_cmp(&b.execution_time_ms),
    }
}
