//! Action folding: merging several actions into one parent action.
//!
//! Folding aggregates the selected actions into a parent whose priority is
//! the highest (numerically lowest) of the children and whose time estimate
//! is their sum. The children keep a back-reference to the parent.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Status values stored on action rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    InProgress,
    Completed,
    Folded,
}

/// The subset of an action row the fold computation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub title: String,
    /// 1 is the highest priority.
    pub priority: i32,
    /// Estimated minutes; missing estimates count as zero.
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub graph_connections: Vec<String>,
    pub status: ActionStatus,
}

/// Aggregates shown before a fold is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub total_estimated_minutes: u32,
    pub highest_priority: i32,
    pub connection_count: usize,
    pub action_count: usize,
}

/// Summary of a folded child kept in the parent's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalAction {
    pub id: String,
    pub title: String,
    pub priority: i32,
    pub estimated_time: Option<u32>,
}

/// Context blob stored on the parent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldContext {
    pub folding_type: String,
    pub original_actions: Vec<OriginalAction>,
    pub folded_at: DateTime<Utc>,
}

/// Row to insert for the parent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldedAction {
    pub title: String,
    pub description: Option<String>,
    pub status: ActionStatus,
    pub priority: i32,
    pub estimated_time: u32,
    pub folded_actions: Vec<String>,
    pub graph_connections: Vec<String>,
    pub context: FoldContext,
}

/// Update applied to every child once the parent exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildUpdate {
    pub status: ActionStatus,
    pub ids: Vec<String>,
}

/// Everything needed to persist a fold: insert `parent`, then set
/// `parent_action_id` on `children.ids` to the new parent's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldPlan {
    pub parent: FoldedAction,
    pub children: ChildUpdate,
    pub metrics: FoldMetrics,
}

/// Compute fold metrics. Returns `None` for an empty selection.
pub fn fold_metrics(actions: &[ActionRecord]) -> Option<FoldMetrics> {
    let highest_priority = actions.iter().map(|a| a.priority).min()?;
    let total_estimated_minutes = actions
        .iter()
        .map(|a| a.estimated_time.unwrap_or(0))
        .fold(0u32, u32::saturating_add);
    let connections: BTreeSet<&str> = actions
        .iter()
        .flat_map(|a| a.graph_connections.iter().map(String::as_str))
        .collect();

    Some(FoldMetrics {
        total_estimated_minutes,
        highest_priority,
        connection_count: connections.len(),
        action_count: actions.len(),
    })
}

/// Build the records for folding `actions` under a new parent.
pub fn plan_fold(
    title: &str,
    description: Option<&str>,
    actions: &[ActionRecord],
) -> Result<FoldPlan> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidInput("folded action needs a title".into()));
    }
    if actions.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "folding needs at least two actions, got {}",
            actions.len()
        )));
    }
    if let Some(already) = actions.iter().find(|a| a.status == ActionStatus::Folded) {
        return Err(Error::InvalidInput(format!(
            "action {} is already folded",
            already.id
        )));
    }

    let metrics = fold_metrics(actions)
        .ok_or_else(|| Error::Internal("metrics for non-empty selection".into()))?;
    let ids: Vec<String> = actions.iter().map(|a| a.id.clone()).collect();

    let parent = FoldedAction {
        title: title.to_string(),
        description: description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from),
        status: ActionStatus::Folded,
        priority: metrics.highest_priority,
        estimated_time: metrics.total_estimated_minutes,
        folded_actions: ids.clone(),
        graph_connections: Vec::new(),
        context: FoldContext {
            folding_type: "manual".to_string(),
            original_actions: actions
                .iter()
                .map(|a| OriginalAction {
                    id: a.id.clone(),
                    title: a.title.clone(),
                    priority: a.priority,
                    estimated_time: a.estimated_time,
                })
                .collect(),
            folded_at: Utc::now(),
        },
    };

    Ok(FoldPlan {
        parent,
        children: ChildUpdate {
            status: ActionStatus::Folded,
            ids,
        },
        metrics,
    })
}

/// Human label for a priority value.
pub fn priority_label(priority: i32) -> &'static str {
    if priority <= 2 {
        "High"
    } else if priority <= 3 {
        "Medium"
    } else {
        "Low"
    }
}

/// Format minutes as `"1h 5m"` or `"45m"`.
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}
