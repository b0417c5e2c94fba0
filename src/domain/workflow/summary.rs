//! Compact rendering of conditional step rules for listings

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::step_types::{Condition, ConditionalAction};

/// Maximum characters of a condition's field shown in a summary
pub const FIELD_WIDTH: usize = 25;

/// Maximum characters of a condition's value shown in a summary
pub const VALUE_WIDTH: usize = 10;

/// Maximum characters of an end_workflow message shown in a badge
pub const MESSAGE_WIDTH: usize = 12;

/// Maximum characters of an unrecognized action shown in a badge
pub const RAW_ACTION_WIDTH: usize = 15;

/// Conditions shown before collapsing the rest into "+N more"
pub const MAX_LINES: usize = 3;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    Green,
    Blue,
    Red,
    Yellow,
    Gray,
}

impl BadgeColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Gray => "gray",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionBadge {
    pub label: String,
    pub color: BadgeColor,
}

impl ActionBadge {
    fn new(label: impl Into<String>, color: BadgeColor) -> Self {
        Self {
            label: label.into(),
            color,
        }
    }
}

impl fmt::Display for ActionBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionLine {
    pub field: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub badge: ActionBadge,
}

impl fmt::Display for ConditionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.operator)?;

        if let Some(value) = &self.value {
            write!(f, " {}", value)?;
        }

        write!(f, " {}", self.badge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSummary {
    pub lines: Vec<ConditionLine>,
    /// Conditions left out of `lines`
    pub hidden: usize,
}

impl fmt::Display for ConditionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }

        if self.hidden > 0 {
            writeln!(f, "+{} more", self.hidden)?;
        }

        Ok(())
    }
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let mut cut: String = text.chars().take(max).collect();
    cut.push_str(ELLIPSIS);
    cut
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Badge shown for a conditional action
pub fn action_badge(action: &ConditionalAction) -> ActionBadge {
    match action {
        ConditionalAction::Continue => ActionBadge::new("continue", BadgeColor::Green),
        ConditionalAction::GoToStep(target) => {
            ActionBadge::new(format!("→ {}", target), BadgeColor::Blue)
        }
        ConditionalAction::EndWorkflow(output) => {
            let message = output
                .error
                .clone()
                .or_else(|| output.result.as_ref().map(value_text))
                .unwrap_or_else(|| "end".to_string());

            ActionBadge::new(
                format!("✗ {}", truncate(&message, MESSAGE_WIDTH)),
                BadgeColor::Red,
            )
        }
        ConditionalAction::SkipStep => ActionBadge::new("skip", BadgeColor::Yellow),
        ConditionalAction::Unrecognized(raw) => {
            ActionBadge::new(truncate(&raw.to_string(), RAW_ACTION_WIDTH), BadgeColor::Gray)
        }
    }
}

fn render_line(condition: &Condition) -> ConditionLine {
    let value = if condition.operator.takes_value() {
        condition
            .value
            .as_ref()
            .map(|v| truncate(&value_text(v), VALUE_WIDTH))
    } else {
        None
    };

    ConditionLine {
        field: truncate(&condition.field, FIELD_WIDTH),
        operator: condition.operator.to_string(),
        value,
        badge: action_badge(&condition.action),
    }
}

/// Summarize a conditional step's rules for a step listing
pub fn render_summary(conditions: &[Condition]) -> ConditionSummary {
    ConditionSummary {
        lines: conditions.iter().take(MAX_LINES).map(render_line).collect(),
        hidden: conditions.len().saturating_sub(MAX_LINES),
    }
}
