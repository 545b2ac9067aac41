//! Bounded prompt rendering of the task's execution history. The history
//! itself lives on [`crate::agent::state::Task`] and never leaves the
//! process; only the most recent slice is shown to the oracle.

use crate::agent::state::{StepOutcome, StepRecord};

/// Render the last `limit` step records as a prompt block. Empty string when
/// there is no history yet.
pub fn render_recent(steps: &[StepRecord], limit: usize) -> String {
    if steps.is_empty() || limit == 0 {
        return String::new();
    }

    let start = steps.len().saturating_sub(limit);
    let mut lines = vec!["\nPrevious actions:".to_string()];
    for (i, record) in steps[start..].iter().enumerate() {
        let desc = match &record.action {
            Some(action) => action.describe(),
            None => "decision could not be parsed".to_string(),
        };
        lines.push(format!("{}. {desc}", i + 1));
        match &record.outcome {
            StepOutcome::Ok { message } if !message.is_empty() => {
                lines.push(format!("   Result: {message}"));
            }
            StepOutcome::Failed { reason } => {
                lines.push(format!("   Error: {reason}"));
            }
            _ => {}
        }
    }
    lines.join("\n")
}
