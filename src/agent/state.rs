use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decision from the oracle. Closed tagged union over the wire protocol;
/// anything that does not map onto a variant is an `OracleParse` error, never
/// coerced. An optional free-text `thought` accompanies the decision and is
/// logged, not acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Goto {
        url: String,
    },
    Click {
        element: u32,
    },
    Type {
        element: u32,
        text: String,
    },
    Press {
        key: String,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u32>,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
    },
    Done {
        result: String,
    },
    Ask {
        question: String,
    },
}

impl Action {
    /// Step-scoped element id this action refers to, if any.
    pub fn element_ref(&self) -> Option<u32> {
        match self {
            Action::Click { element } | Action::Type { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// Short human-readable description for logs and history.
    pub fn describe(&self) -> String {
        match self {
            Action::Goto { url } => format!("goto {url}"),
            Action::Click { element } => format!("click [{element}]"),
            Action::Type { element, text } => format!("type '{text}' into [{element}]"),
            Action::Press { key } => format!("press {key}"),
            Action::Scroll { direction, .. } => format!("scroll {direction}"),
            Action::Wait { .. } => "wait".into(),
            Action::Done { result } => format!("done: {result}"),
            Action::Ask { question } => format!("ask: {question}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok { message: String },
    Failed { reason: String },
}

impl StepOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        StepOutcome::Ok {
            message: message.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        StepOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok { .. })
    }
}

/// One entry of the task's append-only execution history.
///
/// `action` is `None` exactly when a DECIDE attempt failed before producing
/// an action (oracle parse or transport failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_index: u32,
    pub action: Option<Action>,
    pub outcome: StepOutcome,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(step_index: u32, action: Option<Action>, outcome: StepOutcome) -> Self {
        Self {
            step_index,
            action,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Done { summary: String },
    /// Resumable terminal: the caller must answer before the loop continues.
    AskedUser { question: String },
    Failed { reason: String },
    MaxStepsExceeded,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Per-invocation task state, discarded at process exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub status: TaskStatus,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
}

impl Task {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            status: TaskStatus::Running,
            steps: Vec::new(),
            started_at: Utc::now(),
        }
    }
}
