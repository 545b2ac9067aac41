//! The perceive→decide→act→evaluate step state machine.
//!
//! One task, one browser session, one step in flight at a time. Every exit
//! path ends in a named terminal status and releases the session, except the
//! resumable `AskedUser` terminal which keeps it open for `resume`.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::agent::history;
use crate::agent::loop_control::LoopController;
use crate::agent::state::{Action, StepOutcome, StepRecord, Task, TaskStatus};
use crate::browser::BrowserSession;
use crate::config::AgentConfig;
use crate::errors::{DispatchError, WebClawError, WebClawResult};
use crate::oracle::{DecisionOracle, DecisionRequest};
use crate::perception::locator::ElementLocator;
use crate::perception::marker;
use crate::perception::types::{Element, Observation};

/// Non-terminal machine states. Terminals live on `Task.status`.
#[derive(Debug, Clone)]
enum Phase {
    Init,
    Perceive,
    Decide { retried: bool },
    Act { action: Action },
    Evaluate { action: Action, outcome: StepOutcome },
}

/// External stop signal. Observed at the top of each state transition; never
/// interrupts an in-flight oracle or dispatch call.
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct AgentLoop<S: BrowserSession> {
    session: S,
    oracle: Box<dyn DecisionOracle>,
    config: AgentConfig,
    locator: ElementLocator,
    task: Task,
    loop_ctrl: LoopController,
    phase: Phase,
    /// Arena of the current step; ids in decisions resolve against this.
    observation: Option<Observation>,
    stop_rx: watch::Receiver<bool>,
    step_tx: Option<mpsc::UnboundedSender<StepRecord>>,
    session_closed: bool,
}

impl<S: BrowserSession> AgentLoop<S> {
    pub fn new(
        goal: impl Into<String>,
        config: AgentConfig,
        session: S,
        oracle: Box<dyn DecisionOracle>,
    ) -> (Self, StopHandle) {
        let (tx, stop_rx) = watch::channel(false);
        let locator = ElementLocator::new(config.viewport);
        let loop_ctrl = LoopController::new(config.max_steps, config.max_consecutive_failures);
        let agent = Self {
            session,
            oracle,
            config,
            locator,
            task: Task::new(goal),
            loop_ctrl,
            phase: Phase::Init,
            observation: None,
            stop_rx,
            step_tx: None,
            session_closed: false,
        };
        (agent, StopHandle { tx })
    }

    /// Subscribe to StepRecords as they are appended. Call before `run`.
    pub fn step_stream(&mut self) -> mpsc::UnboundedReceiver<StepRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.step_tx = Some(tx);
        rx
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn status(&self) -> &TaskStatus {
        &self.task.status
    }

    /// Drive the task until a terminal status. Calling again after a
    /// non-resumable terminal is a caller error.
    pub async fn run(&mut self) -> WebClawResult<TaskStatus> {
        if self.task.status.is_terminal() {
            return Err(WebClawError::Config(
                "task already terminated; resume() is the only way to continue after ask".into(),
            ));
        }
        tracing::info!(task = %self.task.id, goal = %self.task.goal, "task started");
        Ok(self.drive().await)
    }

    /// Continue a task that asked the user a question. The answer is appended
    /// to history and the loop re-enters DECIDE against the retained
    /// observation. Any other status is a caller error.
    pub async fn resume(&mut self, answer: impl Into<String>) -> WebClawResult<TaskStatus> {
        let TaskStatus::AskedUser { question } = self.task.status.clone() else {
            return Err(WebClawError::Config(
                "resume() is only valid while the task is awaiting an answer".into(),
            ));
        };
        let answer = answer.into();
        tracing::info!(question = %question, answer = %answer, "resuming with user answer");
        self.push_record(
            Some(Action::Ask { question }),
            StepOutcome::ok(format!("user answered: {answer}")),
        );
        if self.loop_ctrl.budget_exhausted() {
            self.task.status = TaskStatus::MaxStepsExceeded;
            self.release_session().await;
            return Ok(self.task.status.clone());
        }
        self.task.status = TaskStatus::Running;
        self.phase = Phase::Decide { retried: false };
        Ok(self.drive().await)
    }

    async fn drive(&mut self) -> TaskStatus {
        loop {
            if *self.stop_rx.borrow() && !self.task.status.is_terminal() {
                tracing::info!("stop signal observed, cancelling task");
                self.task.status = TaskStatus::Failed {
                    reason: WebClawError::Cancelled("external stop signal".into()).to_string(),
                };
            }

            if self.task.status.is_terminal() {
                if !matches!(self.task.status, TaskStatus::AskedUser { .. }) {
                    self.release_session().await;
                }
                tracing::info!(
                    task = %self.task.id,
                    status = ?self.task.status,
                    steps = self.loop_ctrl.steps_taken(),
                    elapsed_ms = self.loop_ctrl.elapsed().as_millis() as u64,
                    "task ended"
                );
                return self.task.status.clone();
            }

            match self.phase.clone() {
                Phase::Init => {
                    self.phase = Phase::Perceive;
                }

                Phase::Perceive => match self.perceive().await {
                    Ok(obs) => {
                        tracing::debug!(
                            elements = obs.elements.len(),
                            url = %obs.url,
                            "observation built"
                        );
                        self.observation = Some(obs);
                        self.phase = Phase::Decide { retried: false };
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "perception failed");
                        self.task.status = TaskStatus::Failed {
                            reason: e.to_string(),
                        };
                    }
                },

                Phase::Decide { retried } => {
                    let Some(obs) = self.observation.as_ref() else {
                        self.task.status = TaskStatus::Failed {
                            reason: "no observation available for decision".into(),
                        };
                        continue;
                    };
                    let request = DecisionRequest {
                        goal: &self.task.goal,
                        observation: obs,
                        history_text: history::render_recent(
                            &self.task.steps,
                            self.config.history_limit,
                        ),
                    };
                    let call_timeout = Duration::from_millis(self.config.call_timeout_ms);
                    let decision = match tokio::time::timeout(
                        call_timeout,
                        self.oracle.decide(request),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(WebClawError::Oracle(format!(
                            "decision timed out after {}ms",
                            self.config.call_timeout_ms
                        ))),
                    };

                    match decision {
                        Ok(action) => {
                            tracing::info!(action = %action.describe(), retried, "decision received");
                            self.phase = Phase::Act { action };
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            tracing::warn!(error = %reason, retried, "decision failed");
                            self.push_record(None, StepOutcome::failed(reason.clone()));
                            if retried {
                                self.task.status = TaskStatus::Failed { reason };
                            } else if self.loop_ctrl.budget_exhausted() {
                                self.task.status = TaskStatus::MaxStepsExceeded;
                            } else {
                                // One retry with the identical observation
                                self.phase = Phase::Decide { retried: true };
                            }
                        }
                    }
                }

                Phase::Act { action } => match action {
                    Action::Done { result } => {
                        self.push_record(
                            Some(Action::Done {
                                result: result.clone(),
                            }),
                            StepOutcome::ok(format!("Done: {result}")),
                        );
                        self.task.status = TaskStatus::Done { summary: result };
                    }

                    Action::Ask { question } => {
                        tracing::info!(question = %question, "oracle asked the user");
                        self.task.status = TaskStatus::AskedUser { question };
                    }

                    action => {
                        let target: Option<Element> = action.element_ref().and_then(|id| {
                            self.observation.as_ref().and_then(|o| o.element(id)).cloned()
                        });

                        if let Some(id) = action.element_ref() {
                            if target.is_none() {
                                // Never dispatched: invalidated ids force a
                                // fresh scan instead of a blind retry.
                                let reason =
                                    WebClawError::StaleReference { element_id: id }.to_string();
                                tracing::warn!(element = id, "stale element reference");
                                self.phase = Phase::Evaluate {
                                    action,
                                    outcome: StepOutcome::failed(reason),
                                };
                                continue;
                            }
                        }

                        match self.dispatch_action(&action, target).await {
                            Ok(message) => {
                                tracing::info!(action = %action.describe(), %message, "action ok");
                                self.phase = Phase::Evaluate {
                                    action,
                                    outcome: StepOutcome::ok(message),
                                };
                            }
                            Err(e) if e.is_fatal() => {
                                let reason = e.to_string();
                                tracing::error!(error = %reason, "fatal dispatch failure");
                                self.push_record(Some(action), StepOutcome::failed(reason.clone()));
                                self.task.status = TaskStatus::Failed { reason };
                            }
                            Err(e) => {
                                tracing::warn!(action = %action.describe(), error = %e, "action failed");
                                self.phase = Phase::Evaluate {
                                    action,
                                    outcome: StepOutcome::failed(e.to_string()),
                                };
                            }
                        }
                    }
                },

                Phase::Evaluate { action, outcome } => {
                    self.push_record(Some(action), outcome);
                    if self.loop_ctrl.budget_exhausted() {
                        tracing::warn!(steps = self.loop_ctrl.steps_taken(), "step budget exhausted");
                        self.task.status = TaskStatus::MaxStepsExceeded;
                    } else if self.loop_ctrl.failure_limit_hit() {
                        self.task.status = TaskStatus::Failed {
                            reason: "too many consecutive failures".into(),
                        };
                    } else {
                        self.phase = Phase::Perceive;
                    }
                }
            }

            tokio::task::yield_now().await;
        }
    }

    /// Scan (with bounded retries and linear backoff), screenshot, annotate.
    /// Ids restart at 1 on every call.
    async fn perceive(&mut self) -> WebClawResult<Observation> {
        let mut attempt: u32 = 0;
        let elements = loop {
            match self.locator.scan(&mut self.session).await {
                Ok(elements) => break elements,
                Err(e @ WebClawError::Scan(_)) => {
                    attempt += 1;
                    if attempt >= self.config.scan_retries {
                        return Err(e);
                    }
                    let backoff =
                        Duration::from_millis(self.config.scan_backoff_ms * attempt as u64);
                    tracing::warn!(attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "scan failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        let screenshot = self.session.screenshot().await?;
        let annotated = marker::annotate(&screenshot, &elements)?;
        Ok(Observation {
            screenshot_png: annotated,
            elements,
            url: self.session.current_url(),
        })
    }

    /// Dispatch one non-terminal action under the per-call timeout. The
    /// target element was already resolved against the current observation.
    async fn dispatch_action(
        &mut self,
        action: &Action,
        target: Option<Element>,
    ) -> Result<String, DispatchError> {
        let scroll_amount = self.config.scroll_amount;
        let call_timeout_ms = self.config.call_timeout_ms;

        let fut = async {
            match action {
                Action::Goto { url } => {
                    let url = normalize_url(url);
                    self.session.goto(&url).await
                }
                Action::Click { element } => {
                    let el = target
                        .as_ref()
                        .ok_or(DispatchError::ElementNotFound(*element))?;
                    self.session.click(el).await
                }
                Action::Type { element, text } => {
                    let el = target
                        .as_ref()
                        .ok_or(DispatchError::ElementNotFound(*element))?;
                    self.session.type_text(el, text).await
                }
                Action::Press { key } => self.session.press(key).await,
                Action::Scroll { direction, amount } => {
                    self.session
                        .scroll(*direction, amount.unwrap_or(scroll_amount))
                        .await
                }
                Action::Wait { ms } => self.session.wait(ms.unwrap_or(1000)).await,
                Action::Done { .. } | Action::Ask { .. } => Err(DispatchError::Generic(
                    "terminal action is not dispatchable".into(),
                )),
            }
        };

        match tokio::time::timeout(Duration::from_millis(call_timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::NavigationTimeout(format!(
                "{} timed out after {call_timeout_ms}ms",
                action.describe()
            ))),
        }
    }

    fn push_record(&mut self, action: Option<Action>, outcome: StepOutcome) {
        let record = StepRecord::new(self.task.steps.len() as u32, action, outcome.clone());
        self.loop_ctrl.record(&outcome);
        if let Some(tx) = &self.step_tx {
            let _ = tx.send(record.clone());
        }
        self.task.steps.push(record);
    }

    async fn release_session(&mut self) {
        if !self.session_closed {
            self.session.close().await;
            self.session_closed = true;
            tracing::debug!(task = %self.task.id, "browser session released");
        }
    }
}

/// `goto` targets without a scheme get https (the oracle often omits it).
fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::agent::state::ScrollDirection;
    use crate::browser::RawNode;
    use crate::perception::types::Rect;

    #[derive(Default)]
    struct SessionLog {
        dispatched: Vec<String>,
        scans: u32,
        closed: u32,
    }

    struct ScriptedSession {
        current: Vec<RawNode>,
        after_goto: Option<Vec<RawNode>>,
        scan_failures: u32,
        fail_press: bool,
        crash_on_click: bool,
        url: String,
        log: Arc<Mutex<SessionLog>>,
    }

    impl ScriptedSession {
        fn new(nodes: Vec<RawNode>) -> (Self, Arc<Mutex<SessionLog>>) {
            let log = Arc::new(Mutex::new(SessionLog::default()));
            (
                Self {
                    current: nodes,
                    after_goto: None,
                    scan_failures: 0,
                    fail_press: false,
                    crash_on_click: false,
                    url: "about:blank".into(),
                    log: log.clone(),
                },
                log,
            )
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn collect_nodes(&mut self) -> WebClawResult<Vec<RawNode>> {
            self.log.lock().unwrap().scans += 1;
            if self.scan_failures > 0 {
                self.scan_failures -= 1;
                return Err(WebClawError::Scan("page is mid-navigation".into()));
            }
            Ok(self.current.clone())
        }

        async fn screenshot(&mut self) -> WebClawResult<Vec<u8>> {
            Ok(blank_png(64, 48))
        }

        fn current_url(&self) -> String {
            self.url.clone()
        }

        async fn goto(&mut self, url: &str) -> Result<String, DispatchError> {
            self.log.lock().unwrap().dispatched.push(format!("goto {url}"));
            self.url = url.to_string();
            if let Some(next) = self.after_goto.take() {
                self.current = next;
            }
            Ok(format!("Navigated to {url}"))
        }

        async fn click(&mut self, target: &Element) -> Result<String, DispatchError> {
            self.log
                .lock()
                .unwrap()
                .dispatched
                .push(format!("click [{}] {}", target.id, target.label));
            if self.crash_on_click {
                return Err(DispatchError::PageCrashed("renderer gone".into()));
            }
            Ok(format!("Clicked element [{}]", target.id))
        }

        async fn type_text(
            &mut self,
            target: &Element,
            text: &str,
        ) -> Result<String, DispatchError> {
            self.log
                .lock()
                .unwrap()
                .dispatched
                .push(format!("type '{text}' into [{}]", target.id));
            Ok(format!("Typed '{text}'"))
        }

        async fn press(&mut self, key: &str) -> Result<String, DispatchError> {
            self.log.lock().unwrap().dispatched.push(format!("press {key}"));
            if self.fail_press {
                return Err(DispatchError::Generic("key rejected".into()));
            }
            Ok(format!("Pressed {key}"))
        }

        async fn scroll(
            &mut self,
            direction: ScrollDirection,
            amount: u32,
        ) -> Result<String, DispatchError> {
            self.log
                .lock()
                .unwrap()
                .dispatched
                .push(format!("scroll {direction} {amount}"));
            Ok(format!("Scrolled {direction}"))
        }

        async fn wait(&mut self, hint_ms: u64) -> Result<String, DispatchError> {
            self.log.lock().unwrap().dispatched.push(format!("wait {hint_ms}"));
            Ok("Waited".into())
        }

        async fn close(&mut self) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    struct ScriptedOracle {
        script: Mutex<VecDeque<WebClawResult<Action>>>,
        fallback: Option<Action>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<WebClawResult<Action>>) -> Box<Self> {
            Box::new(Self {
                script: Mutex::new(script.into()),
                fallback: None,
            })
        }

        fn endless(action: Action) -> Box<Self> {
            Box::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Some(action),
            })
        }
    }

    #[async_trait]
    impl DecisionOracle for ScriptedOracle {
        async fn decide(&self, _request: DecisionRequest<'_>) -> WebClawResult<Action> {
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            match &self.fallback {
                Some(action) => Ok(action.clone()),
                None => Err(WebClawError::Oracle("oracle script exhausted".into())),
            }
        }
    }

    fn blank_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn button(label: &str, y: f32, idx: u32) -> RawNode {
        RawNode {
            tag: "button".into(),
            role: None,
            input_type: None,
            clickable: false,
            label: label.into(),
            bounds: Rect::new(10.0, y, 100.0, 30.0),
            hidden: false,
            depth: 4,
            source_index: idx,
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            call_timeout_ms: 2_000,
            scan_backoff_ms: 1,
            ..AgentConfig::default()
        }
    }

    fn done() -> WebClawResult<Action> {
        Ok(Action::Done {
            result: "task complete".into(),
        })
    }

    #[tokio::test]
    async fn done_terminates_without_dispatch_and_closes_once() {
        let (session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![Ok(Action::Done {
            result: "price found: $42".into(),
        })]);
        let (mut agent, _stop) = AgentLoop::new("find the price", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert_eq!(
            status,
            TaskStatus::Done {
                summary: "price found: $42".into()
            }
        );
        let log = log.lock().unwrap();
        assert!(log.dispatched.is_empty());
        assert_eq!(log.closed, 1);
        assert_eq!(agent.task().steps.len(), 1);
        assert!(agent.task().steps[0].outcome.is_ok());
    }

    #[tokio::test]
    async fn stale_reference_never_reaches_the_session() {
        let (session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![Ok(Action::Click { element: 99 }), done()]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));

        let log = log.lock().unwrap();
        assert!(log.dispatched.iter().all(|c| !c.starts_with("click")));
        // Failed stale record, then a fresh scan before the next decision
        assert_eq!(agent.task().steps.len(), 2);
        let stale = &agent.task().steps[0];
        assert_eq!(stale.action, Some(Action::Click { element: 99 }));
        assert!(!stale.outcome.is_ok());
        assert!(log.scans >= 2);
    }

    #[tokio::test]
    async fn two_malformed_decisions_fail_the_task() {
        let (session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![
            Err(WebClawError::OracleParse("gibberish".into())),
            Err(WebClawError::OracleParse("gibberish again".into())),
        ]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        match status {
            TaskStatus::Failed { reason } => assert!(reason.contains("parse")),
            other => panic!("expected Failed, got {other:?}"),
        }
        // Exactly 2 DECIDE attempts recorded, neither carrying an action
        assert_eq!(agent.task().steps.len(), 2);
        assert!(agent.task().steps.iter().all(|s| s.action.is_none()));
        // Retry used the identical observation: only the initial scan ran
        assert_eq!(log.lock().unwrap().scans, 1);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn one_malformed_decision_is_retried_and_recovers() {
        let (session, _log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![
            Err(WebClawError::OracleParse("gibberish".into())),
            done(),
        ]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));
        assert_eq!(agent.task().steps.len(), 2);
        assert!(agent.task().steps[0].action.is_none());
    }

    #[tokio::test]
    async fn step_budget_is_a_hard_bound() {
        let (session, _log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::endless(Action::Scroll {
            direction: ScrollDirection::Down,
            amount: None,
        });
        let config = AgentConfig {
            max_steps: 3,
            ..test_config()
        };
        let (mut agent, _stop) = AgentLoop::new("goal", config, session, oracle);

        let status = agent.run().await.unwrap();
        assert_eq!(status, TaskStatus::MaxStepsExceeded);
        assert_eq!(agent.task().steps.len(), 3);
        assert!(agent.task().steps.iter().all(|s| s.outcome.is_ok()));
    }

    #[tokio::test]
    async fn goto_renumbers_elements_from_one() {
        let (mut session, log) =
            ScriptedSession::new(vec![button("old-a", 10.0, 0), button("old-b", 60.0, 1)]);
        session.after_goto = Some(vec![
            button("new-a", 10.0, 0),
            button("new-b", 60.0, 1),
            button("new-c", 110.0, 2),
        ]);
        let oracle = ScriptedOracle::new(vec![
            Ok(Action::Goto {
                url: "example.com".into(),
            }),
            Ok(Action::Click { element: 1 }),
            done(),
        ]);
        let (mut agent, _stop) = AgentLoop::new("go to example.com", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));

        let log = log.lock().unwrap();
        // Scheme added, and id 1 resolved against the *new* page's arena
        assert_eq!(log.dispatched[0], "goto https://example.com");
        assert_eq!(log.dispatched[1], "click [1] new-a");
        assert_eq!(agent.task().steps.len(), 3);
    }

    #[tokio::test]
    async fn scan_retries_recover_from_transient_failures() {
        let (mut session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        session.scan_failures = 2;
        let oracle = ScriptedOracle::new(vec![done()]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));
        assert_eq!(log.lock().unwrap().scans, 3);
    }

    #[tokio::test]
    async fn scan_retry_exhaustion_fails_the_task() {
        let (mut session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        session.scan_failures = 10;
        let oracle = ScriptedOracle::new(vec![done()]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        match status {
            TaskStatus::Failed { reason } => assert!(reason.contains("Scan")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(log.lock().unwrap().scans, 3);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn failed_dispatch_recovers_through_a_fresh_scan() {
        let (mut session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        session.fail_press = true;
        let oracle = ScriptedOracle::new(vec![
            Ok(Action::Press {
                key: "Enter".into(),
            }),
            done(),
        ]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));
        assert_eq!(agent.task().steps.len(), 2);
        assert!(!agent.task().steps[0].outcome.is_ok());
        assert!(log.lock().unwrap().scans >= 2);
    }

    #[tokio::test]
    async fn page_crash_is_fatal() {
        let (mut session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        session.crash_on_click = true;
        let oracle = ScriptedOracle::new(vec![Ok(Action::Click { element: 1 })]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        match status {
            TaskStatus::Failed { reason } => assert!(reason.contains("crashed")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn consecutive_failures_abort_the_task() {
        let (mut session, _log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        session.fail_press = true;
        let oracle = ScriptedOracle::endless(Action::Press {
            key: "Enter".into(),
        });
        let config = AgentConfig {
            max_consecutive_failures: 2,
            ..test_config()
        };
        let (mut agent, _stop) = AgentLoop::new("goal", config, session, oracle);

        let status = agent.run().await.unwrap();
        assert_eq!(
            status,
            TaskStatus::Failed {
                reason: "too many consecutive failures".into()
            }
        );
        assert_eq!(agent.task().steps.len(), 2);
    }

    #[tokio::test]
    async fn ask_suspends_and_resume_continues() {
        let (session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![
            Ok(Action::Ask {
                question: "which city?".into(),
            }),
            done(),
        ]);
        let (mut agent, _stop) = AgentLoop::new("weather", test_config(), session, oracle);

        let status = agent.run().await.unwrap();
        assert_eq!(
            status,
            TaskStatus::AskedUser {
                question: "which city?".into()
            }
        );
        // Session stays open while waiting for the answer
        assert_eq!(log.lock().unwrap().closed, 0);

        let status = agent.resume("Oslo").await.unwrap();
        assert!(matches!(status, TaskStatus::Done { .. }));
        assert_eq!(log.lock().unwrap().closed, 1);

        let ask = &agent.task().steps[0];
        assert_eq!(
            ask.action,
            Some(Action::Ask {
                question: "which city?".into()
            })
        );
        match &ask.outcome {
            StepOutcome::Ok { message } => assert!(message.contains("Oslo")),
            other => panic!("expected answered ask, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_outside_ask_is_a_caller_error() {
        let (session, _log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![done()]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);

        agent.run().await.unwrap();
        let err = agent.resume("whatever").await.unwrap_err();
        assert!(matches!(err, WebClawError::Config(_)));
    }

    #[tokio::test]
    async fn stop_signal_cancels_before_the_next_transition() {
        let (session, log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![done()]);
        let (mut agent, stop) = AgentLoop::new("goal", test_config(), session, oracle);

        stop.stop();
        let status = agent.run().await.unwrap();
        match status {
            TaskStatus::Failed { reason } => assert!(reason.contains("cancelled")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(agent.task().steps.is_empty());
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn step_stream_yields_records_incrementally() {
        let (session, _log) = ScriptedSession::new(vec![button("ok", 10.0, 0)]);
        let oracle = ScriptedOracle::new(vec![
            Ok(Action::Press {
                key: "Enter".into(),
            }),
            done(),
        ]);
        let (mut agent, _stop) = AgentLoop::new("goal", test_config(), session, oracle);
        let mut stream = agent.step_stream();

        agent.run().await.unwrap();
        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert_eq!(first.step_index, 0);
        assert_eq!(
            first.action,
            Some(Action::Press {
                key: "Enter".into()
            })
        );
        assert!(matches!(second.action, Some(Action::Done { .. })));
    }

    #[test]
    fn url_normalization_adds_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://a.b"), "http://a.b");
        assert_eq!(normalize_url("https://a.b"), "https://a.b");
    }
}
