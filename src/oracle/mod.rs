pub mod openai;

use async_trait::async_trait;

use crate::agent::state::Action;
use crate::errors::WebClawResult;
use crate::perception::types::Observation;

/// Everything the oracle sees for one decision: the task goal, the annotated
/// screenshot with its element arena, and a bounded rendering of recent
/// steps. Built fresh by the engine every DECIDE.
pub struct DecisionRequest<'a> {
    pub goal: &'a str,
    pub observation: &'a Observation,
    /// Bounded history text, including any user answers to `ask` actions.
    pub history_text: String,
}

/// The external vision-capable decision service. Maps one request to exactly
/// one [`Action`]; unparseable output must surface as
/// `WebClawError::OracleParse`. No side effects, so it is safe to retry with an
/// identical request.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> WebClawResult<Action>;
}
