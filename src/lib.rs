pub mod agent;
pub mod browser;
pub mod config;
pub mod errors;
pub mod oracle;
pub mod perception;

pub use agent::{AgentLoop, StopHandle, TaskStatus};
pub use browser::BrowserSession;
pub use config::{load_config, AgentConfig};
pub use errors::{DispatchError, WebClawError, WebClawResult};
pub use oracle::openai::OpenAiOracle;
pub use oracle::DecisionOracle;

/// Process-wide tracing setup: `RUST_LOG` wins, `info` otherwise. Also loads
/// a `.env` file when one is present.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenvy::dotenv();
}
