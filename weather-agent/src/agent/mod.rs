use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AgentMode;

pub mod context;
pub mod llm_agent;
pub mod message;
pub mod router;

pub use context::{Context, Session};
pub use llm_agent::LlmAgent;
pub use router::KeywordRouter;

#[derive(Debug, Error)]
#[error("LLM not set")]
pub struct LLMNotSet;

#[derive(Debug, Error)]
#[error("Max number of steps reached: {n_steps}")]
pub struct MaxStepsReached {
    pub n_steps: i64,
}

impl MaxStepsReached {
    pub fn new(n_steps: i64) -> Self {
        Self { n_steps }
    }
}

#[derive(Debug, Error)]
#[error("run cancelled")]
pub struct RunCancelled;

/// Progress reported while an agent answers a query.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    StepBegin {
        n: i64,
    },
    Text(String),
    ToolCall {
        id: String,
        name: String,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        brief: String,
        is_error: bool,
    },
    Retry {
        attempt: usize,
        delay: Duration,
    },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn mode(&self) -> AgentMode;
    /// Model behind the agent, if any.
    fn model_name(&self) -> Option<&str>;
    /// Help text listing what the agent can do.
    fn available_tools(&self) -> String;

    async fn respond(&self, query: &str, events: Option<&EventSender>) -> anyhow::Result<String>;
}

pub(crate) fn emit(events: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Answer `query` with `agent`, feeding events to `on_event` from a separate
/// task. Cancelling `cancel_token` abandons the query with [`RunCancelled`].
pub async fn run_agent<A, F>(
    agent: &A,
    query: &str,
    mut on_event: F,
    cancel_token: CancellationToken,
) -> anyhow::Result<String>
where
    A: Agent + ?Sized,
    F: FnMut(AgentEvent) + Send + 'static,
{
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let ui_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            on_event(event);
        }
    });

    debug!("Starting {} run", agent.name());
    let result = {
        let run = agent.respond(query, Some(&events_tx));
        tokio::pin!(run);
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Cancelling the run task");
                Err(anyhow::Error::new(RunCancelled))
            },
            result = &mut run => result,
        }
    };
    drop(events_tx);

    match tokio::time::timeout(Duration::from_millis(500), ui_task).await {
        Ok(_) => debug!("Event loop shut down"),
        Err(_) => warn!("Event loop timed out"),
    }

    result
}
