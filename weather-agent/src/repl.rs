//! Text front end: the interactive session, the demo examples and one-shot
//! queries. Input and output are generic so sessions can be driven from tests.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{Agent, AgentEvent, RunCancelled, run_agent};

pub const EXAMPLE_QUERIES: &[&str] = &[
    "Hello! What can you help me with?",
    "What's the weather in London?",
    "What's the temperature in New York?",
    "Is it raining in Tokyo?",
    "Tell me about the weather in Paris",
];

const SESSION_APOLOGY: &str = "I apologize, but I encountered an error. Please try again.";
const GOODBYE: &str = "Goodbye! Have a great day!";

pub struct Repl {
    agent: Arc<dyn Agent>,
    verbose: bool,
}

impl Repl {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            verbose: false,
        }
    }

    /// Print tool calls and retries to stderr while answering.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Interactive session on `input`. Ctrl-C at the prompt ends the session;
    /// Ctrl-C while a query runs cancels only that query.
    pub async fn run_interactive<R, W>(&self, input: R, output: &mut W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (interrupt_tx, interrupts) = mpsc::unbounded_channel();
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupt_tx.send(()).is_err() {
                    break;
                }
            }
        });
        let result = self
            .run_interactive_with_interrupts(input, output, interrupts)
            .await;
        listener.abort();
        result
    }

    /// Interactive session where each message on `interrupts` acts as Ctrl-C.
    pub async fn run_interactive_with_interrupts<R, W>(
        &self,
        input: R,
        output: &mut W,
        mut interrupts: mpsc::UnboundedReceiver<()>,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Starting interactive weather agent session");
        write_line(output, "=== Weather Agent Interactive Session ===").await?;
        write_line(
            output,
            "I'm your weather assistant! Ask me about weather, temperature, or rain in any location.",
        )
        .await?;
        write_line(output, "Type 'help' for available commands, or 'quit' to exit.\n").await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"You: ").await?;
            output.flush().await?;
            let next = tokio::select! {
                line = lines.next_line() => line?,
                Some(()) = interrupts.recv() => {
                    info!("Interrupted at prompt, ending session");
                    write_line(output, "").await?;
                    write_line(output, &format!("Weather Agent: {GOODBYE}")).await?;
                    break;
                }
            };
            let Some(line) = next else {
                write_line(output, "").await?;
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                write_line(output, &format!("Weather Agent: {GOODBYE}")).await?;
                break;
            }
            if line.eq_ignore_ascii_case("help") {
                let help = self.agent.available_tools();
                write_line(output, &format!("Weather Agent: {help}")).await?;
                continue;
            }

            let cancel_token = CancellationToken::new();
            let answer = self.answer(line, cancel_token.clone());
            tokio::pin!(answer);
            let result = loop {
                tokio::select! {
                    result = &mut answer => break result,
                    Some(()) = interrupts.recv() => cancel_token.cancel(),
                }
            };

            match result {
                Ok(response) => write_line(output, &format!("Weather Agent: {response}")).await?,
                Err(err) if err.is::<RunCancelled>() => {
                    warn!("Query cancelled: {line}");
                    write_line(output, "Weather Agent: Cancelled.").await?;
                }
                Err(err) => {
                    error!("Error processing query: {err:#}");
                    write_line(output, &format!("Weather Agent: {SESSION_APOLOGY}")).await?;
                }
            }
            write_line(output, "").await?;
        }
        Ok(())
    }

    pub async fn run_examples<W>(&self, output: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_line(output, "=== Weather Agent Demo Examples ===\n").await?;
        for query in EXAMPLE_QUERIES {
            write_line(output, &format!("Example Query: {query}")).await?;
            let response = self.answer(query, CancellationToken::new()).await?;
            write_line(output, &format!("Agent Response: {response}")).await?;
            write_line(output, "").await?;
        }
        Ok(())
    }

    pub async fn run_single<W>(&self, query: &str, output: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let response = self.answer(query, CancellationToken::new()).await?;
        write_line(output, &response).await
    }

    /// Answer one query; cancelling `cancel_token` abandons it.
    pub async fn answer(&self, query: &str, cancel_token: CancellationToken) -> anyhow::Result<String> {
        let verbose = self.verbose;
        run_agent(
            self.agent.as_ref(),
            query,
            move |event| {
                if verbose {
                    print_event(&event);
                }
            },
            cancel_token,
        )
        .await
    }
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::ToolCall { name, .. } => eprintln!("  -> calling {name}"),
        AgentEvent::ToolResult {
            name,
            brief,
            is_error,
            ..
        } => {
            let status = if *is_error { "failed" } else { "done" };
            eprintln!("  <- {name} {status}: {brief}");
        }
        AgentEvent::Retry { attempt, delay } => {
            eprintln!("  retrying ({attempt}) in {:.1}s", delay.as_secs_f64());
        }
        AgentEvent::StepBegin { .. } | AgentEvent::Text(_) => {}
    }
}

async fn write_line<W>(output: &mut W, line: &str) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
