//! A team of per-node chains behind a supervisor
//!
//! Routing is a small graph: `Supervisor → Worker → End`. The supervisor runs
//! once, the chosen worker answers, and the graph halts. No output goes back to
//! the supervisor.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use super::supervisor::{RouteDecision, Supervisor, END};
use crate::chain::{ApiChain, ChainError, ChainOutput};
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("supervisor failed: {0}")]
    Supervisor(#[from] LlmError),

    #[error("worker {name} failed: {source}")]
    Worker {
        name: String,
        #[source]
        source: ChainError,
    },

    #[error("worker {0} is already registered")]
    DuplicateWorker(String),

    #[error("{0:?} is reserved and cannot name a worker")]
    ReservedName(String),

    #[error("Failed to start blocking runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// One entry of the routing work log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RouterMessage {
    Question {
        content: String,
    },
    Answer {
        worker: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Working data of one routing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterState {
    /// The question is always at index 0
    pub messages: Vec<RouterMessage>,
    pub team_members: Vec<String>,
    /// A member name or [`END`]; `None` before the supervisor has run
    pub next: Option<String>,
}

impl RouterState {
    pub fn new(question: &str) -> Self {
        Self {
            messages: vec![RouterMessage::Question {
                content: question.to_string(),
            }],
            team_members: Vec::new(),
            next: None,
        }
    }
}

/// How a routed question ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    Answered {
        worker: String,
        output: ChainOutput,
        state: RouterState,
    },
    /// The supervisor chose `end`; no worker was called
    NoRoute { state: RouterState },
}

impl RouteOutcome {
    pub fn state(&self) -> &RouterState {
        match self {
            RouteOutcome::Answered { state, .. } | RouteOutcome::NoRoute { state } => state,
        }
    }
}

enum Step {
    Supervisor,
    Worker(String),
    End,
}

/// Supervisor plus the chains it can dispatch to
pub struct Team {
    supervisor: Supervisor,
    workers: Vec<(String, Arc<ApiChain>)>,
}

impl Team {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            workers: Vec::new(),
        }
    }

    /// Register `chain` under `name`. Names are unique and may not be `end`.
    pub fn add_worker(&mut self, name: impl Into<String>, chain: Arc<ApiChain>) -> Result<(), RouterError> {
        let name = name.into();
        if name.eq_ignore_ascii_case(END) {
            return Err(RouterError::ReservedName(name));
        }
        if self.worker(&name).is_some() {
            return Err(RouterError::DuplicateWorker(name));
        }
        self.workers.push((name, chain));
        Ok(())
    }

    pub fn members(&self) -> Vec<String> {
        self.workers.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn worker(&self, name: &str) -> Option<&Arc<ApiChain>> {
        self.workers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, chain)| chain)
    }

    /// Route `question` to one worker and return its answer.
    pub async fn route_and_answer(&self, question: &str) -> Result<RouteOutcome, RouterError> {
        let mut state = RouterState::new(question);
        let mut answer: Option<(String, ChainOutput)> = None;
        let mut step = Step::Supervisor;

        loop {
            step = match step {
                Step::Supervisor => {
                    state.team_members = self.members();
                    let decision = self
                        .supervisor
                        .decide(question, &state.team_members)
                        .instrument(info_span!("supervisor"))
                        .await?;
                    info!(next = %decision.target(), "Supervisor decision");
                    state.next = Some(decision.target().to_string());
                    match decision {
                        RouteDecision::Worker(name) => Step::Worker(name),
                        RouteDecision::End => Step::End,
                    }
                }
                Step::Worker(name) => {
                    let Some(chain) = self.worker(&name).cloned() else {
                        state.next = Some(END.to_string());
                        break;
                    };
                    let output = chain
                        .invoke(question)
                        .await
                        .map_err(|source| RouterError::Worker { name: name.clone(), source })?;
                    state.messages.push(RouterMessage::Answer {
                        worker: name.clone(),
                        content: output.output.clone(),
                        error: output.error.clone(),
                    });
                    answer = Some((name, output));
                    Step::End
                }
                Step::End => break,
            };
        }

        Ok(match answer {
            Some((worker, output)) => RouteOutcome::Answered { worker, output, state },
            None => RouteOutcome::NoRoute { state },
        })
    }

    /// Blocking variant of [`route_and_answer`](Self::route_and_answer).
    /// Fails with [`RouterError::Runtime`] when called inside an async runtime.
    pub fn route_and_answer_blocking(&self, question: &str) -> Result<RouteOutcome, RouterError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(RouterError::Runtime(std::io::Error::new(
                std::io::ErrorKind::Other,
                "route_and_answer_blocking called from inside an async runtime",
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.route_and_answer(question))
    }
}
