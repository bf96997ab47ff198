//! Orchestration graph
//!
//! Drives `AgentState` through the fixed set of steps:
//! generate SQL, execute, correct and retry on failure, analyze, decide on a
//! chart and optionally build it. Guardrails can be put in front of the whole
//! thing. Every traversal is bounded by a node-step budget.

use crate::agents;
use crate::config::AppConfig;
use crate::db::QueryExecutor;
use crate::error::{AssistantError, Result};
use crate::llm::{ChatModel, LlmClient};
use crate::state::AgentState;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub const DEFAULT_RECURSION_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Guardrails,
    GenerateSql,
    ExecuteSql,
    CorrectSql,
    Analyze,
    DecideGraph,
    Visualize,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Guardrails => "guardrails",
            Node::GenerateSql => "generate_sql",
            Node::ExecuteSql => "execute_sql",
            Node::CorrectSql => "correct_sql",
            Node::Analyze => "analyze",
            Node::DecideGraph => "decide_graph",
            Node::Visualize => "visualize",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRoute {
    Success,
    Retry,
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRoute {
    Visualize,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRoute {
    InScope,
    OutOfScope,
}

/// Route after execution.
pub fn should_retry(state: &AgentState, max_iterations: u32) -> RetryRoute {
    if !state.has_error() {
        RetryRoute::Success
    } else if state.iteration < max_iterations {
        RetryRoute::Retry
    } else {
        RetryRoute::GiveUp
    }
}

pub fn should_generate_graph(state: &AgentState) -> GraphRoute {
    if state.needs_graph {
        GraphRoute::Visualize
    } else {
        GraphRoute::Skip
    }
}

pub fn check_scope(state: &AgentState) -> ScopeRoute {
    if state.is_in_scope {
        ScopeRoute::InScope
    } else {
        ScopeRoute::OutOfScope
    }
}

/// Progress events emitted while a question is being answered.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    NodeStart { node: Node },
    NodeEnd { node: Node, state: AgentState },
    Error { message: String },
    Final { state: AgentState },
}

pub struct Workflow {
    model: Arc<dyn ChatModel>,
    executor: Arc<QueryExecutor>,
    max_iterations: u32,
    recursion_limit: usize,
    guardrails_enabled: bool,
}

impl Workflow {
    pub fn new(model: Arc<dyn ChatModel>, executor: Arc<QueryExecutor>) -> Self {
        Self {
            model,
            executor,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            guardrails_enabled: false,
        }
    }

    /// Build the LLM client and open the database described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let model = LlmClient::new(config.llm.clone())?;
        let executor = QueryExecutor::open(&config.db_path, config.max_result_rows)?;
        info!(
            "Workflow ready: model={} db={} guardrails={}",
            config.llm.model,
            config.db_path.display(),
            config.guardrails_enabled
        );
        Ok(Self::new(Arc::new(model), Arc::new(executor))
            .with_max_iterations(config.max_iterations)
            .with_recursion_limit(config.recursion_limit)
            .with_guardrails(config.guardrails_enabled))
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }

    pub fn with_guardrails(mut self, enabled: bool) -> Self {
        self.guardrails_enabled = enabled;
        self
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn entry(&self) -> Node {
        if self.guardrails_enabled {
            Node::Guardrails
        } else {
            Node::GenerateSql
        }
    }

    /// Answer `question`, returning the final state.
    pub async fn run(&self, question: &str) -> Result<AgentState> {
        self.drive(question, |_| {}).await
    }

    /// Answer `question` in the background, yielding progress events.
    ///
    /// The stream always ends with exactly one `Final` or `Error` event.
    pub fn stream(self: Arc<Self>, question: impl Into<String>) -> UnboundedReceiver<WorkflowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let question = question.into();

        tokio::spawn(async move {
            let events = tx.clone();
            let outcome = self
                .drive(&question, move |event| {
                    let _ = events.send(event);
                })
                .await;
            let last = match outcome {
                Ok(state) => WorkflowEvent::Final { state },
                Err(e) => WorkflowEvent::Error { message: e.to_string() },
            };
            if tx.send(last).is_err() {
                debug!("Event receiver dropped before the run finished");
            }
        });

        rx
    }

    async fn drive<F>(&self, question: &str, mut emit: F) -> Result<AgentState>
    where
        F: FnMut(WorkflowEvent) + Send,
    {
        info!("Question: {}", question);
        let mut state = AgentState::new(question);
        let mut current = Some(self.entry());
        let mut steps = 0usize;

        while let Some(node) = current {
            steps += 1;
            if steps > self.recursion_limit {
                error!("Recursion limit {} reached at {}", self.recursion_limit, node);
                return Err(AssistantError::Workflow(format!(
                    "Recursion limit of {} reached without hitting a stop condition",
                    self.recursion_limit
                )));
            }

            emit(WorkflowEvent::NodeStart { node });
            self.run_node(node, &mut state).await?;
            emit(WorkflowEvent::NodeEnd {
                node,
                state: state.clone(),
            });

            current = self.next(node, &state);
            debug!("{} -> {:?}", node, current);
        }

        if state.has_error() && state.final_answer.trim().is_empty() {
            warn!("Giving up after {} correction attempts", state.iteration);
            state.final_answer = format!(
                "I could not produce a working SQL query after {} correction attempts. Last error: {}",
                state.iteration, state.error
            );
        }
        Ok(state)
    }

    async fn run_node(&self, node: Node, state: &mut AgentState) -> Result<()> {
        info!("Running {}", node);
        match node {
            Node::Guardrails => agents::check_guardrails(self.model(), state).await,
            Node::GenerateSql => agents::generate_sql(self.model(), state).await,
            Node::ExecuteSql => agents::execute_query(&self.executor, state),
            Node::CorrectSql => agents::correct_sql(self.model(), state).await,
            Node::Analyze => agents::analyze_results(self.model(), state).await,
            Node::DecideGraph => agents::decide_graph_need(self.model(), state).await,
            Node::Visualize => agents::visualize(state),
        }
    }

    /// Successor of `node`, or `None` at END.
    pub fn next(&self, node: Node, state: &AgentState) -> Option<Node> {
        match node {
            Node::Guardrails => match check_scope(state) {
                ScopeRoute::InScope => Some(Node::GenerateSql),
                ScopeRoute::OutOfScope => None,
            },
            Node::GenerateSql => Some(Node::ExecuteSql),
            Node::ExecuteSql => match should_retry(state, self.max_iterations) {
                RetryRoute::Success => Some(Node::Analyze),
                RetryRoute::Retry => Some(Node::CorrectSql),
                RetryRoute::GiveUp => None,
            },
            Node::CorrectSql => Some(Node::ExecuteSql),
            Node::Analyze => Some(Node::DecideGraph),
            Node::DecideGraph => match should_generate_graph(state) {
                GraphRoute::Visualize => Some(Node::Visualize),
                GraphRoute::Skip => None,
            },
            Node::Visualize => None,
        }
    }

    /// Mermaid flowchart of the active topology.
    pub fn mermaid(&self) -> String {
        topology_mermaid(self.guardrails_enabled)
    }
}

/// Mermaid flowchart of the graph, with or without the scope check in front.
pub fn topology_mermaid(guardrails_enabled: bool) -> String {
    let mut lines = vec![
        "flowchart TD".to_string(),
        "    __start__([START])".to_string(),
        "    __end__([END])".to_string(),
    ];
    let mut edge = |from: &str, label: Option<&str>, to: &str| {
        lines.push(match label {
            Some(label) => format!("    {} -- {} --> {}", from, label, to),
            None => format!("    {} --> {}", from, to),
        });
    };

    if guardrails_enabled {
        edge("__start__", None, Node::Guardrails.name());
        edge(Node::Guardrails.name(), Some("in_scope"), Node::GenerateSql.name());
        edge(Node::Guardrails.name(), Some("out_of_scope"), "__end__");
    } else {
        edge("__start__", None, Node::GenerateSql.name());
    }
    edge(Node::GenerateSql.name(), None, Node::ExecuteSql.name());
    edge(Node::ExecuteSql.name(), Some("success"), Node::Analyze.name());
    edge(Node::ExecuteSql.name(), Some("retry"), Node::CorrectSql.name());
    edge(Node::ExecuteSql.name(), Some("give_up"), "__end__");
    edge(Node::CorrectSql.name(), None, Node::ExecuteSql.name());
    edge(Node::Analyze.name(), None, Node::DecideGraph.name());
    edge(Node::DecideGraph.name(), Some("visualize"), Node::Visualize.name());
    edge(Node::DecideGraph.name(), Some("skip"), "__end__");
    edge(Node::Visualize.name(), None, "__end__");

    lines.join("\n")
}
