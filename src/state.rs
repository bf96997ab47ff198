//! Agent state passed between workflow steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result text stored when a query ran but returned no rows.
pub const NO_RESULTS: &str = "No Results Found";

/// Chart types the graph-need decision may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    Bar,
    Line,
    Pie,
    Scatter,
    None,
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphType::Bar => "bar",
            GraphType::Line => "line",
            GraphType::Pie => "pie",
            GraphType::Scatter => "scatter",
            GraphType::None => "none",
        }
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(GraphType::Bar),
            "line" => Ok(GraphType::Line),
            "pie" => Ok(GraphType::Pie),
            "scatter" => Ok(GraphType::Scatter),
            "none" | "" => Ok(GraphType::None),
            other => Err(format!("unknown graph type '{}'", other)),
        }
    }
}

/// Mutable state threaded through every node of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub question: String,
    pub sql_query: String,
    /// JSON rows, `NO_RESULTS`, or empty when the query failed.
    pub query_result: String,
    pub final_answer: String,
    /// Last SQL execution failure; empty on success.
    pub error: String,
    /// Number of error-correction attempts made so far.
    pub iteration: u32,
    pub needs_graph: bool,
    /// Empty until the graph-need decision runs with a usable result.
    pub graph_type: String,
    pub graph_json: String,
    pub is_in_scope: bool,
}

impl AgentState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql_query: String::new(),
            query_result: String::new(),
            final_answer: String::new(),
            error: String::new(),
            iteration: 0,
            needs_graph: false,
            graph_type: String::new(),
            graph_json: String::new(),
            is_in_scope: true,
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.trim().is_empty()
    }

    /// True when there are rows worth analysing or charting.
    pub fn has_rows(&self) -> bool {
        let result = self.query_result.trim();
        !result.is_empty() && result != NO_RESULTS
    }

    pub fn graph_type(&self) -> GraphType {
        self.graph_type.parse().unwrap_or(GraphType::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = AgentState::new("how many orders?");
        assert_eq!(state.iteration, 0);
        assert!(state.is_in_scope);
        assert!(!state.needs_graph);
        assert!(!state.has_error());
        assert!(!state.has_rows());
    }

    #[test]
    fn test_no_results_is_not_rows() {
        let mut state = AgentState::new("q");
        state.query_result = NO_RESULTS.to_string();
        assert!(!state.has_rows());
        state.query_result = "[{\"n\": 1}]".to_string();
        assert!(state.has_rows());
    }

    #[test]
    fn test_graph_type_parsing() {
        assert_eq!("Bar".parse::<GraphType>().unwrap(), GraphType::Bar);
        assert_eq!(" pie ".parse::<GraphType>().unwrap(), GraphType::Pie);
        assert_eq!("".parse::<GraphType>().unwrap(), GraphType::None);
        assert!("histogram".parse::<GraphType>().is_err());
    }

    #[test]
    fn test_graph_type_serde_is_lowercase() {
        let json = serde_json::to_string(&GraphType::Scatter).unwrap();
        assert_eq!(json, "\"scatter\"");
    }
}
