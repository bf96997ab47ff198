//! Text rendering for the chat front ends.

use crate::state::AgentState;
use crate::workflow::{Node, WorkflowEvent};
use itertools::Itertools;

/// Results longer than this are cut for progress display.
pub const RESULT_PREVIEW_CHARS: usize = 500;

pub const WELCOME_MESSAGE: &str = "👋 Welcome to the Text2SQL E-commerce Assistant!\n\n\
I can help you query the e-commerce database using natural language. Just ask me questions about:\n\
- Orders and their status\n\
- Customers and their locations\n\
- Products and categories\n\
- Payments and transactions\n\
- Reviews and ratings\n\
- Sellers and their information\n\n\
Example questions:\n\
- How many orders were delivered?\n\
- What are the top 5 product categories by sales?\n\
- Show me orders from São Paulo\n\
- What's the average review score?\n\
- Which sellers have the most orders?\n\n\
Go ahead and ask me anything! 🚀";

pub const GOODBYE_MESSAGE: &str = "Thanks for using the Text2SQL Assistant! 👋";

pub fn display_name(node: Node) -> &'static str {
    match node {
        Node::Guardrails => "🛡️ Check Scope",
        Node::GenerateSql => "📝 Generate SQL Query",
        Node::ExecuteSql => "⚙️ Execute SQL Query",
        Node::CorrectSql => "🔧 Handle Error",
        Node::Analyze => "💬 Generate Answer",
        Node::DecideGraph => "📊 Decide Graph Need",
        Node::Visualize => "📈 Generate Graph",
    }
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}\n... (truncated)", head)
}

/// What a finished node contributed, for the progress view.
pub fn node_output(node: Node, state: &AgentState) -> String {
    match node {
        Node::Guardrails => {
            if state.is_in_scope {
                "✅ Question is in scope".to_string()
            } else {
                format!("ℹ️ {}", state.final_answer)
            }
        }
        Node::GenerateSql => format!("Generated SQL Query:\n```sql\n{}\n```", state.sql_query),
        Node::ExecuteSql => {
            if state.has_error() {
                format!("❌ Error:\n```\n{}\n```", state.error)
            } else {
                format!(
                    "Query Results:\n```json\n{}\n```",
                    truncate(&state.query_result, RESULT_PREVIEW_CHARS)
                )
            }
        }
        Node::CorrectSql => format!(
            "Corrected SQL (Attempt {}):\n```sql\n{}\n```",
            state.iteration, state.sql_query
        ),
        Node::Analyze => format!("Answer:\n{}", state.final_answer),
        Node::DecideGraph => {
            if state.needs_graph {
                format!("✅ Graph Needed: {} chart", state.graph_type.to_uppercase())
            } else {
                "ℹ️ No graph needed for this query".to_string()
            }
        }
        Node::Visualize => {
            if state.graph_json.is_empty() {
                "⚠️ Graph generation skipped".to_string()
            } else {
                "✅ Graph generated successfully".to_string()
            }
        }
    }
}

/// One progress line (or block) per event.
pub fn event_text(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::NodeStart { node } => format!("▶ {}", display_name(*node)),
        WorkflowEvent::NodeEnd { node, state } => node_output(*node, state)
            .lines()
            .map(|line| format!("  {}", line))
            .join("\n"),
        WorkflowEvent::Error { message } => format!("❌ Error: {}", message),
        WorkflowEvent::Final { .. } => "✅ Workflow completed successfully".to_string(),
    }
}

/// The answer shown to the user once the run is over.
///
/// Greetings and declined questions have no SQL, so only the answer is shown.
pub fn final_response(state: &AgentState) -> String {
    let mut response = if state.sql_query.trim().is_empty() {
        state.final_answer.clone()
    } else {
        format!(
            "Generated SQL Query:\n```sql\n{}\n```\n\nAnswer:\n{}",
            state.sql_query, state.final_answer
        )
    };

    if state.has_error() {
        response.push_str(&format!("\n\n⚠️ Note: {}", state.error));
    }
    if state.needs_graph && !state.graph_json.is_empty() {
        let mut kind = state.graph_type.clone();
        if let Some(first) = kind.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        response.push_str(&format!("\n\n📊 Interactive Visualization ({} Chart)", kind));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        let text = "é".repeat(600);
        let cut = truncate(&text, RESULT_PREVIEW_CHARS);
        assert!(cut.ends_with("... (truncated)"));
        assert_eq!(cut.chars().filter(|c| *c == 'é').count(), 500);
        assert_eq!(truncate("short", 500), "short");
    }

    #[test]
    fn test_execute_output_shows_error() {
        let mut state = AgentState::new("q");
        state.error = "no such table: order".to_string();
        let text = node_output(Node::ExecuteSql, &state);
        assert!(text.starts_with("❌ Error:"));
        assert!(text.contains("no such table"));
    }

    #[test]
    fn test_final_response_with_sql_error_and_chart() {
        let mut state = AgentState::new("orders per state");
        state.sql_query = "SELECT 1".to_string();
        state.final_answer = "SP leads.".to_string();
        state.needs_graph = true;
        state.graph_type = "bar".to_string();
        state.graph_json = "{}".to_string();
        let text = final_response(&state);
        assert!(text.contains("```sql\nSELECT 1\n```"));
        assert!(text.contains("Answer:\nSP leads."));
        assert!(text.contains("(Bar Chart)"));
        assert!(!text.contains("Note:"));

        state.error = "boom".to_string();
        assert!(final_response(&state).contains("⚠️ Note: boom"));
    }

    #[test]
    fn test_final_response_greeting_has_no_sql_block() {
        let mut state = AgentState::new("hi");
        state.final_answer = "Hi there!".to_string();
        assert_eq!(final_response(&state), "Hi there!");
    }

    #[test]
    fn test_node_end_is_indented() {
        let mut state = AgentState::new("q");
        state.sql_query = "SELECT 1".to_string();
        let text = event_text(&WorkflowEvent::NodeEnd {
            node: Node::GenerateSql,
            state,
        });
        assert!(text.lines().all(|l| l.starts_with("  ")));
    }
}
