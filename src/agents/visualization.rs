//! Turns the first result set into a Plotly figure.

use crate::error::Result;
use crate::state::{AgentState, GraphType};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

type Row = Map<String, Value>;

/// Build `graph_json` for the chart type picked by the graph decision.
///
/// Leaves `graph_json` empty when the rows hold nothing numeric to plot.
pub fn visualize(state: &mut AgentState) -> Result<()> {
    state.graph_json.clear();

    let graph_type = state.graph_type();
    if graph_type == GraphType::None {
        warn!("Visualization requested without a chart type");
        return Ok(());
    }

    let parsed: Value = serde_json::from_str(&state.query_result)?;
    let rows = first_result_set(&parsed);
    let Some(columns) = rows.first().map(|r| r.keys().cloned().collect::<Vec<_>>()) else {
        warn!("No rows to chart");
        return Ok(());
    };

    let Some((x, y)) = pick_axes(&columns, &rows) else {
        warn!("No numeric y column to chart in {:?}", columns);
        return Ok(());
    };

    let xs: Vec<Value> = rows.iter().map(|r| r.get(&x).cloned().unwrap_or(Value::Null)).collect();
    let ys: Vec<Value> = rows.iter().map(|r| r.get(&y).cloned().unwrap_or(Value::Null)).collect();

    let trace = match graph_type {
        GraphType::Bar => json!({ "type": "bar", "x": xs, "y": ys, "name": y }),
        GraphType::Line => json!({ "type": "scatter", "mode": "lines", "x": xs, "y": ys, "name": y }),
        GraphType::Scatter => json!({ "type": "scatter", "mode": "markers", "x": xs, "y": ys, "name": y }),
        GraphType::Pie => json!({ "type": "pie", "labels": xs, "values": ys }),
        GraphType::None => return Ok(()),
    };

    let mut layout = json!({ "title": { "text": state.question } });
    if graph_type != GraphType::Pie {
        layout["xaxis"] = json!({ "title": { "text": x } });
        layout["yaxis"] = json!({ "title": { "text": y } });
    }

    let figure = json!({ "data": [trace], "layout": layout });
    state.graph_json = serde_json::to_string(&figure)?;
    info!("Built {} chart with {} points", graph_type, rows.len());
    Ok(())
}

/// Rows of a single-statement result, or of the first `{query, rows}` set.
fn first_result_set(parsed: &Value) -> Vec<Row> {
    let Some(items) = parsed.as_array() else {
        return Vec::new();
    };
    let nested = items
        .first()
        .and_then(Value::as_object)
        .filter(|o| o.contains_key("query") && o.get("rows").map_or(false, Value::is_array))
        .and_then(|o| o.get("rows"))
        .and_then(Value::as_array);

    nested
        .unwrap_or(items)
        .iter()
        .filter_map(Value::as_object)
        .cloned()
        .collect()
}

fn is_numeric_column(rows: &[Row], column: &str) -> bool {
    let mut seen = false;
    for value in rows.iter().filter_map(|r| r.get(column)) {
        match value {
            Value::Number(_) => seen = true,
            Value::Null => {}
            _ => return false,
        }
    }
    seen
}

fn is_text_column(rows: &[Row], column: &str) -> bool {
    rows.iter().filter_map(|r| r.get(column)).any(Value::is_string)
}

fn pick_axes(columns: &[String], rows: &[Row]) -> Option<(String, String)> {
    let x = columns
        .iter()
        .find(|c| is_text_column(rows, c))
        .or_else(|| columns.first())?;
    let y = columns.iter().find(|c| *c != x && is_numeric_column(rows, c))?;
    Some((x.clone(), y.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(graph_type: &str, result: &str) -> AgentState {
        let mut state = AgentState::new("orders per state");
        state.needs_graph = true;
        state.graph_type = graph_type.to_string();
        state.query_result = result.to_string();
        state
    }

    const ROWS: &str = r#"[{"customer_state": "SP", "orders": 41746}, {"customer_state": "RJ", "orders": 12852}]"#;

    #[test]
    fn test_bar_chart() {
        let mut s = state("bar", ROWS);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["data"][0]["type"], "bar");
        assert_eq!(fig["data"][0]["x"][1], "RJ");
        assert_eq!(fig["data"][0]["y"][0], 41746);
        assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "customer_state");
        assert_eq!(fig["layout"]["title"]["text"], "orders per state");
    }

    #[test]
    fn test_line_and_pie() {
        let mut s = state("line", ROWS);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["data"][0]["type"], "scatter");
        assert_eq!(fig["data"][0]["mode"], "lines");

        let mut s = state("pie", ROWS);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["data"][0]["labels"][0], "SP");
        assert_eq!(fig["data"][0]["values"][1], 12852);
    }

    #[test]
    fn test_scatter_follows_text_then_numeric_rule() {
        let rows = r#"[{"product_id": "p1", "price": 10.5, "freight_value": 2.1}, {"product_id": "p2", "price": 99.0, "freight_value": 8.4}]"#;
        let mut s = state("scatter", rows);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["data"][0]["mode"], "markers");
        assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "product_id");
        assert_eq!(fig["layout"]["yaxis"]["title"]["text"], "price");
    }

    #[test]
    fn test_all_numeric_rows_use_first_column_as_x() {
        let rows = r#"[{"year": 2017, "orders": 10}, {"year": 2018, "orders": 14}]"#;
        let mut s = state("line", rows);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "year");
        assert_eq!(fig["layout"]["yaxis"]["title"]["text"], "orders");
        assert_eq!(fig["data"][0]["x"][1], 2018);
        assert_eq!(fig["data"][0]["y"][1], 14);
    }

    #[test]
    fn test_single_numeric_column_has_nothing_to_plot_against() {
        let mut s = state("bar", r#"[{"orders": 99441}]"#);
        visualize(&mut s).unwrap();
        assert!(s.graph_json.is_empty());
    }

    #[test]
    fn test_multi_statement_uses_first_set() {
        let result = r#"[{"query": "SELECT ...", "rows": [{"k": "a", "v": 1}]}, {"query": "SELECT ...", "rows": [{"z": 9}]}]"#;
        let mut s = state("bar", result);
        visualize(&mut s).unwrap();
        let fig: Value = serde_json::from_str(&s.graph_json).unwrap();
        assert_eq!(fig["data"][0]["x"][0], "a");
    }

    #[test]
    fn test_no_numeric_column_skips_chart() {
        let mut s = state("bar", r#"[{"city": "campinas", "state": "SP"}]"#);
        visualize(&mut s).unwrap();
        assert!(s.graph_json.is_empty());
    }
}
