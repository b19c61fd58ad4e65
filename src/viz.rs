use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Closed set of chart shapes the frontend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    Table,
    BarChart,
    LineChart,
    PieChart,
    Kpi,
}

impl VisualizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizationType::Table => "table",
            VisualizationType::BarChart => "bar_chart",
            VisualizationType::LineChart => "line_chart",
            VisualizationType::PieChart => "pie_chart",
            VisualizationType::Kpi => "kpi",
        }
    }
}

impl fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualizationType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(VisualizationType::Table),
            "bar_chart" => Ok(VisualizationType::BarChart),
            "line_chart" => Ok(VisualizationType::LineChart),
            "pie_chart" => Ok(VisualizationType::PieChart),
            "kpi" => Ok(VisualizationType::Kpi),
            _ => Err(()),
        }
    }
}

const TEMPORAL_KEYWORDS: [&str; 4] = ["date", "time", "created", "updated"];

/// Cheap, explainable chart suggestion from result shape. The rules are
/// order-sensitive: the first match wins.
pub fn suggest(rows: &[Map<String, Value>], columns: &[String]) -> VisualizationType {
    if rows.is_empty() || columns.is_empty() {
        return VisualizationType::Table;
    }

    // Single value
    if rows.len() == 1 && columns.len() == 1 {
        return VisualizationType::Kpi;
    }

    // Time series detection by column name
    let has_temporal_column = columns.iter().any(|column| {
        let lowered = column.to_lowercase();
        TEMPORAL_KEYWORDS.iter().any(|kw| lowered.contains(kw))
    });
    if has_temporal_column && rows.len() > 1 {
        return VisualizationType::LineChart;
    }

    // Categorical data with counts: look for a numeric column in a small
    // sample of rows
    if columns.len() == 2 && rows.len() <= 20 {
        let has_numeric_column = rows
            .iter()
            .take(3)
            .any(|row| row.values().any(Value::is_number));

        if has_numeric_column {
            return if rows.len() > 5 {
                VisualizationType::BarChart
            } else {
                VisualizationType::PieChart
            };
        }
    }

    VisualizationType::Table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows_from(values: Vec<Value>) -> Vec<Map<String, Value>> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn empty_result_is_a_table() {
        assert_eq!(suggest(&[], &[]), VisualizationType::Table);
        assert_eq!(
            suggest(&[], &["a".to_string()]),
            VisualizationType::Table
        );
    }

    #[test]
    fn single_cell_is_a_kpi() {
        let rows = rows_from(vec![json!({"count": 42})]);
        assert_eq!(
            suggest(&rows, &["count".to_string()]),
            VisualizationType::Kpi
        );
    }

    #[test]
    fn temporal_column_over_multiple_rows_is_a_line_chart() {
        let rows = rows_from(
            (0..5)
                .map(|i| json!({"created_at": format!("2024-01-0{}", i + 1), "total": i}))
                .collect(),
        );
        let columns = vec!["created_at".to_string(), "total".to_string()];
        assert_eq!(suggest(&rows, &columns), VisualizationType::LineChart);
    }

    #[test]
    fn two_numeric_columns_split_between_bar_and_pie() {
        let columns = vec!["month".to_string(), "total".to_string()];

        let eight = rows_from(
            (0..8)
                .map(|i| json!({"month": format!("m{}", i), "total": i * 10}))
                .collect(),
        );
        assert_eq!(suggest(&eight, &columns), VisualizationType::BarChart);

        let three = rows_from(
            (0..3)
                .map(|i| json!({"month": format!("m{}", i), "total": i * 10}))
                .collect(),
        );
        assert_eq!(suggest(&three, &columns), VisualizationType::PieChart);
    }

    #[test]
    fn wide_results_fall_back_to_table() {
        let rows = rows_from(vec![
            json!({"a": 1, "b": 2, "c": 3}),
            json!({"a": 4, "b": 5, "c": 6}),
        ]);
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(suggest(&rows, &columns), VisualizationType::Table);
    }

    #[test]
    fn rule_order_puts_time_series_before_two_column_shapes() {
        // Two columns and eight rows would be a bar chart, but the temporal
        // column name wins first.
        let rows = rows_from(
            (0..8)
                .map(|i| json!({"date": format!("d{}", i), "total": i}))
                .collect(),
        );
        let columns = vec!["date".to_string(), "total".to_string()];
        assert_eq!(suggest(&rows, &columns), VisualizationType::LineChart);
    }
}
