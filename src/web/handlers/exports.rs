use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::history::HistoryEntry;
use crate::web::handlers::error_response;
use crate::web::state::AppState;

/// Looks up the history entry and re-executes its stored SQL for fresh data;
/// exports never serve cached rows.
async fn fresh_data(
    state: &AppState,
    query_id: &str,
) -> AppResult<(HistoryEntry, Vec<Map<String, Value>>)> {
    let entry = state
        .history
        .get(query_id)
        .await
        .ok_or_else(|| AppError::UnknownQuery(query_id.to_string()))?;

    let connection = state
        .registry
        .get(&entry.connection_id)
        .await
        .ok_or_else(|| AppError::UnknownConnection(entry.connection_id.clone()))?;

    let data = connection.pool.execute(&entry.generated_sql).await?;
    Ok((entry, data))
}

fn attachment_headers(query_id: &str, extension: &str, content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let short_id: String = query_id.chars().take(8).collect();
    if let Ok(disposition) = HeaderValue::from_str(&format!(
        "attachment; filename=query_{}.{}",
        short_id, extension
    )) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    headers
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders rows as CSV, header derived from the first row's keys. Zero rows
/// means there is no header to emit, which is an explicit error rather than
/// an empty file.
pub fn write_csv(data: &[Map<String, Value>]) -> AppResult<String> {
    let first = data.first().ok_or(AppError::NoData)?;
    let columns: Vec<&String> = first.keys().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&columns)
        .map_err(|e| AppError::QueryFailed(e.to_string()))?;

    for row in data {
        let record: Vec<String> = columns
            .iter()
            .map(|column| row.get(*column).map(csv_field).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AppError::QueryFailed(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::QueryFailed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::QueryFailed(e.to_string()))
}

pub async fn export_to_csv(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<(HeaderMap, String), (StatusCode, String)> {
    let (entry, data) = fresh_data(&state, &query_id).await.map_err(|err| {
        error!("CSV export failed: {}", err);
        error_response(err)
    })?;

    let content = write_csv(&data).map_err(|err| {
        error!("CSV export failed: {}", err);
        error_response(err)
    })?;

    Ok((
        attachment_headers(&entry.query_id, "csv", "text/csv"),
        content,
    ))
}

pub async fn export_to_json(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<(HeaderMap, Json<Value>), (StatusCode, String)> {
    let (entry, data) = fresh_data(&state, &query_id).await.map_err(|err| {
        error!("JSON export failed: {}", err);
        error_response(err)
    })?;

    let export = json!({
        "query_info": {
            "query_id": entry.query_id,
            "original_query": entry.original_query,
            "generated_sql": entry.generated_sql,
            "connection_id": entry.connection_id,
            "timestamp": entry.timestamp.to_rfc3339(),
            "execution_time": entry.execution_time,
            "row_count": data.len(),
            "visualization_type": entry.visualization_type,
        },
        "data": data,
    });

    Ok((
        attachment_headers(&entry.query_id, "json", "application/json"),
        Json(export),
    ))
}

#[derive(Debug, Serialize)]
pub struct QueryTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub category: &'static str,
    pub visualization_hint: &'static str,
}

/// Preset query templates for common analytics. Static, no state.
fn builtin_templates() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate {
            id: "sales_by_month",
            name: "Sales by Month",
            description: "Show total sales grouped by month",
            template: "Show total sales by month for the last 12 months",
            category: "Sales Analytics",
            visualization_hint: "line_chart",
        },
        QueryTemplate {
            id: "top_products",
            name: "Top Products by Revenue",
            description: "Find the best performing products",
            template: "What are the top 10 products by revenue?",
            category: "Product Analytics",
            visualization_hint: "bar_chart",
        },
        QueryTemplate {
            id: "customer_segments",
            name: "Customer Segments",
            description: "Analyze customer distribution",
            template: "How many customers do we have by region?",
            category: "Customer Analytics",
            visualization_hint: "pie_chart",
        },
        QueryTemplate {
            id: "average_order_value",
            name: "Average Order Value",
            description: "Calculate average order value by segment",
            template: "Show average order value by customer segment",
            category: "Sales Analytics",
            visualization_hint: "bar_chart",
        },
        QueryTemplate {
            id: "total_revenue",
            name: "Total Revenue",
            description: "Show total revenue for a period",
            template: "What is the total revenue for this year?",
            category: "KPIs",
            visualization_hint: "kpi",
        },
        QueryTemplate {
            id: "customer_growth",
            name: "Customer Growth",
            description: "Track new customer acquisitions",
            template: "Show new customer registrations by month",
            category: "Growth Analytics",
            visualization_hint: "line_chart",
        },
        QueryTemplate {
            id: "product_categories",
            name: "Sales by Category",
            description: "Compare sales across product categories",
            template: "Show total sales by product category",
            category: "Product Analytics",
            visualization_hint: "pie_chart",
        },
        QueryTemplate {
            id: "weekly_orders",
            name: "Weekly Order Trends",
            description: "Analyze order patterns by day of week",
            template: "How many orders were placed each day this week?",
            category: "Order Analytics",
            visualization_hint: "bar_chart",
        },
        QueryTemplate {
            id: "inventory_levels",
            name: "Inventory Status",
            description: "Check current inventory levels",
            template: "Show current inventory levels by product",
            category: "Inventory Analytics",
            visualization_hint: "table",
        },
        QueryTemplate {
            id: "user_activity",
            name: "User Activity",
            description: "Track user engagement metrics",
            template: "Show user login activity by month",
            category: "User Analytics",
            visualization_hint: "line_chart",
        },
    ]
}

pub async fn get_query_templates() -> Json<Value> {
    let templates = builtin_templates();

    let mut categories: Vec<&str> = Vec::new();
    for template in &templates {
        if !categories.contains(&template.category) {
            categories.push(template.category);
        }
    }

    Json(json!({
        "templates": templates,
        "categories": categories,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_header_comes_from_the_first_row() {
        let rows = vec![
            serde_json::from_value::<Map<String, Value>>(json!({"name": "ada", "total": 3}))
                .unwrap(),
            serde_json::from_value::<Map<String, Value>>(json!({"name": "grace", "total": 5}))
                .unwrap(),
        ];

        let csv = write_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("name,total"));
        assert_eq!(lines.next(), Some("ada,3"));
        assert_eq!(lines.next(), Some("grace,5"));
    }

    #[test]
    fn csv_quotes_fields_that_need_it_and_blanks_nulls() {
        let rows = vec![serde_json::from_value::<Map<String, Value>>(
            json!({"note": "hello, world", "misc": null}),
        )
        .unwrap()];

        let csv = write_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("note,misc"));
        assert_eq!(lines.next(), Some("\"hello, world\","));
    }

    #[test]
    fn empty_result_is_an_explicit_error() {
        let err = write_csv(&[]).unwrap_err();
        assert!(matches!(err, AppError::NoData));
    }

    #[test]
    fn template_catalog_is_complete() {
        let templates = builtin_templates();
        assert_eq!(templates.len(), 10);
        assert!(templates.iter().any(|t| t.id == "total_revenue"));
    }
}
