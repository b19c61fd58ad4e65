//! Schema rendering and prompt construction for the NL-to-SQL engine.

use crate::db::introspect::SchemaInfo;

/// Renders the introspected schema as text a language model can ground on:
/// one paragraph per table listing `name (type[, PRIMARY KEY][, NOT NULL])`
/// per column, plus a foreign-key summary line when any exist.
pub fn describe_schema(schema: &SchemaInfo) -> String {
    let mut paragraphs = Vec::new();

    for (table_name, table) in &schema.tables {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                let mut desc = format!("{} ({}", column.name, column.data_type);
                if column.primary_key {
                    desc.push_str(", PRIMARY KEY");
                }
                if !column.nullable {
                    desc.push_str(", NOT NULL");
                }
                desc.push(')');
                desc
            })
            .collect();

        let mut paragraph = format!("Table: {}\nColumns: {}", table_name, columns.join(", "));

        if !table.foreign_keys.is_empty() {
            let fk_descs: Vec<String> = table
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "[{}] -> {}.[{}]",
                        fk.constrained_columns.join(", "),
                        fk.referred_table,
                        fk.referred_columns.join(", ")
                    )
                })
                .collect();
            paragraph.push_str(&format!("\nForeign Keys: {}", fk_descs.join(", ")));
        }

        paragraphs.push(paragraph);
    }

    paragraphs.join("\n\n")
}

/// Builds the single instruction prompt sent as the user message.
pub fn build_prompt(question: &str, schema: &SchemaInfo) -> String {
    format!(
        r#"
You are an expert SQL query generator. Convert the following natural language query into a SQL SELECT statement.

Database Schema:
{}

Natural Language Query: "{}"

Rules:
1. Only generate SELECT statements
2. Use proper SQL syntax for {} database
3. Include appropriate JOINs when needed
4. Use aggregate functions when appropriate
5. Add proper WHERE clauses for filtering - be very careful to match the user's intent
6. Order results logically
7. Limit results to reasonable amounts (use LIMIT/TOP)
8. Pay close attention to the exact filtering requirements in the natural language query

Return ONLY a JSON object with these fields:
{{
    "sql": "the generated SQL query",
    "explanation": "brief explanation of what the query does",
    "visualization_hint": "suggest the best visualization type (table, bar_chart, line_chart, pie_chart, kpi)",
    "confidence": 0.95
}}

Do not include any text before or after the JSON object.
"#,
        describe_schema(schema),
        question,
        schema.database_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::introspect::{ColumnInfo, ForeignKeyInfo, TableInfo};
    use crate::db::Dialect;
    use std::collections::BTreeMap;

    fn sample_schema() -> SchemaInfo {
        let mut tables = BTreeMap::new();
        tables.insert(
            "orders".to_string(),
            TableInfo {
                columns: vec![
                    ColumnInfo {
                        name: "id".to_string(),
                        data_type: "INTEGER".to_string(),
                        nullable: false,
                        default: None,
                        primary_key: true,
                    },
                    ColumnInfo {
                        name: "customer_id".to_string(),
                        data_type: "INTEGER".to_string(),
                        nullable: true,
                        default: None,
                        primary_key: false,
                    },
                ],
                foreign_keys: vec![ForeignKeyInfo {
                    constrained_columns: vec!["customer_id".to_string()],
                    referred_table: "customers".to_string(),
                    referred_columns: vec!["id".to_string()],
                }],
                indexes: vec![],
            },
        );
        SchemaInfo {
            tables,
            database_type: Dialect::Sqlite,
        }
    }

    #[test]
    fn renders_columns_with_constraints() {
        let text = describe_schema(&sample_schema());
        assert!(text.contains("Table: orders"));
        assert!(text.contains("id (INTEGER, PRIMARY KEY, NOT NULL)"));
        assert!(text.contains("customer_id (INTEGER)"));
        assert!(text.contains("Foreign Keys: [customer_id] -> customers.[id]"));
    }

    #[test]
    fn prompt_embeds_question_schema_and_dialect() {
        let prompt = build_prompt("how many orders", &sample_schema());
        assert!(prompt.contains("Natural Language Query: \"how many orders\""));
        assert!(prompt.contains("Table: orders"));
        assert!(prompt.contains("syntax for sqlite database"));
        assert!(prompt.contains("\"visualization_hint\""));
    }
}
