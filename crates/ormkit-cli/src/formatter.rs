//! Output formatters for schemas and operation results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ormkit_core::proto::{EntityRecord, OperationResult, Row, Value};
use ormkit_core::SchemaRegistry;
use serde_json::Value as Json;

use crate::commands::Output;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Describe the entities of a schema.
pub fn format_schema(registry: &SchemaRegistry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let entities: Vec<_> = registry.entities().collect();
            serde_json::to_string_pretty(&entities).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Entity", "Fields", "Primary key", "Relations"]);
            for entity in registry.entities() {
                let fields = entity
                    .fields
                    .iter()
                    .map(|f| {
                        let optional = if f.nullable { "?" } else { "" };
                        format!("{}: {}{}", f.name, f.kind, optional)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let relations = entity
                    .relations
                    .iter()
                    .map(|r| {
                        let arity = if r.is_to_many() { "[]" } else { "" };
                        format!("{} -> {}{}", r.name, r.target, arity)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                table.add_row(vec![
                    Cell::new(&entity.name),
                    Cell::new(fields),
                    Cell::new(entity.primary_key.join(", ")),
                    Cell::new(relations),
                ]);
            }
            table.to_string()
        }
    }
}

/// Render what a command produced.
pub fn format_output(output: &Output, format: OutputFormat) -> String {
    match (output, format) {
        (Output::Message(message), OutputFormat::Table) => message.clone(),
        (Output::Message(message), OutputFormat::Json) => {
            serde_json::json!({ "message": message }).to_string()
        }
        (Output::Result(result), OutputFormat::Json) => pretty(&result.to_json()),
        (Output::Results(results), OutputFormat::Json) => pretty(&Json::Array(
            results.iter().map(OperationResult::to_json).collect(),
        )),
        (Output::Result(result), OutputFormat::Table) => format_result_table(result),
        (Output::Results(results), OutputFormat::Table) => results
            .iter()
            .map(format_result_table)
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn pretty(json: &Json) -> String {
    serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
}

fn format_result_table(result: &OperationResult) -> String {
    match result {
        OperationResult::Record(None) => "No record".to_string(),
        OperationResult::Record(Some(record)) | OperationResult::Written(record) => {
            records_table(std::slice::from_ref(record))
        }
        OperationResult::Records(records) if records.is_empty() => "No results".to_string(),
        OperationResult::Records(records) => records_table(records),
        OperationResult::Batch(batch) => format!("{} record(s) affected", batch.count),
        OperationResult::Count(count) => count.to_string(),
        OperationResult::Affected(count) => format!("{count} row(s) affected"),
        OperationResult::Rows(rows) if rows.is_empty() => "No results".to_string(),
        OperationResult::Rows(rows) => rows_table(rows),
        OperationResult::Aggregate(_) | OperationResult::Groups(_) => {
            json_objects_table(&result.to_json())
        }
    }
}

/// Records as a table; the columns are the union of selected fields
/// followed by included relations rendered as JSON.
fn records_table(records: &[EntityRecord]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for name in record
            .fields
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(record.relations.iter().map(|(n, _)| n.as_str()))
        {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut table = Table::new();
    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());
    for record in records {
        let json = record.to_json();
        let row: Vec<Cell> = columns
            .iter()
            .map(|column| match record.get(column) {
                Some(value) => Cell::new(format_value(value)),
                None => Cell::new(json.get(*column).map(compact).unwrap_or_default()),
            })
            .collect();
        table.add_row(row);
    }
    table.to_string()
}

fn rows_table(rows: &[Row]) -> String {
    let mut table = Table::new();
    if let Some(first) = rows.first() {
        table.set_header(
            first
                .values
                .iter()
                .map(|(name, _)| Cell::new(name))
                .collect::<Vec<_>>(),
        );
    }
    for row in rows {
        table.add_row(
            row.values
                .iter()
                .map(|(_, value)| Cell::new(format_value(value)))
                .collect::<Vec<_>>(),
        );
    }
    table.to_string()
}

/// Aggregate output: one table row per JSON object, one column per key.
fn json_objects_table(json: &Json) -> String {
    let objects: Vec<&serde_json::Map<String, Json>> = match json {
        Json::Object(map) => vec![map],
        Json::Array(items) => items.iter().filter_map(Json::as_object).collect(),
        _ => vec![],
    };
    if objects.is_empty() {
        return "No results".to_string();
    }

    let mut columns: Vec<&str> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut table = Table::new();
    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());
    for object in &objects {
        table.add_row(
            columns
                .iter()
                .map(|column| Cell::new(object.get(*column).map(compact).unwrap_or_default()))
                .collect::<Vec<_>>(),
        );
    }
    table.to_string()
}

/// Strings print without quotes.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compact(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::proto::{BatchCount, RelationValue};

    fn athlete(id: i64, name: &str) -> EntityRecord {
        EntityRecord {
            entity: "Athlete".into(),
            fields: vec![
                ("id".into(), Value::Int(id)),
                ("firstName".into(), Value::String(name.into())),
            ],
            relations: vec![],
        }
    }

    #[test]
    fn test_records_table_prints_strings_unquoted() {
        let output = format_result_table(&OperationResult::Records(vec![
            athlete(1, "Ada"),
            athlete(2, "Bo"),
        ]));
        assert!(output.contains("firstName"));
        assert!(output.contains("Ada"));
        assert!(!output.contains("\"Ada\""));
    }

    #[test]
    fn test_relations_render_as_json() {
        let mut record = athlete(1, "Ada");
        record.relations.push((
            "club".into(),
            RelationValue::One(Some(Box::new(EntityRecord {
                entity: "Club".into(),
                fields: vec![("id".into(), Value::Int(7))],
                relations: vec![],
            }))),
        ));
        let output = records_table(&[record]);
        assert!(output.contains("club"));
        assert!(output.contains(r#"{"id":7}"#));
    }

    #[test]
    fn test_json_output() {
        let output = format_output(
            &Output::Result(OperationResult::Batch(BatchCount::new(3))),
            OutputFormat::Json,
        );
        let parsed: Json = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, serde_json::json!({ "count": 3 }));
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(
            format_result_table(&OperationResult::Records(vec![])),
            "No results"
        );
        assert_eq!(format_result_table(&OperationResult::Record(None)), "No record");
    }
}
