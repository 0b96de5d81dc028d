//! Subcommand implementations.

use std::path::Path;

use ormkit_core::proto::json::parse_operation;
use ormkit_core::proto::{Operation, OperationKind, OperationResult};
use ormkit_core::{
    Dialect, Engine, PostgresDialect, SchemaRegistry, SqliteDialect, SqliteDriver,
};
use serde_json::Value as Json;

use crate::error::CliError;
use crate::formatter;
use crate::{Args, Command, DialectArg};

/// Run the parsed command line, returning what to print.
pub async fn run(args: Args) -> Result<String, CliError> {
    let source = std::fs::read_to_string(&args.schema).map_err(|e| CliError::read(&args.schema, e))?;
    let registry = SchemaRegistry::from_json(&source)?;
    tracing::debug!(
        schema = %args.schema.display(),
        entities = registry.entities().count(),
        "schema loaded"
    );

    // Commands that only need the schema.
    match &args.command {
        Command::Schema => return Ok(formatter::format_schema(&registry, args.format)),
        Command::Ddl { dialect } => {
            let dialect: &dyn Dialect = match dialect {
                DialectArg::Sqlite => &SqliteDialect,
                DialectArg::Postgres => &PostgresDialect,
            };
            let statements = registry.create_statements(dialect);
            return Ok(statements
                .iter()
                .map(|sql| format!("{sql};"))
                .collect::<Vec<_>>()
                .join("\n\n"));
        }
        _ => {}
    }

    let engine = Engine::new(
        registry,
        SqliteDriver::new(args.sqlite_config()),
        args.engine_config(),
    );
    engine.connect().await?;
    if args.database.is_none() && !matches!(args.command, Command::Push) {
        engine.push_schema().await?;
    }

    let work = execute(&engine, &args.command);
    let output = match args.deadline() {
        Some(after) => match tokio::time::timeout(after, work).await {
            Ok(output) => output,
            Err(_) => Err(ormkit_core::Error::DeadlineExceeded { after }.into()),
        },
        None => work.await,
    };
    engine.disconnect().await;
    output.map(|result| formatter::format_output(&result, args.format))
}

/// What a command produced.
pub enum Output {
    Message(String),
    Result(OperationResult),
    Results(Vec<OperationResult>),
}

async fn execute(engine: &Engine, command: &Command) -> Result<Output, CliError> {
    match command {
        Command::Push => {
            let count = engine.push_schema().await?;
            Ok(Output::Message(format!("{count} statement(s) applied")))
        }
        Command::Run {
            entity,
            operation,
            args,
        } => {
            let kind: OperationKind = operation.parse()?;
            let document = read_document(args)?;
            let operation = parse_operation(entity, kind, &document)?;
            Ok(Output::Result(engine.execute(operation).await?))
        }
        Command::Raw {
            sql,
            params,
            execute,
        } => {
            let params: Json = serde_json::from_str(params).map_err(|e| CliError::json("--params", e))?;
            let kind = if *execute {
                OperationKind::ExecuteRaw
            } else {
                OperationKind::QueryRaw
            };
            let operation = parse_operation("", kind, &serde_json::json!({ "sql": sql, "params": params }))?;
            Ok(Output::Result(engine.execute(operation).await?))
        }
        Command::Batch { file } => {
            let operations = read_batch(file)?;
            Ok(Output::Results(engine.run_batch(operations).await?))
        }
        Command::Schema | Command::Ddl { .. } => Err(CliError::Usage(
            "command does not need a database".to_string(),
        )),
    }
}

/// Argument document from the command line or, with `@path`, a file.
fn read_document(arg: &str) -> Result<Json, CliError> {
    match arg.strip_prefix('@') {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| CliError::read(path, e))?;
            serde_json::from_str(&text).map_err(|e| CliError::json(path, e))
        }
        None => serde_json::from_str(arg).map_err(|e| CliError::json("arguments", e)),
    }
}

fn read_batch(path: &Path) -> Result<Vec<Operation>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::read(path, e))?;
    let document: Json =
        serde_json::from_str(&text).map_err(|e| CliError::json(path.display().to_string(), e))?;
    let entries = document
        .as_array()
        .ok_or_else(|| CliError::Usage("batch file must hold a JSON array".to_string()))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let operation = entry
                .get("operation")
                .and_then(Json::as_str)
                .ok_or_else(|| CliError::Usage(format!("batch entry {i}: missing \"operation\"")))?;
            let kind: OperationKind = operation.parse()?;
            let entity = entry.get("entity").and_then(Json::as_str).unwrap_or_default();
            if entity.is_empty() && !matches!(kind, OperationKind::QueryRaw | OperationKind::ExecuteRaw) {
                return Err(CliError::Usage(format!("batch entry {i}: missing \"entity\"")));
            }
            let args = entry.get("args").cloned().unwrap_or(Json::Null);
            Ok(parse_operation(entity, kind, &args)?)
        })
        .collect()
}
