//! ormkit command-line interface
//!
//! Loads a schema, pushes its tables and runs operations given as JSON
//! argument documents against a SQLite database.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod error;
mod formatter;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use formatter::OutputFormat;
use ormkit_core::config::{DEFAULT_MAX_INCLUDE_DEPTH, DEFAULT_POOL_SIZE};
use ormkit_core::{EngineConfig, SqliteConfig};

/// ormkit command-line interface
#[derive(Parser, Debug)]
#[command(name = "ormkit")]
#[command(version, about = "Schema-checked queries and mutations over SQLite")]
pub struct Args {
    /// Schema document (JSON)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// SQLite database file; an in-memory database is used when omitted
    /// and the schema is pushed before every command
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Maximum number of pooled connections
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Maximum include nesting depth
    #[arg(long, default_value_t = DEFAULT_MAX_INCLUDE_DEPTH)]
    pub max_include_depth: usize,

    /// Abort the command after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// SQL dialect for rendered DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Sqlite,
    Postgres,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create missing tables and indexes
    Push,

    /// Describe the entities of the schema
    Schema,

    /// Print the DDL of the schema
    Ddl {
        #[arg(long, default_value = "sqlite", value_enum)]
        dialect: DialectArg,
    },

    /// Run one operation, e.g. `run Athlete findMany '{"take": 5}'`
    Run {
        entity: String,
        operation: String,
        /// Argument document; `@path` reads it from a file
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Run raw SQL
    Raw {
        sql: String,
        /// Parameters as a JSON array
        #[arg(long, default_value = "[]")]
        params: String,
        /// Run as a statement and print the affected row count
        #[arg(long)]
        execute: bool,
    },

    /// Run a JSON array of operations in one transaction
    Batch {
        /// File holding `[{"entity": .., "operation": .., "args": ..}, ..]`
        file: PathBuf,
    },
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_max_include_depth(self.max_include_depth)
    }

    pub fn sqlite_config(&self) -> SqliteConfig {
        match &self.database {
            Some(path) => SqliteConfig::new(path).with_pool_size(self.pool_size),
            None => SqliteConfig::in_memory(),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ormkit=info")),
        )
        .init();

    let args = Args::parse();

    match commands::run(args).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
