pub mod cli;
pub mod connection;
pub mod data;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod import;
pub mod io_utils;
pub mod parser;
pub mod preview;
pub mod report;
pub mod schema;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::{
    cli::{Cli, Commands},
    error::ImportError,
};

pub use crate::{
    connection::{ConnectionSpec, DiscreteParams, Session},
    error::ErrorKind,
    import::{ImportOptions, ImportRequest, import, import_with},
    report::{ImportOutcome, ImportResponse},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_pg_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => import::execute(&args),
        Commands::Preview(args) => preview::execute(&args),
    }
}

/// Process exit code for a failed run: 2 when the upload itself was at
/// fault, 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ImportError>() {
        Some(import_err) if import_err.kind().is_client_error() => 2,
        _ => 1,
    }
}
