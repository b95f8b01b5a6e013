//! The import operation: validate the request, parse the upload, derive the
//! table, then hand both to the executor on a freshly opened session.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info};

use crate::{
    cli::{ImportArgs, SourceArgs},
    connection::{self, ConnectOptions, ConnectionProfile, ConnectionSpec, Session},
    error::ImportError,
    executor::ImportExecutor,
    identifier::validate_identifier,
    io_utils,
    parser::{self, ParseOptions},
    report::ImportOutcome,
    schema::{DEFAULT_PRIMARY_KEY, DEFAULT_SCHEMA, TableDefinition},
};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub parse: ParseOptions,
    pub primary_key: String,
    pub connect: ConnectOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            connect: ConnectOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file_bytes: Vec<u8>,
    pub connection: ConnectionSpec,
    pub table_name: String,
    pub schema_name: String,
    pub options: ImportOptions,
}

impl ImportRequest {
    pub fn new(
        file_bytes: Vec<u8>,
        connection: ConnectionSpec,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            file_bytes,
            connection,
            table_name: table_name.into(),
            schema_name: DEFAULT_SCHEMA.to_string(),
            options: ImportOptions::default(),
        }
    }

    /// Blank schema names fall back to `public`.
    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        let schema_name = schema_name.into();
        self.schema_name = if schema_name.trim().is_empty() {
            DEFAULT_SCHEMA.to_string()
        } else {
            schema_name
        };
        self
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks everything that can be checked without reading rows or
    /// touching the database.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.file_bytes.is_empty() {
            return Err(ImportError::validation("No CSV file provided"));
        }
        validate_identifier("Table name", &self.table_name)?;
        validate_identifier("Schema name", &self.schema_name)?;
        validate_identifier("Primary key column", &self.options.primary_key)?;
        self.connection.validate()
    }
}

/// Imports `request` into the database it names.
pub fn import(request: &ImportRequest) -> ImportOutcome {
    import_with(request, |spec| connection::connect(spec, &request.options.connect))
}

/// Same as [`import`], opening the session through `connector`. The session
/// is dropped (and so closed) before this returns, whatever the outcome.
pub fn import_with<S, F>(request: &ImportRequest, connector: F) -> ImportOutcome
where
    S: Session,
    F: FnOnce(&ConnectionSpec) -> Result<S, ImportError>,
{
    match run_import(request, connector) {
        Ok(rows_imported) => ImportOutcome::Success {
            rows_imported,
            schema_name: request.schema_name.clone(),
            table_name: request.table_name.clone(),
        },
        Err(err) => {
            let err = err.map_message(|message| request.connection.redact(message));
            error!("Import into {}.{} failed: {err}", request.schema_name, request.table_name);
            ImportOutcome::Failure(err)
        }
    }
}

fn run_import<S, F>(request: &ImportRequest, connector: F) -> Result<usize, ImportError>
where
    S: Session,
    F: FnOnce(&ConnectionSpec) -> Result<S, ImportError>,
{
    request.validate()?;
    let table = parser::parse_csv(&request.file_bytes, &request.options.parse)?;
    info!(
        "Parsed {} row(s) with column(s) {:?}",
        table.row_count(),
        table.columns
    );
    let definition = TableDefinition::derive(
        &request.schema_name,
        &request.table_name,
        &request.options.primary_key,
        &table.columns,
    )?;

    let mut session = connector(&request.connection)?;
    let mut executor = ImportExecutor::new(&mut session);
    executor.run(&definition, &table)
}

pub fn execute(args: &ImportArgs) -> Result<()> {
    let connection = resolve_connection(args)?;
    let mut request = build_request(&args.source, connection)?;
    request.options.connect.connect_timeout = args.connect_timeout.map(Duration::from_secs);
    info!(
        "Importing '{}' into {}.{} via {:?} connection",
        args.source.input.display(),
        request.schema_name,
        request.table_name,
        request.connection.kind()
    );

    let outcome = import(&request);
    let response = outcome.to_response();
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&response).context("Serializing import response")?;
        println!("{rendered}");
    }
    match outcome {
        ImportOutcome::Success { .. } => {
            if let Some(message) = response.message {
                info!("{message}");
                if !args.json {
                    println!("{message}");
                }
            }
            Ok(())
        }
        ImportOutcome::Failure(err) => Err(err.into()),
    }
}

/// Parsing and key options taken from the flags shared with `preview`.
pub fn source_options(source: &SourceArgs) -> Result<ImportOptions> {
    let delimiter = io_utils::resolve_input_delimiter(&source.input, source.delimiter);
    let encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    Ok(ImportOptions {
        parse: ParseOptions {
            delimiter,
            encoding,
            dynamic_typing: !source.no_dynamic_typing,
        },
        primary_key: source.primary_key.clone(),
        connect: ConnectOptions::default(),
    })
}

fn build_request(source: &SourceArgs, connection: ConnectionSpec) -> Result<ImportRequest> {
    let options = source_options(source)?;
    let file_bytes = io_utils::read_input(&source.input)?;
    Ok(ImportRequest::new(file_bytes, connection, source.table.clone())
        .with_schema(source.schema.clone().unwrap_or_default())
        .with_options(options))
}

fn resolve_connection(args: &ImportArgs) -> Result<ConnectionSpec> {
    let base = match &args.connection_file {
        Some(path) => ConnectionProfile::load(path)?,
        None => ConnectionProfile::default(),
    };
    let flags = ConnectionProfile {
        kind: args.connection_type,
        connection_string: args.connection_string.clone(),
        host: args.host.clone(),
        port: args.port.clone(),
        database: args.database.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
    };
    Ok(base.merged_with(flags).into_spec())
}
