//! Target resolution: from connection parameters to one live database session.
//!
//! A session is a single connection driven by its own current-thread Tokio
//! runtime, so the rest of the crate stays synchronous. There are no retries;
//! the operator is waiting on the result and a failed connect is reported
//! immediately.

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
    error::Error as StdError,
    time::Duration,
};

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::ValueEnum;
use log::{debug, info, warn};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Deserializer};
use tokio::runtime::Runtime;
use tokio_postgres::{
    Client, Config, Statement,
    config::{Host, SslMode},
    types::{Format, IsNull, ToSql, Type, to_sql_checked},
};

use crate::error::ImportError;

pub const DEFAULT_PORT: u16 = 5432;
const REDACTED: &str = "***";
/// Secrets shorter than this are only redacted as whole words.
const MIN_SUBSTRING_SECRET: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A single connection string (hosted Postgres such as Neon)
    Neon,
    /// Discrete host/port/database/username/password fields
    Local,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct DiscreteParams {
    pub host: String,
    /// Raw port text; absent, zero or non-numeric falls back to 5432.
    pub port: Option<String>,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
}

impl DiscreteParams {
    pub fn resolved_port(&self) -> u16 {
        match self.port.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match raw.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => {
                    debug!("Port '{raw}' is not usable; using {DEFAULT_PORT}");
                    DEFAULT_PORT
                }
            },
            _ => DEFAULT_PORT,
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.database.trim().is_empty() {
            missing.push("database");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        missing
    }
}

impl fmt::Debug for DiscreteParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionSpec {
    Dsn { connection_string: String },
    Discrete(DiscreteParams),
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSpec::Dsn { .. } => f
                .debug_struct("Dsn")
                .field("connection_string", &REDACTED)
                .finish(),
            ConnectionSpec::Discrete(params) => fmt::Debug::fmt(params, f),
        }
    }
}

impl ConnectionSpec {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionSpec::Dsn { .. } => ConnectionKind::Neon,
            ConnectionSpec::Discrete(_) => ConnectionKind::Local,
        }
    }

    /// Field-presence check run before anything touches the network.
    pub fn validate(&self) -> Result<(), ImportError> {
        match self {
            ConnectionSpec::Dsn { connection_string } if connection_string.trim().is_empty() => {
                Err(ImportError::validation("Connection string is required"))
            }
            ConnectionSpec::Dsn { .. } => Ok(()),
            ConnectionSpec::Discrete(params) => {
                let missing = params.missing_fields();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(ImportError::Validation(format!(
                        "Database connection details are incomplete (missing {})",
                        missing.join(", ")
                    )))
                }
            }
        }
    }

    /// Builds the driver configuration. Any problem is a connection error.
    ///
    /// Discrete targets connect in plaintext; a connection string keeps its
    /// own `sslmode` (`prefer` when absent).
    pub fn to_config(&self) -> Result<Config, ImportError> {
        match self {
            ConnectionSpec::Dsn { connection_string } => {
                if connection_string.trim().is_empty() {
                    return Err(ImportError::Connection(
                        "Connection string is empty".to_string(),
                    ));
                }
                Config::from_str(connection_string.trim()).map_err(|err| {
                    ImportError::Connection(format!("Connection string was rejected: {err}"))
                })
            }
            ConnectionSpec::Discrete(params) => {
                let missing = params.missing_fields();
                if !missing.is_empty() {
                    return Err(ImportError::Connection(format!(
                        "Missing connection fields: {}",
                        missing.join(", ")
                    )));
                }
                let mut config = Config::new();
                config
                    .host(params.host.trim())
                    .port(params.resolved_port())
                    .dbname(params.database.trim())
                    .user(params.username.trim())
                    .ssl_mode(SslMode::Disable);
                if let Some(password) = params.password.as_deref().filter(|p| !p.is_empty()) {
                    config.password(password);
                }
                Ok(config)
            }
        }
    }

    /// Values that must never appear in a message shown to the caller.
    fn secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        match self {
            ConnectionSpec::Dsn { connection_string } => {
                secrets.push(connection_string.trim().to_string());
                if let Some(password) = Config::from_str(connection_string.trim())
                    .ok()
                    .and_then(|config| config.get_password().map(<[u8]>::to_vec))
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                {
                    secrets.push(password);
                }
            }
            ConnectionSpec::Discrete(params) => {
                if let Some(password) = &params.password {
                    secrets.push(password.clone());
                }
            }
        }
        secrets.retain(|s| !s.is_empty());
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets
    }

    /// Replaces every credential of this connection in `message` with `***`.
    pub fn redact(&self, message: &str) -> String {
        self.secrets()
            .iter()
            .fold(message.to_string(), |acc, secret| {
                if secret.chars().count() < MIN_SUBSTRING_SECRET {
                    replace_whole_words(&acc, secret)
                } else {
                    acc.replace(secret.as_str(), REDACTED)
                }
            })
    }
}

fn replace_whole_words(message: &str, secret: &str) -> String {
    let standalone = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
    let mut redacted = String::with_capacity(message.len());
    let mut copied = 0;
    for (start, _) in message.match_indices(secret) {
        let end = start + secret.len();
        let before = message[..start].chars().next_back();
        let after = message[end..].chars().next();
        if standalone(before) && standalone(after) {
            redacted.push_str(&message[copied..start]);
            redacted.push_str(REDACTED);
            copied = end;
        }
    }
    redacted.push_str(&message[copied..]);
    redacted
}

/// Connection parameters as stored in a YAML profile. Every field is optional
/// so command-line flags can fill in or override individual values.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionProfile {
    #[serde(rename = "type")]
    pub kind: Option<ConnectionKind>,
    pub connection_string: Option<String>,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening connection profile {path:?}"))?;
        let profile: ConnectionProfile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing connection profile {path:?}"))?;
        Ok(profile)
    }

    /// Overlays `other` on top of `self`; values present in `other` win.
    pub fn merged_with(self, other: ConnectionProfile) -> ConnectionProfile {
        ConnectionProfile {
            kind: other.kind.or(self.kind),
            connection_string: other.connection_string.or(self.connection_string),
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            database: other.database.or(self.database),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
        }
    }

    pub fn into_spec(self) -> ConnectionSpec {
        match self.kind.unwrap_or(ConnectionKind::Local) {
            ConnectionKind::Neon => ConnectionSpec::Dsn {
                connection_string: self.connection_string.unwrap_or_default(),
            },
            ConnectionKind::Local => ConnectionSpec::Discrete(DiscreteParams {
                host: self.host.unwrap_or_default(),
                port: self.port,
                database: self.database.unwrap_or_default(),
                username: self.username.unwrap_or_default(),
                password: self.password,
            }),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
    }

    Ok(Option::<RawPort>::deserialize(deserializer)?.map(|raw| match raw {
        RawPort::Number(n) => n.to_string(),
        RawPort::Text(s) => s,
    }))
}

/// Failure reported by the database or the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// SQLSTATE, when the server produced one.
    pub code: Option<String>,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(error: tokio_postgres::Error) -> Self {
        let Some(db_error) = error.as_db_error() else {
            return DbError::new(error_chain(&error));
        };

        let code = db_error.code().code().to_string();
        let mut message = db_error.message().to_string();
        if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
            message.push_str(&format!(" (detail: {detail})"));
        }
        if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
            message.push_str(&format!(" (hint: {hint})"));
        }
        let message = match code.as_str() {
            "23505" => format!("duplicate value violates unique constraint: {message}"),
            "23502" => format!("null value violates not-null constraint: {message}"),
            "22P02" => format!("invalid input syntax: {message}"),
            _ => format!("{message} (code: {code})"),
        };
        DbError {
            code: Some(code),
            message,
        }
    }
}

/// `error` followed by each of its causes, `: `-separated.
fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.ends_with(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/// The statements the import executor needs from a database session.
///
/// Dropping the session closes it.
pub trait Session {
    /// Runs one or more statements without parameters.
    fn batch_execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Runs a parameterized statement, binding each value as text (`None` is
    /// NULL) for the server to convert to the column's type. Returns the
    /// number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64, DbError>;
}

/// A cell sent in text format, whatever type the server inferred for its
/// parameter, so an existing `integer` column receives `'30'` and parses it
/// itself.
#[derive(Debug)]
struct TextParam<'a>(Option<&'a str>);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    pub connect_timeout: Option<Duration>,
}

pub struct PgSession {
    client: Client,
    statements: HashMap<String, Statement>,
    runtime: Runtime,
}

impl fmt::Debug for PgSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSession")
            .field("prepared", &self.statements.len())
            .finish_non_exhaustive()
    }
}

/// Opens exactly one connection described by `spec`.
pub fn connect(spec: &ConnectionSpec, options: &ConnectOptions) -> Result<PgSession, ImportError> {
    let mut config = spec.to_config()?;
    if let Some(timeout) = options.connect_timeout {
        config.connect_timeout(timeout);
    }
    let target = describe_target(&config);
    info!("Connecting to {target}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| ImportError::Connection(format!("Failed to start I/O runtime: {err}")))?;
    let tls = TlsConnector::builder()
        .build()
        .map_err(|err| ImportError::Connection(format!("Failed to build TLS connector: {err}")))?;
    let tls = MakeTlsConnector::new(tls);

    let (client, connection) = runtime
        .block_on(config.connect(tls))
        .map_err(|err| ImportError::Connection(DbError::from(err).message))?;
    runtime.spawn(async move {
        if let Err(err) = connection.await {
            warn!("Database connection closed with error: {err}");
        }
    });
    debug!("Connected to {target}");

    Ok(PgSession {
        client,
        statements: HashMap::new(),
        runtime,
    })
}

fn describe_target(config: &Config) -> String {
    let host = match config.get_hosts().first() {
        Some(Host::Tcp(host)) => host.clone(),
        #[cfg(unix)]
        Some(Host::Unix(path)) => path.display().to_string(),
        None => "localhost".to_string(),
    };
    let port = config.get_ports().first().copied().unwrap_or(DEFAULT_PORT);
    let database = config.get_dbname().unwrap_or("<default>");
    format!("{host}:{port}/{database}")
}

impl PgSession {
    fn statement(&mut self, sql: &str) -> Result<Statement, DbError> {
        if let Some(statement) = self.statements.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self.runtime.block_on(self.client.prepare(sql))?;
        self.statements.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }
}

impl Session for PgSession {
    fn batch_execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(DbError::from)
    }

    fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64, DbError> {
        let statement = self.statement(sql)?;
        let params = params
            .iter()
            .map(|value| TextParam(value.as_deref()))
            .collect::<Vec<_>>();
        let bound = params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        self.runtime
            .block_on(self.client.execute(&statement, &bound))
            .map_err(DbError::from)
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        debug!("Closing database session");
    }
}
