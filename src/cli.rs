use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::connection::ConnectionKind;

#[derive(Debug, Parser)]
#[command(author, version, about = "Import CSV files into PostgreSQL tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a CSV file into a table, creating the schema and table if needed
    Import(ImportArgs),
    /// Show the table definition and first rows an import would produce, without connecting
    Preview(PreviewArgs),
}

// Input and target options shared by `import` and `preview`.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// CSV file to load (`-` reads stdin); the first line is the header
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination table name (letters, digits, underscore)
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Destination schema name (defaults to public)
    #[arg(short = 's', long = "schema")]
    pub schema: Option<String>,
    /// Name of the generated auto-increment key column
    #[arg(long = "primary-key", default_value = "id")]
    pub primary_key: String,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Keep every cell as verbatim text instead of detecting numbers and booleans
    #[arg(long = "no-dynamic-typing")]
    pub no_dynamic_typing: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// How to reach the database
    #[arg(long = "connection-type", value_enum)]
    pub connection_type: Option<ConnectionKind>,
    /// YAML connection profile; explicit flags override its values
    #[arg(long = "connection-file")]
    pub connection_file: Option<PathBuf>,
    /// Connection string for `--connection-type neon`
    #[arg(long = "connection-string", env = "DATABASE_URL", hide_env_values = true)]
    pub connection_string: Option<String>,
    /// Database host for `--connection-type local`
    #[arg(long, env = "PGHOST")]
    pub host: Option<String>,
    /// Database port (defaults to 5432)
    #[arg(long, env = "PGPORT")]
    pub port: Option<String>,
    /// Database name
    #[arg(long, env = "PGDATABASE")]
    pub database: Option<String>,
    /// Database user
    #[arg(long, env = "PGUSER")]
    pub username: Option<String>,
    /// Database password
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Give up connecting after this many seconds
    #[arg(long = "connect-timeout")]
    pub connect_timeout: Option<u64>,
    /// Print the result as a JSON object on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_delimiter_accepts_names_and_single_chars() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }
}
