use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    import::source_options,
    io_utils, parser,
    schema::{DEFAULT_SCHEMA, TableDefinition},
    table,
};

/// Dry run: parse and derive exactly as `import` would, print the statements
/// and the first rows, and never connect.
pub fn execute(args: &PreviewArgs) -> Result<()> {
    let source = &args.source;
    let options = source_options(source)?;
    let schema_name = source
        .schema
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SCHEMA);

    let bytes = io_utils::read_input(&source.input)?;
    let parsed = parser::parse_csv(&bytes, &options.parse)
        .with_context(|| format!("Parsing {:?}", source.input))?;
    let definition = TableDefinition::derive(
        schema_name,
        &source.table,
        &options.primary_key,
        &parsed.columns,
    )?;

    if !definition.uses_default_schema() {
        println!("{};", definition.create_schema_sql());
    }
    println!("{};", definition.create_table_sql());
    println!("{};", definition.insert_sql());
    println!();
    print!("{}", table::render_preview(&definition, &parsed, args.rows));
    info!(
        "Previewed {} of {} row(s) for {}",
        args.rows.min(parsed.row_count()),
        parsed.row_count(),
        definition.display_name()
    );
    Ok(())
}
