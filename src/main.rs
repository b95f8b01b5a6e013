fn main() {
    if let Err(err) = csv_pg_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(csv_pg_import::exit_code(&err));
    }
}
