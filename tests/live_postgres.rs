//! End-to-end checks against a real server. Set `CSV_PG_IMPORT_TEST_URL` to a
//! connection string for a scratch database to run them; without it they
//! return immediately.

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use csv_pg_import::connection::{ConnectOptions, ConnectionSpec, PgSession, Session, connect};
use csv_pg_import::error::ErrorKind;
use csv_pg_import::{ImportOutcome, ImportRequest, import};

fn test_url() -> Option<String> {
    env::var("CSV_PG_IMPORT_TEST_URL").ok().filter(|v| !v.is_empty())
}

fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    format!("{prefix}_{nanos}")
}

fn spec(url: &str) -> ConnectionSpec {
    ConnectionSpec::Dsn {
        connection_string: url.to_string(),
    }
}

fn session(url: &str) -> PgSession {
    connect(&spec(url), &ConnectOptions::default()).expect("connect")
}

fn count_rows(url: &str, qualified: &str) -> u64 {
    let mut session = session(url);
    // Copying into a scratch table keeps the Session surface to execute().
    let tally = unique_name("tally");
    session
        .batch_execute(&format!("CREATE TEMP TABLE {tally} AS SELECT 1 FROM {qualified}"))
        .expect("tally table");
    session
        .execute(&format!("UPDATE {tally} SET \"?column?\" = 1"), &[])
        .expect("count rows")
}

#[test]
fn imports_rows_in_file_order() {
    let Some(url) = test_url() else { return };
    let table = unique_name("people");
    let request = ImportRequest::new(
        b"name,age\nAlice,30\nBob,thirty\nCara,25\n".to_vec(),
        spec(&url),
        table.clone(),
    );

    let outcome = import(&request);
    assert_eq!(outcome.rows_imported(), Some(3), "{outcome:?}");

    let again = import(&request);
    assert_eq!(again.rows_imported(), Some(3), "{again:?}");
    assert_eq!(count_rows(&url, &format!("public.\"{table}\"")), 6);

    let mut check = session(&url);
    let ordered = check
        .execute(
            &format!(
                "UPDATE public.\"{table}\" SET name = name \
                 WHERE id IN (1, 2, 3) AND name = CASE id WHEN 1 THEN 'Alice' WHEN 2 THEN 'Bob' ELSE 'Cara' END"
            ),
            &[],
        )
        .expect("order check");
    assert_eq!(ordered, 3);
    check
        .batch_execute(&format!("DROP TABLE public.\"{table}\""))
        .expect("cleanup");
}

#[test]
fn not_null_violation_rolls_back_every_row() {
    let Some(url) = test_url() else { return };
    let table = unique_name("strict");
    let mut setup = session(&url);
    setup
        .batch_execute(&format!(
            "CREATE TABLE public.\"{table}\" (id SERIAL PRIMARY KEY, name TEXT, age TEXT NOT NULL)"
        ))
        .expect("create strict table");
    drop(setup);

    let request = ImportRequest::new(
        b"name,age\nA,1\nB,2\nC,\nD,4\nE,5\n".to_vec(),
        spec(&url),
        table.clone(),
    );
    match import(&request) {
        ImportOutcome::Failure(err) => {
            assert_eq!(err.kind(), ErrorKind::Row);
            assert!(err.to_string().contains("row 3"), "{err}");
        }
        other => panic!("expected row failure, got {other:?}"),
    }
    assert_eq!(count_rows(&url, &format!("public.\"{table}\"")), 0);

    session(&url)
        .batch_execute(&format!("DROP TABLE public.\"{table}\""))
        .expect("cleanup");
}

#[test]
fn custom_schema_is_created() {
    let Some(url) = test_url() else { return };
    let schema = unique_name("import");
    let request = ImportRequest::new(b"name\nAda\n".to_vec(), spec(&url), "people")
        .with_schema(schema.clone());
    let outcome = import(&request);
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(count_rows(&url, &format!("\"{schema}\".people")), 1);

    session(&url)
        .batch_execute(&format!("DROP SCHEMA \"{schema}\" CASCADE"))
        .expect("cleanup");
}

#[test]
fn concurrent_imports_into_a_new_table_all_succeed() {
    let Some(url) = test_url() else { return };
    let table = unique_name("race");
    let mut csv = String::from("name,score\n");
    for idx in 0..500 {
        csv.push_str(&format!("row{idx},{idx}\n"));
    }
    let request = ImportRequest::new(csv.into_bytes(), spec(&url), table.clone());

    let outcomes = std::thread::scope(|scope| {
        let handles = (0..4)
            .map(|_| scope.spawn(|| import(&request)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("import thread"))
            .collect::<Vec<_>>()
    });
    for outcome in &outcomes {
        assert_eq!(outcome.rows_imported(), Some(500), "{outcome:?}");
    }
    assert_eq!(count_rows(&url, &format!("public.\"{table}\"")), 2000);

    session(&url)
        .batch_execute(&format!("DROP TABLE public.\"{table}\""))
        .expect("cleanup");
}

#[test]
fn existing_typed_columns_receive_text_for_the_server_to_convert() {
    let Some(url) = test_url() else { return };
    let table = unique_name("typed");
    session(&url)
        .batch_execute(&format!(
            "CREATE TABLE public.\"{table}\" (id SERIAL PRIMARY KEY, name TEXT, age INTEGER)"
        ))
        .expect("create typed table");

    let request = ImportRequest::new(
        b"name,age\nAlice,30\nBob,25\n".to_vec(),
        spec(&url),
        table.clone(),
    );
    let outcome = import(&request);
    assert_eq!(outcome.rows_imported(), Some(2), "{outcome:?}");

    let bad = ImportRequest::new(b"name,age\nCara,thirty\n".to_vec(), spec(&url), table.clone());
    match import(&bad) {
        ImportOutcome::Failure(err) => {
            assert_eq!(err.kind(), ErrorKind::Row);
            assert!(err.to_string().contains("invalid input syntax"), "{err}");
        }
        other => panic!("expected row failure, got {other:?}"),
    }
    assert_eq!(count_rows(&url, &format!("public.\"{table}\"")), 2);

    session(&url)
        .batch_execute(&format!("DROP TABLE public.\"{table}\""))
        .expect("cleanup");
}
