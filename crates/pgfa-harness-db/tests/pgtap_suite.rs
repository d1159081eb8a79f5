//! The numbered pgTAP suite, run through psql against a prepared database.
//!
//! Run with `cargo test -p pgfa-harness-db -- --ignored`.

#![forbid(unsafe_code)]

mod common;

use pgfa_harness_db::{ConnectOptions, PreparedDatabase, connect, install_default_view};
use pgfa_harness_tap::PsqlRunner;

#[test]
#[ignore = "requires a live PostgreSQL"]
fn pgtap_sql_files_pass() {
    let _serial = common::serial();
    let config = common::live_config();
    let layout = config.layout();
    let _prepared = PreparedDatabase::prepare(&config, &layout).unwrap();
    {
        let mut conn = connect(&config, &ConnectOptions::new()).unwrap();
        install_default_view(&mut conn, &layout, config.view_mode).unwrap();
    }

    let runner = PsqlRunner::from_config(&config);
    let scripts = layout.pgtap_files().unwrap();
    assert!(!scripts.is_empty(), "no pgTAP files under {}", layout.pgtap_dir().display());
    for script in &scripts {
        let outcome = runner.run(script).unwrap();
        if let Err(err) = outcome.into_result() {
            panic!("{err}");
        }
    }
}
