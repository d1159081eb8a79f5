//! check_name coverage of a real pgFirstAid checkout.
//!
//! Point `PGFA_REPO_ROOT` at the checkout; without the SQL files these
//! tests print `SKIP:` and return.

#![forbid(unsafe_code)]

use pgfa_harness_core::{
    HarnessConfig, RepoLayout, pgtap_coverage, source_file_check_names, view_file_coverage,
};

fn checkout() -> Option<(HarnessConfig, RepoLayout)> {
    let config = HarnessConfig::from_env().expect("harness configuration from environment");
    let layout = config.layout();
    if layout.source_sql().is_file() {
        Some((config, layout))
    } else {
        eprintln!(
            "SKIP: {} not found; set PGFA_REPO_ROOT to a pgFirstAid checkout",
            layout.source_sql().display()
        );
        None
    }
}

#[test]
fn every_health_check_has_pgtap_coverage() {
    let Some((_, layout)) = checkout() else {
        return;
    };
    let report = pgtap_coverage(&layout).unwrap();
    assert!(
        report.missing_in_right.is_empty(),
        "Missing pgTAP coverage for health checks: {}",
        report.missing_in_right.join(", ")
    );
    assert!(
        report.extra_in_right.is_empty(),
        "pgTAP checks names the source never produces: {}",
        report.extra_in_right.join(", ")
    );
}

#[test]
fn selected_view_files_cover_all_health_checks() {
    let Some((config, layout)) = checkout() else {
        return;
    };
    assert!(!source_file_check_names(&layout.source_sql()).unwrap().is_empty());
    for report in view_file_coverage(&layout, config.view_mode).unwrap() {
        report.ensure().unwrap();
    }
}
