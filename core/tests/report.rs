//! Summary report tests.

use cohort_core::{
    config::{GeneratorConfig, MetricsConfig},
    generator::CohortGenerator,
    metrics::build_kpis,
    report::{build_report, thousands, write_report, REPORT_FILE},
};

#[test]
fn thousands_separators() {
    assert_eq!(thousands(0), "0");
    assert_eq!(thousands(855), "855");
    assert_eq!(thousands(2495), "2,495");
    assert_eq!(thousands(1_234_567), "1,234,567");
}

#[test]
fn report_states_calibrated_totals() {
    let dataset = CohortGenerator::new(GeneratorConfig::calibrated_2022_2023())
        .unwrap()
        .generate()
        .unwrap()
        .dataset;
    let kpis = build_kpis(&dataset.clients, &dataset.engagements, &MetricsConfig::default()).unwrap();
    let report = build_report(&dataset, &kpis).unwrap();

    assert!(report.markdown.contains("- Total clients: 2,495"));
    assert!(report.markdown.contains("- Total exits: 2,261"));
    assert!(report.markdown.contains("- Exits to permanent housing: 855"));
    for program in ["HHCM", "SHI", "CEA", "OTHER_COC"] {
        assert!(report.markdown.contains(&format!("| {program} |")), "{program} missing");
    }

    assert!(report.watchlist_top.len() <= 10);
    assert!(report.watchlist_top.iter().all(|w| w.watch_flag));

    let equity_exits: u64 = report.equity.iter().map(|e| e.exited_clients).sum();
    let equity_perm: u64 = report.equity.iter().map(|e| e.perm_exits).sum();
    assert_eq!(equity_exits, 2261);
    assert_eq!(equity_perm, 855);
    assert!(report.equity.windows(2).all(|w| w[0].perm_rate >= w[1].perm_rate));
}

#[test]
fn report_is_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = CohortGenerator::new(GeneratorConfig::small_test())
        .unwrap()
        .generate()
        .unwrap()
        .dataset;
    let kpis = build_kpis(&dataset.clients, &dataset.engagements, &MetricsConfig::default()).unwrap();
    let report = build_report(&dataset, &kpis).unwrap();

    let paths = write_report(dir.path().join("outputs"), &report).unwrap();
    assert_eq!(
        paths.markdown.file_name().and_then(|n| n.to_str()),
        Some(REPORT_FILE)
    );
    let text = std::fs::read_to_string(&paths.markdown).unwrap();
    assert_eq!(text, report.markdown);
    assert!(paths.watchlist_top.exists());
}
