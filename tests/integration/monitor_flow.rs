//! Watching a remote run against a scripted campaign server

use std::time::Duration;

use fuzzkit::api::{Finding, FindingSeverity, MockCampaignApi};
use fuzzkit::monitor::{MonitorOptions, MonitorOutcome, RemoteMonitor, Severity};

fn finding(nid: &str, level: &str) -> Finding {
    Finding {
        nid: nid.to_string(),
        display_name: format!("{level} finding"),
        error_id: "heap_buffer_overflow".to_string(),
        severity: Some(FindingSeverity {
            level: Some(level.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_reports_only_findings_above_threshold() {
    let api = MockCampaignApi::new()
        .with_statuses(["PENDING", "RUNNING"])
        .with_findings(vec![vec![
            finding("f-low", "LOW"),
            finding("f-high", "HIGH"),
            finding("f-critical", "CRITICAL"),
        ]]);
    let options = MonitorOptions {
        duration: Some(Duration::from_secs(3600)),
        min_severity: Some(Severity::High),
        ..Default::default()
    };

    let outcome = RemoteMonitor::new(&api, options)
        .monitor("run-42")
        .await
        .unwrap();

    let MonitorOutcome::FindingsReported(findings) = outcome else {
        panic!("expected findings, got {outcome:?}");
    };
    let nids: Vec<_> = findings.iter().map(|f| f.nid.as_str()).collect();
    assert_eq!(nids, vec!["f-high", "f-critical"]);
    assert_eq!(api.status_calls(), 2);
    assert_eq!(api.findings_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runs_until_the_server_finishes() {
    let api = MockCampaignApi::new().with_statuses(["RUNNING", "RUNNING", "RUNNING", "SUCCEEDED"]);

    let outcome = RemoteMonitor::new(&api, MonitorOptions::default())
        .monitor("run-7")
        .await
        .unwrap();

    assert_eq!(outcome, MonitorOutcome::Finished);
    assert_eq!(api.status_calls(), 4);
    assert_eq!(api.findings_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unfiltered_monitoring_reports_low_findings() {
    let api = MockCampaignApi::new()
        .with_findings(vec![vec![], vec![finding("f-low", "LOW")]]);

    let outcome = RemoteMonitor::new(&api, MonitorOptions::default())
        .monitor("run-9")
        .await
        .unwrap();

    assert!(matches!(outcome, MonitorOutcome::FindingsReported(ref f) if f.len() == 1));
    assert_eq!(api.findings_calls(), 2);
}
