//! Full export flow over HTTP: submit, poll, download to disk.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dats_jobs::{
    AlwaysConfirm, ClientConfig, JobTracker, Notifier, PollConfig, Severity, TerminalOutcome,
    WatchEnd,
};
use dats_types::{ExportJobParameters, ExportTarget};
use mockito::Server;
use serde_json::json;

#[derive(Default)]
struct Notes(Mutex<Vec<(String, Severity)>>);

impl Notifier for Notes {
    fn notify(&self, message: &str, severity: Severity) {
        self.0.lock().unwrap().push((message.to_string(), severity));
    }
}

fn export_read(status: &str, results_url: Option<&str>) -> String {
    json!({
        "id": "42",
        "status": status,
        "results_url": results_url,
        "parameters": {
            "export_job_type": "SINGLE_PROJECT_ALL_TAGS",
            "specific_export_job_parameters": {
                "export_job_type": "SINGLE_PROJECT_ALL_TAGS",
                "project_id": 1
            }
        },
        "created": "2024-05-01T10:00:00"
    })
    .to_string()
}

fn config(server: &Server, dir: &tempfile::TempDir) -> ClientConfig {
    ClientConfig {
        api_url: server.url(),
        content_url: server.url(),
        download_dir: dir.path().to_path_buf(),
        poll: PollConfig {
            interval_ms: 5,
            ..PollConfig::default()
        },
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn finished_export_is_saved_to_download_dir() {
    let mut server = Server::new_async().await;
    let _create = server
        .mock("POST", "/export")
        .with_status(200)
        .with_body(export_read("WAITING", None))
        .create_async()
        .await;
    let _poll = server
        .mock("GET", "/export/42")
        .with_status(200)
        .with_body(export_read("FINISHED", Some("exports/42.csv")))
        .create_async()
        .await;
    let file = server
        .mock("GET", "/exports/42.csv")
        .with_status(200)
        .with_body("tag_id,name\n1,climate\n")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir);
    let notes = Arc::new(Notes::default());
    let tracker = JobTracker::from_config(&config, notes.clone(), Box::new(AlwaysConfirm)).unwrap();

    let mut watch = tracker
        .submit(
            "export-tags",
            ExportJobParameters::new(ExportTarget::SingleProjectAllTags { project_id: 1 }),
        )
        .await
        .unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), watch.wait())
        .await
        .unwrap();
    assert!(matches!(end, WatchEnd::Terminal(_)));

    file.assert_async().await;
    let saved = std::fs::read_to_string(dir.path().join("42.csv")).unwrap();
    assert_eq!(saved, "tag_id,name\n1,climate\n");

    let notes = notes.0.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1, Severity::Success);
}

#[tokio::test]
async fn finished_export_without_url_ends_after_one_read() {
    let mut server = Server::new_async().await;
    let _create = server
        .mock("POST", "/export")
        .with_status(200)
        .with_body(export_read("WAITING", None))
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/export/42")
        .with_status(200)
        .with_body(export_read("FINISHED", None))
        .expect(1)
        .create_async()
        .await;
    let file = server
        .mock("GET", mockito::Matcher::Regex("^/exports/".into()))
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let notes = Arc::new(Notes::default());
    let tracker =
        JobTracker::from_config(&config(&server, &dir), notes.clone(), Box::new(AlwaysConfirm)).unwrap();

    let mut watch = tracker
        .submit(
            "export-tags",
            ExportJobParameters::new(ExportTarget::SingleProjectAllTags { project_id: 1 }),
        )
        .await
        .unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), watch.wait())
        .await
        .unwrap();
    assert!(
        matches!(end, WatchEnd::Terminal(TerminalOutcome::Finished { result: None, .. })),
        "got {end:?}"
    );
    // Several poll intervals: a live poll would hit the mock again.
    tokio::time::sleep(Duration::from_millis(60)).await;

    poll.assert_async().await;
    file.assert_async().await;
    assert!(tracker.active_jobs().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(
        *notes.0.lock().unwrap(),
        vec![(
            "Export job 42 finished without a result".to_string(),
            Severity::Error
        )]
    );
}
