use dats_jobs::{ApiError, HttpJobApi, JobApi};
use dats_types::{
    CotaRefinementHyperparameters, CotaRefinementRequest, ExportJobParameters, ExportFormat,
    ExportTarget, JobKind, JobParameters, JobResult, JobStatus,
};
use mockito::{Matcher, Server};
use serde_json::json;

fn api(server: &Server, token: Option<&str>) -> HttpJobApi {
    HttpJobApi::with_client(reqwest::Client::new(), &server.url(), token.map(str::to_string))
}

fn export_read(status: &str, results_url: Option<&str>) -> serde_json::Value {
    json!({
        "id": "42",
        "status": status,
        "results_url": results_url,
        "parameters": {
            "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
            "export_format": "CSV",
            "specific_export_job_parameters": {
                "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
                "project_id": 1,
                "span_annotation_ids": [5, 6]
            }
        },
        "created": "2024-05-01T10:00:00.123456",
        "updated": "2024-05-01T10:00:05"
    })
}

#[tokio::test]
async fn create_export_posts_wire_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/export")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::Json(json!({
            "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
            "export_format": "JSON",
            "specific_export_job_parameters": {
                "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
                "project_id": 1,
                "span_annotation_ids": [5, 6]
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(export_read("WAITING", None).to_string())
        .expect(1)
        .create_async()
        .await;

    let params: JobParameters = ExportJobParameters::new(ExportTarget::SingleProjectSelectedSpanAnnotations {
        project_id: 1,
        span_annotation_ids: vec![5, 6],
    })
    .with_format(ExportFormat::Json)
    .into();

    let snapshot = api(&server, Some("secret")).create_job(&params).await.unwrap();
    assert_eq!(snapshot.id(), "42");
    assert_eq!(snapshot.kind(), JobKind::Export);
    assert_eq!(snapshot.status(), JobStatus::Waiting);
    assert!(snapshot.result().is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn get_finished_export_carries_locator() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/export/42")
        .with_status(200)
        .with_body(export_read("FINISHED", Some("/exports/42.csv")).to_string())
        .create_async()
        .await;

    let snapshot = api(&server, None).get_job(JobKind::Export, "42").await.unwrap();
    match snapshot.result() {
        Some(JobResult::Export(export)) => {
            assert_eq!(export.results_url, "/exports/42.csv");
            assert_eq!(export.file_name(), "42.csv");
        }
        other => panic!("expected export result, got {other:?}"),
    }
    assert!(snapshot.updated().is_some());
}

#[tokio::test]
async fn misspelled_erroneous_status_is_accepted() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/export/42")
        .with_status(200)
        .with_body(export_read("ERRORNEOUS", None).to_string())
        .create_async()
        .await;

    let snapshot = api(&server, None).get_job(JobKind::Export, "42").await.unwrap();
    assert_eq!(snapshot.status(), JobStatus::Erroneous);
}

#[tokio::test]
async fn finished_export_without_url_is_invalid() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/export/42")
        .with_status(200)
        .with_body(export_read("FINISHED", None).to_string())
        .create_async()
        .await;

    let err = api(&server, None).get_job(JobKind::Export, "42").await.unwrap_err();
    assert!(matches!(err, ApiError::Snapshot(_)), "got {err:?}");
}

#[tokio::test]
async fn status_codes_map_to_errors() {
    let mut server = Server::new_async().await;
    let _missing = server
        .mock("GET", "/llm/404")
        .with_status(404)
        .with_body("no such job")
        .create_async()
        .await;
    let _invalid = server
        .mock("POST", "/crawler")
        .with_status(422)
        .with_body(r#"{"detail":"urls: field required"}"#)
        .create_async()
        .await;
    let _down = server
        .mock("GET", "/crawler/1")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let api = api(&server, None);
    assert!(matches!(
        api.get_job(JobKind::Llm, "404").await,
        Err(ApiError::NotFound(body)) if body == "no such job"
    ));

    let params: JobParameters = dats_types::CrawlerJobParameters {
        project_id: 1,
        urls: vec!["https://example.org".into()],
    }
    .into();
    assert!(matches!(
        api.create_job(&params).await,
        Err(ApiError::Validation(body)) if body.contains("field required")
    ));

    assert!(matches!(
        api.get_job(JobKind::Crawler, "1").await,
        Err(ApiError::Status { status: 503, .. })
    ));
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/cota/refine/abc")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = api(&server, None)
        .get_job(JobKind::CotaRefinement, "abc")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

fn cota_read(status: &str, step: &str) -> serde_json::Value {
    json!({
        "id": "c-1",
        "status": status,
        "current_pipeline_step": step,
        "error_message": null,
        "cota": {"id": 3, "name": "Climate framing"},
        "created": "2024-05-01T10:00:00+00:00",
        "updated": null
    })
}

#[tokio::test]
async fn cota_refine_sends_body_only_with_hyperparameters() {
    let mut server = Server::new_async().await;
    let bare = server
        .mock("POST", "/cota/refine/3")
        .match_body(Matcher::Exact(String::new()))
        .with_status(200)
        .with_body(cota_read("WAITING", "None").to_string())
        .expect(1)
        .create_async()
        .await;

    let api = api(&server, None);
    let snapshot = api
        .create_job(&CotaRefinementRequest::new(3).into())
        .await
        .unwrap();
    assert_eq!(snapshot.kind(), JobKind::CotaRefinement);
    assert!(snapshot.progress().is_none());
    bare.assert_async().await;

    let tuned = server
        .mock("POST", "/cota/refine/3")
        .match_body(Matcher::Json(json!({"train_epochs": 5})))
        .with_status(200)
        .with_body(cota_read("RUNNING", "TRAIN_MODEL").to_string())
        .expect(1)
        .create_async()
        .await;

    let request = CotaRefinementRequest {
        cota_id: 3,
        hyperparameters: Some(CotaRefinementHyperparameters {
            train_epochs: Some(5),
            ..Default::default()
        }),
    };
    let snapshot = api.create_job(&request.into()).await.unwrap();
    assert_eq!(
        snapshot.progress().and_then(|p| p.description.as_deref()),
        Some("TRAIN_MODEL")
    );
    tuned.assert_async().await;
}

#[tokio::test]
async fn job_ids_are_path_escaped() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/cota/refine/a%2Fb")
        .with_status(200)
        .with_body(cota_read("FINISHED", "None").to_string())
        .expect(1)
        .create_async()
        .await;

    let snapshot = api(&server, None)
        .get_job(JobKind::CotaRefinement, "a/b")
        .await
        .unwrap();
    assert!(matches!(snapshot.result(), Some(JobResult::CotaRefinement(r)) if r.cota_id == 3));
    mock.assert_async().await;
}

fn llm_read(id: &str, created: &str) -> serde_json::Value {
    json!({
        "id": id,
        "status": "RUNNING",
        "num_steps_total": 4,
        "current_step": 1,
        "current_step_description": "Tagging document 1/4",
        "result": null,
        "parameters": {
            "llm_job_type": "DOCUMENT_TAGGING",
            "project_id": 7,
            "prompts": [],
            "specific_task_parameters": {
                "llm_job_type": "DOCUMENT_TAGGING",
                "sdoc_ids": [1, 2, 3, 4],
                "tag_ids": [9]
            }
        },
        "created": created,
        "updated": created
    })
}

#[tokio::test]
async fn list_llm_jobs_newest_first() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/llm/project/7")
        .with_status(200)
        .with_body(
            json!([
                llm_read("old", "2024-01-01T00:00:00"),
                llm_read("new", "2024-03-01T00:00:00"),
                llm_read("mid", "2024-02-01T00:00:00"),
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let jobs = api(&server, None).list_llm_jobs(7).await.unwrap();
    let ids: Vec<&str> = jobs.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
    assert_eq!(jobs[0].progress().and_then(|p| p.steps), Some((1, 4)));
}
