//! MlflowClient against a local fake tracking server.
//!
//! Each test stands up a warp server on an ephemeral port that answers the
//! handful of MLflow endpoints under test, then drives the real HTTP client
//! against it.

use registrar_tracking::{
    FileInfo, MlflowClient, MlflowConfig, RunInfo, RunStatus, Stage, TrackingClient,
    TrackingError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

fn client_for(addr: std::net::SocketAddr) -> MlflowClient {
    let mut config = MlflowConfig::new(format!("http://{addr}"));
    config.retry_backoff = Duration::from_millis(1);
    config.timeout = Duration::from_secs(5);
    MlflowClient::new(config).expect("client")
}

#[tokio::test]
async fn list_artifacts_follows_pagination() {
    let routes = warp::path!("api" / "2.0" / "mlflow" / "artifacts" / "list")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|q: HashMap<String, String>| {
            assert_eq!(q.get("run_id").map(String::as_str), Some("run-1"));
            if q.get("page_token").map(String::as_str) == Some("p2") {
                warp::reply::json(&json!({
                    "root_uri": "mlflow-artifacts:/0/run-1/artifacts",
                    "files": [{ "path": "metrics.json", "is_dir": false, "file_size": 12 }]
                }))
            } else {
                warp::reply::json(&json!({
                    "root_uri": "mlflow-artifacts:/0/run-1/artifacts",
                    "files": [{ "path": "model", "is_dir": true }],
                    "next_page_token": "p2"
                }))
            }
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let files = client_for(addr).list_artifacts("run-1", None).await.unwrap();
    assert_eq!(
        files,
        vec![FileInfo::dir("model"), FileInfo::file("metrics.json", 12)]
    );
}

#[tokio::test]
async fn repeated_page_token_ends_search() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let routes = warp::path!("api" / "2.0" / "mlflow" / "model-versions" / "search")
        .and(warp::get())
        .map(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            warp::reply::json(&json!({
                "model_versions": [{ "name": "sentiment_model", "version": n.to_string() }],
                "next_page_token": "same-page"
            }))
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let versions = client_for(addr)
        .search_model_versions("name='sentiment_model'")
        .await
        .unwrap();
    let numbers: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(numbers, vec!["1", "2"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn existing_registered_model_is_not_an_error() {
    let routes = warp::path!("api" / "2.0" / "mlflow" / "registered-models" / "create")
        .and(warp::post())
        .and(warp::body::json::<Value>())
        .map(|body: Value| {
            assert_eq!(body["name"], "sentiment_model");
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "error_code": "RESOURCE_ALREADY_EXISTS",
                    "message": "Registered Model (name=sentiment_model) already exists."
                })),
                StatusCode::BAD_REQUEST,
            )
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    client_for(addr)
        .create_registered_model("sentiment_model")
        .await
        .expect("already-exists should be treated as success");
}

#[tokio::test]
async fn missing_model_version_maps_to_not_found() {
    let routes = warp::path!("api" / "2.0" / "mlflow" / "model-versions" / "get").map(|| {
        warp::reply::with_status(
            warp::reply::json(&json!({
                "error_code": "RESOURCE_DOES_NOT_EXIST",
                "message": "Model Version (name=m, version=9) not found"
            })),
            StatusCode::NOT_FOUND,
        )
    });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let err = client_for(addr).get_model_version("m", "9").await.unwrap_err();
    assert!(matches!(err, TrackingError::NotFound(ref m) if m.contains("version=9")));
}

#[tokio::test]
async fn api_errors_carry_code_and_status() {
    let routes = warp::path!("api" / "2.0" / "mlflow" / "model-versions" / "create").map(|| {
        warp::reply::with_status(
            warp::reply::json(&json!({
                "error_code": "INVALID_PARAMETER_VALUE",
                "message": "source must be a valid URI"
            })),
            StatusCode::BAD_REQUEST,
        )
    });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let err = client_for(addr)
        .create_model_version("m", "bogus", None)
        .await
        .unwrap_err();
    match err {
        TrackingError::Api {
            status, error_code, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(error_code, "INVALID_PARAMETER_VALUE");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn transition_sends_stage_and_archive_flag() {
    let seen = Arc::new(Mutex::new(None::<Value>));
    let captured = Arc::clone(&seen);
    let routes = warp::path!("api" / "2.0" / "mlflow" / "model-versions" / "transition-stage")
        .and(warp::post())
        .and(warp::body::json::<Value>())
        .map(move |body: Value| {
            *captured.lock().unwrap() = Some(body);
            warp::reply::json(&json!({
                "model_version": {
                    "name": "sentiment_model",
                    "version": "4",
                    "current_stage": "Staging",
                    "status": "READY"
                }
            }))
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let mv = client_for(addr)
        .transition_model_version_stage("sentiment_model", "4", Stage::Staging, false)
        .await
        .unwrap();
    assert_eq!(mv.current_stage, Stage::Staging);

    let body = seen.lock().unwrap().clone().expect("request body");
    assert_eq!(body["stage"], "Staging");
    assert_eq!(body["version"], "4");
    assert_eq!(body["archive_existing_versions"], false);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let routes = warp::path!("api" / "2.0" / "mlflow" / "model-versions" / "search").map(move || {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            warp::reply::with_status(
                warp::reply::json(&json!({ "message": "upstream unavailable" })),
                StatusCode::SERVICE_UNAVAILABLE,
            )
        } else {
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "model_versions": [
                        { "name": "m", "version": "9", "current_stage": "None", "status": "READY" },
                        { "name": "m", "version": "10", "current_stage": "None", "status": "READY" }
                    ]
                })),
                StatusCode::OK,
            )
        }
    });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let versions = client_for(addr).search_model_versions("name='m'").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let routes = warp::path!("api" / "2.0" / "mlflow" / "runs" / "get").map(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        warp::reply::with_status(
            warp::reply::json(&json!({
                "error_code": "INVALID_PARAMETER_VALUE",
                "message": "bad run id"
            })),
            StatusCode::BAD_REQUEST,
        )
    });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    assert!(client_for(addr).get_run("nope").await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn artifacts_upload_through_proxy_with_basic_auth() {
    let uploads = Arc::new(Mutex::new(Vec::<(String, Option<String>, Vec<u8>)>::new()));
    let sink = Arc::clone(&uploads);
    let routes = warp::put()
        .and(warp::path!("api" / "2.0" / "mlflow-artifacts" / "artifacts" / ..))
        .and(warp::path::tail())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::bytes())
        .map(
            move |tail: warp::path::Tail, auth: Option<String>, body: warp::hyper::body::Bytes| {
                sink.lock()
                    .unwrap()
                    .push((tail.as_str().to_string(), auth, body.to_vec()));
                warp::reply::json(&json!({}))
            },
        );
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let mut config = MlflowConfig::new(format!("http://{addr}"));
    config.username = Some("owner".into());
    config.password = Some("token".into());
    let client = MlflowClient::new(config).unwrap();

    let run = RunInfo {
        run_id: "run-9".into(),
        experiment_id: "0".into(),
        artifact_uri: "mlflow-artifacts:/0/run-9/artifacts".into(),
        status: RunStatus::Running,
    };
    client
        .log_artifact(&run, "model/model.pkl", b"pickled".to_vec())
        .await
        .unwrap();

    let uploads = uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (path, auth, body) = &uploads[0];
    assert_eq!(path, "0/run-9/artifacts/model/model.pkl");
    assert!(auth.as_deref().is_some_and(|a| a.starts_with("Basic ")));
    assert_eq!(body, b"pickled");
}
