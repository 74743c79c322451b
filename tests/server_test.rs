use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use retail_pulse::pipeline::aggregation::{Aggregator, Dashboard};
use retail_pulse::pipeline::ingestion::IngestionPipeline;
use retail_pulse::pipeline::mapper::FieldMapper;
use retail_pulse::pipeline::storage::{InMemoryStorage, Storage};
use retail_pulse::server::{create_server, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const UPLOAD: &str = "\
Invoice Number,Transaction Type,Transaction Date,Store,Gross Quantity,Nett Invoice Value
INV1,IV,2024-01-10,Palladium,1,100.10
INV2,IV,2024-01-11,Palladium,2,200
INV3,IV,2024-01-12,Palladium,1,100
";

fn app() -> (Arc<dyn Storage>, axum::Router) {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let state = AppState {
        dashboard: Arc::new(Dashboard::new(storage.clone(), Aggregator::default())),
        pipeline: Arc::new(IngestionPipeline::new(storage.clone(), FieldMapper::default())),
    };
    (storage, create_server(state))
}

async fn send(app: &axum::Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, json))
}

fn upload(body: &str, actor: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/ingest/upload")
        .header("content-type", "text/csv");
    if let Some(actor) = actor {
        builder = builder.header("X-Actor", actor);
    }
    Ok(builder.body(Body::from(body.to_string()))?)
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn upload_then_query_rounded_kpis() -> Result<()> {
    let (_, app) = app();

    let (status, report) = send(&app, upload(UPLOAD, Some("maria"))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rows_accepted"], 3);

    let (status, kpis) = send(
        &app,
        get("/api/dashboard/kpis?start_date=2024-01-01&end_date=2024-01-31&store_location=Jacadi%20Palladium&sales_channel=")?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kpis["transaction_count"], 3);
    assert_eq!(kpis["net_quantity"], 4);
    assert_eq!(kpis["net_revenue"], 400.1);
    assert_eq!(kpis["average_transaction_value"], 133.37);
    assert_eq!(kpis["multi_item_percentage"], 33.33);

    let (_, latest) = send(&app, get("/api/dashboard/latest-date")?).await?;
    assert_eq!(latest["latest_date"], "2024-01-12");

    let (_, logs) = send(&app, get("/api/sync-logs?limit=5")?).await?;
    assert_eq!(logs[0]["triggered_by"], "maria");
    assert_eq!(logs[0]["source"], "manual_upload");
    assert_eq!(logs[0]["status"], "completed");
    Ok(())
}

#[tokio::test]
async fn empty_upload_is_unprocessable_and_logged_anonymously() -> Result<()> {
    let (storage, app) = app();

    let (status, body) = send(&app, upload("Customer\nsomeone\n", None)?).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap_or_default().contains("No valid records"));

    let logs = storage.list_sync_logs(1).await?;
    assert_eq!(logs[0].triggered_by, "anonymous");
    Ok(())
}

#[tokio::test]
async fn breakdown_requires_a_known_dimension() -> Result<()> {
    let (_, app) = app();
    send(&app, upload(UPLOAD, None)?).await?;

    let (status, groups) = send(&app, get("/api/dashboard/breakdown?by=store")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups["Jacadi Palladium"]["transaction_count"], 3);

    let (status, _) = send(&app, get("/api/dashboard/breakdown?by=region")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn health_reports_service() -> Result<()> {
    let (_, app) = app();
    let (status, body) = send(&app, get("/health")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn comparison_reports_every_window() -> Result<()> {
    let (_, app) = app();
    send(&app, upload(UPLOAD, None)?).await?;

    let (status, cmp) = send(&app, get("/api/dashboard/comparison")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cmp["current"]["start_date"], "2024-01-01");
    assert_eq!(cmp["current"]["end_date"], "2024-01-12");
    assert_eq!(cmp["current"]["kpis"]["net_revenue"], 400.1);
    assert_eq!(cmp["previous_month"]["start_date"], "2023-12-01");
    assert_eq!(cmp["previous_year"]["end_date"], "2023-01-12");
    assert_eq!(cmp["year_to_date"]["start_date"], "2023-04-01");
    assert_eq!(cmp["year_to_date"]["kpis"]["transaction_count"], 3);

    let (status, _) = send(&app, get("/api/dashboard/comparison?end_date=12/01/2024")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
