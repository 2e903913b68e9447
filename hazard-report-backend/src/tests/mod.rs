use crate::storage::JsonFileStore;
use crate::{build_app, AppState};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::*;
use hazard_report_shared::api::{
    CreatedResponse, ErrorResponse, ExportRequest, OkResponse, ReportResponse, UploadResponse,
};
use hazard_report_shared::attachment::{Attachment, MAX_UPLOAD_BYTES};
use hazard_report_shared::report::{Report, ReportFields, ReportPatch, RiskLevel};
use hazard_report_shared::API_KEY_HEADER;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

const TEST_KEY: &str = "correct horse battery staple";

async fn setup_test_server(api_key: Option<&str>) -> (TestServer, TempDir) {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                "hazard_report_backend=debug,tower_http=debug,debug",
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let appstate = AppState::test(dir.path(), api_key).await;
    let shared_state = Arc::new(RwLock::new(appstate));
    let app: axum::Router = build_app(&shared_state).await;

    let config = TestServerConfig {
        expect_success_by_default: true,
        restrict_requests_with_http_schema: false,
        default_content_type: None,
        default_scheme: Some("http".into()),
        ..Default::default()
    };

    (
        TestServer::new_with_config(app, config).expect("Failed to start test server"),
        dir,
    )
}

fn api_key_header(key: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_static(key),
    )
}

fn sample_fields(applicant: &str) -> ReportFields {
    ReportFields {
        applicant_name: applicant.to_string(),
        inspection_date: "2025-02-14".to_string(),
        district: "Badulla".to_string(),
        ds_division: "Haputale".to_string(),
        gn_division: "Dambetenna".to_string(),
        observations: "Fresh cracks on the upslope side of the house".to_string(),
        risk_level: Some(RiskLevel::Moderate),
        recommendation: String::new(),
        attachments: Vec::new(),
    }
}

fn png_bytes() -> Vec<u8> {
    crate::pdf::tests::png_bytes(8, 8)
}

async fn create(server: &TestServer, fields: &ReportFields) -> i64 {
    let res = server.post("/api/reports").json(fields).await;
    res.assert_status(StatusCode::CREATED);
    let created = res.json::<CreatedResponse>();
    assert!(created.ok);
    created.id
}

async fn upload(server: &TestServer, name: &str, mime: &str, data: Vec<u8>) -> Attachment {
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(data).file_name(name).mime_type(mime),
    );
    let res = server.post("/api/upload").multipart(form).await;
    res.assert_status(StatusCode::CREATED);
    let body = res.json::<UploadResponse>();
    assert!(body.ok);
    body.file
}

#[tokio::test]
async fn test_failing_setup_server() {
    let dir = tempfile::tempdir().expect("tempdir");
    // a file where a directory needs to be
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").expect("write");
    JsonFileStore::open(&blocker.join("data/db.json"))
        .await
        .err()
        .expect("Should fail to open the report store");
}

#[tokio::test]
async fn test_api_report_crud() {
    let (server, _dir) = setup_test_server(None).await;

    let res = server.get("/api/reports").await;
    assert!(res.json::<Vec<Report>>().is_empty());

    let id = create(&server, &sample_fields("Nimal")).await;
    let other = create(&server, &sample_fields("Kamala")).await;
    assert_ne!(id, other);

    let res = server.get("/api/reports").await;
    let reports = res.json::<Vec<Report>>();
    assert_eq!(
        reports.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![id, other]
    );
    assert!(reports[0].created_at.is_some());

    let res = server.get(&format!("/api/reports/{}", id)).await;
    let report = res.json::<Report>();
    assert_eq!(report.fields.applicant_name, "Nimal");

    // partial update leaves everything else alone
    let res = server
        .put(&format!("/api/reports/{}", id))
        .json(&serde_json::json!({"riskLevel": "High", "recommendation": "Relocate"}))
        .await;
    let updated = res.json::<ReportResponse>();
    assert!(updated.ok);
    assert_eq!(updated.report.id, id);
    assert_eq!(updated.report.created_at, report.created_at);
    assert_eq!(updated.report.fields.risk_level, Some(RiskLevel::High));
    assert_eq!(updated.report.fields.recommendation, "Relocate");
    assert_eq!(updated.report.fields.applicant_name, "Nimal");
    assert_eq!(updated.report.fields.district, "Badulla");

    let res = server.get(&format!("/api/reports/{}", id)).await;
    assert_eq!(res.json::<Report>(), updated.report);

    let res = server
        .put("/api/reports/424242")
        .json(&ReportPatch::default())
        .expect_failure()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("Report not found"));

    let res = server.get("/api/reports/424242").expect_failure().await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_create_rejects_non_json() {
    let (server, _dir) = setup_test_server(None).await;
    let res = server
        .post("/api/reports")
        .content_type("application/json")
        .text("{ nope")
        .expect_failure()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let body = res.json::<ErrorResponse>();
    assert!(!body.ok);
}

#[tokio::test]
async fn test_api_update_replaces_attachments_wholesale() {
    let (server, _dir) = setup_test_server(None).await;
    let first = upload(&server, "first.png", "image/png", png_bytes()).await;
    let second = upload(&server, "second.png", "image/png", png_bytes()).await;

    let mut fields = sample_fields("Sunil");
    fields.attachments = vec![first];
    let id = create(&server, &fields).await;

    let res = server
        .put(&format!("/api/reports/{}", id))
        .json(&ReportPatch {
            attachments: Some(vec![second.clone()]),
            ..Default::default()
        })
        .await;
    assert_eq!(res.json::<ReportResponse>().report.fields.attachments, vec![second]);
}

#[tokio::test]
async fn test_api_upload() {
    let (server, _dir) = setup_test_server(None).await;

    let data = png_bytes();
    let file = upload(&server, "site photo.png", "image/png", data.clone()).await;
    debug!("Uploaded {:?}", file);
    assert_eq!(file.name, "site photo.png");
    assert_eq!(file.content_type, "image/png");
    assert_eq!(file.size, data.len() as u64);
    let stored = file.stored_name.clone().expect("stored name");
    assert!(stored.ends_with("-site_photo.png"));
    assert!(file.url.ends_with(&format!("/uploads/{}", stored)));
    assert!(file.url.starts_with("http://"));

    // served back as-is
    let res = server.get(&format!("/uploads/{}", stored)).await;
    assert_eq!(res.as_bytes().to_vec(), data);

    let pdf = upload(&server, "plan.pdf", "application/pdf", b"%PDF-1.4\n".to_vec()).await;
    assert_eq!(pdf.content_type, "application/pdf");
}

#[tokio::test]
async fn test_api_upload_rejections() {
    let (server, dir) = setup_test_server(None).await;

    let too_big = vec![0u8; MAX_UPLOAD_BYTES as usize + 1];
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(too_big).file_name("big.png").mime_type("image/png"),
    );
    let res = server
        .post("/api/upload")
        .multipart(form)
        .expect_failure()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert!(!res.json::<ErrorResponse>().ok);

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"plain text".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let res = server
        .post("/api/upload")
        .multipart(form)
        .expect_failure()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let form = MultipartForm::new().add_text("comment", "forgot the file");
    let res = server
        .post("/api/upload")
        .multipart(form)
        .expect_failure()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("No file uploaded"));

    let stored = std::fs::read_dir(dir.path().join("uploads"))
        .expect("uploads dir")
        .count();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_api_delete_report_cascades() {
    let (server, _dir) = setup_test_server(None).await;
    let kept = upload(&server, "kept.png", "image/png", png_bytes()).await;
    let photo = upload(&server, "photo.png", "image/png", png_bytes()).await;
    let plan = upload(&server, "plan.pdf", "application/pdf", b"%PDF-1.4\n".to_vec()).await;

    let mut fields = sample_fields("Ruwan");
    fields.attachments = vec![photo.clone(), plan.clone()];
    let id = create(&server, &fields).await;

    let res = server.delete(&format!("/api/reports/{}", id)).await;
    assert!(res.json::<OkResponse>().ok);

    let res = server.get("/api/reports").await;
    assert!(res.json::<Vec<Report>>().is_empty());

    for gone in [&photo, &plan] {
        let name = gone.stored_name.clone().expect("stored name");
        server
            .get(&format!("/uploads/{}", name))
            .expect_failure()
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
    let kept_name = kept.stored_name.clone().expect("stored name");
    server.get(&format!("/uploads/{}", kept_name)).await;

    server
        .delete(&format!("/api/reports/{}", id))
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_delete_upload_with_report_id() {
    let (server, _dir) = setup_test_server(None).await;
    let a = upload(&server, "a.png", "image/png", png_bytes()).await;
    let b = upload(&server, "b.png", "image/png", png_bytes()).await;

    let mut fields = sample_fields("Chamari");
    fields.attachments = vec![a.clone(), b.clone()];
    let id = create(&server, &fields).await;

    let a_name = a.stored_name.clone().expect("stored name");
    let res = server
        .delete(&format!("/api/uploads/{}", a_name))
        .add_query_param("reportId", id)
        .await;
    assert!(res.json::<OkResponse>().ok);

    let res = server.get(&format!("/api/reports/{}", id)).await;
    assert_eq!(res.json::<Report>().fields.attachments, vec![b]);

    let res = server
        .delete(&format!("/api/uploads/{}", a_name))
        .expect_failure()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("File not found"));
}

#[tokio::test]
async fn test_api_unparseable_ids_get_json_errors() {
    let (server, dir) = setup_test_server(None).await;

    for res in [
        server.get("/api/reports/abc").expect_failure().await,
        server
            .put("/api/reports/abc")
            .json(&ReportPatch::default())
            .expect_failure()
            .await,
        server.delete("/api/reports/abc").expect_failure().await,
    ] {
        res.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("Report not found"));
    }

    let photo = upload(&server, "slope.png", "image/png", png_bytes()).await;
    let mut fields = sample_fields("Ruwan");
    fields.attachments = vec![photo.clone()];
    let id = create(&server, &fields).await;

    // a junk reportId is ignored, the file still goes
    let stored = photo.stored_name.clone().expect("stored name");
    let res = server
        .delete(&format!("/api/uploads/{}", stored))
        .add_query_param("reportId", "abc")
        .await;
    assert!(res.json::<OkResponse>().ok);
    assert!(!dir.path().join("uploads").join(&stored).exists());
    let res = server.get(&format!("/api/reports/{}", id)).await;
    assert_eq!(res.json::<Report>().fields.attachments, vec![photo]);

    let res = server
        .delete("/api/uploads/nothere.png")
        .add_query_param("reportId", "abc")
        .expect_failure()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("File not found"));
}

#[tokio::test]
async fn test_api_update_clears_risk_level() {
    let (server, _dir) = setup_test_server(None).await;
    let mut fields = sample_fields("Anoma");
    fields.risk_level = Some(RiskLevel::High);
    let id = create(&server, &fields).await;

    let res = server
        .put(&format!("/api/reports/{}", id))
        .json(&serde_json::json!({"recommendation": "Monitor"}))
        .await;
    let report = res.json::<ReportResponse>().report;
    assert_eq!(report.fields.risk_level, Some(RiskLevel::High));

    let res = server
        .put(&format!("/api/reports/{}", id))
        .json(&serde_json::json!({"riskLevel": ""}))
        .await;
    let report = res.json::<ReportResponse>().report;
    assert_eq!(report.fields.risk_level, None);
    assert_eq!(report.fields.recommendation, "Monitor");

    let res = server.get(&format!("/api/reports/{}", id)).await;
    assert_eq!(res.json::<Report>().fields.risk_level, None);
}

#[tokio::test]
async fn test_api_export_pdf() {
    let (server, _dir) = setup_test_server(None).await;
    let photo = upload(&server, "photo.png", "image/png", png_bytes()).await;
    let mut fields = sample_fields("Dilani");
    fields.attachments = vec![photo];
    let id = create(&server, &fields).await;

    // one real id, one unknown one
    let res = server
        .post("/api/export/pdf")
        .json(&ExportRequest::for_ids(vec![id, 999]))
        .await;
    res.assert_status_ok();
    assert_eq!(
        res.header(CONTENT_TYPE),
        HeaderValue::from_static("application/pdf")
    );
    assert_eq!(
        res.header(CONTENT_DISPOSITION),
        HeaderValue::from_static("attachment; filename=\"reports.pdf\"")
    );
    let bytes = res.as_bytes().to_vec();
    assert!(bytes.starts_with(b"%PDF-"));
    let doc = lopdf::Document::load_mem(&bytes).expect("valid pdf");
    assert_eq!(doc.get_pages().len(), 1);

    let res = server
        .post("/api/export/pdf")
        .json(&serde_json::json!({ "id": id }))
        .await;
    res.assert_status_ok();

    let res = server
        .post("/api/export/pdf")
        .json(&ExportRequest::for_ids(vec![999]))
        .expect_failure()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("No reports found"));

    server
        .post("/api/export/pdf")
        .json(&ExportRequest::default())
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_export_pdf_multiple_reports() {
    let (server, _dir) = setup_test_server(None).await;
    let first = create(&server, &sample_fields("One")).await;
    let second = create(&server, &sample_fields("Two")).await;

    let res = server
        .post("/api/export/pdf")
        .json(&ExportRequest::for_ids(vec![second, first, second]))
        .await;
    let doc = lopdf::Document::load_mem(res.as_bytes()).expect("valid pdf");
    let pages: Vec<String> = doc
        .get_pages()
        .values()
        .map(|page| {
            String::from_utf8_lossy(&doc.get_page_content(*page).expect("content")).to_string()
        })
        .collect();
    // request order, duplicate dropped
    assert_eq!(pages.len(), 2);
    assert!(pages[0].contains(&format!("(Report ID: {}) Tj", second)));
    assert!(pages[1].contains(&format!("(Report ID: {}) Tj", first)));
}

#[tokio::test]
async fn test_api_key_gate() {
    let (server, _dir) = setup_test_server(Some(TEST_KEY)).await;

    // reads, creates and uploads stay open
    let id = create(&server, &sample_fields("Gated")).await;
    server.get("/api/reports").await;
    server.get(&format!("/api/reports/{}", id)).await;
    let file = upload(&server, "open.png", "image/png", png_bytes()).await;

    let res = server
        .put(&format!("/api/reports/{}", id))
        .json(&ReportPatch::default())
        .expect_failure()
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<ErrorResponse>(), ErrorResponse::new("Unauthorized"));

    let (name, _) = api_key_header(TEST_KEY);
    server
        .put(&format!("/api/reports/{}", id))
        .add_header(name.clone(), HeaderValue::from_static("wrong"))
        .json(&ReportPatch::default())
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let stored = file.stored_name.clone().expect("stored name");
    server
        .delete(&format!("/api/uploads/{}", stored))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/api/export/pdf")
        .json(&ExportRequest::for_ids(vec![id]))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .delete(&format!("/api/reports/{}", id))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // and with the right key everything goes through
    let (name, value) = api_key_header(TEST_KEY);
    server
        .put(&format!("/api/reports/{}", id))
        .add_header(name.clone(), value.clone())
        .json(&ReportPatch::default())
        .await;
    server
        .post("/api/export/pdf")
        .add_header(name.clone(), value.clone())
        .json(&ExportRequest::for_ids(vec![id]))
        .await;
    server
        .delete(&format!("/api/uploads/{}", stored))
        .add_header(name.clone(), value.clone())
        .await;
    server
        .delete(&format!("/api/reports/{}", id))
        .add_header(name, value)
        .await;
}

#[tokio::test]
async fn test_openapi_json() {
    let (server, _dir) = setup_test_server(None).await;
    let res = server.get(crate::openapi::OPENAPI_JSON_PATH).await;
    let doc = res.json::<serde_json::Value>();
    assert!(doc["paths"]["/api/reports"].is_object());
    assert!(doc["paths"]["/api/export/pdf"].is_object());
}

#[tokio::test]
async fn test_cache_control_on_ok() {
    let (server, _dir) = setup_test_server(None).await;
    let res = server.get("/api/reports").await;
    assert_eq!(
        res.header(axum::http::header::CACHE_CONTROL),
        HeaderValue::from_static("private, no-transform max-age=0")
    );
}
