mod helpers;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use helpers::*;
use labnote_core::constants::PROCUREMENT_REQUESTS_PATH;
use labnote_core::models::{ProcurementRequest, ProcurementState};
use std::io::{Cursor, Read};
use std::time::Duration;

fn header<'a>(response: &'a axum_test::TestResponse, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
}

fn archive_names(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    archive.file_names().map(String::from).collect()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup_test_app().await;

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in_memory");
    assert_eq!(body["storage"], "healthy");
}

#[tokio::test]
async fn test_openapi_lists_make() {
    let app = setup_test_app().await;

    let response = app.client().get("/api/openapi.json").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let spec: serde_json::Value = response.json();
    assert!(spec["paths"]["/make"].is_object());
}

#[tokio::test]
async fn test_make_requires_api_key() {
    let app = setup_test_app().await;

    let response = app.client().get("/make").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = app
        .client()
        .get("/make")
        .add_header("Authorization", bearer("not-a-key"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = app
        .client()
        .get("/make")
        .add_header("Authorization", format!("Token {}", ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_format_falls_back_to_json() {
    let app = setup_test_app().await;

    let fallback = app
        .client()
        .get("/make")
        .add_query_param("format", "bogus")
        .add_query_param("type", "experiments")
        .add_query_param("id", "2 1")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    let json = app
        .client()
        .get("/make")
        .add_query_param("format", "json")
        .add_query_param("type", "experiments")
        .add_query_param("id", "2 1")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(fallback.status_code(), StatusCode::OK);
    assert_eq!(header(&fallback, "content-type"), "application/json");
    assert_eq!(fallback.as_bytes(), json.as_bytes());

    let entries: Vec<serde_json::Value> = fallback.json();
    let titles: Vec<&str> = entries.iter().map(|e| e["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Titration", "Buffer prep"]);
}

#[tokio::test]
async fn test_buffered_response_headers() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "csv")
        .add_query_param("type", "experiments")
        .add_query_param("id", "1")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "text/csv; charset=UTF-8");
    assert_eq!(header(&response, "cache-control"), "no-store");
    assert_eq!(
        header(&response, "content-size"),
        response.as_bytes().len().to_string()
    );
    let disposition = header(&response, "content-disposition");
    assert!(disposition.starts_with("inline; filename=\""));
    assert!(disposition.ends_with("-export.elabftw.csv\""));
    assert!(header(&response, "last-modified").ends_with(" GMT"));
}

#[tokio::test]
async fn test_csv_keeps_selection_order() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "csv")
        .add_query_param("type", "experiments")
        .add_query_param("id", "4 99 1")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,date,title"));
    assert!(lines[1].starts_with("4,"));
    assert!(lines[2].starts_with("1,"));
}

#[tokio::test]
async fn test_category_selection() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "json")
        .add_query_param("type", "experiments")
        .add_query_param("category", "5")
        .add_query_param("id", "4")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    let entries: Vec<serde_json::Value> = response.json();
    let mut ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_owner_outside_team_is_forbidden() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "csv")
        .add_query_param("type", "experiments")
        .add_query_param("owner", "1")
        .add_header("Authorization", bearer(EVE_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "ILLEGAL_ACTION");
}

#[tokio::test]
async fn test_sysadmin_report_requires_sysadmin() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "sysadminReport")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "sysadminReport")
        .add_header("Authorization", bearer(ROOT_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert_eq!(text.lines().count(), 5);
    assert!(text.starts_with("userid,"));
}

#[tokio::test]
async fn test_large_export_is_audited() {
    let app = setup_test_app().await;
    let ids = (1..=13).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "csv")
        .add_query_param("type", "experiments")
        .add_query_param("id", ids)
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let mut events = Vec::new();
    for _ in 0..50 {
        events = app.store.audit_events().await;
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].actor_id, 1);
    assert_eq!(events[0].body(), "User exported 13 entries");
}

#[tokio::test]
async fn test_export_at_threshold_is_not_audited() {
    let app = setup_test_app().await;
    let ids = (1..=12).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "json")
        .add_query_param("type", "experiments")
        .add_query_param("id", ids)
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(app.store.audit_events().await.is_empty());
}

#[tokio::test]
async fn test_zip_is_streamed_as_attachment() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "zip")
        .add_query_param("type", "items")
        .add_query_param("id", "10")
        .add_query_param("json", "1")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/zip");
    assert_eq!(header(&response, "x-accel-buffering"), "no");
    assert_eq!(header(&response, "cache-control"), "no-store");
    assert!(response.headers().get("content-size").is_none());
    let disposition = header(&response, "content-disposition");
    assert!(disposition.starts_with("attachment; filename=\""));
    assert!(disposition.ends_with("-export.elabftw.zip\""));

    let names = archive_names(response.as_bytes());
    assert!(names.iter().any(|n| n.ends_with("/Scale.pdf")));
    assert!(names.iter().any(|n| n.ends_with("/Scale.json")));
    assert!(names.iter().any(|n| n.ends_with("/attachment.txt")));
    assert!(names.iter().any(|n| n == "export-elabftw.json"));

    let mut archive = zip::ZipArchive::new(Cursor::new(response.as_bytes().to_vec())).unwrap();
    let attachment = names.iter().find(|n| n.ends_with("/attachment.txt")).unwrap();
    let mut content = String::new();
    archive
        .by_name(attachment)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "raw data");
}

#[tokio::test]
async fn test_empty_zip_is_valid() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "zip")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(archive_names(response.as_bytes()).is_empty());
}

#[tokio::test]
async fn test_eln_archive() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "eln")
        .add_query_param("type", "experiments")
        .add_query_param("id", "1 2")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/vnd.eln+zip");
    assert!(header(&response, "content-disposition").ends_with("-export.eln\""));

    let names = archive_names(response.as_bytes());
    assert!(names.iter().any(|n| n.ends_with("/ro-crate-metadata.json")));
    assert_eq!(
        names.iter().filter(|n| n.ends_with("/export-elabftw.json")).count(),
        2
    );
}

#[tokio::test]
async fn test_single_pdf_is_named_after_entity() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "pdf")
        .add_query_param("type", "experiments")
        .add_query_param("id", "3")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/pdf");
    assert!(response.as_bytes().starts_with(b"%PDF"));
    let disposition = header(&response, "content-disposition");
    assert!(disposition.contains("filename*=UTF-8''"));
    assert!(disposition.contains("Gr%C3%B6%C3%9Fe%20test"));
}

#[tokio::test]
async fn test_multiple_pdf() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "pdf")
        .add_query_param("type", "experiments")
        .add_query_param("id", "1 2")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(header(&response, "content-disposition").ends_with("-export.elabftw.pdf\""));
}

#[tokio::test]
async fn test_qr_png() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "qrpng")
        .add_query_param("type", "experiments")
        .add_query_param("id", "1")
        .add_query_param("size", "100")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert!(response.as_bytes().starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn test_scheduler_report() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "schedulerReport")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("id,item_id,item,"));

    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "schedulerReport")
        .add_query_param("start", "last tuesday")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_procurement_requests_path() {
    let app = setup_test_app().await;
    for (id, team) in [(1, 1), (2, 2)] {
        app.store
            .insert_procurement_request(ProcurementRequest {
                id,
                team,
                created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
                requester_fullname: "Ada Lovelace".to_string(),
                entity_id: 10,
                entity_title: "Scale".to_string(),
                quantity: 2,
                quantity_received: 0,
                body: None,
                state: ProcurementState::Pending,
            })
            .await;
    }

    let response = app
        .client()
        .get(PROCUREMENT_REQUESTS_PATH)
        .add_query_param("format", "csv")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("id,created_at,requester"));
    assert!(lines[1].starts_with("1,"));
    assert!(header(&response, "content-disposition").contains("procurement-requests"));

    // Same format on /make exports entities
    let response = app
        .client()
        .get("/make")
        .add_query_param("format", "csv")
        .add_header("Authorization", bearer(ADA_KEY))
        .await;
    assert!(response.text().starts_with("id,date,title"));
}
