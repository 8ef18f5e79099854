use crate::common::{TestApp, routes};

#[tokio::test]
async fn health_reports_ok_and_version() {
    let app = TestApp::spawn().await;

    let res = app.get(routes::HEALTH).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "ok");
    assert_eq!(res.body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn every_response_carries_the_release() {
    let app = TestApp::spawn().await;

    let ok = app.get(routes::HEALTH).await;
    let missing = app.get(&routes::project("acme-missing")).await;

    assert_eq!(ok.headers["x-release"], "2026.10.1");
    assert_eq!(missing.status, 404);
    assert_eq!(missing.headers["x-release"], "2026.10.1");
}

#[tokio::test]
async fn openapi_document_lists_project_paths() {
    let app = TestApp::spawn().await;

    let res = app.get(routes::OPENAPI).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["info"]["title"], "devdb API");
    assert!(res.body["paths"]["/projects"].is_object());
    assert!(res.body["paths"]["/projects/{id}/databases/{name}"]["delete"].is_object());
    assert!(res.body["paths"]["/projects/{id}/snapshots/initialize"]["post"].is_object());
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = TestApp::spawn().await;

    let res = app
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{}{}", app.addr, routes::PROJECTS),
        )
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
}
