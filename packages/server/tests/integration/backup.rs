use serde_json::json;
use tokio::net::TcpListener;

use crate::common::{TestApp, routes};

/// A local port that accepts TCP connections, standing in for the source
/// database during the reachability probe.
async fn reachable_source() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn captures_dump_and_restores_it_into_a_new_project() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;
    let (_source, port) = reachable_source().await;

    let res = app
        .post(
            &routes::backup(&id),
            &json!({
                "host": "127.0.0.1",
                "port": port,
                "username": "admin",
                "password": "pw",
                "database": "shop",
            }),
        )
        .await;

    assert_eq!(res.status, 201, "{}", res.text);
    assert_eq!(res.body["bucket"], "devdb-backups");
    let key = res.body["key"].as_str().unwrap();
    assert!(key.starts_with("acme/acme-shop/"), "{key}");
    assert!(key.ends_with(".dump"), "{key}");
    assert_eq!(res.body["sizeBytes"], 30);
    let location = res.body["location"].as_str().unwrap().to_string();
    assert_eq!(location, format!("s3://devdb-backups/{key}"));

    let restored = app
        .create_project_with(json!({
            "owner": "acme",
            "name": "shop-copy",
            "engineType": "postgres",
            "engineVersion": "16",
            "backupLocation": location,
        }))
        .await;
    let db = app.create_database(&restored, "db1").await;

    assert_eq!(db.status, 201, "{}", db.text);
    assert_eq!(db.body["strategy"], "restoreFromBackup");
    assert_eq!(db.body["sourceBackup"], location.as_str());
    let spec = app
        .platform
        .compute_spec("devdb", "acme-shop-copy-db1")
        .expect("compute unit missing");
    assert_eq!(spec.restore.map(|r| r.source), Some(location));
}

#[tokio::test]
async fn iam_auth_needs_no_password() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;
    let (_source, port) = reachable_source().await;

    let res = app
        .post(
            &routes::backup(&id),
            &json!({
                "host": "127.0.0.1",
                "port": port,
                "username": "iam_user",
                "useIamAuth": true,
                "database": "shop",
            }),
        )
        .await;

    assert_eq!(res.status, 201, "{}", res.text);
}

#[tokio::test]
async fn missing_password_is_a_validation_error() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;

    let res = app
        .post(
            &routes::backup(&id),
            &json!({
                "host": "127.0.0.1",
                "username": "admin",
                "database": "shop",
            }),
        )
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn unreachable_source_reports_backup_failure() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;
    let port = {
        let (listener, port) = reachable_source().await;
        drop(listener);
        port
    };

    let res = app
        .post(
            &routes::backup(&id),
            &json!({
                "host": "127.0.0.1",
                "port": port,
                "username": "admin",
                "password": "pw",
                "database": "shop",
            }),
        )
        .await;

    assert_eq!(res.status, 500);
    assert_eq!(res.code(), "BACKUP_FAILED");
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            &routes::backup("acme-missing"),
            &json!({
                "host": "127.0.0.1",
                "username": "admin",
                "password": "pw",
                "database": "shop",
            }),
        )
        .await;

    assert_eq!(res.status, 404);
}
