use chrono::{TimeZone, Utc};
use serde_json::json;
use server::platform::{Labels, SnapshotInfo, instance_labels};

use crate::common::{TestApp, routes};

fn seeded_snapshot(name: &str, hour: u32, ready: bool) -> SnapshotInfo {
    SnapshotInfo {
        name: name.to_string(),
        namespace: "devdb".to_string(),
        source_volume: Some("acme-shop-db1-data".to_string()),
        created_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()),
        ready_to_use: ready,
        labels: instance_labels("acme-shop", "db1"),
        annotations: Labels::new(),
    }
}

#[tokio::test]
async fn new_project_has_no_snapshots() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;

    let res = app.get(&routes::snapshots(&id)).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body, json!([]));
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.get(&routes::snapshots("acme-missing")).await;

    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn lists_newest_first_and_only_for_the_project() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;
    app.platform.insert_snapshot(seeded_snapshot("snap-a", 10, true));
    app.platform.insert_snapshot(seeded_snapshot("snap-c", 20, true));
    app.platform.insert_snapshot(seeded_snapshot("snap-b", 15, false));
    let mut foreign = seeded_snapshot("other", 23, true);
    foreign.labels = instance_labels("acme-blog", "db1");
    app.platform.insert_snapshot(foreign);

    let res = app.get(&routes::snapshots(&id)).await;

    let names: Vec<&str> = res
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["snap-c", "snap-b", "snap-a"]);
    assert_eq!(res.body[1]["readyToUse"], false);
}

#[tokio::test]
async fn clone_skips_snapshots_that_are_not_ready() {
    let app = TestApp::spawn().await;
    let id = app.create_project("acme", "shop").await;
    assert_eq!(app.create_database(&id, "db1").await.status, 201);
    app.wait_for_snapshots(&id).await;
    let mut pending = seeded_snapshot("acme-shop-db1-data-29990101000000", 0, false);
    pending.created_at = Some(Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap());
    app.platform.insert_snapshot(pending);

    let res = app.create_database(&id, "db2").await;

    assert_eq!(res.status, 201, "{}", res.text);
    assert_eq!(res.body["strategy"], "cloneFromSnapshot");
    assert_ne!(
        res.body["sourceSnapshot"],
        "acme-shop-db1-data-29990101000000"
    );
}

mod initialization {
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::common::{TestApp, routes};

    /// Capture a dump of a stand-in source database and return its location.
    async fn captured_backup(app: &TestApp) -> String {
        let source = app.create_project("acme", "source").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let res = app
            .post(
                &routes::backup(&source),
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
        res.body["location"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn seeds_a_snapshot_from_the_project_backup() {
        let app = TestApp::spawn().await;
        let location = captured_backup(&app).await;
        let id = app
            .create_project_with(json!({
                "owner": "acme",
                "name": "shop",
                "engineType": "postgres",
                "engineVersion": "16",
                "backupLocation": location,
            }))
            .await;

        let res = app.post(&routes::initialize_snapshot(&id), &json!({})).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["backupLocation"], location.as_str());
        assert_eq!(res.body["readyToUse"], true);
        let listed = app.get(&routes::snapshots(&id)).await;
        assert_eq!(listed.body.as_array().unwrap().len(), 1);
        assert_eq!(listed.body[0]["name"], res.body["name"]);
        let databases = app.get(&routes::databases(&id)).await;
        assert_eq!(databases.body, json!([]));
    }

    #[tokio::test]
    async fn project_without_backup_is_rejected() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;

        let res = app.post(&routes::initialize_snapshot(&id), &json!({})).await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert_eq!(app.platform.calls("create_volume"), 0);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app
            .post(&routes::initialize_snapshot("acme-missing"), &json!({}))
            .await;

        assert_eq!(res.status, 404);
    }
}
