use crate::common::{TestApp, routes};
use serde_json::json;

mod database_creation {
    use super::*;

    #[tokio::test]
    async fn second_instance_clones_latest_snapshot_of_first() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        assert_eq!(id, "acme-shop");

        let first = app.create_database(&id, "db1").await;
        assert_eq!(first.status, 201, "{}", first.text);
        assert_eq!(first.body["strategy"], "freshEmpty");
        assert_eq!(first.body["restoredFromSnapshot"], false);
        assert_eq!(first.body["snapshotScheduled"], true);
        assert_eq!(first.body["port"], 5432);
        assert!(first.body["credentials"]["password"].is_string());

        let snapshots = app.wait_for_snapshots(&id).await;
        let snapshot = snapshots[0]["name"].as_str().unwrap().to_string();
        assert!(snapshot.starts_with("acme-shop-db1-data-"), "{snapshot}");
        assert_eq!(snapshots[0]["readyToUse"], true);
        assert_eq!(snapshots[0]["engineVersion"], "16");

        let second = app.create_database(&id, "db2").await;
        assert_eq!(second.status, 201, "{}", second.text);
        assert_eq!(second.body["strategy"], "cloneFromSnapshot");
        assert_eq!(second.body["restoredFromSnapshot"], true);
        assert_eq!(second.body["sourceSnapshot"], snapshot.as_str());
        assert_eq!(second.body["snapshotScheduled"], false);

        let volume = app
            .platform
            .volume("devdb", "acme-shop-db2-data")
            .expect("clone volume missing");
        assert_eq!(volume.source_snapshot.as_deref(), Some(snapshot.as_str()));
    }

    #[tokio::test]
    async fn existing_name_is_a_conflict() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        assert_eq!(app.create_database(&id, "db1").await.status, 201);

        let res = app.create_database(&id, "db1").await;

        assert_eq!(res.status, 409);
        assert_eq!(res.code(), "CONFLICT");
        assert_eq!(app.platform.calls("create_compute"), 1);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found_without_touching_the_platform() {
        let app = TestApp::spawn().await;

        let res = app.create_database("acme-missing", "db1").await;

        assert_eq!(res.status, 404);
        assert_eq!(app.platform.calls("create_volume"), 0);
        assert_eq!(app.platform.calls("create_namespace"), 0);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;

        let res = app.create_database(&id, "DB_1").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert_eq!(app.platform.calls("create_volume"), 0);
    }

    #[tokio::test]
    async fn unreachable_backup_is_rejected_before_provisioning() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;

        let res = app
            .post(
                &routes::databases(&id),
                &json!({
                    "name": "db1",
                    "backupLocation": "s3://devdb-backups/acme/acme-shop/missing.dump",
                }),
            )
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert!(
            res.body["message"]
                .as_str()
                .unwrap()
                .contains("Backup URL is not accessible")
        );
        assert_eq!(app.platform.calls("create_volume"), 0);
    }

    #[tokio::test]
    async fn platform_failure_is_an_internal_error() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        app.platform.fail_on("create_endpoint");

        let res = app.create_database(&id, "db1").await;

        assert_eq!(res.status, 500);
        assert_eq!(res.code(), "INTERNAL_ERROR");
    }
}

mod database_listing {
    use super::*;

    #[tokio::test]
    async fn lists_instances_sorted_by_name() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        for name in ["db2", "db1"] {
            assert_eq!(app.create_database(&id, name).await.status, 201);
        }

        let res = app.get(&routes::databases(&id)).await;

        assert_eq!(res.status, 200);
        let names: Vec<&str> = res.body["databases"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["db1", "db2"]);
        assert_eq!(
            res.body["databases"][0]["host"],
            "acme-shop-db1.devdb.svc.cluster.local"
        );
        assert!(res.body["databases"][0]["credentials"].get("password").is_none());
    }

    #[tokio::test]
    async fn empty_project_has_no_databases() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;

        let res = app.get(&routes::databases(&id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["databases"], json!([]));
    }
}

mod database_deletion {
    use super::*;

    #[tokio::test]
    async fn removes_compute_endpoint_and_volume() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        assert_eq!(app.create_database(&id, "db1").await.status, 201);

        let res = app.delete(&routes::database(&id, "db1")).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["name"], "db1");
        assert_eq!(res.body["projectId"], "acme-shop");
        assert_eq!(res.body["volumeDeleted"], true);
        assert!(!app.platform.has_endpoint("devdb", "acme-shop-db1"));
        assert!(app.platform.volume("devdb", "acme-shop-db1-data").is_none());

        let listed = app.get(&routes::databases(&id)).await;
        assert_eq!(listed.body["databases"], json!([]));
    }

    #[tokio::test]
    async fn same_derived_name_in_another_project_is_left_alone() {
        let app = TestApp::spawn().await;
        let shop = app.create_project("acme", "shop").await;
        let shop_db = app.create_project("acme", "shop-db").await;
        assert_eq!(app.create_database(&shop, "db-1").await.status, 201);

        let res = app.delete(&routes::database(&shop_db, "1")).await;
        assert_eq!(res.status, 404, "{}", res.text);
        assert!(app.platform.compute_spec("devdb", "acme-shop-db-1").is_some());
        assert!(app.platform.volume("devdb", "acme-shop-db-1-data").is_some());

        let res = app.create_database(&shop_db, "1").await;
        assert_eq!(res.status, 409, "{}", res.text);
        assert_eq!(res.code(), "CONFLICT");

        let listed = app.get(&routes::databases(&shop)).await;
        assert_eq!(listed.body["databases"][0]["name"], "db-1");
    }

    #[tokio::test]
    async fn missing_instance_is_not_found() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;

        let res = app.delete(&routes::database(&id, "db9")).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }
}
