use crate::common::{TestApp, routes};
use serde_json::json;

mod project_creation {
    use super::*;

    #[tokio::test]
    async fn derives_id_and_reveals_generated_password_once() {
        let app = TestApp::spawn().await;

        let res = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "Acme",
                    "name": "Shop",
                    "engineType": "postgres",
                    "engineVersion": "16",
                }),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["id"], "acme-shop");
        assert_eq!(res.body["owner"], "acme");
        assert_eq!(res.body["defaultCredentials"]["username"], "devdb");
        assert_eq!(res.body["defaultCredentials"]["databaseName"], "shop");
        let password = res.body["defaultCredentials"]["password"].as_str().unwrap();
        assert_eq!(password.len(), 24);

        let fetched = app.get(&routes::project("acme-shop")).await;
        assert_eq!(fetched.status, 200);
        assert!(fetched.body["defaultCredentials"].get("password").is_none());
    }

    #[tokio::test]
    async fn keeps_supplied_credentials() {
        let app = TestApp::spawn().await;

        let res = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "billing",
                    "engineType": "mysql",
                    "engineVersion": "8.0",
                    "credentials": {
                        "username": "app",
                        "password": "s3cret-pass",
                        "databaseName": "ledger",
                    },
                }),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["engineType"], "mysql");
        assert_eq!(res.body["defaultCredentials"]["username"], "app");
        assert_eq!(res.body["defaultCredentials"]["password"], "s3cret-pass");
        assert_eq!(res.body["defaultCredentials"]["databaseName"], "ledger");
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let app = TestApp::spawn().await;
        app.create_project("acme-a", "b").await;

        let res = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "a-b",
                    "engineType": "postgres",
                    "engineVersion": "16",
                }),
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn rejects_unsupported_engine_version() {
        let app = TestApp::spawn().await;

        let res = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "shop",
                    "engineType": "postgres",
                    "engineVersion": "9",
                }),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert!(res.body["message"].as_str().unwrap().contains("16"));
    }

    #[tokio::test]
    async fn rejects_invalid_names_and_backup_locations() {
        let app = TestApp::spawn().await;

        let bad_name = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "my_shop!",
                    "engineType": "postgres",
                    "engineVersion": "16",
                }),
            )
            .await;
        assert_eq!(bad_name.status, 400);

        let bad_backup = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "shop",
                    "engineType": "postgres",
                    "engineVersion": "16",
                    "backupLocation": "ftp://backups.example.com/db.dump",
                }),
            )
            .await;
        assert_eq!(bad_backup.status, 400);
        assert_eq!(bad_backup.code(), "VALIDATION_ERROR");

        // mysql cannot restore a postgres custom-format archive.
        let wrong_format = app
            .post(
                routes::PROJECTS,
                &json!({
                    "owner": "acme",
                    "name": "shop",
                    "engineType": "mysql",
                    "engineVersion": "8.0",
                    "backupLocation": "s3://devdb-backups/acme/shop.dump",
                }),
            )
            .await;
        assert_eq!(wrong_format.status, 400, "{}", wrong_format.text);
        assert_eq!(wrong_format.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let app = TestApp::spawn().await;

        let res = app.post_raw(routes::PROJECTS, "{\"owner\": ").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }
}

mod project_lookup {
    use super::*;

    #[tokio::test]
    async fn lists_projects_filtered_by_owner() {
        let app = TestApp::spawn().await;
        app.create_project("acme", "shop").await;
        app.create_project("acme", "blog").await;
        app.create_project("globex", "crm").await;

        let all = app.get(routes::PROJECTS).await;
        assert_eq!(all.status, 200);
        assert_eq!(all.body.as_array().unwrap().len(), 3);
        assert_eq!(all.body[0]["id"], "acme-shop");

        let acme = app.get(&format!("{}?owner=ACME", routes::PROJECTS)).await;
        let ids: Vec<&str> = acme
            .body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["acme-shop", "acme-blog"]);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.get(&routes::project("acme-missing")).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn detail_includes_databases() {
        let app = TestApp::spawn().await;
        let id = app.create_project("acme", "shop").await;
        let created = app.create_database(&id, "db1").await;
        assert_eq!(created.status, 201, "{}", created.text);

        let res = app.get(&routes::project(&id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["databases"][0]["name"], "db1");
        assert_eq!(res.body["databases"][0]["status"], "Running");
    }
}
