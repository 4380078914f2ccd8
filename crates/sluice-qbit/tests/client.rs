use std::path::PathBuf;
use std::time::Duration;

use httpmock::prelude::*;
use sluice_qbit::{QbitClient, QbitSettings};
use sluice_torrent_core::{DownloadEngine, EnginePreferences, FilePriority};

fn client_for(server: &MockServer) -> QbitClient {
    QbitClient::new(QbitSettings {
        base_url: server.base_url(),
        username: "admin".into(),
        password: "secret".into(),
        request_timeout: Duration::from_secs(5),
        save_path: PathBuf::from("/srv/downloads"),
    })
    .expect("client")
}

#[tokio::test]
async fn login_posts_credentials_and_reads_verdict() {
    let server = MockServer::start_async().await;
    let accepted = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/auth/login")
            .body_contains("username=admin")
            .body_contains("password=secret");
        then.status(200).body("Ok.");
    });

    let client = client_for(&server);
    assert!(client.login().await.expect("login"));
    accepted.assert();
}

#[tokio::test]
async fn rejected_credentials_report_false() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/v2/auth/login");
        then.status(200).body("Fails.");
    });

    let client = client_for(&server);
    assert!(!client.login().await.expect("login"));
}

#[tokio::test]
async fn expired_session_logs_in_once_then_degrades_to_empty() {
    let server = MockServer::start_async().await;
    let login = server.mock(|when, then| {
        when.method(POST).path("/api/v2/auth/login");
        then.status(200).body("Ok.");
    });
    let info = server.mock(|when, then| {
        when.method(GET).path("/api/v2/torrents/info");
        then.status(403);
    });

    let client = client_for(&server);
    assert!(client.list_tasks().await.is_empty());
    assert_eq!(login.hits(), 1);
    assert_eq!(info.hits(), 2);
}

#[tokio::test]
async fn file_listing_decodes_progress_and_availability() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/torrents/files")
            .query_param("hash", "abc123");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                r#"[{"index":0,"name":"Show/e01.mkv","size":2048,"progress":0.25,"availability":-1},
                    {"index":1,"name":"Show/e02.mkv","size":4096,"progress":1,"availability":3.5}]"#,
            );
    });

    let client = client_for(&server);
    let files = client.list_files("abc123").await;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "Show/e01.mkv");
    assert!(files[0].availability.abs() < f64::EPSILON);
    assert!((files[1].progress - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn malformed_listing_degrades_to_empty() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/api/v2/torrents/info");
        then.status(200).body("not json");
    });

    let client = client_for(&server);
    assert!(client.list_tasks().await.is_empty());
}

#[tokio::test]
async fn priority_update_joins_indices() {
    let server = MockServer::start_async().await;
    let prio = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/filePrio")
            .body_contains("hash=abc123")
            .body_contains("id=0%7C2%7C5")
            .body_contains("priority=1");
        then.status(200);
    });

    let client = client_for(&server);
    client
        .set_priority("abc123", &[0, 2, 5], FilePriority::Normal)
        .await
        .expect("priority");
    client
        .set_priority("abc123", &[], FilePriority::Skip)
        .await
        .expect("empty batch is a no-op");
    prio.assert_hits(1);
}

#[tokio::test]
async fn resume_falls_back_to_start_and_reannounces() {
    let server = MockServer::start_async().await;
    let resume = server.mock(|when, then| {
        when.method(POST).path("/api/v2/torrents/resume");
        then.status(404);
    });
    let start = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/start")
            .body_contains("hashes=abc123");
        then.status(200);
    });
    let reannounce = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/reannounce")
            .body_contains("hashes=abc123");
        then.status(200);
    });

    let client = client_for(&server);
    client.resume("abc123").await.expect("resume");
    resume.assert();
    start.assert();
    reannounce.assert();
}

#[tokio::test]
async fn add_task_is_paused_into_save_path() {
    let server = MockServer::start_async().await;
    let add = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/add")
            .body_contains("urls=magnet%3A%3Fxt%3Durn%3Abtih%3Aabc")
            .body_contains("paused=true")
            .body_contains("savepath=%2Fsrv%2Fdownloads")
            .body_contains("root_folder=true");
        then.status(200).body("Ok.");
    });

    let client = client_for(&server);
    client
        .add_task("magnet:?xt=urn:btih:abc")
        .await
        .expect("add");
    add.assert();
}

#[tokio::test]
async fn delete_and_force_start_send_flags() {
    let server = MockServer::start_async().await;
    let delete = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/delete")
            .body_contains("deleteFiles=true");
        then.status(200);
    });
    let force = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/torrents/setForceStart")
            .body_contains("value=true");
        then.status(200);
    });

    let client = client_for(&server);
    client.delete("abc123", true).await.expect("delete");
    client.force_start("abc123", true).await.expect("force");
    delete.assert();
    force.assert();
}

#[tokio::test]
async fn preferences_are_sent_as_json_field() {
    let server = MockServer::start_async().await;
    let prefs = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/app/setPreferences")
            .body_contains("json=")
            .body_contains("max_connec");
        then.status(200);
    });

    let client = client_for(&server);
    client
        .apply_preferences(&EnginePreferences::default())
        .await
        .expect("preferences");
    prefs.assert();
}

#[tokio::test]
async fn rejected_commands_surface_errors() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/v2/torrents/reannounce");
        then.status(500);
    });

    let client = client_for(&server);
    assert!(client.reannounce("abc123").await.is_err());
}
