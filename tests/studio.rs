//! End-to-end tests: a real daemon on a real Unix socket, driven the
//! way a client would drive it.

use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use deadair::broadcast::EventKind;
use deadair::config::{Config, TimingSettings};
use deadair::daemon::{Daemon, DaemonClient, DaemonRequest, DaemonResponse};

fn test_config(temp: &TempDir) -> Config {
    Config {
        data_dir: temp.path().to_path_buf(),
        history_capacity: 10,
        timing: TimingSettings {
            // Long clocks so only explicit requests drive the studio.
            tick_interval_secs: 3600,
            rotation_interval_secs: 3600,
            stage_delay_min_secs: 0,
            stage_delay_max_secs: 0,
            dialogue_timeout_secs: 1,
            metrics_interval_secs: 3600,
        },
        ..Default::default()
    }
}

async fn start_daemon(config: &Config) -> JoinHandle<deadair::Result<()>> {
    let daemon = Daemon::new(config).expect("daemon should build");
    let join = tokio::spawn(async move { daemon.run().await });

    let socket = config.socket_path();
    for _ in 0..100 {
        if socket.exists() {
            return join;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("daemon socket never appeared at {:?}", socket);
}

async fn shut_down(client: &mut DaemonClient, join: JoinHandle<deadair::Result<()>>) {
    let response = client.request(DaemonRequest::Shutdown).await.unwrap();
    assert!(matches!(response, DaemonResponse::Shutdown));
    timeout(Duration::from_secs(10), join)
        .await
        .expect("daemon should exit after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_ping_and_shutdown() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let join = start_daemon(&config).await;

    let mut client = DaemonClient::connect(&config.to_daemon_config()).await.unwrap();
    let response = client.request(DaemonRequest::Ping).await.unwrap();
    assert!(matches!(response, DaemonResponse::Pong));

    shut_down(&mut client, join).await;

    // Socket and PID file are cleaned up on the way out.
    assert!(!config.socket_path().exists());
    assert!(!config.pid_path().exists());
}

#[tokio::test]
async fn test_forced_breakdown_streams_to_watchers() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let join = start_daemon(&config).await;
    let daemon_config = config.to_daemon_config();

    // One connection watches, another drives.
    let mut watcher = DaemonClient::connect(&daemon_config).await.unwrap();
    watcher.send(&DaemonRequest::Watch).await.unwrap();
    // Give the daemon a moment to subscribe the watcher.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = DaemonClient::connect(&daemon_config).await.unwrap();
    let response = client.request(DaemonRequest::ForceBreakdown).await.unwrap();
    assert!(matches!(response, DaemonResponse::Forced));

    // The watcher sees the full arc: started, six stages in order, ended.
    let mut stages = Vec::new();
    let mut saw_started = false;
    loop {
        let response = timeout(Duration::from_secs(10), watcher.recv())
            .await
            .expect("event feed stalled")
            .unwrap()
            .expect("feed closed early");
        let DaemonResponse::Event(event) = response else {
            panic!("expected an event on the watch feed");
        };
        match event.kind {
            EventKind::BreakdownStarted => {
                saw_started = true;
                assert_eq!(event.payload["reason"], "forced");
            }
            EventKind::BreakdownStage => {
                stages.push(event.payload["stage"].as_str().unwrap().to_string());
            }
            EventKind::BreakdownEnded => {
                assert_eq!(event.payload["completed"], true);
                break;
            }
            _ => {}
        }
    }
    assert!(saw_started);
    assert_eq!(stages, vec!["confusion", "realization", "panic", "denial", "acceptance", "amnesia"]);

    // The record landed in history.
    let response = client.request(DaemonRequest::History { limit: 10 }).await.unwrap();
    let DaemonResponse::History(records) = response else {
        panic!("expected history");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage_count, 6);
    assert!(records[0].completed);

    let response = client.request(DaemonRequest::Status).await.unwrap();
    let DaemonResponse::Status(status) = response else {
        panic!("expected status");
    };
    assert_eq!(status.breakdown_count, 1);
    assert!(!status.in_breakdown);

    shut_down(&mut client, join).await;
}

#[tokio::test]
async fn test_comment_round_trip() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let join = start_daemon(&config).await;

    let mut client = DaemonClient::connect(&config.to_daemon_config()).await.unwrap();

    // Benign comment: acknowledged, no breakdown.
    let response = client
        .request(DaemonRequest::Comment {
            text: "lovely weather graphics tonight".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(response, DaemonResponse::CommentAck { triggered: false }));

    // Awareness keyword: the desk cracks.
    let response = client
        .request(DaemonRequest::Comment {
            text: "wait, are you real?".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(response, DaemonResponse::CommentAck { triggered: true }));

    // Poll until the breakdown runs its course.
    let mut done = false;
    for _ in 0..100 {
        let response = client.request(DaemonRequest::Status).await.unwrap();
        if let DaemonResponse::Status(status) = response
            && !status.in_breakdown
            && status.breakdown_count == 1
        {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(done, "comment-triggered breakdown never completed");

    let response = client.request(DaemonRequest::History { limit: 1 }).await.unwrap();
    let DaemonResponse::History(records) = response else {
        panic!("expected history");
    };
    assert_eq!(records[0].trigger.to_string(), "comment");

    shut_down(&mut client, join).await;
}

#[tokio::test]
async fn test_status_reports_full_desk() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let join = start_daemon(&config).await;

    let mut client = DaemonClient::connect(&config.to_daemon_config()).await.unwrap();
    let response = client.request(DaemonRequest::Status).await.unwrap();
    let DaemonResponse::Status(status) = response else {
        panic!("expected status");
    };

    assert_eq!(status.on_air, "rex");
    assert_eq!(status.personas.len(), 3);
    assert!(status.personas.iter().all(|p| p.sanity_level == 100));
    assert!(status.next_breakdown_time > chrono::Utc::now());

    let response = client.request(DaemonRequest::Predict).await.unwrap();
    let DaemonResponse::Prediction(prediction) = response else {
        panic!("expected prediction");
    };
    assert!(prediction.time_until_minutes >= 0);
    assert!(prediction.confidence_percent <= 99);

    shut_down(&mut client, join).await;
}

#[tokio::test]
async fn test_custom_personas_from_file() {
    let temp = TempDir::new().unwrap();
    let personas_path = temp.path().join("personas.yml");
    std::fs::write(
        &personas_path,
        r#"
- id: gale
  name: Gale Force
  bias: weather-absolutist
"#,
    )
    .unwrap();

    let mut config = test_config(&temp);
    config.personas_file = Some(personas_path);
    let join = start_daemon(&config).await;

    let mut client = DaemonClient::connect(&config.to_daemon_config()).await.unwrap();
    let response = client.request(DaemonRequest::Status).await.unwrap();
    let DaemonResponse::Status(status) = response else {
        panic!("expected status");
    };
    assert_eq!(status.personas.len(), 4);
    assert!(status.personas.iter().any(|p| p.persona_id == "gale"));

    shut_down(&mut client, join).await;
}
