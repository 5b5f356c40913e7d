mod common;

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

use common::{assert_port_released, free_port};
use exam_grader::battery::{ApiTestBattery, TestBattery, API_TEST_CASES};
use exam_grader::infrastructure::platform_terminator;
use exam_grader::models::{GradingRecord, ProcessState, Submission};
use exam_grader::services::{JsonFileStore, RecordSink, STARTUP_TEST_NAME};
use exam_grader::{Config, GradingOrchestrator};
use tempfile::TempDir;

fn test_config(port: u16) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port,
        cooldown_ms: 0,
        stabilize_delay_ms: 0,
        probe_interval_ms: 200,
        kill_grace_ms: 100,
        startup_timeout_secs: 2,
        ..Config::default()
    }
}

fn orchestrator(config: Config, results: &Path) -> GradingOrchestrator {
    let batteries: Vec<Box<dyn TestBattery>> = vec![Box::new(ApiTestBattery::from_config(&config))];
    GradingOrchestrator::new(
        config,
        batteries,
        Box::new(JsonFileStore::new(results)),
        platform_terminator(),
    )
    .unwrap()
}

fn write(dir: &Path, file: &str, content: &str) {
    let path = dir.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

async fn saved(results: &Path) -> Vec<GradingRecord> {
    JsonFileStore::new(results).load().await.unwrap()
}

#[tokio::test]
async fn test_missing_server_directory_scores_zero_without_launch() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("alice");
    fs::create_dir_all(&repo).unwrap();
    let results = tmp.path().join("results.json");

    let records = orchestrator(test_config(free_port()), &results)
        .grade_all(&[Submission::new("a1", "Alice", &repo)])
        .await
        .unwrap();

    let record = &records[0];
    assert!(!record.server_started);
    assert_eq!(record.total_score, 0);
    assert_eq!(record.max_score, 100);
    assert!(record.tests.is_empty());
    assert!(record.process_lifecycle.is_empty());
    assert_eq!(record.errors.len(), 1);

    assert_eq!(saved(&results).await, records);
}

#[tokio::test]
async fn test_missing_manifest_is_reported() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("bob");
    write(&repo, "backend/index.js", "console.log('hi')");
    let results = tmp.path().join("results.json");

    let records = orchestrator(test_config(free_port()), &results)
        .grade_all(&[Submission::new("b1", "Bob", &repo)])
        .await
        .unwrap();

    let record = &records[0];
    assert!(!record.server_started);
    assert_eq!(record.total_score, 0);
    assert!(record.errors.iter().any(|e| e.contains("package.json")), "{:?}", record.errors);
}

#[cfg(unix)]
#[tokio::test]
async fn test_server_that_never_listens_fails_startup() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("carol");
    write(&repo, "backend/package.json", r#"{"name":"c"}"#);
    // 用 sh 执行入口文件：进程一直活着，但从不监听端口
    write(&repo, "backend/index.js", "sleep 30\n");
    let results = tmp.path().join("results.json");
    let port = free_port();
    let config = Config {
        runtime_program: "sh".to_string(),
        ..test_config(port)
    };

    let records = orchestrator(config, &results)
        .grade_all(&[Submission::new("c1", "Carol", &repo)])
        .await
        .unwrap();

    let record = &records[0];
    assert!(!record.server_started);
    assert_eq!(record.tests.len(), 1);
    assert_eq!(record.tests[0].test_name, STARTUP_TEST_NAME);
    assert_eq!(record.tests[0].points, 0);
    assert_eq!(record.tests[0].max_points, 5);
    assert_eq!(record.skipped_tests.len(), API_TEST_CASES.len());
    assert_eq!(record.total_score, 0);
    assert_eq!(record.max_score, 100);
    assert!(record.is_consistent());
    assert_eq!(
        record.process_lifecycle,
        vec![
            ProcessState::NotStarted,
            ProcessState::Spawning,
            ProcessState::AwaitingReadiness,
            ProcessState::Failed,
            ProcessState::Terminating,
            ProcessState::Terminated,
        ]
    );
    assert_port_released(port);
}

#[tokio::test]
async fn test_duplicate_ids_rejected_before_grading() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results.json");
    let submissions = [
        Submission::new("x", "One", tmp.path().join("one")),
        Submission::new("x", "Two", tmp.path().join("two")),
    ];

    let result = orchestrator(test_config(free_port()), &results)
        .grade_all(&submissions)
        .await;

    assert!(result.is_err());
    assert!(!results.exists());
}

#[tokio::test]
async fn test_resume_skips_already_graded_submissions() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results.json");
    let first = Submission::new("s1", "First", tmp.path().join("first"));
    let second = Submission::new("s2", "Second", tmp.path().join("second"));

    let earlier = GradingRecord::zero(first.clone(), 100, "earlier run");
    JsonFileStore::new(&results).persist(&[earlier.clone()]).await.unwrap();

    let config = Config {
        resume: true,
        ..test_config(free_port())
    };
    let records = orchestrator(config, &results)
        .grade_all(&[first, second])
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0], earlier);
    assert_eq!(records[1].submission.id, "s2");
    assert_eq!(saved(&results).await.len(), 2);
}

fn python3_available() -> bool {
    StdCommand::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// 只会回答空列表的最小服务器，入口文件由 python3 执行
const EMPTY_LIST_SERVER: &str = r#"
import json, os
from http.server import BaseHTTPRequestHandler, HTTPServer

class Handler(BaseHTTPRequestHandler):
    def do_GET(self):
        body = json.dumps([]).encode()
        self.send_response(200)
        self.send_header("Content-Type", "application/json")
        self.send_header("Content-Length", str(len(body)))
        self.end_headers()
        self.wfile.write(body)

    def do_POST(self):
        self.send_response(405)
        self.send_header("Content-Length", "0")
        self.end_headers()

    def log_message(self, *args):
        pass

HTTPServer.allow_reuse_address = True
HTTPServer(("0.0.0.0", int(os.environ["PORT"])), Handler).serve_forever()
"#;

#[tokio::test]
async fn test_back_to_back_submissions_share_the_port() {
    if !python3_available() {
        eprintln!("python3 not found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let mut submissions = Vec::new();
    for id in ["p1", "p2"] {
        let repo = tmp.path().join(id);
        write(&repo, "backend/package.json", r#"{"name":"p"}"#);
        write(&repo, "backend/index.js", EMPTY_LIST_SERVER);
        submissions.push(Submission::new(id, id, &repo));
    }
    let results = tmp.path().join("results.json");
    let port = free_port();
    let config = Config {
        runtime_program: "python3".to_string(),
        startup_timeout_secs: 10,
        request_timeout_ms: 2000,
        ..test_config(port)
    };

    let records = orchestrator(config, &results)
        .grade_all(&submissions)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.server_started, "{:?}", record.errors);
        assert_eq!(record.tests.len(), 1 + API_TEST_CASES.len());
        assert_eq!(record.tests[0].points, 5);
        assert!(record.is_consistent());
        assert!(record.total_score < record.max_score);
        assert_eq!(record.process_lifecycle.last(), Some(&ProcessState::Terminated));
        assert!(record.process_lifecycle.contains(&ProcessState::Testing));
    }
    assert_port_released(port);
    assert_eq!(saved(&results).await.len(), 2);
}

#[tokio::test]
async fn test_persist_survives_sequence_and_reload() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("nested").join("results.json");
    let submissions: Vec<Submission> = (1..=3)
        .map(|i| Submission::new(format!("m{}", i), format!("Missing {}", i), tmp.path().join(format!("m{}", i))))
        .collect();

    let records = orchestrator(test_config(free_port()), &results)
        .grade_all(&submissions)
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    let reloaded = saved(&results).await;
    let ids: Vec<_> = reloaded.iter().map(|r| r.submission.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m2", "m3"]);
}
