mod common;

use captcha_client::{
    CaptchaImage, CaptchaRecord, Client, ConnectionStatus, Credentials, ErrorKind, SocketConfig,
    UploadOptions,
};
use common::{ScriptedServer, Step};
use serde_json::json;
use std::time::{Duration, Instant};

fn socket_client(server: &ScriptedServer, poll_interval: Duration) -> Client<captcha_client::SocketTransport> {
    Client::socket(
        Credentials::new("alice", "secret").unwrap(),
        SocketConfig::single("127.0.0.1", server.port).with_timeout(Duration::from_secs(4)),
    )
    .with_poll_interval(poll_interval)
}

fn unsolved() -> Step {
    Step::Reply(json!({"captcha": 42, "text": null, "is_correct": false}))
}

#[test]
fn test_decode_returns_solved_record() {
    let server = ScriptedServer::start(vec![vec![
        Step::Reply(json!({"user": 1, "balance": 100.0, "is_banned": false})),
        unsolved(),
        unsolved(),
        Step::Reply(json!({"captcha": 42, "text": "ab12", "is_correct": true})),
    ]]);
    let mut client = socket_client(&server, Duration::from_millis(20));

    let image = CaptchaImage::from_bytes(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec());
    let record = client
        .decode(&image, &UploadOptions::default(), Some(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(
        record,
        Some(CaptchaRecord {
            id: 42,
            text: Some("ab12".to_string()),
            is_correct: true,
        })
    );
    assert_eq!(server.commands(), vec!["login", "upload", "captcha", "captcha"]);
}

#[test]
fn test_decode_gives_up_at_deadline() {
    let mut script = vec![Step::Reply(json!({"user": 1}))];
    script.extend((0..50).map(|_| unsolved()));
    let server = ScriptedServer::start(vec![script]);
    let poll = Duration::from_millis(25);
    let timeout = Duration::from_millis(150);
    let mut client = socket_client(&server, poll);

    let started = Instant::now();
    let result = client
        .decode(
            &CaptchaImage::from_bytes(vec![1u8, 2, 3]),
            &UploadOptions::default(),
            Some(timeout),
        )
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result, None);
    assert!(elapsed < timeout + poll + Duration::from_millis(500), "took {:?}", elapsed);
    assert_eq!(client.transport().status(), ConnectionStatus::LoggedIn);
}

#[test]
fn test_banned_account_during_decode() {
    let server = ScriptedServer::start(vec![vec![
        Step::Reply(json!({"user": 1})),
        Step::Reply(json!({"error": "banned"})),
    ]]);
    let mut client = socket_client(&server, Duration::from_millis(10));

    let err = client
        .decode(&CaptchaImage::from_bytes(vec![1u8]), &UploadOptions::default(), None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(client.transport().status(), ConnectionStatus::Disconnected);
}
