#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use pipeduplex::channel::{Channel, ChannelConfig, ChannelHandlers, Confirm, EndpointPair, Role};

const WAIT: Duration = Duration::from_secs(5);

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/pdcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn spawn_cli(dir: &Path, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_pipeduplex"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .arg("--socket-dir")
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("cli should start")
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("cli did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn read_stdout(child: &mut Child) -> String {
    let mut out = String::new();
    if let Some(stdout) = child.stdout.as_mut() {
        stdout.read_to_string(&mut out).expect("stdout should be readable");
    }
    out
}

/// Library-side initiator that forwards received lines to the returned receiver.
fn initiator(dir: &Path) -> (Channel, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let pair = EndpointPair::parse("pipeA", "pipeB").expect("names should be valid");
    let config = ChannelConfig::new(pair, Role::Initiator)
        .with_socket_dir(dir)
        .with_handshake_timeout(WAIT);
    let channel = Channel::new(
        config,
        ChannelHandlers::new(move |_, line| {
            let _ = tx.send(line.to_string());
        }),
    );
    let result = channel
        .establish()
        .expect("establish should start")
        .wait();
    assert!(result.connected, "handshake failed: {}", result.detail);
    (channel, rx)
}

#[test]
fn echo_returns_each_message() {
    let dir = unique_temp_dir("echo");
    let mut child = spawn_cli(&dir, &["echo", "pipeA", "pipeB", "--role", "responder"]);

    let (channel, replies) = initiator(&dir);
    assert_eq!(channel.send("hello"), Confirm::Ok);
    assert_eq!(channel.send("world"), Confirm::Ok);
    assert_eq!(replies.recv_timeout(WAIT).unwrap(), "hello");
    assert_eq!(replies.recv_timeout(WAIT).unwrap(), "world");

    channel.close();
    let status = wait_for_exit(&mut child, WAIT);
    assert!(status.success(), "echo should exit cleanly after peer leaves");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_raw_lines_and_stops_after_count() {
    let dir = unique_temp_dir("listen");
    let mut child = spawn_cli(
        &dir,
        &[
            "--format", "raw", "listen", "pipeA", "pipeB", "--role", "responder", "--count", "2",
        ],
    );

    let (channel, _replies) = initiator(&dir);
    assert!(channel.send("one").is_ok());
    assert!(channel.send("two").is_ok());

    let status = wait_for_exit(&mut child, WAIT);
    assert!(status.success());
    assert_eq!(read_stdout(&mut child), "one\ntwo\n");

    channel.close();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_reaches_listen_as_json() {
    let dir = unique_temp_dir("send");
    let mut listener = spawn_cli(
        &dir,
        &[
            "--format", "json", "listen", "pipeA", "pipeB", "--role", "server", "--count", "1",
        ],
    );

    let mut sender = spawn_cli(
        &dir,
        &[
            "send", "pipeA", "pipeB", "--role", "client", "--timeout", "5s", "--data", "hi there",
        ],
    );
    assert!(wait_for_exit(&mut sender, WAIT).success());
    assert!(wait_for_exit(&mut listener, WAIT).success());

    let stdout = read_stdout(&mut listener);
    let message: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("listen should emit json");
    assert_eq!(message["payload"], "hi there");
    assert_eq!(message["from"], "initiator");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_wait_prints_echoed_reply() {
    let dir = unique_temp_dir("send-wait");
    let mut echo = spawn_cli(&dir, &["echo", "pipeA", "pipeB", "--role", "responder"]);

    let mut sender = spawn_cli(
        &dir,
        &[
            "--format", "raw", "send", "pipeA", "pipeB", "--role", "initiator", "--data", "ping",
            "--wait",
        ],
    );
    assert!(wait_for_exit(&mut sender, WAIT).success());
    assert_eq!(read_stdout(&mut sender), "ping\n");

    assert!(wait_for_exit(&mut echo, WAIT).success());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn handshake_timeout_returns_124() {
    let dir = unique_temp_dir("timeout");
    let mut child = spawn_cli(
        &dir,
        &["listen", "pipeA", "pipeB", "--role", "initiator", "--timeout", "200ms"],
    );

    let status = wait_for_exit(&mut child, WAIT);
    assert_eq!(status.code(), Some(124));
    assert!(
        !dir.join("pipeB.sock").exists(),
        "listening endpoint is removed after timeout"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_extended_reports_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_pipeduplex"))
        .arg("--format")
        .arg("json")
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(&stdout).expect("version should emit json");
    assert_eq!(
        payload.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
}
