#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tokio::net::{UnixListener, UnixStream};
use vppmux::adapter::frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE};
use vppmux::adapter::socket::{MessageTableEntry, SockclntCreate, SockclntCreateReply};
use vppmux::api::codec::peek_msg_id;
use vppmux::api::{ControlPingReply, MessageType, MsgCodec};

const PING_ID: u16 = 100;
const PING_REPLY_ID: u16 = 101;
const VPE_PID: u32 = 31337;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "vppmux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

async fn run_cli(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_vppmux"))
            .args(&args)
            .output()
            .expect("vppmux should run")
    })
    .await
    .expect("cli task should finish")
}

fn args(items: &[&str], socket: &Path) -> Vec<String> {
    items
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(socket.display().to_string()))
        .collect()
}

/// Serve VPP clients one after another: register them, answer control
/// pings, ignore everything else.
async fn fake_vpp(listener: UnixListener) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(serve_client(stream));
    }
}

async fn serve_client(stream: UnixStream) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, DEFAULT_MAX_FRAME_SIZE);
    let mut writer = FrameWriter::new(write_half, DEFAULT_MAX_FRAME_SIZE);
    let codec = MsgCodec::new();

    let Ok(data) = reader.read_frame().await else {
        return;
    };
    let mut create = SockclntCreate::default();
    codec.decode_msg(&data, &mut create).expect("sockclnt_create should decode");
    let context = codec
        .decode_msg_context(&data, MessageType::Request)
        .expect("context should decode");
    let reply = SockclntCreateReply {
        response: 0,
        index: 1,
        message_table: vec![
            MessageTableEntry {
                index: PING_ID,
                name: "control_ping_51077d14".to_string(),
            },
            MessageTableEntry {
                index: PING_REPLY_ID,
                name: "control_ping_reply_f6b0b8ca".to_string(),
            },
            MessageTableEntry {
                index: 17,
                name: "sockclnt_delete_8ac76db6".to_string(),
            },
        ],
    };
    let out = codec
        .encode_msg_with_context(&reply, 16, context)
        .expect("reply should encode");
    if writer.write_frame(&out).await.is_err() {
        return;
    }

    while let Ok(data) = reader.read_frame().await {
        if peek_msg_id(&data).ok() != Some(PING_ID) {
            continue;
        }
        let Ok(context) = codec.decode_msg_context(&data, MessageType::Request) else {
            continue;
        };
        let pong = ControlPingReply {
            retval: 0,
            client_index: 1,
            vpe_pid: VPE_PID,
        };
        let Ok(out) = codec.encode_msg_with_context(&pong, PING_REPLY_ID, context) else {
            continue;
        };
        if writer.write_frame(&out).await.is_err() {
            return;
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn version_prints_package_version() {
    let output = run_cli(vec!["version".to_string()]).await;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("vppmux {}", env!("CARGO_PKG_VERSION"))
    );

    let output = run_cli(vec!["version".to_string(), "--extended".to_string()]).await;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("name: vppmux"));
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_reports_replies_as_json() {
    let dir = unique_temp_dir("ping");
    let socket = dir.join("api.sock");
    let server = tokio::spawn(fake_vpp(UnixListener::bind(&socket).expect("bind")));

    let output = run_cli(args(
        &[
            "--log-level",
            "error",
            "--format",
            "json",
            "ping",
            "--count",
            "2",
            "--interval",
            "10ms",
            "--timeout",
            "2s",
        ],
        &socket,
    ))
    .await;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["sent"], 2);
    assert_eq!(summary["received"], 2);
    assert_eq!(summary["replies"][0]["vpe_pid"], VPE_PID);
    assert_eq!(summary["replies"][1]["seq"], 2);

    server.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_missing_socket_times_out() {
    let dir = unique_temp_dir("ping-missing");
    let socket = dir.join("api.sock");

    let output = run_cli(args(
        &["--log-level", "error", "ping", "--timeout", "200ms"],
        &socket,
    ))
    .await;
    assert_eq!(output.status.code(), Some(124));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: VPP not ready"), "stderr: {stderr}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn watch_prints_connected_event() {
    let dir = unique_temp_dir("watch");
    let socket = dir.join("api.sock");
    let server = tokio::spawn(fake_vpp(UnixListener::bind(&socket).expect("bind")));

    let output = run_cli(args(
        &[
            "--log-level",
            "error",
            "--format",
            "json",
            "watch",
            "--count",
            "1",
        ],
        &socket,
    ))
    .await;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let event: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(event["state"], "connected");
    assert!(event["error"].is_null());

    server.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_a_usage_error() {
    let dir = unique_temp_dir("config");
    let config = dir.join("vppmux.json");
    std::fs::write(&config, r#"{"reply-timeout": "0ms"}"#).expect("config should be writable");

    let output = run_cli(vec![
        "--config".to_string(),
        config.display().to_string(),
        "version".to_string(),
    ])
    .await;
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("reply-timeout"));

    let _ = std::fs::remove_dir_all(&dir);
}
