//! End-to-end sessions over a real websocket

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use adbgate_api::{router, AppState, DeviceExecutor, DeviceRegistry, ExecutionError, TargetHandle};
use adbgate_proto::FileNode;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Device whose storage is a map of remote path to contents
#[derive(Default)]
struct MemoryDevice {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl DeviceExecutor for MemoryDevice {
    async fn run_shell(&self, command: &str) -> Result<String, ExecutionError> {
        Ok(format!("ran: {}", command))
    }

    async fn reboot(&self) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn is_online(&self) -> Result<bool, ExecutionError> {
        Ok(true)
    }

    async fn list_path(&self, path: &str, _with_children: bool) -> Result<FileNode, ExecutionError> {
        Ok(FileNode {
            name: path.to_string(),
            path: path.to_string(),
            directory: true,
            ..Default::default()
        })
    }

    async fn deliver_file(&self, local: &Path, remote: &str) -> Result<(), ExecutionError> {
        let data = tokio::fs::read(local).await?;
        self.files.lock().unwrap().insert(remote.to_string(), data);
        Ok(())
    }

    async fn retrieve_file(&self, remote: &str, local: &Path) -> Result<(), ExecutionError> {
        let data = self
            .files
            .lock()
            .unwrap()
            .get(remote)
            .cloned()
            .ok_or_else(|| ExecutionError::CommandFailed(format!("{} not found", remote)))?;
        tokio::fs::write(local, data).await?;
        Ok(())
    }
}

struct StaticRegistry {
    devices: HashMap<String, TargetHandle>,
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn resolve(&self, serial: &str) -> Option<TargetHandle> {
        self.devices.get(serial).cloned()
    }

    async fn enumerate(&self) -> Vec<(String, TargetHandle)> {
        self.devices
            .iter()
            .map(|(serial, handle)| (serial.clone(), handle.clone()))
            .collect()
    }
}

async fn start_gateway(staging: &Path) -> SocketAddr {
    let mut devices: HashMap<String, TargetHandle> = HashMap::new();
    devices.insert("ABC123".to_string(), Arc::new(MemoryDevice::default()));
    devices.insert("XYZ789".to_string(), Arc::new(MemoryDevice::default()));
    let registry = Arc::new(StaticRegistry { devices });

    let app = router(AppState::new(registry, staging.to_path_buf()), true);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (client, _response) = connect_async(format!("ws://{}{}", addr, path))
        .await
        .unwrap();
    client
}

async fn send_json(client: &mut Client, request: Value) {
    client
        .send(Message::Text(request.to_string().into()))
        .await
        .unwrap();
}

async fn next_message(client: &mut Client) -> Message {
    loop {
        match client.next().await.unwrap().unwrap() {
            Message::Ping(_) | Message::Pong(_) => continue,
            msg => return msg,
        }
    }
}

async fn next_json(client: &mut Client) -> Value {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn story_push_then_pull_round_trip_over_websocket() {
    let staging = tempfile::tempdir().unwrap();
    let addr = start_gateway(staging.path()).await;
    let mut client = connect(addr, "/adb").await;

    // Authenticate against one device
    send_json(
        &mut client,
        json!({"messageType": "AUTH", "deviceSerial": "ABC123"}),
    )
    .await;
    let auth = next_json(&mut client).await;
    assert_eq!(auth["statusCode"], 200);
    assert_eq!(auth["message"], "Auth success.");

    // Push eleven bytes in two binary frames
    send_json(
        &mut client,
        json!({
            "messageType": "FILE_PUSH",
            "fullPath": "/sdcard/hello.txt",
            "fileName": "hello.txt",
            "size": 11
        }),
    )
    .await;
    assert_eq!(next_json(&mut client).await["statusCode"], 201);

    client
        .send(Message::Binary(b"hello ".to_vec().into()))
        .await
        .unwrap();
    client
        .send(Message::Binary(b"world".to_vec().into()))
        .await
        .unwrap();
    let pushed = next_json(&mut client).await;
    assert_eq!(pushed["statusCode"], 200);
    assert_eq!(pushed["message"], "File push successful.");

    // Pull it back
    send_json(
        &mut client,
        json!({"messageType": "FILE_PULL", "fullPath": "/sdcard/hello.txt"}),
    )
    .await;
    assert_eq!(next_json(&mut client).await["statusCode"], 201);
    match next_message(&mut client).await {
        Message::Binary(data) => assert_eq!(&data[..], b"hello world"),
        other => panic!("expected binary frame, got {:?}", other),
    }
    let pulled = next_json(&mut client).await;
    assert_eq!(pulled["message"], "File pull successful.");
    assert_eq!(pulled["size"], 11);

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn test_unauthenticated_request_rejected_over_websocket() {
    let staging = tempfile::tempdir().unwrap();
    let addr = start_gateway(staging.path()).await;
    let mut client = connect(addr, "/adb").await;

    send_json(
        &mut client,
        json!({"messageType": "SHELL_COMMAND", "shellCommand": "ls"}),
    )
    .await;
    let response = next_json(&mut client).await;
    assert_eq!(response["statusCode"], 400);
    assert_eq!(response["message"], "Must authenticate to call ADB commands.");

    // The connection survives the rejection
    send_json(
        &mut client,
        json!({"messageType": "AUTH", "deviceSerial": "ABC123"}),
    )
    .await;
    assert_eq!(next_json(&mut client).await["statusCode"], 200);
}

#[tokio::test]
async fn test_admin_enumerates_devices_over_websocket() {
    let staging = tempfile::tempdir().unwrap();
    let addr = start_gateway(staging.path()).await;
    let mut client = connect(addr, "/admin/adb").await;

    send_json(&mut client, json!({"messageType": "DEVICES_GET"})).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["statusCode"], 200);
    assert_eq!(
        response["devices"],
        json!([
            {"deviceSerial": "ABC123", "status": "online"},
            {"deviceSerial": "XYZ789", "status": "online"}
        ])
    );

    send_json(
        &mut client,
        json!({
            "messageType": "SHELL_COMMAND",
            "deviceSerial": "XYZ789",
            "shellCommand": "uptime"
        }),
    )
    .await;
    let response = next_json(&mut client).await;
    assert_eq!(response["deviceSerial"], "XYZ789");
    assert_eq!(response["shellCommandOutput"], "ran: uptime");
}

#[tokio::test]
async fn test_disconnect_mid_push_leaves_no_staging_files() {
    let staging = tempfile::tempdir().unwrap();
    let addr = start_gateway(staging.path()).await;
    let mut client = connect(addr, "/adb").await;

    send_json(
        &mut client,
        json!({"messageType": "AUTH", "deviceSerial": "ABC123"}),
    )
    .await;
    next_json(&mut client).await;
    send_json(
        &mut client,
        json!({"messageType": "FILE_PUSH", "fullPath": "/sdcard/big", "size": 1000}),
    )
    .await;
    assert_eq!(next_json(&mut client).await["statusCode"], 201);
    client
        .send(Message::Binary(vec![0u8; 10].into()))
        .await
        .unwrap();

    client.close(None).await.unwrap();
    while let Some(Ok(msg)) = client.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    // Cleanup runs after the server sees the close; give it a moment
    let mut leftover = usize::MAX;
    for _ in 0..50 {
        leftover = std::fs::read_dir(staging.path()).unwrap().count();
        if leftover == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(leftover, 0);
}
