//! End-to-end tests for the terminal WebSocket bridge

use futures::{SinkExt, StreamExt};
use session_bridge::codec::{ClientFrame, ServerFrame, TerminalSize};
use session_bridge::gateway::{Gateway, GatewayBuilder};
use session_bridge::BridgeConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_gateway(shell: &str) -> (Gateway, SocketAddr) {
    let mut config = BridgeConfig::default();
    config.terminal.shell = Some(shell.to_string());
    config.terminal.cwd = Some(std::env::temp_dir());

    let gateway = GatewayBuilder::new().config(config).port(0).build().unwrap();
    tokio_test::assert_ok!(gateway.start().await);
    let addr = gateway.local_addr().await.unwrap();
    (gateway, addr)
}

async fn connect(addr: SocketAddr, query: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws/terminal{}", addr, query))
        .await
        .unwrap();
    socket
}

/// Next server frame, `None` once the server closes
async fn next_frame(socket: &mut Socket) -> Option<ServerFrame> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), socket.next())
            .await
            .expect("server went quiet")?;
        match message.ok()? {
            Message::Text(text) => return Some(ServerFrame::decode(&text).unwrap()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Collect output until `needle` shows up
async fn read_output_until(socket: &mut Socket, needle: &str) -> String {
    let mut output = Vec::new();
    while let Some(frame) = next_frame(socket).await {
        if let ServerFrame::Output(bytes) = frame {
            output.extend(bytes);
            if String::from_utf8_lossy(&output).contains(needle) {
                break;
            }
        }
    }
    String::from_utf8_lossy(&output).into_owned()
}

#[tokio::test]
async fn test_shell_round_trip_and_exit() {
    let (gateway, addr) = start_gateway("/bin/sh").await;
    let mut socket = connect(addr, "?cols=100&rows=30").await;

    match next_frame(&mut socket).await {
        Some(ServerFrame::Info(message)) => {
            assert!(message.starts_with("Connected to /bin/sh"), "{}", message)
        }
        other => panic!("expected banner, got {:?}", other),
    }

    socket
        .send(Message::Text(ClientFrame::Input(b"echo E2E_$((6 * 7))\n".to_vec()).encode()))
        .await
        .unwrap();
    let output = read_output_until(&mut socket, "E2E_42").await;
    assert!(output.contains("E2E_42"), "{}", output);

    // Geometry as the shell sees it
    socket
        .send(Message::Text(
            ClientFrame::Resize(TerminalSize::new(132, 43)).encode(),
        ))
        .await
        .unwrap();
    socket
        .send(Message::Text("stty size\n".to_string()))
        .await
        .unwrap();
    let output = read_output_until(&mut socket, "43 132").await;
    assert!(output.contains("43 132"), "{}", output);

    // Raw text is input too
    socket
        .send(Message::Text("exit 7\n".to_string()))
        .await
        .unwrap();

    let mut infos = Vec::new();
    while let Some(frame) = next_frame(&mut socket).await {
        if let ServerFrame::Info(message) = frame {
            infos.push(message);
        }
    }
    assert_eq!(infos, vec!["Process exited with code 7".to_string()]);

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_initial_geometry_from_query() {
    let (gateway, addr) = start_gateway("/bin/sh").await;
    let mut socket = connect(addr, "?cols=90&rows=20").await;
    next_frame(&mut socket).await;

    socket
        .send(Message::Binary(b"stty size\n".to_vec()))
        .await
        .unwrap();
    let output = read_output_until(&mut socket, "20 90").await;
    assert!(output.contains("20 90"), "{}", output);

    socket.close(None).await.unwrap();
    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_spawn_failure_reports_and_closes() {
    let (gateway, addr) = start_gateway("/nonexistent/shell").await;
    let mut socket = connect(addr, "").await;

    match next_frame(&mut socket).await {
        Some(ServerFrame::Info(message)) => {
            assert!(message.starts_with("Failed to start /nonexistent/shell"), "{}", message)
        }
        other => panic!("expected failure info, got {:?}", other),
    }
    assert!(next_frame(&mut socket).await.is_none());

    gateway.stop().await.unwrap();
}
