//! Shared harness for the end-to-end scenario and property tests: a
//! minimal scripted TCP server matching the one each crate's own unit
//! tests use, exposed here so `tests/*.rs` can drive a real `Session`
//! over a real socket without reaching into `tw2002_bot`'s private
//! test modules.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::sync::Mutex;
use std::sync::Arc;

/// One write the server makes, optionally waiting for a substring of
/// the client's next bytes before moving on (a synchronization point,
/// not a protocol assertion).
pub struct ScriptStep {
    pub send: Vec<u8>,
    pub expect_contains: Option<String>,
}

pub fn step(send: &str, expect: Option<&str>) -> ScriptStep {
    ScriptStep { send: send.as_bytes().to_vec(), expect_contains: expect.map(String::from) }
}

async fn drain_initial_handshake(socket: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    let _ = tokio::time::timeout(Duration::from_millis(200), socket.read(&mut buf)).await;
}

async fn run_script(mut socket: TcpStream, steps: Vec<ScriptStep>, captured: Option<Arc<Mutex<Vec<u8>>>>) {
    drain_initial_handshake(&mut socket).await;

    for s in steps {
        let _ = socket.write_all(&s.send).await;
        let Some(expect) = s.expect_contains else { continue };
        let mut acc: Vec<u8> = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if acc.windows(expect.len().max(1)).any(|w| w == expect.as_bytes()) {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            let mut chunk = [0u8; 256];
            match tokio::time::timeout(Duration::from_millis(200), socket.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => continue,
                Ok(Ok(n)) => {
                    acc.extend_from_slice(&chunk[..n]);
                    if let Some(cap) = &captured {
                        cap.lock().await.extend_from_slice(&chunk[..n]);
                    }
                }
                Ok(Err(_)) => break,
            }
        }
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
}

/// Spawns a listener that plays `steps` in order, bound on an ephemeral
/// loopback port. Returns the port and the server task's handle.
pub fn spawn_scripted_server(steps: Vec<ScriptStep>) -> (u16, JoinHandle<()>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    let listener = TcpListener::from_std(listener).unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            run_script(socket, steps, None).await;
        }
    });
    (port, handle)
}

/// Same as [`spawn_scripted_server`], but every byte the client sends
/// back is also appended to the returned buffer, so a test can assert
/// on exactly what the client transmitted (e.g. that a rejected trade
/// never reached the wire).
pub fn spawn_scripted_server_capturing(steps: Vec<ScriptStep>) -> (u16, JoinHandle<()>, Arc<Mutex<Vec<u8>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_clone = Arc::clone(&captured);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    let listener = TcpListener::from_std(listener).unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            run_script(socket, steps, Some(captured_clone)).await;
        }
    });
    (port, handle, captured)
}

/// A server that writes `payload` once and then goes silent, used for
/// the stable-unknown and repeating-screen recovery scenarios.
pub fn spawn_repeating_server(payload: &'static str) -> (u16, JoinHandle<()>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    let listener = TcpListener::from_std(listener).unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            drain_initial_handshake(&mut socket).await;
            let _ = socket.write_all(payload.as_bytes()).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    });
    (port, handle)
}
