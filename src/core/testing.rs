//! Test doubles: stub core executables and a stub `/api/info` endpoint

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Write an executable shell script and return its path
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Bind an ephemeral localhost port
pub async fn bind_local() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Serve a JSON `/api/info` on `listener`, hanging up on every request that
/// arrives before `delay` has elapsed.
pub fn serve_api_info_after(listener: TcpListener, delay: Duration) {
    let ready_at = Instant::now() + delay;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(answer(stream, Instant::now() >= ready_at, true));
        }
    });
}

/// Serve a non-JSON body, which must not count as ready
pub fn serve_plain_text(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(answer(stream, true, false));
        }
    });
}

async fn answer(mut stream: TcpStream, respond: bool, json: bool) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    if !respond {
        return;
    }

    let (content_type, body) = if json {
        ("application/json", r#"{"version":"2.0.0","name":"LedFx"}"#)
    } else {
        ("text/plain", "not ready")
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
