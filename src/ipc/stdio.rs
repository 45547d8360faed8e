//! JSON-lines transport over the supervisor's standard streams

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::commands::Command;
use super::window::ChannelWindow;

const INBOUND_CAPACITY: usize = 64;

/// A line read from the command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Malformed { line: String, error: String },
}

/// Parse one JSON command per line from `reader`. The channel closes at EOF.
pub fn spawn_reader<R>(reader: R) -> mpsc::Receiver<Inbound>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read command channel: {}", e);
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let inbound = match Command::parse(trimmed) {
                Ok(command) => Inbound::Command(command),
                Err(e) => {
                    warn!("Command not recognized: {} ({})", trimmed, e);
                    Inbound::Malformed {
                        line: trimmed.to_string(),
                        error: e.to_string(),
                    }
                }
            };
            if tx.send(inbound).await.is_err() {
                break;
            }
        }
        debug!("Command channel closed");
    });
    rx
}

/// A window that writes every message to `writer` as one JSON line
pub fn spawn_writer<W>(label: &str, writer: W) -> (ChannelWindow, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (window, mut rx) = ChannelWindow::new(label);
    let task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = rx.recv().await {
            let mut line = match serde_json::to_vec(&message) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize {:?}: {}", message, e);
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = writer.write_all(&line).await {
                error!("UI channel write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("UI channel flush failed: {}", e);
                break;
            }
        }
    });
    (window, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::UiMessage;
    use crate::ipc::window::UiWindow;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn reads_commands_and_flags_garbage() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut rx = spawn_reader(server);

        client
            .write_all(b"{\"command\":\"get-platform\"}\n\nnot json\n")
            .await
            .unwrap();
        drop(client);

        assert_eq!(rx.recv().await, Some(Inbound::Command(Command::GetPlatform)));
        match rx.recv().await {
            Some(Inbound::Malformed { line, .. }) => assert_eq!(line, "not json"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn writes_one_json_line_per_message() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (window, task) = spawn_writer("stdout", client);

        window.send(UiMessage::Snackbar("hello".into())).unwrap();
        window.send(UiMessage::Shutdown).unwrap();
        drop(window);
        task.await.unwrap();

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        assert_eq!(
            out,
            "{\"type\":\"snackbar\",\"payload\":\"hello\"}\n{\"type\":\"shutdown\"}\n"
        );
    }
}
