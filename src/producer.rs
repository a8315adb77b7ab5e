use crate::broadcast::LongPollBroadcaster;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

/// Turn one input line into a payload. JSON is passed through, anything else becomes a string.
pub fn parse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string())))
}

/// Broadcast every non-empty line read from `reader` until EOF
pub async fn run_line_producer<R>(reader: R, broadcaster: LongPollBroadcaster<Value>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(payload) = parse_line(&line) {
                    broadcaster.broadcast(payload);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read producer input: {}", e);
                break;
            }
        }
    }
    tracing::info!("Line producer finished");
}

/// Spawn a background task that broadcasts lines from stdin
pub fn spawn_stdin_producer(broadcaster: LongPollBroadcaster<Value>) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_line_producer(BufReader::new(tokio::io::stdin()), broadcaster).await;
    })
}
