//! Line-oriented adapter: one JSON request per input line, one JSON response
//! per output line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::contract::{CommandResponse, Request, Response};
use crate::runtime::EngineGateway;

/// Answers requests until `input` ends. Returns how many responses were
/// written; stops at the first read, write or flush error.
pub async fn serve<R, W>(
    gateway: &EngineGateway,
    input: R,
    mut output: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => gateway.handle(request).await,
            Err(e) => Response::Command(CommandResponse::rejected(
                "ValidationError",
                format!("Malformed request: {e}"),
            )),
        };

        let mut out = match serde_json::to_string(&response) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                continue;
            }
        };
        out.push('\n');
        output.write_all(out.as_bytes()).await?;
        output.flush().await?;
        answered += 1;
    }

    Ok(answered)
}
