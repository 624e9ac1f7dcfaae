use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use super::codec::KasaCodec;
use crate::error::KasaError;

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// One round trip: connect, send one framed command, read one framed reply.
///
/// The timeout covers the whole exchange. When it expires the socket is
/// dropped with the future, which closes it.
pub async fn send_command(
    host: &str,
    port: u16,
    command: &Value,
    timeout: Duration,
) -> Result<Value, KasaError> {
    match tokio::time::timeout(timeout, exchange(host, port, command)).await {
        Ok(result) => result,
        Err(_) => {
            debug!("Kasa request to {}:{} timed out", host, port);
            Err(KasaError::Timeout(timeout.as_millis() as u64))
        }
    }
}

async fn exchange(host: &str, port: u16, command: &Value) -> Result<Value, KasaError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| KasaError::Connect {
            addr: format!("{host}:{port}"),
            reason: e.to_string(),
        })?;
    let mut framed = Framed::new(stream, KasaCodec);

    let payload = serde_json::to_vec(command)?;
    debug!("Kasa -> {}: {}", host, command);
    framed.send(payload).await?;

    let reply = framed.next().await.ok_or(KasaError::ConnectionClosed)??;
    let value: Value = serde_json::from_slice(&reply)?;
    debug!("Kasa <- {}: {}", host, value);
    Ok(value)
}
