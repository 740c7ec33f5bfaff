//! Native-messaging framing
//!
//! Browsers talk to a native host over stdio with each JSON message preceded
//! by its length as a 32-bit unsigned integer in native byte order. Messages
//! to the browser are capped at 1 MiB, messages from it at 64 MiB.
//!
//! `serve` runs the host side: decode a request, push it through a
//! [`Transport`], frame the wire response back. Undecodable requests get a
//! failure response instead of ending the session, so the extension's
//! callback always fires.

use super::wire::WireResponse;
use super::{RemoteError, Request, Transport};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest message accepted from the browser
pub const MAX_INCOMING: usize = 64 * 1024 * 1024;

/// Largest message the browser accepts from a host
pub const MAX_OUTGOING: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("message of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one frame. `Ok(None)` means the browser closed the pipe cleanly.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_INCOMING {
        return Err(CodecError::TooLarge {
            len,
            limit: MAX_INCOMING,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_OUTGOING {
        return Err(CodecError::TooLarge {
            len: body.len(),
            limit: MAX_OUTGOING,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| CodecError::TooLarge {
        len: body.len(),
        limit: MAX_OUTGOING,
    })?;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode and write one JSON message
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    write_frame(writer, &body).await
}

/// Serve framed requests until the browser closes the pipe
///
/// Returns the number of requests handled.
pub async fn serve<R, W>(
    reader: &mut R,
    writer: &mut W,
    transport: &dyn Transport,
) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut handled = 0usize;

    while let Some(body) = read_frame(reader).await? {
        handled += 1;

        let response = match serde_json::from_slice::<Request>(&body) {
            Ok(request) => {
                let kind = request.kind();
                tracing::debug!("Host request #{}: {}", handled, kind);
                let result = transport.send(request).await;
                if let Err(e) = &result {
                    tracing::warn!("{} failed: {}", kind, e);
                }
                WireResponse::from_result(&result)
            }
            Err(e) => {
                tracing::warn!("Undecodable host request #{}: {}", handled, e);
                WireResponse::failure(&RemoteError::InvalidRequest(format!(
                    "undecodable request: {}",
                    e
                )))
            }
        };

        let encoded = serde_json::to_vec(&response)?;
        if encoded.len() > MAX_OUTGOING {
            tracing::warn!(
                "Reply #{} is {} bytes, over the browser limit",
                handled,
                encoded.len()
            );
            let fallback = WireResponse::failure(&RemoteError::InvalidRequest(format!(
                "reply of {} bytes exceeds the {} byte native-messaging limit",
                encoded.len(),
                MAX_OUTGOING
            )));
            write_message(writer, &fallback).await?;
        } else {
            write_frame(writer, &encoded).await?;
        }
    }

    tracing::info!("Browser closed the native-messaging pipe after {} request(s)", handled);
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ChannelError, Payload};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::io::duplex;

    struct EchoTransport;

    async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Option<Value> {
        read_frame(reader)
            .await
            .unwrap()
            .map(|body| serde_json::from_slice(&body).unwrap())
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: Request) -> Result<Payload, ChannelError> {
            match request {
                Request::AskQuestion { question, .. } => Ok(Payload::Answer(question)),
                Request::GetHistory => Ok(Payload::History(Vec::new())),
                _ => Err(RemoteError::StorageUnavailable("offline".into()).into()),
            }
        }
    }

    #[tokio::test]
    async fn test_frame_round_trip_and_clean_eof() {
        let (mut a, mut b) = duplex(1024);
        write_message(&mut a, &json!({"type": "GET_HISTORY"}))
            .await
            .unwrap();
        drop(a);

        let msg = read_message(&mut b).await;
        assert_eq!(msg, Some(json!({"type": "GET_HISTORY"})));
        assert!(read_message(&mut b).await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_is_refused() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&u32::MAX.to_ne_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(CodecError::TooLarge { .. })
        ));

        let big = vec![b'x'; MAX_OUTGOING + 1];
        assert!(matches!(
            write_frame(&mut a, &big).await,
            Err(CodecError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_answers_every_frame() {
        let (mut browser, host) = duplex(64 * 1024);
        let (mut host_read, mut host_write) = tokio::io::split(host);

        let server = tokio::spawn(async move {
            serve(&mut host_read, &mut host_write, &EchoTransport).await
        });

        let context = json!({
            "id": "example.com",
            "analyzed_at": "2026-03-01T12:00:00Z",
            "privacy_score": 72,
            "risk_level": "Safe"
        });
        write_message(
            &mut browser,
            &json!({"type": "ASK_QUESTION", "question": "hi", "context": context, "provider": "auto"}),
        )
        .await
        .unwrap();
        write_frame(&mut browser, b"not json").await.unwrap();
        write_message(&mut browser, &json!({"type": "GET_DASHBOARD_DATA"}))
            .await
            .unwrap();

        let first = read_message(&mut browser).await.unwrap();
        assert_eq!(first, json!({"success": true, "answer": "hi"}));

        let second = read_message(&mut browser).await.unwrap();
        assert_eq!(second["success"], false);
        assert_eq!(second["code"], "invalid_request");

        let third = read_message(&mut browser).await.unwrap();
        assert_eq!(third["code"], "storage_unavailable");

        drop(browser);
        assert_eq!(server.await.unwrap().unwrap(), 3);
    }
}
