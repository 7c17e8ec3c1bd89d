//! Frame sources.
//!
//! The supervisor reads text frames through [`FrameSource`] so that tests can
//! script a feed without a socket.

use std::string::FromUtf8Error;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Opens streaming connections.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameStream>>;
}

/// An open feed.
#[async_trait]
pub trait FrameStream: Send {
    /// Next data frame. `None` once the server closes the connection.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// Dials real WebSocket endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsFrameSource;

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameStream>> {
        let url = Url::parse(url).with_context(|| format!("Invalid stream URL: {url}"))?;
        let (ws_stream, _) = connect_async(url)
            .await
            .context("WebSocket handshake failed")?;
        Ok(Box::new(WsFrameStream { inner: ws_stream }))
    }
}

struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.inner.next().await {
            match msg.context("WebSocket read failed")? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match binary_frame(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping binary frame that is not UTF-8");
                    }
                },
                Message::Close(frame) => {
                    tracing::info!(?frame, "stream closed by server");
                    return Ok(None);
                }
                // ping/pong are answered by tungstenite
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Binary frames carry the same JSON as text frames; anything else is not a frame.
fn binary_frame(bytes: Vec<u8>) -> Result<String, FromUtf8Error> {
    String::from_utf8(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_json_is_passed_through() {
        let frame = binary_frame(br#"{"lastUpdateId":1}"#.to_vec()).unwrap();
        assert_eq!(frame, r#"{"lastUpdateId":1}"#);
    }

    #[test]
    fn non_utf8_binary_is_rejected_not_mangled() {
        assert!(binary_frame(vec![b'{', 0xff, 0xfe, b'}']).is_err());
    }
}
