//! Realtime transport seam. [`WsTransport`] is the production implementation
//! over tokio-tungstenite; tests substitute their own [`Transport`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens links to the realtime backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, ClientError>;
}

/// One open duplex connection carrying text frames.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, frame: String) -> Result<(), ClientError>;

    /// Next inbound text frame; `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    async fn close(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, ClientError> {
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WsStream,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, frame: String) -> Result<(), ClientError> {
        self.stream.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        while let Some(item) = self.stream.next().await {
            match item {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "websocket close");
        }
    }
}
