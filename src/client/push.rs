//! WebSocket push transport for crawl jobs
//!
//! The backend streams a crawl as `catchup`, `document`, `done` and `error`
//! messages on `ws(s)://<api>/v1/crawl/{job_id}`. Connecting and every read
//! are bounded, so a hung socket degrades to polling instead of blocking.

use crate::client::types::PushMessage;
use crate::client::{PushSession, PushTransport};
use crate::{KeeperError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Opens WebSocket sessions against the backend
#[derive(Debug, Clone)]
pub struct WsTransport {
    ws_base: String,
    timeout: Duration,
}

impl WsTransport {
    /// Creates a transport for a `ws://` or `wss://` base URL
    pub fn new(ws_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ws_base: ws_base.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Endpoint streaming the given crawl job
    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/v1/crawl/{}", self.ws_base, job_id)
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn open(&self, job_id: &str) -> Result<Box<dyn PushSession>> {
        let url = self.job_url(job_id);
        tracing::debug!("Connecting push transport to {}", url);

        let (stream, _response) = tokio::time::timeout(self.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| KeeperError::Timeout { url: url.clone() })?
            .map_err(|e| KeeperError::WebSocket(Box::new(e)))?;

        Ok(Box::new(WsSession {
            stream,
            read_timeout: self.timeout,
            url,
        }))
    }
}

/// An open WebSocket stream for one crawl job
struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_timeout: Duration,
    url: String,
}

#[async_trait]
impl PushSession for WsSession {
    async fn next_message(&mut self) -> Result<Option<PushMessage>> {
        loop {
            let frame = tokio::time::timeout(self.read_timeout, self.stream.next())
                .await
                .map_err(|_| KeeperError::Timeout {
                    url: self.url.clone(),
                })?;

            match frame {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(KeeperError::WebSocket(Box::new(e))),
                Some(Ok(Message::Text(text))) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(PushMessage::parse(&text)?));
                }
                // Ping, pong, binary and raw frames carry no job events
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Closing push transport {}: {}", self.url, e);
        }
        // Drain until the peer acknowledges the close
        while let Ok(Some(Ok(_))) =
            tokio::time::timeout(Duration::from_millis(200), self.stream.next()).await
        {}
    }
}
