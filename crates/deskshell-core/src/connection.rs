//! Host side of the UI boundary: a loopback WebSocket that carries protocol frames.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::dispatch::RequestHandler;
use crate::protocol::{self, AuthRequest, AuthResult, Message};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to send messages to one connected UI
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ConnectionHandle {
    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        self.tx
            .send(msg.encode())
            .await
            .map_err(|_| anyhow::anyhow!("connection channel closed"))
    }

    pub async fn send_raw(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(data)
            .await
            .map_err(|_| anyhow::anyhow!("connection channel closed"))
    }
}

pub struct BridgeServer {
    listener: TcpListener,
    token: String,
    handler: Arc<RequestHandler>,
    heartbeat_interval: Duration,
}

impl BridgeServer {
    /// Bind the listener. Only loopback addresses are accepted.
    pub async fn bind(
        addr: &str,
        token: String,
        handler: Arc<RequestHandler>,
        heartbeat_interval: Duration,
    ) -> Result<Self> {
        let parsed: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid listen address {}", addr))?;
        if !parsed.ip().is_loopback() {
            bail!("refusing to listen on non-loopback address {}", parsed);
        }

        let listener = TcpListener::bind(parsed)
            .await
            .with_context(|| format!("failed to bind {}", parsed))?;

        Ok(Self {
            listener,
            token,
            handler,
            heartbeat_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// WebSocket URL handed to the UI process
    pub fn url(&self) -> Result<String> {
        Ok(format!("ws://{}/bridge", self.local_addr()?))
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) {
        let token: Arc<str> = Arc::from(self.token.as_str());
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let token = token.clone();
                    let handler = self.handler.clone();
                    let heartbeat = self.heartbeat_interval;
                    tokio::spawn(async move {
                        match serve_connection(stream, peer, &token, handler, heartbeat).await {
                            Ok(()) => info!("UI connection {} closed", peer),
                            Err(e) => warn!("UI connection {} ended: {:#}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    token: &str,
    handler: Arc<RequestHandler>,
    heartbeat_interval: Duration,
) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    debug!("WebSocket handshake with {}", peer);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // Bytes received but not yet decoded; AUTH may arrive in pieces and be followed by requests
    let mut read_buf = Vec::new();

    // The first frame must authenticate
    let auth = time::timeout(AUTH_TIMEOUT, async {
        while let Some(msg) = ws_stream.next().await {
            match msg? {
                WsMessage::Binary(data) => {
                    read_buf.extend_from_slice(&data);
                    if let Some((msg, consumed)) = Message::decode(&read_buf)? {
                        read_buf.drain(..consumed);
                        if msg.header.msg_type == protocol::AUTH {
                            let req: AuthRequest = msg.parse_json()?;
                            return Ok::<AuthRequest, anyhow::Error>(req);
                        }
                        bail!("expected AUTH, got 0x{:02x}", msg.header.msg_type);
                    }
                }
                WsMessage::Close(_) => bail!("client closed connection during auth"),
                _ => {}
            }
        }
        bail!("connection closed before auth")
    })
    .await
    .context("auth timeout")??;

    if auth.token != token {
        let reject = protocol::auth_result(&AuthResult {
            success: false,
            error: Some("invalid token".to_string()),
        })?;
        ws_sink.send(WsMessage::Binary(reject.encode().into())).await.ok();
        ws_sink.close().await.ok();
        bail!("rejected connection with bad token");
    }

    let accept = protocol::auth_result(&AuthResult {
        success: true,
        error: None,
    })?;
    ws_sink.send(WsMessage::Binary(accept.encode().into())).await?;
    info!(
        "UI {} authenticated ({})",
        peer,
        auth.client.as_deref().unwrap_or("unnamed client")
    );

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Vec<u8>>(256);
    let handle = ConnectionHandle { tx: outgoing_tx };

    let mut heartbeat_timer = time::interval(heartbeat_interval);
    heartbeat_timer.tick().await; // skip first immediate tick

    let mut last_pong = Instant::now();
    let heartbeat_timeout = heartbeat_interval * 3;

    loop {
        // Decode all complete messages from buffer
        loop {
            match Message::decode(&read_buf) {
                Ok(Some((msg, consumed))) => {
                    read_buf.drain(..consumed);

                    match msg.header.msg_type {
                        protocol::HEARTBEAT_ACK => {
                            last_pong = Instant::now();
                            debug!("heartbeat ACK received");
                        }
                        protocol::HEARTBEAT => {
                            last_pong = Instant::now();
                            let ack = protocol::heartbeat_ack();
                            ws_sink.send(WsMessage::Binary(ack.encode().into())).await?;
                        }
                        t if protocol::is_request(t) => {
                            last_pong = Instant::now();
                            handler.handle_message(msg, handle.clone());
                        }
                        t => {
                            warn!("ignoring unexpected message type 0x{:02x} from {}", t, peer);
                        }
                    }
                }
                Ok(None) => break, // need more data
                Err(e) => {
                    error!("protocol decode error: {}", e);
                    read_buf.clear();
                    break;
                }
            }
        }

        tokio::select! {
            // Incoming WebSocket messages
            ws_msg = ws_stream.next() => {
                match ws_msg {
                    Some(Ok(WsMessage::Binary(data))) => {
                        read_buf.extend_from_slice(&data);
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        ws_sink.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("UI {} sent close frame", peer);
                        return Ok(());
                    }
                    Some(Ok(_)) => {} // text, pong
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                }
            }

            // Replies produced by request tasks
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(data) => {
                        ws_sink.send(WsMessage::Binary(data.into())).await?;
                    }
                    // we hold a sender ourselves, so this never fires
                    None => return Ok(()),
                }
            }

            // Heartbeat timer
            _ = heartbeat_timer.tick() => {
                if last_pong.elapsed() > heartbeat_timeout {
                    warn!("UI {} missed heartbeats, disconnecting", peer);
                    return Ok(());
                }
                let hb = protocol::heartbeat();
                ws_sink.send(WsMessage::Binary(hb.encode().into())).await?;
                debug!("sent heartbeat");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::assets::AssetBundle;
    use crate::bridge::tests::{bridge, FakePicker};
    use crate::protocol::Reply;
    use tokio_tungstenite::connect_async;

    async fn start(home: &std::path::Path) -> String {
        let bridge = Arc::new(bridge(home, FakePicker::answering(None)));
        let handler = Arc::new(RequestHandler::new(bridge, AssetBundle::new(home, false)));
        let server = BridgeServer::bind(
            "127.0.0.1:0",
            "secret".to_string(),
            handler,
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        let url = server.url().unwrap();
        tokio::spawn(server.run());
        url
    }

    fn auth(token: &str) -> WsMessage {
        let req = AuthRequest {
            token: token.to_string(),
            client: Some("test".to_string()),
        };
        WsMessage::Binary(Message::json(protocol::AUTH, 0, &req).unwrap().encode().into())
    }

    async fn next_message<S>(stream: &mut S) -> Message
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            match stream.next().await.unwrap().unwrap() {
                WsMessage::Binary(data) => return Message::decode(&data).unwrap().unwrap().0,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_rejects_non_loopback_bind() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(bridge(dir.path(), FakePicker::answering(None)));
        let handler = Arc::new(RequestHandler::new(bridge, AssetBundle::new(dir.path(), false)));
        let result =
            BridgeServer::bind("0.0.0.0:0", "t".into(), handler, Duration::from_secs(30)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_authenticated_request_reply() {
        let home = tempfile::tempdir().unwrap();
        let url = start(home.path()).await;

        let (ws, _) = connect_async(&url).await.unwrap();
        let (mut sink, mut stream) = ws.split();
        sink.send(auth("secret")).await.unwrap();

        let result: AuthResult = next_message(&mut stream).await.parse_json().unwrap();
        assert!(result.success);

        // Request split across two WebSocket frames
        let request = Message::new(protocol::HOME_DIR, 77, b"{}".to_vec()).encode();
        let (head, tail) = request.split_at(4);
        sink.send(WsMessage::Binary(head.to_vec().into())).await.unwrap();
        sink.send(WsMessage::Binary(tail.to_vec().into())).await.unwrap();

        let reply_msg = next_message(&mut stream).await;
        assert_eq!(reply_msg.header.msg_type, protocol::REPLY);
        assert_eq!(reply_msg.header.request_id, 77);
        let reply: Reply = reply_msg.parse_json().unwrap();
        assert!(reply.ok);
        assert_eq!(reply.value, serde_json::json!(home.path().to_string_lossy()));
    }

    #[tokio::test]
    async fn test_auth_split_across_messages() {
        let home = tempfile::tempdir().unwrap();
        let url = start(home.path()).await;

        let (ws, _) = connect_async(&url).await.unwrap();
        let (mut sink, mut stream) = ws.split();

        // AUTH in two pieces, with a HOME_DIR request riding in the second one
        let WsMessage::Binary(auth_bytes) = auth("secret") else {
            unreachable!()
        };
        let mut tail = auth_bytes[4..].to_vec();
        tail.extend_from_slice(&Message::new(protocol::HOME_DIR, 5, b"{}".to_vec()).encode());
        sink.send(WsMessage::Binary(auth_bytes[..4].to_vec().into())).await.unwrap();
        sink.send(WsMessage::Binary(tail.into())).await.unwrap();

        let result: AuthResult = next_message(&mut stream).await.parse_json().unwrap();
        assert!(result.success);

        let reply_msg = next_message(&mut stream).await;
        assert_eq!(reply_msg.header.request_id, 5);
        let reply: Reply = reply_msg.parse_json().unwrap();
        assert_eq!(reply.value, serde_json::json!(home.path().to_string_lossy()));
    }

    #[tokio::test]
    async fn test_bad_token_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        let url = start(home.path()).await;

        let (ws, _) = connect_async(&url).await.unwrap();
        let (mut sink, mut stream) = ws.split();
        sink.send(auth("wrong")).await.unwrap();

        let result: AuthResult = next_message(&mut stream).await.parse_json().unwrap();
        assert!(!result.success);
    }
}
