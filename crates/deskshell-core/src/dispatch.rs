use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::assets::AssetBundle;
use crate::bridge::Bridge;
use crate::connection::ConnectionHandle;
use crate::error::BridgeError;
use crate::protocol::{self, Message, ProtocolError};

/// Turns bridge requests into bridge calls and sends exactly one REPLY for each
pub struct RequestHandler {
    bridge: Arc<Bridge>,
    assets: AssetBundle,
}

impl RequestHandler {
    pub fn new(bridge: Arc<Bridge>, assets: AssetBundle) -> Self {
        Self { bridge, assets }
    }

    /// Handle a request on its own task so a slow command never holds up a listing
    pub fn handle_message(self: &Arc<Self>, msg: Message, handle: ConnectionHandle) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.respond(msg, &handle).await;
        });
    }

    pub async fn respond(&self, msg: Message, handle: &ConnectionHandle) {
        let request_id = msg.header.request_id;
        let reply = match self.dispatch(&msg).await {
            Ok(value) => protocol::reply_ok(request_id, &value),
            Err(e) => protocol::reply_err(request_id, &e),
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!("failed to build reply for request {}: {}", request_id, e);
                let fallback = match e {
                    ProtocolError::PayloadTooLarge { size } => BridgeError::FileTooLarge {
                        size: size as u64,
                        limit: protocol::MAX_PAYLOAD_SIZE as u64,
                    },
                    other => BridgeError::ReadError(other.to_string()),
                };
                match protocol::reply_err(request_id, &fallback) {
                    Ok(reply) => reply,
                    Err(_) => return,
                }
            }
        };

        if let Err(e) = handle.send_message(&reply).await {
            warn!("dropping reply to request {}: {:#}", request_id, e);
        }
    }

    /// Run the operation named by `msg` and return its JSON result
    pub async fn dispatch(&self, msg: &Message) -> Result<Value, BridgeError> {
        let bridge = &self.bridge;
        match msg.header.msg_type {
            protocol::OPEN_FOLDER => {
                let req: protocol::OpenFolderRequest = if msg.payload.is_empty() {
                    Default::default()
                } else {
                    parse(msg, "OPEN_FOLDER")?
                };
                to_value(&bridge.choose_folder(req.default_path.as_deref()).await?)
            }
            protocol::LIST_CHILDREN => {
                let req: protocol::ListChildrenRequest = parse(msg, "LIST_CHILDREN")?;
                debug!("list children: {}", req.path);
                to_value(&bridge.list_children(&req.path).await?)
            }
            protocol::HOME_DIR => to_value(&bridge.home_dir().to_string_lossy()),
            protocol::RESOLVE_PATH => {
                let req: protocol::ResolvePathRequest = parse(msg, "RESOLVE_PATH")?;
                let resolved = bridge.resolve_path(&req.cwd, &req.segment).await?;
                to_value(&resolved.to_string_lossy())
            }
            protocol::RUN_COMMAND => {
                let req: protocol::RunCommandRequest = parse(msg, "RUN_COMMAND")?;
                to_value(&bridge.run_command(&req.command, &req.cwd).await?)
            }
            protocol::READ_FILE => {
                let req: protocol::ReadFileRequest = parse(msg, "READ_FILE")?;
                debug!("read file: {}", req.path);
                to_value(&bridge.read_file(&req.path).await?)
            }
            protocol::GET_ASSET => {
                let req: protocol::AssetRequest = parse(msg, "GET_ASSET")?;
                to_value(&self.assets.load(&req.path).await?)
            }
            other => {
                let e = ProtocolError::InvalidType(other);
                warn!("request handler: {}", e);
                Err(BridgeError::BadRequest(e.to_string()))
            }
        }
    }
}

fn parse<T: DeserializeOwned>(msg: &Message, name: &str) -> Result<T, BridgeError> {
    serde_json::from_slice(&msg.payload)
        .map_err(|e| BridgeError::BadRequest(format!("invalid {}: {}", name, e)))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(value).map_err(|e| BridgeError::ReadError(e.to_string()))
}
