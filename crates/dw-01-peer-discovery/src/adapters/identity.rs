//! Persistent node identity.
//!
//! The ed25519 keypair is stored in its protobuf encoding so the peer id,
//! and every multiaddr built from it, survives restarts.

use std::fs;
use std::path::Path;

use libp2p_identity::Keypair;
use tracing::info;

use crate::domain::NodeError;

/// Load the keypair at `path`, generating and saving one if the file does
/// not exist. `None` yields a fresh ephemeral identity.
pub fn load_or_generate(path: Option<&Path>) -> Result<Keypair, NodeError> {
    let Some(path) = path else {
        return Ok(Keypair::generate_ed25519());
    };

    if path.exists() {
        let bytes = fs::read(path)
            .map_err(|e| NodeError::Identity(format!("read {}: {e}", path.display())))?;
        let keypair = Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| NodeError::Identity(format!("decode {}: {e}", path.display())))?;
        info!(peer = %keypair.public().to_peer_id(), path = %path.display(), "[dw-01] 🔑 Loaded node identity");
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| NodeError::Identity(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| NodeError::Identity(format!("create {}: {e}", parent.display())))?;
    }
    fs::write(path, encoded)
        .map_err(|e| NodeError::Identity(format!("write {}: {e}", path.display())))?;
    info!(peer = %keypair.public().to_peer_id(), path = %path.display(), "[dw-01] 🔑 Generated node identity");
    Ok(keypair)
}
