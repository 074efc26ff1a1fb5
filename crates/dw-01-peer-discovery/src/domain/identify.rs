//! `/dweb/identify/1.0.0`: who is on the other end of a connection.
//!
//! Each side sends one [`IdentifyMessage`]. The signature covers the peer id
//! and the listen addresses, so a peer cannot advertise addresses on behalf
//! of another key.

use libp2p_identity::{Keypair, PublicKey};
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use shared_types::encoding::base64_bytes;
use shared_types::PeerId;

use super::errors::NodeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyMessage {
    pub peer_id: String,
    /// Protobuf-encoded public key.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub listen_addrs: Vec<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Identity of a remote after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub peer: PeerId,
    pub listen_addrs: Vec<Multiaddr>,
    pub protocols: Vec<String>,
}

fn signing_payload(peer: &str, listen_addrs: &[String]) -> Vec<u8> {
    let mut payload = format!("/dweb/identify/1.0.0\n{peer}");
    for addr in listen_addrs {
        payload.push('\n');
        payload.push_str(addr);
    }
    payload.into_bytes()
}

impl IdentifyMessage {
    pub fn signed(
        keypair: &Keypair,
        listen_addrs: &[Multiaddr],
        protocols: Vec<String>,
    ) -> Result<Self, NodeError> {
        let public = keypair.public();
        let peer_id = public.to_peer_id().to_string();
        let listen_addrs: Vec<String> = listen_addrs.iter().map(ToString::to_string).collect();
        let signature = keypair
            .sign(&signing_payload(&peer_id, &listen_addrs))
            .map_err(|e| NodeError::Identity(e.to_string()))?;
        Ok(Self {
            peer_id,
            public_key: public.encode_protobuf(),
            listen_addrs,
            protocols,
            signature,
        })
    }

    /// Check the key, the claimed peer id and the signature.
    pub fn verify(&self) -> Result<VerifiedIdentity, String> {
        let public = PublicKey::try_decode_protobuf(&self.public_key)
            .map_err(|e| format!("bad public key: {e}"))?;
        let peer = public.to_peer_id();
        if peer.to_string() != self.peer_id {
            return Err("peer id does not match public key".into());
        }
        if !public.verify(
            &signing_payload(&self.peer_id, &self.listen_addrs),
            &self.signature,
        ) {
            return Err("invalid signature".into());
        }
        Ok(VerifiedIdentity {
            peer,
            listen_addrs: self
                .listen_addrs
                .iter()
                .filter_map(|a| a.parse().ok())
                .collect(),
            protocols: self.protocols.clone(),
        })
    }
}
