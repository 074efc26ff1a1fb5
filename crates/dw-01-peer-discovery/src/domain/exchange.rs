//! `/dweb/peer-exchange/1.0.0` messages.
//!
//! ```json
//! {"type":"request","reason":"bootstrap","knownPeers":["12D3..."]}
//! {"type":"response","once":true,"peers":[{"peerId":"12D3...","multiaddrs":["/ip4/..."]}]}
//! {"type":"error","reason":"...","once":true}
//! ```

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use shared_types::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    #[serde(default)]
    pub multiaddrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExchangeMessage {
    Request {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, rename = "knownPeers")]
        known_peers: Vec<String>,
    },
    Response {
        #[serde(default)]
        once: bool,
        #[serde(default)]
        peers: Vec<PeerInfo>,
    },
    Error {
        reason: String,
        #[serde(default)]
        once: bool,
    },
}

impl ExchangeMessage {
    pub fn request(reason: &str, known: &[PeerId]) -> Self {
        ExchangeMessage::Request {
            reason: Some(reason.to_string()),
            known_peers: known.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        ExchangeMessage::Error {
            reason: reason.into(),
            once: true,
        }
    }
}

/// Response listing every entry except the requester.
pub fn build_response<I>(requester: &PeerId, entries: I) -> ExchangeMessage
where
    I: IntoIterator<Item = (PeerId, Vec<Multiaddr>)>,
{
    let peers = entries
        .into_iter()
        .filter(|(peer, _)| peer != requester)
        .map(|(peer, addrs)| PeerInfo {
            peer_id: peer.to_string(),
            multiaddrs: addrs.iter().map(ToString::to_string).collect(),
        })
        .collect();
    ExchangeMessage::Response { once: true, peers }
}

/// Usable records from a response: peer id parses, is not `local`, and at
/// least one multiaddr parses. Unparseable addresses are dropped.
pub fn usable_peers(local: &PeerId, peers: &[PeerInfo]) -> Vec<(PeerId, Vec<Multiaddr>)> {
    peers
        .iter()
        .filter_map(|info| {
            let peer: PeerId = info.peer_id.trim().parse().ok()?;
            if &peer == local {
                return None;
            }
            let addrs: Vec<Multiaddr> = info
                .multiaddrs
                .iter()
                .filter_map(|a| a.parse().ok())
                .collect();
            (!addrs.is_empty()).then_some((peer, addrs))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let known = PeerId::random();
        let wire = serde_json::to_value(ExchangeMessage::request("bootstrap", &[known])).unwrap();
        assert_eq!(
            wire,
            json!({"type": "request", "reason": "bootstrap", "knownPeers": [known.to_string()]})
        );

        let bare: ExchangeMessage = serde_json::from_value(json!({"type": "request"})).unwrap();
        assert_eq!(
            bare,
            ExchangeMessage::Request {
                reason: None,
                known_peers: vec![]
            }
        );
    }

    #[test]
    fn test_response_excludes_requester() {
        let requester = PeerId::random();
        let other = PeerId::random();
        let addr: Multiaddr = "/ip4/1.1.1.1/udp/1/quic-v1".parse().unwrap();

        let response = build_response(
            &requester,
            vec![(requester, vec![addr.clone()]), (other, vec![addr.clone()])],
        );
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "response",
                "once": true,
                "peers": [{"peerId": other.to_string(), "multiaddrs": ["/ip4/1.1.1.1/udp/1/quic-v1"]}]
            })
        );
    }

    #[test]
    fn test_error_wire_shape() {
        let wire = serde_json::to_value(ExchangeMessage::error("bad frame")).unwrap();
        assert_eq!(wire, json!({"type": "error", "reason": "bad frame", "once": true}));
    }

    #[test]
    fn test_usable_peers_filters_bad_records() {
        let local = PeerId::random();
        let good = PeerId::random();
        let no_addrs = PeerId::random();
        let peers = vec![
            PeerInfo {
                peer_id: "".into(),
                multiaddrs: vec!["/ip4/1.1.1.1/udp/1/quic-v1".into()],
            },
            PeerInfo {
                peer_id: local.to_string(),
                multiaddrs: vec!["/ip4/1.1.1.1/udp/1/quic-v1".into()],
            },
            PeerInfo {
                peer_id: no_addrs.to_string(),
                multiaddrs: vec!["not an addr".into()],
            },
            PeerInfo {
                peer_id: good.to_string(),
                multiaddrs: vec!["garbage".into(), "/ip4/2.2.2.2/udp/2/quic-v1".into()],
            },
        ];

        let usable = usable_peers(&local, &peers);
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].0, good);
        assert_eq!(usable[0].1.len(), 1);
    }
}
