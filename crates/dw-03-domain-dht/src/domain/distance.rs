//! XOR distance over SHA-256 key space.

use std::cmp::Ordering;

use sha2::{Digest, Sha256};
use shared_types::PeerId;

/// A point in the 256-bit key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHash([u8; 32]);

impl KeyHash {
    pub fn of_key(key: &str) -> Self {
        Self(Sha256::digest(key.as_bytes()).into())
    }

    pub fn of_peer(peer: &PeerId) -> Self {
        Self(Sha256::digest(peer.to_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Full XOR distance between two points.
pub fn xor_distance(a: &KeyHash, b: &KeyHash) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.0[i] ^ b.0[i];
    }
    out
}

/// Number of leading bits `a` and `b` share (256 when equal).
pub fn common_prefix_len(a: &KeyHash, b: &KeyHash) -> usize {
    for (i, byte) in xor_distance(a, b).iter().enumerate() {
        if *byte != 0 {
            return i * 8 + byte.leading_zeros() as usize;
        }
    }
    256
}

/// Compare two peers by distance to `target`, closest first.
pub fn cmp_distance(target: &KeyHash, a: &KeyHash, b: &KeyHash) -> Ordering {
    xor_distance(target, a).cmp(&xor_distance(target, b))
}

/// The `k` peers closest to `key`, closest first.
pub fn closest_peers(key: &str, peers: &[PeerId], k: usize) -> Vec<PeerId> {
    let target = KeyHash::of_key(key);
    let mut ranked: Vec<(KeyHash, PeerId)> = peers
        .iter()
        .map(|peer| (KeyHash::of_peer(peer), *peer))
        .collect();
    ranked.sort_by(|(a, _), (b, _)| cmp_distance(&target, a, b));
    ranked.into_iter().take(k).map(|(_, peer)| peer).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = KeyHash::of_key("a");
        let b = KeyHash::of_key("b");
        assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
        assert_eq!(xor_distance(&a, &a), [0u8; 32]);
        assert_eq!(common_prefix_len(&a, &a), 256);
        assert!(common_prefix_len(&a, &b) < 256);
    }

    #[test]
    fn test_closest_peers_is_sorted_and_bounded() {
        let peers: Vec<PeerId> = (0..30).map(|_| PeerId::random()).collect();
        let key = "/dweb/domain/example";
        let closest = closest_peers(key, &peers, 20);
        assert_eq!(closest.len(), 20);

        let target = KeyHash::of_key(key);
        for pair in closest.windows(2) {
            let ord = cmp_distance(&target, &KeyHash::of_peer(&pair[0]), &KeyHash::of_peer(&pair[1]));
            assert_ne!(ord, Ordering::Greater);
        }

        // Every excluded peer is at least as far as the farthest included one.
        let farthest = KeyHash::of_peer(&closest[19]);
        for peer in peers.iter().filter(|p| !closest.contains(p)) {
            let ord = cmp_distance(&target, &KeyHash::of_peer(peer), &farthest);
            assert_ne!(ord, Ordering::Less);
        }
    }

    #[test]
    fn test_fewer_peers_than_k() {
        let peers = vec![PeerId::random(), PeerId::random()];
        assert_eq!(closest_peers("k", &peers, 20).len(), 2);
        assert!(closest_peers("k", &[], 20).is_empty());
    }
}
