use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

use crate::{
    hash::{ContentKey, HashScheme},
    model::{HAS_PARENT, HashEdgeCandidate, NodeCandidate, NodeType},
};

/// Synthetic chemicals plus random parent edges between them.
#[derive(Clone, Debug)]
pub struct SyntheticBatch {
    pub nodes: Vec<NodeCandidate>,
    pub edges: Vec<HashEdgeCandidate>,
}

impl SyntheticBatch {
    pub fn node_hashes(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.hash.clone()).collect()
    }
}

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn random_block(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// InChIKey-shaped string; uniqueness comes from the index suffix.
fn synthetic_inchi_key(rng: &mut StdRng, index: usize) -> String {
    format!(
        "{}-{}-{index}",
        random_block(rng, 14),
        random_block(rng, 8)
    )
}

/// Deterministic for a given seed.
pub fn generate_batch(node_count: usize, edges_per_node: usize, seed: u64) -> SyntheticBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let scheme = HashScheme::CURRENT;
    let inchi_keys: Vec<String> = (0..node_count)
        .map(|index| synthetic_inchi_key(&mut rng, index))
        .collect();
    let keys: Vec<ContentKey> = inchi_keys.iter().map(ContentKey::chemical).collect();
    let nodes: Vec<NodeCandidate> = inchi_keys
        .iter()
        .zip(&keys)
        .enumerate()
        .map(|(index, (inchi_key, key))| {
            NodeCandidate::keyed(
                scheme,
                NodeType::Chemical,
                json!({"inchi_key": inchi_key, "name": format!("compound {index}")}),
                key,
            )
        })
        .collect();

    let mut edges = Vec::new();
    if node_count > 1 {
        for (index, key) in keys.iter().enumerate() {
            for _ in 0..edges_per_node {
                let mut target = rng.gen_range(0..node_count);
                if target == index {
                    target = (target + 1) % node_count;
                }
                edges.push(HashEdgeCandidate::between(
                    scheme,
                    key,
                    &keys[target],
                    HAS_PARENT,
                ));
            }
        }
    }
    SyntheticBatch { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_batch_is_deterministic() {
        let a = generate_batch(20, 2, 7);
        let b = generate_batch(20, 2, 7);
        assert_eq!(a.node_hashes(), b.node_hashes());
        assert_eq!(a.edges.len(), 40);
        assert!(a.edges.iter().all(|e| e.source_hash != e.destination_hash));
    }
}
