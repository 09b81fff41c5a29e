//! Tree hashing for archive integrity.

use std::io;
use std::io::Write;

use sha2::Digest;
use sha2::Sha256;

use crate::error::{Error, ErrorKind, Result};

/// Leaf size of the tree hash.
pub const MIB: usize = 1 << 20;

/// TreeHash calculates the tree hash and regular SHA-256 hash of the data
/// written to it. These values are needed when uploading an archive or
/// verifying an aligned download. First each 1 MiB chunk of data is
/// hashed. Second each consecutive pair of digests is concatenated then
/// hashed; a single trailing node is promoted to the next level
/// unchanged. The second step is repeated until one node remains, which
/// is the tree hash.
pub struct TreeHash {
    nodes: Vec<[u8; 32]>,
    pending: Vec<u8>,
    running: Sha256,
    tree_hash: [u8; 32],
    flat_hash: [u8; 32],
}

impl TreeHash {
    /// Returns a new, initialized tree hasher.
    pub fn new() -> Self {
        TreeHash {
            nodes: Vec::new(),
            pending: Vec::with_capacity(MIB),
            running: Sha256::new(),
            tree_hash: [0; 32],
            flat_hash: [0; 32],
        }
    }

    /// Reset the tree hash's state allowing it to be reused.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.pending.clear();
        self.running = Sha256::new();
        self.tree_hash = [0; 32];
        self.flat_hash = [0; 32];
    }

    /// Finalize the remaining chunk of data, if any, and calculate the
    /// tree hash. An empty input hashes as a single empty leaf, so the
    /// tree hash equals `SHA-256("")`.
    pub fn close(&mut self) {
        if !self.pending.is_empty() || self.nodes.is_empty() {
            self.nodes.push(Sha256::digest(&self.pending).into());
            self.running.update(&self.pending);
            self.pending.clear();
        }

        self.tree_hash = collapse(self.nodes.clone());
        self.flat_hash = self.running.clone().finalize().into();
    }

    /// The root-level tree hash of everything written. Valid after
    /// [`close`](TreeHash::close).
    pub fn tree_hash(&self) -> [u8; 32] {
        self.tree_hash
    }

    /// The flat SHA-256 checksum of everything written. Valid after
    /// [`close`](TreeHash::close).
    pub fn hash(&self) -> [u8; 32] {
        self.flat_hash
    }
}

impl Default for TreeHash {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for TreeHash {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let take = (MIB - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == MIB {
                self.nodes.push(Sha256::digest(&self.pending).into());
                self.running.update(&self.pending);
                self.pending.clear();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// MultiTreeHash combines tree hashes that were calculated per part into
/// the root-level hash of the whole archive, as needed to complete a
/// multipart upload. Parts must be added in range order, and every part
/// except the last must be the same power-of-two number of MiB for the
/// result to match a single hash over the concatenated archive.
#[derive(Default)]
pub struct MultiTreeHash {
    nodes: Vec<[u8; 32]>,
}

impl MultiTreeHash {
    /// Returns an empty combiner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next part's tree hash root.
    pub fn add(&mut self, root: [u8; 32]) {
        self.nodes.push(root);
    }

    /// Append the next part's tree hash root from its hex form, as
    /// carried in `x-amz-sha256-tree-hash`.
    pub fn add_hex(&mut self, root: &str) -> Result<()> {
        let bytes = hex::decode(root).map_err(|e| {
            Error::new(ErrorKind::Encoding, "tree hash is not valid hex")
                .with_operation("treehash::add_hex")
                .set_source(e)
        })?;
        let root: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::new(ErrorKind::Encoding, "tree hash must be 32 bytes")
                .with_operation("treehash::add_hex")
        })?;

        self.nodes.push(root);
        Ok(())
    }

    /// The root-level hash over the added parts, or `None` when no part
    /// has been added.
    pub fn root(&self) -> Option<[u8; 32]> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(collapse(self.nodes.clone()))
    }
}

// Collapse one level of digests at a time until the root remains. Pairs
// hash the concatenation of the two raw 32-byte digests, never their hex
// text; a trailing unpaired node is promoted unchanged.
fn collapse(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            if let [left, right] = pair {
                let mut h = Sha256::new();
                h.update(left);
                h.update(right);
                next.push(h.finalize().into());
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

/// Compare a service-returned tree hash with a locally computed root.
///
/// The service sends the hash in lowercase hex; a mismatch means the
/// bytes read do not form the archive the service stored.
pub fn verify_tree_hash(expected_hex: &str, computed: [u8; 32]) -> Result<()> {
    if expected_hex != hex::encode(computed) {
        return Err(Error::new(
            ErrorKind::Integrity,
            &format!(
                "tree hash mismatch: service reported {expected_hex}, computed {}",
                hex::encode(computed)
            ),
        )
        .with_operation("treehash::verify_tree_hash"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(data: &[u8]) -> TreeHash {
        let mut th = TreeHash::new();
        th.write_all(data).expect("write must succeed");
        th.close();
        th
    }

    #[test]
    fn test_hello_world() {
        let th = hash_of(b"Hello World");
        let expected = "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e";
        assert_eq!(hex::encode(th.hash()), expected);
        assert_eq!(hex::encode(th.tree_hash()), expected);
    }

    #[test]
    fn test_one_mib() {
        let th = hash_of(&vec![b'a'; MIB]);
        let expected = "9bc1b2a288b26af7257a36277ae3816a7d4f16e89c1e7e77d0a5c48bad62b360";
        assert_eq!(hex::encode(th.tree_hash()), expected);
        assert_eq!(hex::encode(th.hash()), expected);
    }

    #[test]
    fn test_two_mib() {
        let th = hash_of(&vec![b'a'; 2 * MIB]);
        assert_eq!(
            hex::encode(th.tree_hash()),
            "560c2c9333c719cb00cfdffee3ba293db17f58743cdd1f7e4055373ae6300afa"
        );
        assert_eq!(
            hex::encode(th.hash()),
            "5256ec18f11624025905d057d6befb03d77b243511ac5f77ed5e0221ce6d84b5"
        );
    }

    #[test]
    fn test_empty_input() {
        let th = hash_of(b"");
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hex::encode(th.tree_hash()), expected);
        assert_eq!(hex::encode(th.hash()), expected);
    }

    #[test]
    fn test_small_input_tree_equals_flat() {
        // Anything at most one leaf wide has no tree to build.
        for data in [&b"x"[..], &vec![b'y'; MIB - 1][..], &vec![b'z'; MIB][..]] {
            let th = hash_of(data);
            assert_eq!(th.tree_hash(), th.hash());
            assert_eq!(th.hash(), crate::hash::sha256(data));
        }
    }

    #[test]
    fn test_write_partition_independence() {
        let data = vec![b'a'; 2 * MIB + 12345];
        let whole = hash_of(&data);

        for chunk_size in [1usize << 10, 7919, MIB, MIB + 1, data.len()] {
            let mut th = TreeHash::new();
            for chunk in data.chunks(chunk_size) {
                th.write_all(chunk).expect("write must succeed");
            }
            th.close();
            assert_eq!(
                th.tree_hash(),
                whole.tree_hash(),
                "tree hash differs for chunk size {chunk_size}"
            );
            assert_eq!(
                th.hash(),
                whole.hash(),
                "flat hash differs for chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn test_reset() {
        let mut th = TreeHash::new();
        th.write_all(b"some leftover state").expect("write must succeed");
        th.reset();
        th.write_all(b"Hello World").expect("write must succeed");
        th.close();
        assert_eq!(
            hex::encode(th.hash()),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }

    #[test]
    fn test_combine_even_parts() {
        // Four 1 MiB parts combine to the same root a single hasher
        // produces over the concatenation; a power-of-two leaf count
        // takes no promotions.
        let part = hash_of(&vec![b'a'; MIB]);

        let mut multi = MultiTreeHash::new();
        for _ in 0..4 {
            multi.add(part.tree_hash());
        }
        let root = multi.root().expect("combiner must not be empty");

        assert_eq!(
            hex::encode(root),
            "9491cb2ed1d4e7cd53215f4017c23ec4ad21d7050a1e6bb636c4f67e8cddb844"
        );
        assert_eq!(root, hash_of(&vec![b'a'; 4 * MIB]).tree_hash());
    }

    #[test]
    fn test_combine_odd_parts_promotes() {
        // Three parts exercise the promotion path: the third root rides
        // up a level unchanged before the final pairing.
        let part = hash_of(&vec![b'a'; MIB]);

        let mut multi = MultiTreeHash::new();
        for _ in 0..3 {
            multi.add(part.tree_hash());
        }
        let root = multi.root().expect("combiner must not be empty");

        assert_eq!(
            hex::encode(root),
            "70239f4f2ead7561f69d48b956b547edef52a1280a93c262c0b582190be7db17"
        );
        assert_eq!(root, hash_of(&vec![b'a'; 3 * MIB]).tree_hash());
    }

    #[test]
    fn test_combine_uneven_tail() {
        // Two full parts plus a short tail, combined from per-part roots.
        let data = vec![b'a'; 2 * MIB + MIB / 2];

        let mut multi = MultiTreeHash::new();
        for chunk in data.chunks(MIB) {
            multi.add(hash_of(chunk).tree_hash());
        }

        assert_eq!(
            multi.root().expect("combiner must not be empty"),
            hash_of(&data).tree_hash()
        );
    }

    #[test]
    fn test_combine_hex_round_trip() {
        let part = hash_of(&vec![b'a'; MIB]);

        let mut multi = MultiTreeHash::new();
        multi
            .add_hex(&hex::encode(part.tree_hash()))
            .expect("hex root must be accepted");
        assert_eq!(multi.root(), Some(part.tree_hash()));

        assert!(multi.add_hex("not hex").is_err());
        assert!(multi.add_hex("abcd").is_err());
    }

    #[test]
    fn test_empty_combiner() {
        assert_eq!(MultiTreeHash::new().root(), None);
    }

    #[test]
    fn test_verify_tree_hash() {
        let th = hash_of(b"Hello World");
        verify_tree_hash(
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e",
            th.tree_hash(),
        )
        .expect("hashes must match");

        let err = verify_tree_hash(
            "0000000000000000000000000000000000000000000000000000000000000000",
            th.tree_hash(),
        )
        .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }
}
