//! Test fixtures for generating test data.

use larder_core::{BlobHash, BlobInfo, ClaimMetadata, Outpoint, StreamHash};
use serde_json::json;

/// Blob hash derived from a seed.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn blob_hash(seed: &str) -> BlobHash {
    BlobHash::compute(seed.as_bytes())
}

/// Stream hash derived from a seed.
#[allow(dead_code)]
pub fn stream_hash(seed: &str) -> StreamHash {
    StreamHash::from_hex(BlobHash::compute(format!("stream:{seed}").as_bytes()).as_str())
        .expect("computed hash is valid hex")
}

/// A 32-byte hash made of one hex byte repeated, e.g. `"aa" * 32`.
#[allow(dead_code)]
pub fn repeated_hash(byte: &str) -> BlobHash {
    BlobHash::from_hex(&byte.repeat(32)).expect("repeated hex is valid")
}

#[allow(dead_code)]
pub fn repeated_stream_hash(byte: &str) -> StreamHash {
    StreamHash::from_hex(&byte.repeat(32)).expect("repeated hex is valid")
}

#[allow(dead_code)]
pub fn outpoint(txid: &str, nout: u32) -> Outpoint {
    Outpoint::new(txid, nout).expect("valid outpoint")
}

/// Claim payload naming `sd_hash` as its stream descriptor.
#[allow(dead_code)]
pub fn claim_payload(sd_hash: &BlobHash) -> ClaimMetadata {
    ClaimMetadata::new(json!({
        "title": "test claim",
        "sources": { "lbry_sd_hash": sd_hash.as_str() },
    }))
}

/// `count` data pieces for a stream followed by its terminator.
#[allow(dead_code)]
pub fn stream_pieces(seed: &str, count: u32) -> Vec<BlobInfo> {
    let mut pieces: Vec<BlobInfo> = (0..count)
        .map(|i| {
            BlobInfo::new(
                blob_hash(&format!("{seed}-piece-{i}")),
                i,
                format!("iv{i}"),
                2 * 1024 * 1024,
            )
        })
        .collect();
    pieces.push(BlobInfo::terminator(count, format!("iv{count}")));
    pieces
}
