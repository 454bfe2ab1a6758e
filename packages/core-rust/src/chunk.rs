//! Checksum-chained partitioning of a completed result payload.
//!
//! A payload is split into fixed-size, ordered slices. Each [`Chunk`] records
//! the SHA-256 of its own slice and the checksum of the slice before it, so a
//! consumer that trusts chunk *k* can check that chunk *k+1* belongs to the
//! same sequence without re-fetching anything earlier.
//!
//! # Offsets
//!
//! Offsets count Unicode scalar values, not bytes, so a slice never splits a
//! character. For ASCII payloads the two are identical.
//!
//! # Cursors
//!
//! A cursor is the standard base64 encoding of the decimal offset of the *next*
//! chunk. Cursors are opaque to clients.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default slice length used by the server.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Whether a chunk is the final one of its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    Partial,
    Complete,
}

/// One slice of a chunked payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub offset: usize,
    pub data: String,
    pub checksum: String,
    pub checksum_previous: Option<String>,
    pub state: ChunkState,
    pub cursor: Option<String>,
}

/// Errors found by [`verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("chunk {index}: expected offset {expected}, found {found}")]
    Offset {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("chunk {index}: checksum does not match data")]
    Checksum { index: usize },
    #[error("chunk {index}: checksumPrevious does not link to the prior chunk")]
    Link { index: usize },
    #[error("chunk {index}: state or cursor inconsistent with its position")]
    Position { index: usize },
}

/// Hashes a slice as `sha256:<lowercase hex>`.
#[must_use]
pub fn checksum(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

/// Encodes the offset of the next chunk as an opaque cursor.
#[must_use]
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(offset.to_string())
}

/// Decodes a cursor back into an offset. Returns `None` for anything malformed.
#[must_use]
pub fn decode_cursor(cursor: &str) -> Option<usize> {
    let bytes = STANDARD.decode(cursor).ok()?;
    std::str::from_utf8(&bytes).ok()?.trim().parse().ok()
}

/// Partitions `payload` into a checksum-chained chunk sequence.
///
/// Deterministic for a given `(payload, chunk_size)`. An empty payload yields
/// an empty sequence. A `chunk_size` of zero is treated as one.
#[must_use]
pub fn build_chunks(payload: &str, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut previous: Option<String> = None;
    let mut offset = 0;
    let mut rest = payload;

    while !rest.is_empty() {
        let split = rest
            .char_indices()
            .nth(chunk_size)
            .map_or(rest.len(), |(byte_idx, _)| byte_idx);
        let (data, tail) = rest.split_at(split);
        let next_offset = offset + data.chars().count();
        let is_last = tail.is_empty();
        let sum = checksum(data);

        chunks.push(Chunk {
            offset,
            data: data.to_string(),
            checksum: sum.clone(),
            checksum_previous: previous.replace(sum),
            state: if is_last {
                ChunkState::Complete
            } else {
                ChunkState::Partial
            },
            cursor: (!is_last).then(|| encode_cursor(next_offset)),
        });

        offset = next_offset;
        rest = tail;
    }

    chunks
}

/// Picks the chunk addressed by `cursor`.
///
/// Falls back to the first chunk when the cursor is absent, undecodable, or
/// names an offset no chunk starts at. Returns `None` only for an empty slice.
#[must_use]
pub fn select_chunk<'a>(chunks: &'a [Chunk], cursor: Option<&str>) -> Option<&'a Chunk> {
    let by_cursor = cursor
        .and_then(decode_cursor)
        .and_then(|offset| chunks.iter().find(|c| c.offset == offset));
    by_cursor.or_else(|| chunks.first())
}

/// Checks that `chunks` is a well-formed chain starting at offset 0.
///
/// A prefix of a sequence verifies as long as it is contiguous; the last element
/// of a prefix may be `partial`.
///
/// # Errors
///
/// Returns the first [`ChainError`] encountered.
pub fn verify_chain(chunks: &[Chunk]) -> Result<(), ChainError> {
    let mut expected_offset = 0;
    let mut previous: Option<&str> = None;

    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.offset != expected_offset {
            return Err(ChainError::Offset {
                index,
                expected: expected_offset,
                found: chunk.offset,
            });
        }
        if checksum(&chunk.data) != chunk.checksum {
            return Err(ChainError::Checksum { index });
        }
        if chunk.checksum_previous.as_deref() != previous {
            return Err(ChainError::Link { index });
        }

        expected_offset += chunk.data.chars().count();
        let is_last = index + 1 == chunks.len();
        let position_ok = match chunk.state {
            ChunkState::Complete => is_last && chunk.cursor.is_none(),
            ChunkState::Partial => {
                chunk.cursor.as_deref().and_then(decode_cursor) == Some(expected_offset)
            }
        };
        if !position_ok {
            return Err(ChainError::Position { index });
        }

        previous = Some(&chunk.checksum);
    }

    Ok(())
}
