//! Binary map format.
//!
//! Layout:
//! - Header (20 bytes):
//!   - Magic: "VSMP" (4 bytes)
//!   - Version: u16 (little-endian)
//!   - Flags: u16 (little-endian, reserved, must be 0)
//!   - Payload length: u64 (little-endian)
//!   - CRC32C of the payload: u32 (little-endian)
//! - Payload: postcard encoding of identification, point cloud, keyframes,
//!   covisibility graph and retrieval index, in that order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MapError, Result};

use super::covisibility::CovisibilityGraph;
use super::identification::Identification;
use super::keyframe_collection::KeyframeCollection;
use super::keyframe_db::KeyframeRetrieval;
use super::map::{Map, MapPersistence};
use super::sparse_map::{FeaturePointCloud, SparseMap};

/// Magic bytes at the start of every map file.
pub const MAP_MAGIC: [u8; 4] = *b"VSMP";

/// Current map format version.
pub const MAP_VERSION: u16 = 1;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub flags: u16,
    pub payload_len: u64,
    pub checksum: u32,
}

impl MapHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic: MAP_MAGIC,
            version: MAP_VERSION,
            flags: 0,
            payload_len: payload.len() as u64,
            checksum: crc32c::crc32c(payload),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&self.magic);
        header[4..6].copy_from_slice(&self.version.to_le_bytes());
        header[6..8].copy_from_slice(&self.flags.to_le_bytes());
        header[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        header[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        header
    }

    /// Parse and check magic and version.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(MapError::CorruptMapData(format!(
                "truncated header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAP_MAGIC {
            return Err(MapError::CorruptMapData("invalid magic bytes".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != MAP_VERSION {
            return Err(MapError::IncompatibleVersion {
                found: version,
                supported: MAP_VERSION,
            });
        }

        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..16]);
        let checksum = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);

        Ok(Self {
            magic,
            version,
            flags,
            payload_len: u64::from_le_bytes(len),
            checksum,
        })
    }
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    identification: &'a Identification,
    point_cloud: &'a FeaturePointCloud,
    keyframes: &'a KeyframeCollection,
    covisibility_graph: &'a CovisibilityGraph,
    keyframe_retrieval: &'a KeyframeRetrieval,
}

#[derive(Deserialize)]
struct Payload {
    identification: Identification,
    point_cloud: FeaturePointCloud,
    keyframes: KeyframeCollection,
    covisibility_graph: CovisibilityGraph,
    keyframe_retrieval: KeyframeRetrieval,
}

/// Encode a map. Store read locks are taken in canonical order, then the
/// identification lock, and all are held until the payload is complete.
pub fn encode_map(map: &SparseMap) -> Result<Vec<u8>> {
    let snapshot = map.read_all();
    let identification = map.identification();

    let payload = postcard::to_allocvec(&PayloadRef {
        identification: &identification,
        point_cloud: &snapshot.point_cloud,
        keyframes: &snapshot.keyframes,
        covisibility_graph: &snapshot.covisibility_graph,
        keyframe_retrieval: &snapshot.keyframe_retrieval,
    })
    .map_err(|e| MapError::CorruptMapData(format!("encode failed: {}", e)))?;
    drop(identification);
    drop(snapshot);

    let header = MapHeader::for_payload(&payload);
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&payload);

    debug!("Encoded map: {} payload bytes, crc32c {:08x}", payload.len(), header.checksum);
    Ok(out)
}

/// Decode a map. Never returns a partially wired map: every structural or
/// cross-store problem is reported as [`MapError::CorruptMapData`], an
/// unknown version as [`MapError::IncompatibleVersion`].
pub fn decode_map(bytes: &[u8]) -> Result<SparseMap> {
    let header = MapHeader::decode(bytes)?;
    if header.flags != 0 {
        return Err(MapError::CorruptMapData(format!(
            "unknown header flags {:#06x}",
            header.flags
        )));
    }

    let payload = &bytes[HEADER_SIZE..];
    let expected = header.payload_len;
    if (payload.len() as u64) < expected {
        return Err(MapError::CorruptMapData(format!(
            "truncated payload: {} of {} bytes",
            payload.len(),
            expected
        )));
    }
    if (payload.len() as u64) > expected {
        return Err(MapError::CorruptMapData(format!(
            "{} trailing bytes after payload",
            payload.len() as u64 - expected
        )));
    }

    let checksum = crc32c::crc32c(payload);
    if checksum != header.checksum {
        return Err(MapError::CorruptMapData(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            header.checksum, checksum
        )));
    }

    let (decoded, rest): (Payload, _) = postcard::take_from_bytes(payload)
        .map_err(|e| MapError::CorruptMapData(format!("decode failed: {}", e)))?;
    if !rest.is_empty() {
        return Err(MapError::CorruptMapData(format!(
            "{} undecoded bytes in payload",
            rest.len()
        )));
    }

    SparseMap::from_parts(
        decoded.identification,
        decoded.point_cloud,
        decoded.keyframes,
        decoded.covisibility_graph,
        decoded.keyframe_retrieval,
    )
}

impl Map for SparseMap {
    fn identification_snapshot(&self) -> Identification {
        self.identification().clone()
    }

    fn update_identification(&self, f: &mut dyn FnMut(&mut Identification)) {
        f(&mut self.identification());
    }
}

impl MapPersistence for SparseMap {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_map(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_map(bytes)
    }
}
