//! Process-wide identifiers and their color encoding for picking.

use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier shared by instances, occurrences, references and bodies.
pub type Uid = u32;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Returns a new identifier, unique for the lifetime of the process.
pub fn generate_id() -> Uid {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Encodes the low 24 bits of an id as an RGB color.
///
/// Red holds bits 0..8, green 8..16 and blue 16..24. Alpha is never used so
/// that blending cannot corrupt the id.
pub fn encode_rgb_id(id: Uid) -> [u8; 3] {
    [
        (id & 0xFF) as u8,
        ((id >> 8) & 0xFF) as u8,
        ((id >> 16) & 0xFF) as u8,
    ]
}

/// Inverse of [`encode_rgb_id`].
pub fn decode_rgb_id(rgb: [u8; 3]) -> Uid {
    u32::from(rgb[0]) | (u32::from(rgb[1]) << 8) | (u32::from(rgb[2]) << 16)
}
