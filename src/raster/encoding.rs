//! 32-bit id words written into the reference raster.
//!
//! Layout: bit 31 marks a path id (background and debug colors keep it
//! clear), bit 15 selects the visible channel, bits 8..=14 and 16..=30
//! carry the allocator counter, and the low byte stores the point's arc
//! length along its run, normalized to `0..=255`.

/// High 24 bits: the id portion of a word.
pub const ID_MASK: u32 = 0xFFFF_FF00;
/// Set on every word the rasterizer writes for a path.
pub const PATH_BIT: u32 = 0x8000_0000;
/// Set on visible-channel ids, clear on hidden-channel ids.
pub const VISIBLE_BIT: u32 = 0x0000_8000;

const COUNTER_BASE: u32 = 0x0000_a000;
const LOW_BITS: u32 = 0x0000_007f;
const HIGH_BITS: u32 = 0x003f_ff80;

pub fn is_path_id(word: u32) -> bool {
    word & PATH_BIT != 0
}

pub fn is_visible_id(word: u32) -> bool {
    word & VISIBLE_BIT != 0
}

pub fn masked(word: u32) -> u32 {
    word & ID_MASK
}

pub fn length_byte(word: u32) -> u8 {
    (word & 0xFF) as u8
}

/// Normalized arc-length byte: `255 * partial / run_len`, truncated.
pub fn encode_length_byte(partial: f64, run_len: f64) -> u32 {
    if run_len <= 0.0 {
        return 0;
    }
    (255.0 * partial / run_len).clamp(0.0, 255.0) as u32
}

pub fn decode_length(byte: u8, run_len: f64) -> f64 {
    byte as f64 * run_len / 255.0
}

/// Monotone id allocator, reset once per frame.
///
/// A single counter feeds both channels, so visible and hidden ids never
/// collide even under [`ID_MASK`].
#[derive(Clone, Copy, Debug)]
pub struct IdAllocator {
    next: u32,
    frame: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: COUNTER_BASE,
            frame: u64::MAX,
        }
    }
}

impl IdAllocator {
    /// Idempotent per frame: repeated calls with the same stamp keep the
    /// current counter.
    pub fn reset(&mut self, frame: u64) {
        if self.frame != frame {
            self.frame = frame;
            self.next = COUNTER_BASE;
        }
    }

    fn spread(counter: u32) -> u32 {
        ((counter & LOW_BITS) << 8) | ((counter & HIGH_BITS) << 9)
    }

    pub fn fresh(&mut self, visible: bool) -> u32 {
        self.next = self.next.wrapping_add(1);
        let channel = if visible { VISIBLE_BIT } else { 0 };
        Self::spread(self.next) | PATH_BIT | channel
    }
}
