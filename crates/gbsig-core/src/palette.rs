//! Palette resolution for legacy 4-shade and extended 15-bit color modes.
//!
//! Colors are returned as `0x00RRGGBB`, the layout the framebuffer readout
//! and the host's PNG writer both consume.

use std::sync::LazyLock;

use crate::registers::DmgPalette;

const PAL_RAM_SIZE: usize = 0x40;
const PAL_INDEX_MASK: u8 = 0x3F;
const PAL_UNUSED_BIT: u8 = 0x40;
const PAL_AUTO_INCREMENT_BIT: u8 = 0x80;

/// Output colors for legacy shades 0..=3 (lightest first).
pub const DMG_SHADES: [u32; 4] = [0x00FF_FF80, 0x00A0_C040, 0x0040_8040, 0x0000_1800];

/// 5-bit to 8-bit channel expansion: the mean of a linear ramp and a square
/// root curve, truncated.
static EXPAND_5BIT: LazyLock<[u8; 32]> = LazyLock::new(|| {
    let mut table = [0u8; 32];
    for (i, out) in table.iter_mut().enumerate() {
        let fi = i as f64;
        let linear = fi * 255.0 / 31.0;
        let curve = (fi * 255.0 * 255.0 / 31.0).sqrt();
        *out = ((linear + curve) / 2.0) as u8;
    }
    table
});

/// Bit-reversed bytes, used for horizontally flipped tile rows.
pub static X_FLIP: [u8; 256] = build_x_flip();

const fn build_x_flip() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }
    table
}

/// Expands one 5-bit color channel to 8 bits.
#[inline]
pub fn expand_5bit(value: u8) -> u8 {
    EXPAND_5BIT[(value & 0x1F) as usize]
}

/// Converts a little-endian RGB555 pair to `0x00RRGGBB`.
pub fn decode_rgb555(lo: u8, hi: u8) -> u32 {
    let r = lo & 0x1F;
    let g = ((hi & 0x03) << 3) | (lo >> 5);
    let b = (hi >> 2) & 0x1F;
    ((expand_5bit(r) as u32) << 16) | ((expand_5bit(g) as u32) << 8) | expand_5bit(b) as u32
}

/// Color of a fully lit extended-mode pixel; shown while the display is off.
pub fn cgb_white() -> u32 {
    decode_rgb555(0xFF, 0x7F)
}

/// One 64-byte extended palette RAM with its index register.
#[derive(Clone)]
pub struct PaletteRam {
    data: [u8; PAL_RAM_SIZE],
    index: u8,
}

impl Default for PaletteRam {
    fn default() -> Self {
        Self {
            data: [0; PAL_RAM_SIZE],
            index: PAL_UNUSED_BIT,
        }
    }
}

impl PaletteRam {
    pub fn read_index(&self) -> u8 {
        self.index | PAL_UNUSED_BIT
    }

    pub fn write_index(&mut self, value: u8) {
        self.index = (value & (PAL_AUTO_INCREMENT_BIT | PAL_INDEX_MASK)) | PAL_UNUSED_BIT;
    }

    pub fn read_data(&self) -> u8 {
        self.data[(self.index & PAL_INDEX_MASK) as usize]
    }

    /// Stores `value` at the current index, then advances the index when
    /// auto-increment is selected. The index wraps within the 64 bytes.
    pub fn write_data(&mut self, value: u8) {
        let idx = self.index & PAL_INDEX_MASK;
        self.data[idx as usize] = value;
        if self.index & PAL_AUTO_INCREMENT_BIT != 0 {
            let next = idx.wrapping_add(1) & PAL_INDEX_MASK;
            self.index = PAL_AUTO_INCREMENT_BIT | PAL_UNUSED_BIT | next;
        }
    }

    /// Resolved color for `color_index` of palette `palette` (0..=7).
    pub fn color(&self, palette: u8, color_index: u8) -> u32 {
        let off = (palette & 0x07) as usize * 8 + (color_index & 0x03) as usize * 2;
        decode_rgb555(self.data[off], self.data[off + 1])
    }

    pub fn bytes(&self) -> &[u8; PAL_RAM_SIZE] {
        &self.data
    }
}

/// Which palette a composited pixel draws from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaletteId {
    #[default]
    Bg,
    Obj0,
    Obj1,
    CgbBg(u8),
    CgbObj(u8),
}

/// Palette state for both color modes.
#[derive(Clone)]
pub struct Palettes {
    pub bgp: DmgPalette,
    pub obp0: DmgPalette,
    pub obp1: DmgPalette,
    pub bg_ram: PaletteRam,
    pub obj_ram: PaletteRam,
}

impl Default for Palettes {
    fn default() -> Self {
        Self {
            bgp: DmgPalette::new(0xFC),
            obp0: DmgPalette::new(0xFF),
            obp1: DmgPalette::new(0xFF),
            bg_ram: PaletteRam::default(),
            obj_ram: PaletteRam::default(),
        }
    }
}

impl Palettes {
    pub fn resolve(&self, id: PaletteId, color_index: u8) -> u32 {
        match id {
            PaletteId::Bg => DMG_SHADES[self.bgp.shade(color_index) as usize],
            PaletteId::Obj0 => DMG_SHADES[self.obp0.shade(color_index) as usize],
            PaletteId::Obj1 => DMG_SHADES[self.obp1.shade(color_index) as usize],
            PaletteId::CgbBg(p) => self.bg_ram.color(p, color_index),
            PaletteId::CgbObj(p) => self.obj_ram.color(p, color_index),
        }
    }
}
