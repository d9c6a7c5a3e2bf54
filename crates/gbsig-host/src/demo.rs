//! Scripted register program that stands in for a running game: a scrolling
//! checkerboard, one bouncing object and a held two-voice chord with a noise
//! tick. Everything goes through the same register writes a CPU would make.

use gbsig_core::devices::Devices;
use gbsig_core::hardware::Model;

/// Work RAM window the extended-mode program stages tile data in before
/// uploading it with a general VRAM-DMA.
const STAGING_BASE: u16 = 0xC000;

const TILE_LIGHT: u8 = 0;
const TILE_DARK: u8 = 1;
const TILE_BALL: u8 = 2;

const BALL_ROWS: [u8; 8] = [0x3C, 0x7E, 0xFF, 0xFF, 0xFF, 0xFF, 0x7E, 0x3C];

/// Legacy tile patterns: light (color 1), dark (color 2) and a round object
/// in color 3.
fn tile_data() -> Vec<u8> {
    let mut data: Vec<u8> = Vec::with_capacity(48);
    data.extend([0xFF, 0x00].repeat(8));
    data.extend([0x00, 0xFF].repeat(8));
    for row in BALL_ROWS {
        data.extend([row, row]);
    }
    data
}

/// Extended palettes as RGB555: background 0 and 1, object 0.
const BG_PALETTES: [[u16; 4]; 2] = [
    [0x7FFF, 0x5EF7, 0x39CE, 0x0000],
    [0x7FFF, 0x7E8C, 0x4D06, 0x0000],
];
const OBJ_PALETTE: [u16; 4] = [0x7FFF, 0x001F, 0x0010, 0x0000];

/// Square-channel period for a frequency in Hz.
fn square_period(hz: f64) -> u16 {
    (2048.0 - 131_072.0 / hz).round().clamp(0.0, 2047.0) as u16
}

pub struct Demo {
    model: Model,
    staging: Vec<u8>,
}

impl Demo {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            staging: tile_data(),
        }
    }

    /// Source bytes for VRAM-DMA; anything outside the staged tiles reads
    /// open bus.
    pub fn read_staging(&self, addr: u16) -> u8 {
        addr.checked_sub(STAGING_BASE)
            .and_then(|off| self.staging.get(off as usize))
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn load(&self, dev: &mut Devices) {
        dev.write(0xFF40, 0x00); // display off while loading
        self.load_tiles(dev);
        self.load_map(dev);
        self.load_palettes(dev);

        // Object 0: the ball, centered.
        dev.write(0xFE00, 16 + 68);
        dev.write(0xFE01, 8 + 76);
        dev.write(0xFE02, TILE_BALL);
        dev.write(0xFE03, 0x00);

        dev.write(0xFF40, 0x93); // display, objects, BG on; tiles at 0x8000
        self.start_audio(dev);
        log::info!("demo program loaded ({} mode)", self.model);
    }

    fn load_tiles(&self, dev: &mut Devices) {
        if self.model.is_cgb() {
            dev.write(0xFF51, (STAGING_BASE >> 8) as u8);
            dev.write(0xFF52, STAGING_BASE as u8);
            dev.write(0xFF53, 0x00);
            dev.write(0xFF54, 0x00);
            dev.write(0xFF55, (self.staging.len() / 16 - 1) as u8); // general
            let copied = dev.run_vram_dma(|addr| self.read_staging(addr));
            log::debug!("uploaded {copied} tile blocks by VRAM-DMA");
        } else {
            for (i, &byte) in self.staging.iter().enumerate() {
                dev.write(0x8000 + i as u16, byte);
            }
        }
    }

    fn load_map(&self, dev: &mut Devices) {
        for y in 0..32u16 {
            for x in 0..32u16 {
                let tile = if (x + y) % 2 == 0 { TILE_LIGHT } else { TILE_DARK };
                dev.write(0x9800 + y * 32 + x, tile);
            }
        }
        if self.model.is_cgb() {
            dev.write(0xFF4F, 1);
            for y in 0..32u16 {
                for x in 0..32u16 {
                    let palette = ((x / 4 + y / 4) % 2) as u8;
                    dev.write(0x9800 + y * 32 + x, palette);
                }
            }
            dev.write(0xFF4F, 0);
        }
    }

    fn load_palettes(&self, dev: &mut Devices) {
        dev.write(0xFF47, 0xE4);
        dev.write(0xFF48, 0xE4);
        dev.write(0xFF49, 0x1B);
        if !self.model.is_cgb() {
            return;
        }
        dev.write(0xFF68, 0x80); // index 0, auto-increment
        for color in BG_PALETTES.iter().flatten() {
            let [lo, hi] = color.to_le_bytes();
            dev.write(0xFF69, lo);
            dev.write(0xFF69, hi);
        }
        dev.write(0xFF6A, 0x80);
        for color in OBJ_PALETTE {
            let [lo, hi] = color.to_le_bytes();
            dev.write(0xFF6B, lo);
            dev.write(0xFF6B, hi);
        }
    }

    fn start_audio(&self, dev: &mut Devices) {
        dev.write(0xFF26, 0x80); // master enable
        dev.write(0xFF24, 0x77);
        dev.write(0xFF25, 0xFF);

        // C5 on channel 1, E5 on channel 2, both held.
        let c5 = square_period(523.25);
        dev.write(0xFF10, 0x00);
        dev.write(0xFF11, 0x80);
        dev.write(0xFF12, 0xA0);
        dev.write(0xFF13, c5 as u8);
        dev.write(0xFF14, 0x80 | (c5 >> 8) as u8);

        let e5 = square_period(659.25);
        dev.write(0xFF16, 0x40);
        dev.write(0xFF17, 0x80);
        dev.write(0xFF18, e5 as u8);
        dev.write(0xFF19, 0x80 | (e5 >> 8) as u8);

        dev.write(0xFF21, 0x71); // noise: volume 7, fading
        dev.write(0xFF22, 0x55);
        self.tick_noise(dev);
    }

    fn tick_noise(&self, dev: &mut Devices) {
        dev.write(0xFF23, 0x80);
    }

    /// Per-frame register updates: background scroll, object bounce and a
    /// noise tick once a second.
    pub fn animate(&self, dev: &mut Devices, frame: u64) {
        dev.write(0xFF43, frame as u8);
        dev.write(0xFF42, (frame / 2) as u8);

        let phase = (frame % 120) as i32;
        let offset = if phase < 60 { phase } else { 120 - phase };
        dev.write(0xFE01, (8 + 46 + offset) as u8);

        if frame % 60 == 0 {
            self.tick_noise(dev);
        }
    }
}
