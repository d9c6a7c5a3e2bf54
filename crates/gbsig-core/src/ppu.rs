//! Pixel pipeline: scanline timing, interrupt edges, frame readout and the
//! VRAM-DMA register latch.
//!
//! Each visible line is composited in one batch once the line has run for
//! [`TRANSFER_OFFSET`] cycles, rather than dot by dot.

use crate::palette::{DMG_SHADES, Palettes, cgb_white};
use crate::registers::{Lcdc, StatSelect};
use crate::render::{
    self, LineParams, LineSprites, OAM_SIZE, Pixel, SCREEN_HEIGHT, SCREEN_WIDTH, VideoMemory,
    WindowCounter,
};

#[cfg(feature = "ppu-trace")]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "ppu-trace"))]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {};
}

/// Cycles in one scanline.
pub const LINE_CYCLES: u32 = 456;
/// Cycle offset within a visible line at which the line is composited.
pub const TRANSFER_OFFSET: u32 = 280;
/// Lines per frame including VBlank.
pub const LINES_PER_FRAME: u8 = 154;
const VBLANK_START: u8 = SCREEN_HEIGHT as u8;

/// Interrupt flag bits raised in the IF byte.
pub const INT_VBLANK: u8 = 0x01;
pub const INT_STAT: u8 = 0x02;

/// Step granularity; keeps the transfer point and line advance exact for
/// large step arguments.
const STEP_CHUNK: u32 = 4;

const HDMA_BLOCK_SIZE: u16 = 0x10;

/// Pipeline mode, numbered as reported in STAT bits 0-1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    #[default]
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

/// VRAM-DMA transfer kind selected by HDMA5 bit 7.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DmaMode {
    #[default]
    General,
    HBlank,
}

/// One 16-byte VRAM-DMA copy for the bus to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaBlock {
    pub src: u16,
    /// Absolute VRAM address (0x8000..=0x9FF0).
    pub dst: u16,
}

/// HDMA1-HDMA5 latch. The byte copy belongs to the bus; this only tracks
/// addresses, mode and remaining length, and hands out blocks on request.
#[derive(Clone, Debug)]
struct VramDma {
    src: u16,
    dst: u16,
    /// Remaining 16-byte blocks.
    blocks: u8,
    mode: DmaMode,
    active: bool,
    cancelled: bool,
    /// Blocks the bus may copy right now.
    ready: u8,
}

impl Default for VramDma {
    fn default() -> Self {
        Self {
            src: 0,
            dst: 0x8000,
            blocks: 0,
            mode: DmaMode::General,
            active: false,
            cancelled: false,
            ready: 0,
        }
    }
}

impl VramDma {
    #[inline]
    fn sanitize_dest(addr: u16) -> u16 {
        0x8000 | (addr & 0x1FF0)
    }

    fn read_length(&self) -> u8 {
        if self.active {
            self.blocks.saturating_sub(1) & 0x7F
        } else if self.cancelled {
            0x80 | (self.blocks.saturating_sub(1) & 0x7F)
        } else {
            0xFF
        }
    }

    fn write_length(&mut self, val: u8, in_hblank: bool) {
        if self.active && self.mode == DmaMode::HBlank && val & 0x80 == 0 {
            log::debug!("HDMA cancelled with {} blocks left", self.blocks);
            self.active = false;
            self.cancelled = true;
            self.ready = 0;
            return;
        }
        self.blocks = (val & 0x7F) + 1;
        self.active = true;
        self.cancelled = false;
        if val & 0x80 == 0 {
            self.mode = DmaMode::General;
            self.ready = self.blocks;
        } else {
            self.mode = DmaMode::HBlank;
            self.ready = u8::from(in_hblank);
        }
        log::debug!(
            "VRAM DMA armed: {:?} {} blocks {:04X}->{:04X}",
            self.mode,
            self.blocks,
            self.src,
            self.dst
        );
    }

    fn hblank_entered(&mut self) {
        if self.active && self.mode == DmaMode::HBlank {
            self.ready = 1;
        }
    }

    fn next_block(&mut self) -> Option<DmaBlock> {
        if !self.active || self.ready == 0 {
            return None;
        }
        let block = DmaBlock {
            src: self.src,
            dst: self.dst,
        };
        self.src = self.src.wrapping_add(HDMA_BLOCK_SIZE);
        self.dst = Self::sanitize_dest(self.dst.wrapping_add(HDMA_BLOCK_SIZE));
        self.ready -= 1;
        self.blocks = self.blocks.saturating_sub(1);
        if self.blocks == 0 {
            self.active = false;
            self.ready = 0;
        }
        Some(block)
    }
}

pub struct Ppu {
    mem: VideoMemory,
    vram_bank: usize,

    cgb: bool,

    lcdc: Lcdc,
    stat: StatSelect,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_match: bool,
    dma: u8,
    wy: u8,
    wx: u8,
    palettes: Palettes,
    /// Object priority mode register (OPRI); bit 0 clear selects OAM order.
    opri: u8,
    hdma: VramDma,

    mode: Mode,
    line_cycles: u32,
    /// Line seen by the previous step; `None` right after power-on or
    /// display enable so the first line is always composited.
    prev_line: Option<u8>,
    transfer_due: bool,
    lyc_lock: bool,
    mode_lock: bool,
    window: WindowCounter,

    framebuffer: [[Pixel; SCREEN_WIDTH]; SCREEN_HEIGHT],
    /// Latched sprites for the current scanline
    line_sprites: LineSprites,
    /// Indicates a completed frame is available for readout
    frame_ready: bool,
    frame_counter: u64,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self::new_with_mode(false)
    }

    /// Creates a pipeline with power-on register values. `cgb` selects
    /// extended color mode.
    pub fn new_with_mode(cgb: bool) -> Self {
        Self {
            mem: VideoMemory::default(),
            vram_bank: 0,
            cgb,
            lcdc: Lcdc::new(0x91),
            stat: StatSelect::new(0x85),
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_match: false,
            dma: 0xFF,
            wy: 0,
            wx: 0,
            palettes: Palettes::default(),
            opri: if cgb { 0 } else { 1 },
            hdma: VramDma::default(),
            mode: Mode::HBlank,
            line_cycles: 0,
            prev_line: None,
            transfer_due: false,
            lyc_lock: false,
            mode_lock: false,
            window: WindowCounter::default(),
            framebuffer: [[Pixel::default(); SCREEN_WIDTH]; SCREEN_HEIGHT],
            line_sprites: LineSprites::default(),
            frame_ready: false,
            frame_counter: 0,
        }
    }

    /// Returns true if the PPU is running in Game Boy Color mode.
    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc.lcd_enable()
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn in_hblank(&self) -> bool {
        self.mode == Mode::HBlank
    }

    /// Returns the current value of the internal window line counter.
    pub fn window_line_counter(&self) -> u8 {
        self.window.line
    }

    /// Objects selected for the most recently composited line, in the order
    /// they were drawn (topmost first).
    pub fn line_sprites(&self) -> &LineSprites {
        &self.line_sprites
    }

    /// Returns true if a full frame has been rendered and is ready to display.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Clears the frame ready flag after a frame has been consumed.
    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Returns the number of frames that have been completed since power on.
    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    /// Composited pixels, row-major.
    pub fn pixels(&self) -> &[[Pixel; SCREEN_WIDTH]; SCREEN_HEIGHT] {
        &self.framebuffer
    }

    fn blank_color(&self) -> u32 {
        if self.cgb { cgb_white() } else { DMG_SHADES[0] }
    }

    /// Resolved `0x00RRGGBB` color of the pixel at linear index `index`
    /// (`y * 160 + x`). Out-of-range indices and a disabled display yield the
    /// blank color.
    pub fn pixel_color(&self, index: usize) -> u32 {
        if !self.lcdc.lcd_enable() || index >= SCREEN_WIDTH * SCREEN_HEIGHT {
            return self.blank_color();
        }
        let px = self.framebuffer[index / SCREEN_WIDTH][index % SCREEN_WIDTH];
        self.palettes.resolve(px.palette, px.color_index)
    }

    /// Resolves the whole frame into `0x00RRGGBB` values.
    pub fn framebuffer_rgb(&self) -> Vec<u32> {
        (0..SCREEN_WIDTH * SCREEN_HEIGHT)
            .map(|i| self.pixel_color(i))
            .collect()
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.mem.vram[self.vram_bank][(addr as usize) & 0x1FFF]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.mem.vram[self.vram_bank][(addr as usize) & 0x1FFF] = val;
    }

    /// Direct bank access for loaders that bypass VBK.
    pub fn vram_bank(&self, bank: usize) -> &[u8] {
        &self.mem.vram[bank & 1]
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        let idx = (addr as usize) & 0xFF;
        if idx < OAM_SIZE { self.mem.oam[idx] } else { 0xFF }
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        let idx = (addr as usize) & 0xFF;
        if idx < OAM_SIZE {
            self.mem.oam[idx] = val;
        }
    }

    /// Next VRAM-DMA block the bus should copy now, if any. A general
    /// transfer yields all of its blocks back to back; an HBlank transfer
    /// yields one per HBlank entry.
    pub fn next_dma_block(&mut self) -> Option<DmaBlock> {
        self.hdma.next_block()
    }

    pub fn dma_active(&self) -> bool {
        self.hdma.active
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc.raw(),
            0xFF41 => {
                let coincidence = if self.lyc_match { 0x04 } else { 0 };
                0x80 | self.stat.raw() | coincidence | self.mode as u8
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.palettes.bgp.raw(),
            0xFF48 => self.palettes.obp0.raw(),
            0xFF49 => self.palettes.obp1.raw(),
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb => 0xFE | self.vram_bank as u8,
            0xFF51 if self.cgb => (self.hdma.src >> 8) as u8,
            0xFF52 if self.cgb => (self.hdma.src & 0x00F0) as u8,
            0xFF53 if self.cgb => ((self.hdma.dst & 0x1F00) >> 8) as u8,
            0xFF54 if self.cgb => (self.hdma.dst & 0x00F0) as u8,
            0xFF55 if self.cgb => self.hdma.read_length(),
            0xFF68 if self.cgb => self.palettes.bg_ram.read_index(),
            0xFF69 if self.cgb => self.palettes.bg_ram.read_data(),
            0xFF6A if self.cgb => self.palettes.obj_ram.read_index(),
            0xFF6B if self.cgb => self.palettes.obj_ram.read_data(),
            0xFF6C if self.cgb => self.opri | 0xFE,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        ppu_trace!("ppu write {:04X} <- {:02X}", addr, val);
        match addr {
            0xFF40 => {
                let was_on = self.lcdc.lcd_enable();
                self.lcdc.set(val);
                if was_on && !self.lcdc.lcd_enable() {
                    log::debug!("display disabled at line {}", self.ly);
                    self.blank();
                } else if !was_on && self.lcdc.lcd_enable() {
                    log::debug!("display enabled");
                }
            }
            0xFF41 => {
                self.stat.set(val);
                self.check_mode_interrupt(if_reg);
            }
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                if self.lcdc.lcd_enable() {
                    self.check_lyc(if_reg);
                }
            }
            0xFF46 => self.dma = val,
            0xFF47 => self.palettes.bgp.set(val),
            0xFF48 => self.palettes.obp0.set(val),
            0xFF49 => self.palettes.obp1.set(val),
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF4F if self.cgb => self.vram_bank = (val & 0x01) as usize,
            0xFF51 if self.cgb && !self.hdma.active => {
                self.hdma.src = (val as u16) << 8 | (self.hdma.src & 0x00FF);
            }
            0xFF52 if self.cgb && !self.hdma.active => {
                self.hdma.src = (self.hdma.src & 0xFF00) | (val & 0xF0) as u16;
            }
            0xFF53 if self.cgb && !self.hdma.active => {
                let raw = ((val as u16) << 8) | (self.hdma.dst & 0x00F0);
                self.hdma.dst = VramDma::sanitize_dest(raw);
            }
            0xFF54 if self.cgb && !self.hdma.active => {
                let raw = (self.hdma.dst & 0x1F00) | (val as u16 & 0x00F0);
                self.hdma.dst = VramDma::sanitize_dest(raw);
            }
            0xFF55 if self.cgb => {
                let in_hblank = !self.lcdc.lcd_enable() || self.mode == Mode::HBlank;
                self.hdma.write_length(val, in_hblank);
            }
            0xFF68 if self.cgb => self.palettes.bg_ram.write_index(val),
            0xFF69 if self.cgb => self.palettes.bg_ram.write_data(val),
            0xFF6A if self.cgb => self.palettes.obj_ram.write_index(val),
            0xFF6B if self.cgb => self.palettes.obj_ram.write_data(val),
            0xFF6C if self.cgb => self.opri = val & 0x01,
            _ => {}
        }
    }

    /// Display-off state: line and window counters parked at zero.
    fn blank(&mut self) {
        self.mode = Mode::HBlank;
        self.ly = 0;
        self.line_cycles = 0;
        self.window.reset();
        self.prev_line = None;
        self.transfer_due = false;
        self.lyc_lock = false;
        self.mode_lock = false;
    }

    fn set_mode(&mut self, mode: Mode, if_reg: &mut u8) {
        self.mode = mode;
        self.mode_lock = false;
        self.check_mode_interrupt(if_reg);
    }

    fn check_mode_interrupt(&mut self, if_reg: &mut u8) {
        if !self.mode_lock && self.stat.mode_selected(self.mode as u8) {
            *if_reg |= INT_STAT;
            self.mode_lock = true;
        }
    }

    fn check_lyc(&mut self, if_reg: &mut u8) {
        self.lyc_match = self.ly == self.lyc;
        if self.lyc_match && self.stat.lyc_selected() && !self.lyc_lock {
            *if_reg |= INT_STAT;
            self.lyc_lock = true;
        }
    }

    fn transfer_line(&mut self, if_reg: &mut u8) {
        self.set_mode(Mode::OamScan, if_reg);
        self.line_sprites =
            render::select_sprites(&self.mem.oam, self.ly, self.lcdc.obj_height());
        self.line_sprites
            .sort_for_priority(self.cgb && self.opri & 0x01 == 0);

        self.set_mode(Mode::Transfer, if_reg);
        let params = LineParams {
            ly: self.ly,
            scx: self.scx,
            scy: self.scy,
            wx: self.wx,
            wy: self.wy,
            lcdc: self.lcdc,
            cgb: self.cgb,
        };
        render::render_line(
            &self.mem,
            &params,
            &self.line_sprites,
            &mut self.window,
            &mut self.framebuffer[self.ly as usize],
        );

        self.set_mode(Mode::HBlank, if_reg);
        self.hdma.hblank_entered();
    }

    /// Advances the pipeline by `cycles`, raising interrupt bits in `if_reg`.
    /// Returns true if an HBlank period began during this step.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) -> bool {
        let mut remaining = cycles;
        let mut hblank_triggered = false;
        while remaining > 0 {
            let increment = remaining.min(STEP_CHUNK);
            remaining -= increment;
            if !self.lcdc.lcd_enable() {
                self.blank();
                continue;
            }

            self.check_lyc(if_reg);

            match self.ly {
                0..VBLANK_START => {
                    if self.prev_line != Some(self.ly) {
                        self.transfer_due = true;
                    }
                    if self.transfer_due && self.line_cycles >= TRANSFER_OFFSET {
                        self.transfer_line(if_reg);
                        self.transfer_due = false;
                        hblank_triggered = true;
                    }
                }
                VBLANK_START => {
                    if self.prev_line != Some(self.ly) {
                        self.set_mode(Mode::VBlank, if_reg);
                        *if_reg |= INT_VBLANK;
                        self.window.reset();
                        self.frame_ready = true;
                        self.frame_counter += 1;
                        ppu_trace!("vblank, frame {}", self.frame_counter);
                    }
                }
                _ => {}
            }
            self.prev_line = Some(self.ly);

            self.check_mode_interrupt(if_reg);

            self.line_cycles += increment;
            if self.line_cycles >= LINE_CYCLES {
                self.line_cycles -= LINE_CYCLES;
                self.ly += 1;
                if self.ly == LINES_PER_FRAME {
                    self.ly = 0;
                }
                self.lyc_lock = false;
            }
        }
        hblank_triggered
    }
}
