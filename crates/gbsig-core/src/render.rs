//! Scanline compositor.
//!
//! Renders one full line of background, window and objects into a row of
//! [`Pixel`]s. Colors are resolved later, at readout, so palette writes made
//! after the line was composited still show up in the frame.

use crate::palette::{PaletteId, X_FLIP};
use crate::registers::Lcdc;

// Screen resolution
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Sprite limits
pub const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

// Internal memory sizes
pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// VRAM layout
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const SIGNED_TILE_BASE: isize = 0x1000;

/// One composited pixel, before palette resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pixel {
    /// 2-bit color index (0..=3).
    pub color_index: u8,
    pub palette: PaletteId,
    /// Set for BG/window pixels whose tile attribute claims priority.
    pub bg_priority: bool,
}

/// Tile and object memory owned by the pixel pipeline.
#[derive(Clone)]
pub struct VideoMemory {
    pub vram: [[u8; VRAM_BANK_SIZE]; 2],
    pub oam: [u8; OAM_SIZE],
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self {
            vram: [[0; VRAM_BANK_SIZE]; 2],
            oam: [0; OAM_SIZE],
        }
    }
}

/// Object attributes latched for the current scanline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Sprite {
    pub x: i16,
    pub y: i16,
    pub tile: u8,
    pub flags: u8,
    pub oam_index: usize,
}

/// The objects selected for one scanline, at most ten.
#[derive(Clone, Debug, Default)]
pub struct LineSprites {
    sprites: [Sprite; MAX_SPRITES_PER_LINE],
    count: usize,
}

impl LineSprites {
    pub fn as_slice(&self) -> &[Sprite] {
        &self.sprites[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Orders the list so the object drawn on top comes first.
    ///
    /// `oam_order` selects native extended-mode priority (OAM index only);
    /// otherwise the smallest X wins and ties fall to the smaller OAM index.
    pub fn sort_for_priority(&mut self, oam_order: bool) {
        let list = &mut self.sprites[..self.count];
        if oam_order {
            list.sort_by_key(|s| s.oam_index);
        } else {
            list.sort_by_key(|s| (s.x, s.oam_index));
        }
    }
}

/// Scans OAM in index order and returns the first ten objects whose vertical
/// span covers `ly`.
pub fn select_sprites(oam: &[u8; OAM_SIZE], ly: u8, height: u8) -> LineSprites {
    let mut out = LineSprites::default();
    let ly = ly as i16;
    let height = height as i16;
    for i in 0..TOTAL_SPRITES {
        if out.count >= MAX_SPRITES_PER_LINE {
            break;
        }
        let base = i * 4;
        let y = oam[base] as i16 - 16;
        if ly >= y && ly < y + height {
            out.sprites[out.count] = Sprite {
                x: oam[base + 1] as i16 - 8,
                y,
                tile: oam[base + 2],
                flags: oam[base + 3],
                oam_index: i,
            };
            out.count += 1;
        }
    }
    out
}

/// Register snapshot the compositor reads for one line.
#[derive(Clone, Copy, Debug)]
pub struct LineParams {
    pub ly: u8,
    pub scx: u8,
    pub scy: u8,
    pub wx: u8,
    pub wy: u8,
    pub lcdc: Lcdc,
    pub cgb: bool,
}

/// Internal window line counter plus the window-enable bit seen on the
/// previous composited line. Turning the window back on restarts the count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowCounter {
    pub line: u8,
    pub prev_enabled: bool,
}

impl WindowCounter {
    pub fn reset(&mut self) {
        self.line = 0;
    }
}

/// Pattern bytes and attributes of the BG/window tile under the cursor.
#[derive(Clone, Copy, Default)]
struct TileRow {
    lo: u8,
    hi: u8,
    palette: PaletteId,
    bg_priority: bool,
}

impl TileRow {
    #[inline(always)]
    fn color_at(&self, px: u8) -> u8 {
        let bit = 7 - (px & 7);
        ((self.hi >> bit) & 1) << 1 | ((self.lo >> bit) & 1)
    }
}

/// Fetches one row of a BG/window tile from map entry `map_index`, applying
/// the extended-mode attribute byte (bank, flips, palette, priority).
fn fetch_tile_row(
    mem: &VideoMemory,
    params: &LineParams,
    map_base: usize,
    map_index: usize,
    row: u8,
) -> TileRow {
    let map_addr = map_base + (map_index & 0x3FF);
    let tile_index = mem.vram[0][map_addr];
    let (attr, bank) = if params.cgb {
        let attr = mem.vram[1][map_addr];
        (attr, ((attr >> 3) & 1) as usize)
    } else {
        (0, 0)
    };
    let mut row = row & 7;
    if attr & 0x40 != 0 {
        row = 7 - row;
    }
    let tile_start = if params.lcdc.tile_data_unsigned() {
        tile_index as usize * 16
    } else {
        (SIGNED_TILE_BASE + tile_index as i8 as isize * 16) as usize
    };
    let addr = tile_start + row as usize * 2;
    let mut lo = mem.vram[bank][addr];
    let mut hi = mem.vram[bank][addr + 1];
    if attr & 0x20 != 0 {
        lo = X_FLIP[lo as usize];
        hi = X_FLIP[hi as usize];
    }
    let palette = if params.cgb {
        PaletteId::CgbBg(attr & 0x07)
    } else {
        PaletteId::Bg
    };
    TileRow {
        lo,
        hi,
        palette,
        bg_priority: attr & 0x80 != 0,
    }
}

/// Composites line `params.ly` into `out`.
///
/// `sprites` must already be in priority order (see
/// [`LineSprites::sort_for_priority`]). The window counter advances only
/// when the window drew on this line and restarts from zero on the first
/// line the window is enabled again after being off.
pub fn render_line(
    mem: &VideoMemory,
    params: &LineParams,
    sprites: &LineSprites,
    window: &mut WindowCounter,
    out: &mut [Pixel; SCREEN_WIDTH],
) {
    let lcdc = params.lcdc;
    // In legacy mode LCDC bit 0 blanks BG and window to color 0. Extended
    // mode always draws them and uses the bit as master priority instead.
    let bg_enabled = params.cgb || lcdc.bg_window_enable();

    out.fill(Pixel::default());
    if params.cgb {
        for px in out.iter_mut() {
            px.palette = PaletteId::CgbBg(0);
        }
    }

    if bg_enabled {
        draw_background(mem, params, out);
        if lcdc.window_enable() {
            if !window.prev_enabled {
                window.reset();
            }
            if params.ly >= params.wy && params.wx <= WINDOW_X_MAX {
                draw_window(mem, params, window.line, out);
                window.line = window.line.wrapping_add(1);
            }
        }
        window.prev_enabled = lcdc.window_enable();
    }

    if lcdc.obj_enable() {
        draw_sprites(mem, params, sprites, out);
    }
}

fn draw_background(mem: &VideoMemory, params: &LineParams, out: &mut [Pixel; SCREEN_WIDTH]) {
    let map_base = if params.lcdc.bg_map_high() {
        BG_MAP_1_BASE
    } else {
        BG_MAP_0_BASE
    };
    let bg_y = params.ly.wrapping_add(params.scy);
    let map_row = (bg_y >> 3) as usize;
    let mut tile = TileRow::default();

    for (x, px) in out.iter_mut().enumerate() {
        let bg_x = (x as u8).wrapping_add(params.scx);
        if x == 0 || bg_x & 7 == 0 {
            let map_col = (bg_x >> 3) as usize;
            tile = fetch_tile_row(mem, params, map_base, map_row * 32 + map_col, bg_y);
        }
        *px = Pixel {
            color_index: tile.color_at(bg_x),
            palette: tile.palette,
            bg_priority: tile.bg_priority,
        };
    }
}

fn draw_window(
    mem: &VideoMemory,
    params: &LineParams,
    win_line: u8,
    out: &mut [Pixel; SCREEN_WIDTH],
) {
    let map_base = if params.lcdc.window_map_high() {
        BG_MAP_1_BASE
    } else {
        BG_MAP_0_BASE
    };
    let map_row = (win_line >> 3) as usize;
    let origin = params.wx as i16 - 7;
    let start = origin.max(0) as usize;
    let mut tile = TileRow::default();

    for (x, px) in out.iter_mut().enumerate().skip(start) {
        let win_x = (x as i16 - origin) as u8;
        if x == start || win_x & 7 == 0 {
            let map_col = (win_x >> 3) as usize;
            tile = fetch_tile_row(mem, params, map_base, map_row * 32 + map_col, win_line);
        }
        *px = Pixel {
            color_index: tile.color_at(win_x),
            palette: tile.palette,
            bg_priority: tile.bg_priority,
        };
    }
}

fn draw_sprites(
    mem: &VideoMemory,
    params: &LineParams,
    sprites: &LineSprites,
    out: &mut [Pixel; SCREEN_WIDTH],
) {
    let height = params.lcdc.obj_height() as i16;
    let master_priority = params.lcdc.bg_window_enable();
    let mut drawn = [false; SCREEN_WIDTH];

    for s in sprites.as_slice() {
        let mut tile = s.tile;
        if height == 16 {
            tile &= 0xFE;
        }
        let mut line_idx = params.ly as i16 - s.y;
        if s.flags & 0x40 != 0 {
            line_idx = height - 1 - line_idx;
        }
        let bank = if params.cgb {
            ((s.flags >> 3) & 0x01) as usize
        } else {
            0
        };
        let addr = (tile as usize + (line_idx as usize >> 3)) * 16 + (line_idx as usize & 7) * 2;
        let mut lo = mem.vram[bank][addr];
        let mut hi = mem.vram[bank][addr + 1];
        if s.flags & 0x20 != 0 {
            lo = X_FLIP[lo as usize];
            hi = X_FLIP[hi as usize];
        }
        let palette = if params.cgb {
            PaletteId::CgbObj(s.flags & 0x07)
        } else if s.flags & 0x10 != 0 {
            PaletteId::Obj1
        } else {
            PaletteId::Obj0
        };

        for px in 0..8u8 {
            let bit = 7 - px;
            let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
            if color_id == 0 {
                continue;
            }
            let sx = s.x + px as i16;
            if !(0i16..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                continue;
            }
            let under = out[sx as usize];
            if master_priority && under.color_index != 0 {
                if params.cgb && under.bg_priority {
                    continue;
                }
                if s.flags & 0x80 != 0 {
                    continue;
                }
            }
            out[sx as usize] = Pixel {
                color_index: color_id,
                palette,
                bg_priority: false,
            };
            drawn[sx as usize] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lcdc: u8) -> LineParams {
        LineParams {
            ly: 0,
            scx: 0,
            scy: 0,
            wx: 7,
            wy: 0,
            lcdc: Lcdc::new(lcdc),
            cgb: false,
        }
    }

    #[test]
    fn signed_tile_addressing_reaches_lower_block() {
        let mut mem = VideoMemory::default();
        // Tile 0 is at 0x1000 in signed mode and at 0x0000 otherwise.
        mem.vram[0][0x1000] = 0xFF;
        let row = fetch_tile_row(&mem, &params(0x81), BG_MAP_0_BASE, 0, 0);
        assert_eq!(row.lo, 0xFF);
        assert_eq!(row.color_at(0), 1);

        let row = fetch_tile_row(&mem, &params(0x91), BG_MAP_0_BASE, 0, 0);
        assert_eq!(row.lo, 0x00);
    }

    #[test]
    fn window_left_of_screen_starts_mid_tile() {
        let mut mem = VideoMemory::default();
        // Window tile 0 row 0: leftmost pixel color 1, rest color 0.
        mem.vram[0][0] = 0x80;
        // BG uses map 0x1800 filled with tile 1 (solid color 3).
        mem.vram[0][BG_MAP_0_BASE] = 1;
        mem.vram[0][16] = 0xFF;
        mem.vram[0][17] = 0xFF;
        let mut p = params(0x80 | 0x40 | 0x20 | 0x10 | 0x01);
        p.wx = 0;
        let mut out = [Pixel::default(); SCREEN_WIDTH];
        let mut window = WindowCounter::default();
        render_line(&mem, &p, &LineSprites::default(), &mut window, &mut out);
        // WX=0 scrolls the window 7 pixels left, hiding its first pixel.
        assert_eq!(out[0].color_index, 0);
        assert_eq!(window.line, 1);
    }

    #[test]
    fn window_past_right_edge_is_not_drawn() {
        let mem = VideoMemory::default();
        let mut p = params(0xB1);
        p.wx = 167;
        let mut out = [Pixel::default(); SCREEN_WIDTH];
        let mut window = WindowCounter {
            line: 3,
            prev_enabled: true,
        };
        render_line(&mem, &p, &LineSprites::default(), &mut window, &mut out);
        assert_eq!(window.line, 3);
    }

    #[test]
    fn window_reenable_restarts_counter() {
        let mem = VideoMemory::default();
        let mut window = WindowCounter {
            line: 10,
            prev_enabled: false,
        };
        let mut out = [Pixel::default(); SCREEN_WIDTH];
        let p = params(0xB1);
        render_line(&mem, &p, &LineSprites::default(), &mut window, &mut out);
        assert_eq!(window, WindowCounter { line: 1, prev_enabled: true });

        // Window off: counter holds, flag drops.
        render_line(&mem, &params(0x91), &LineSprites::default(), &mut window, &mut out);
        assert_eq!(window, WindowCounter { line: 1, prev_enabled: false });

        // BG/window disabled in legacy mode leaves the flag untouched.
        render_line(&mem, &params(0xB0), &LineSprites::default(), &mut window, &mut out);
        assert_eq!(window, WindowCounter { line: 1, prev_enabled: false });
    }
}
