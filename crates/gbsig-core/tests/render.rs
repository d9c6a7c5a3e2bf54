use gbsig_core::palette::PaletteId;
use gbsig_core::registers::Lcdc;
use gbsig_core::render::{
    LineParams, LineSprites, MAX_SPRITES_PER_LINE, OAM_SIZE, Pixel, SCREEN_WIDTH, VideoMemory,
    WindowCounter, render_line, select_sprites,
};

const SOLID_1: u8 = 1;
const SOLID_2: u8 = 2;

/// Tile 1 is solid color 1 and tile 2 solid color 2; tile 3 solid color 3.
fn tile_memory() -> VideoMemory {
    let mut mem = VideoMemory::default();
    for row in 0..8 {
        mem.vram[0][16 + row * 2] = 0xFF;
        mem.vram[0][32 + row * 2 + 1] = 0xFF;
        mem.vram[0][48 + row * 2] = 0xFF;
        mem.vram[0][48 + row * 2 + 1] = 0xFF;
    }
    mem
}

fn put_sprite(oam: &mut [u8; OAM_SIZE], index: usize, y: u8, x: u8, tile: u8, flags: u8) {
    let base = index * 4;
    oam[base] = y;
    oam[base + 1] = x;
    oam[base + 2] = tile;
    oam[base + 3] = flags;
}

fn params(ly: u8, lcdc: u8, cgb: bool) -> LineParams {
    LineParams {
        ly,
        scx: 0,
        scy: 0,
        wx: 7,
        wy: 0,
        lcdc: Lcdc::new(lcdc),
        cgb,
    }
}

fn render(mem: &VideoMemory, p: &LineParams, oam_order: bool) -> [Pixel; SCREEN_WIDTH] {
    let mut sprites = select_sprites(&mem.oam, p.ly, p.lcdc.obj_height());
    sprites.sort_for_priority(oam_order);
    let mut out = [Pixel::default(); SCREEN_WIDTH];
    let mut window = WindowCounter::default();
    render_line(mem, p, &sprites, &mut window, &mut out);
    out
}

#[test]
fn selection_keeps_first_ten_in_oam_order() {
    let mut oam = [0u8; OAM_SIZE];
    // Alternate objects on line 20 with objects far below it.
    for i in 0..40 {
        let y = if i % 3 == 0 { 100 } else { 20 + 16 - (i % 4) as u8 };
        put_sprite(&mut oam, i, y, 8 + i as u8, 0, 0);
    }
    let expected: Vec<usize> = (0..40)
        .filter(|&i| {
            let top = oam[i * 4] as i16 - 16;
            (top..top + 8).contains(&20)
        })
        .take(MAX_SPRITES_PER_LINE)
        .collect();

    let sel = select_sprites(&oam, 20, 8);
    assert_eq!(sel.len(), MAX_SPRITES_PER_LINE);
    let got: Vec<usize> = sel.as_slice().iter().map(|s| s.oam_index).collect();
    assert_eq!(got, expected);
}

#[test]
fn selection_ignores_x_position() {
    let mut oam = [0u8; OAM_SIZE];
    // Off-screen X still counts toward the limit.
    for i in 0..12 {
        put_sprite(&mut oam, i, 16, 0, 0, 0);
    }
    assert_eq!(select_sprites(&oam, 0, 8).len(), MAX_SPRITES_PER_LINE);
}

#[test]
fn tall_objects_cover_sixteen_lines() {
    let mut oam = [0u8; OAM_SIZE];
    put_sprite(&mut oam, 0, 16, 8, 0, 0);
    assert_eq!(select_sprites(&oam, 8, 8).len(), 0);
    assert_eq!(select_sprites(&oam, 8, 16).len(), 1);
    assert_eq!(select_sprites(&oam, 16, 16).len(), 0);
}

#[test]
fn empty_oam_selects_nothing() {
    let sel = select_sprites(&[0; OAM_SIZE], 0, 8);
    assert!(sel.is_empty());
    assert!(LineSprites::default().as_slice().is_empty());
}

#[test]
fn legacy_priority_smallest_x_wins() {
    let mut mem = tile_memory();
    // Object 0 at screen x 12..19, object 1 at 8..15.
    put_sprite(&mut mem.oam, 0, 16, 20, SOLID_2, 0);
    put_sprite(&mut mem.oam, 1, 16, 16, SOLID_1, 0);
    let out = render(&mem, &params(0, 0x93, false), false);

    assert_eq!(out[8].color_index, 1);
    assert_eq!(out[13].color_index, 1);
    assert_eq!(out[16].color_index, 2);
    assert_eq!(out[13].palette, PaletteId::Obj0);
}

#[test]
fn legacy_priority_ties_go_to_lower_oam_index() {
    let mut mem = tile_memory();
    put_sprite(&mut mem.oam, 0, 16, 20, SOLID_2, 0);
    put_sprite(&mut mem.oam, 1, 16, 20, SOLID_1, 0);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert!(out[12..20].iter().all(|px| px.color_index == 2));
}

#[test]
fn oam_order_priority_ignores_x() {
    let mut mem = tile_memory();
    put_sprite(&mut mem.oam, 0, 16, 20, SOLID_2, 0);
    put_sprite(&mut mem.oam, 1, 16, 16, SOLID_1, 0);
    let out = render(&mem, &params(0, 0x93, true), true);
    assert_eq!(out[13].color_index, 2);
    assert_eq!(out[8].color_index, 1);
    assert_eq!(out[13].palette, PaletteId::CgbObj(0));
}

#[test]
fn transparent_pixels_let_lower_objects_through() {
    let mut mem = tile_memory();
    // Tile 4 row 0: only the leftmost pixel opaque.
    mem.vram[0][64] = 0x80;
    put_sprite(&mut mem.oam, 0, 16, 8, 4, 0);
    put_sprite(&mut mem.oam, 1, 16, 8, SOLID_2, 0);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert_eq!(out[0].color_index, 1);
    assert_eq!(out[1].color_index, 2);
}

#[test]
fn object_behind_background_only_shows_over_color_zero() {
    let mut mem = tile_memory();
    // Background: first map column is tile 3 (color 3), the rest tile 0.
    mem.vram[0][0x1800] = 3;
    put_sprite(&mut mem.oam, 0, 16, 12, SOLID_1, 0x80);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert_eq!(out[4].color_index, 3);
    assert_eq!(out[4].palette, PaletteId::Bg);
    assert_eq!(out[8].color_index, 1);
    assert_eq!(out[8].palette, PaletteId::Obj0);
}

#[test]
fn legacy_bg_disable_blanks_and_lets_objects_win() {
    let mut mem = tile_memory();
    mem.vram[0][0x1800] = 3;
    put_sprite(&mut mem.oam, 0, 16, 8, SOLID_1, 0x80);
    let out = render(&mem, &params(0, 0x92, false), false);
    assert_eq!(out[0].color_index, 1);
    assert_eq!(out[0].palette, PaletteId::Obj0);
    assert!(out[8..].iter().all(|px| px.color_index == 0));
}

#[test]
fn extended_bg_attribute_priority_hides_objects() {
    let mut mem = tile_memory();
    mem.vram[0][0x1800] = 3;
    mem.vram[1][0x1800] = 0x80 | 0x05;
    put_sprite(&mut mem.oam, 0, 16, 8, SOLID_1, 0x03);
    let out = render(&mem, &params(0, 0x93, true), true);
    assert_eq!(out[0].color_index, 3);
    assert_eq!(out[0].palette, PaletteId::CgbBg(5));

    // Clearing LCDC bit 0 strips background priority in extended mode.
    let out = render(&mem, &params(0, 0x92, true), true);
    assert_eq!(out[0].color_index, 1);
    assert_eq!(out[0].palette, PaletteId::CgbObj(3));
}

#[test]
fn legacy_obp1_selected_by_flag() {
    let mut mem = tile_memory();
    put_sprite(&mut mem.oam, 0, 16, 8, SOLID_1, 0x10);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert_eq!(out[0].palette, PaletteId::Obj1);
}

#[test]
fn object_flips() {
    let mut mem = tile_memory();
    // Tile 5: row 0 leftmost pixel color 1; row 7 rightmost pixel color 2.
    mem.vram[0][80] = 0x80;
    mem.vram[0][80 + 15] = 0x01;
    put_sprite(&mut mem.oam, 0, 16, 8, 5, 0x20);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert_eq!(out[7].color_index, 1);
    assert_eq!(out[0].color_index, 0);

    mem.oam[3] = 0x40;
    let out = render(&mem, &params(0, 0x93, false), false);
    assert_eq!(out[7].color_index, 2);
}

#[test]
fn tall_objects_ignore_tile_bit_zero() {
    let mut mem = tile_memory();
    // Tile 3 index with 8x16: top half from tile 2, bottom half from tile 3.
    put_sprite(&mut mem.oam, 0, 16, 8, 3, 0);
    let top = render(&mem, &params(0, 0x97, false), false);
    let bottom = render(&mem, &params(8, 0x97, false), false);
    assert_eq!(top[0].color_index, 2);
    assert_eq!(bottom[0].color_index, 3);
}

#[test]
fn objects_clip_at_left_edge() {
    let mut mem = tile_memory();
    put_sprite(&mut mem.oam, 0, 16, 4, SOLID_1, 0);
    let out = render(&mem, &params(0, 0x93, false), false);
    assert!(out[..4].iter().all(|px| px.color_index == 1));
    assert_eq!(out[4].color_index, 0);
}

#[test]
fn window_covers_background_from_wx() {
    let mut mem = tile_memory();
    // BG map 0x9800 all tile 1, window map 0x9C00 all tile 0.
    for i in 0..0x400 {
        mem.vram[0][0x1800 + i] = 1;
    }
    let mut p = params(0, 0x80 | 0x40 | 0x20 | 0x10 | 0x01, false);
    p.wx = 87;
    let out = render(&mem, &p, false);
    assert_eq!(out[79].color_index, 1);
    assert!(out[80..].iter().all(|px| px.color_index == 0));
}

#[test]
fn window_below_wy_is_hidden() {
    let mem = tile_memory();
    let mut p = params(10, 0xB1, false);
    p.wy = 20;
    let sprites = LineSprites::default();
    let mut out = [Pixel::default(); SCREEN_WIDTH];
    let mut window = WindowCounter::default();
    render_line(&mem, &p, &sprites, &mut window, &mut out);
    assert_eq!(window.line, 0);

    p.ly = 20;
    render_line(&mem, &p, &sprites, &mut window, &mut out);
    assert_eq!(window.line, 1);
}

#[test]
fn extended_tile_attributes_flip_background() {
    let mut mem = tile_memory();
    // Tile 5 row 0 leftmost pixel color 1, shown mirrored to column 7.
    mem.vram[0][80] = 0x80;
    mem.vram[0][0x1800] = 5;
    mem.vram[1][0x1800] = 0x20;
    let out = render(&mem, &params(0, 0x91, true), true);
    assert_eq!(out[0].color_index, 0);
    assert_eq!(out[7].color_index, 1);

    // Vertical flip fetches row 7 for line 0.
    mem.vram[1][0x1800] = 0x40;
    mem.vram[0][80 + 14] = 0xFF;
    let out = render(&mem, &params(0, 0x91, true), true);
    assert!(out[..8].iter().all(|px| px.color_index == 1));
}
