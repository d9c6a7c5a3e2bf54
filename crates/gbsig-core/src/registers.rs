//! Register file.
//!
//! Each register keeps the raw byte last written alongside the fields decoded
//! from it. Decoding happens once, inside `set`, so callers never repeat the
//! bit masks.

/// LCD control (LCDC, 0xFF40).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lcdc {
    raw: u8,
    bg_window_enable: bool,
    obj_enable: bool,
    obj_tall: bool,
    bg_map_high: bool,
    tile_data_unsigned: bool,
    window_enable: bool,
    window_map_high: bool,
    lcd_enable: bool,
}

impl Lcdc {
    pub fn new(raw: u8) -> Self {
        let mut lcdc = Self::default();
        lcdc.set(raw);
        lcdc
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            bg_window_enable: raw & 0x01 != 0,
            obj_enable: raw & 0x02 != 0,
            obj_tall: raw & 0x04 != 0,
            bg_map_high: raw & 0x08 != 0,
            tile_data_unsigned: raw & 0x10 != 0,
            window_enable: raw & 0x20 != 0,
            window_map_high: raw & 0x40 != 0,
            lcd_enable: raw & 0x80 != 0,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Bit 0. BG/window enable on DMG, BG/window master priority on CGB.
    pub fn bg_window_enable(&self) -> bool {
        self.bg_window_enable
    }

    pub fn obj_enable(&self) -> bool {
        self.obj_enable
    }

    pub fn obj_height(&self) -> u8 {
        if self.obj_tall { 16 } else { 8 }
    }

    pub fn bg_map_high(&self) -> bool {
        self.bg_map_high
    }

    pub fn tile_data_unsigned(&self) -> bool {
        self.tile_data_unsigned
    }

    pub fn window_enable(&self) -> bool {
        self.window_enable
    }

    pub fn window_map_high(&self) -> bool {
        self.window_map_high
    }

    pub fn lcd_enable(&self) -> bool {
        self.lcd_enable
    }
}

/// Writable part of STAT (0xFF41): the four interrupt source selects.
///
/// Mode and coincidence bits belong to the pixel pipeline and are composed on
/// read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatSelect {
    raw: u8,
    hblank: bool,
    vblank: bool,
    oam: bool,
    lyc: bool,
}

impl StatSelect {
    pub const WRITABLE: u8 = 0x78;

    pub fn new(raw: u8) -> Self {
        let mut stat = Self::default();
        stat.set(raw);
        stat
    }

    pub fn set(&mut self, raw: u8) {
        let raw = raw & Self::WRITABLE;
        *self = Self {
            raw,
            hblank: raw & 0x08 != 0,
            vblank: raw & 0x10 != 0,
            oam: raw & 0x20 != 0,
            lyc: raw & 0x40 != 0,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Whether entering `mode` (0..=3) raises a STAT interrupt.
    pub fn mode_selected(&self, mode: u8) -> bool {
        match mode {
            0 => self.hblank,
            1 => self.vblank,
            2 => self.oam,
            _ => false,
        }
    }

    pub fn lyc_selected(&self) -> bool {
        self.lyc
    }
}

/// Legacy 4-shade palette (BGP, OBP0, OBP1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DmgPalette {
    raw: u8,
    shades: [u8; 4],
}

impl DmgPalette {
    pub fn new(raw: u8) -> Self {
        let mut pal = Self::default();
        pal.set(raw);
        pal
    }

    pub fn set(&mut self, raw: u8) {
        self.raw = raw;
        for (i, shade) in self.shades.iter_mut().enumerate() {
            *shade = (raw >> (i * 2)) & 0x03;
        }
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Shade (0..=3) assigned to `color_index`.
    #[inline(always)]
    pub fn shade(&self, color_index: u8) -> u8 {
        self.shades[(color_index & 0x03) as usize]
    }
}

/// NRx1 for the square channels: duty in bits 6-7, length load in bits 0-5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LengthDuty {
    raw: u8,
    duty: u8,
    length: u8,
}

impl LengthDuty {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            duty: raw >> 6,
            length: raw & 0x3F,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    /// High-phase fraction of one square period for the selected duty.
    pub fn duty_ratio(&self) -> f64 {
        match self.duty {
            0 => 0.125,
            1 => 0.25,
            2 => 0.5,
            _ => 0.75,
        }
    }

    pub fn length(&self) -> u8 {
        self.length
    }
}

/// NRx2: initial volume, envelope direction and envelope period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopeReg {
    raw: u8,
    initial_volume: u8,
    increase: bool,
    period: u8,
}

impl EnvelopeReg {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            initial_volume: raw >> 4,
            increase: raw & 0x08 != 0,
            period: raw & 0x07,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn initial_volume(&self) -> u8 {
        self.initial_volume
    }

    pub fn increase(&self) -> bool {
        self.increase
    }

    /// Envelope period in 64 Hz ticks. Zero disables the envelope.
    pub fn period(&self) -> u8 {
        self.period
    }
}

/// NRx3/NRx4 pair: 11-bit period plus the length-enable bit.
///
/// The trigger bit is acted on at write time and not stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeriodReg {
    period: u16,
    length_enable: bool,
}

impl PeriodReg {
    pub fn set_low(&mut self, val: u8) {
        self.period = (self.period & 0x0700) | val as u16;
    }

    pub fn set_high(&mut self, val: u8) {
        self.period = (self.period & 0x00FF) | (((val & 0x07) as u16) << 8);
        self.length_enable = val & 0x40 != 0;
    }

    pub fn set_period(&mut self, period: u16) {
        self.period = period & 0x07FF;
    }

    pub fn period(&self) -> u16 {
        self.period
    }

    pub fn length_enable(&self) -> bool {
        self.length_enable
    }
}

/// NR10: channel 1 frequency sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReg {
    raw: u8,
    pace: u8,
    negate: bool,
    shift: u8,
}

impl SweepReg {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            pace: (raw >> 4) & 0x07,
            negate: raw & 0x08 != 0,
            shift: raw & 0x07,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Sweep pace in 128 Hz ticks. Zero stops sweep iterations.
    pub fn pace(&self) -> u8 {
        self.pace
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn shift(&self) -> u8 {
        self.shift
    }
}

/// NR43: noise clock shift, LFSR width and clock divisor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoiseReg {
    raw: u8,
    clock_shift: u8,
    width7: bool,
    divisor: u8,
}

impl NoiseReg {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            clock_shift: raw >> 4,
            width7: raw & 0x08 != 0,
            divisor: raw & 0x07,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn clock_shift(&self) -> u8 {
        self.clock_shift
    }

    pub fn width7(&self) -> bool {
        self.width7
    }

    pub fn divisor(&self) -> u8 {
        self.divisor
    }

    /// LFSR clock in Hz: `262144 / (divisor * 2^shift)`, divisor 0 counting
    /// as 0.5.
    pub fn lfsr_clock_hz(&self) -> f64 {
        let divisor = if self.divisor == 0 {
            0.5
        } else {
            self.divisor as f64
        };
        262_144.0 / (divisor * f64::from(1u32 << self.clock_shift))
    }
}

/// NR50: per-ear master volume (0..=7). The VIN bits are kept raw only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MasterVolume {
    raw: u8,
    left: u8,
    right: u8,
}

impl MasterVolume {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        *self = Self {
            raw,
            left: (raw >> 4) & 0x07,
            right: raw & 0x07,
        };
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn left(&self) -> u8 {
        self.left
    }

    pub fn right(&self) -> u8 {
        self.right
    }
}

/// NR51: stereo routing. Bits 0-3 route channels 1-4 right, bits 4-7 left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Panning {
    raw: u8,
    left: [bool; 4],
    right: [bool; 4],
}

impl Panning {
    pub fn new(raw: u8) -> Self {
        let mut reg = Self::default();
        reg.set(raw);
        reg
    }

    pub fn set(&mut self, raw: u8) {
        self.raw = raw;
        for ch in 0..4 {
            self.right[ch] = raw & (1 << ch) != 0;
            self.left[ch] = raw & (1 << (ch + 4)) != 0;
        }
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Routing for channel index `ch` (0-based) as `(left, right)`.
    pub fn route(&self, ch: usize) -> (bool, bool) {
        (self.left[ch & 3], self.right[ch & 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcdc_decodes_every_bit() {
        let lcdc = Lcdc::new(0x91);
        assert!(lcdc.lcd_enable());
        assert!(lcdc.tile_data_unsigned());
        assert!(lcdc.bg_window_enable());
        assert!(!lcdc.obj_enable());
        assert!(!lcdc.window_enable());
        assert_eq!(lcdc.obj_height(), 8);
        assert_eq!(Lcdc::new(0x04).obj_height(), 16);
        assert_eq!(lcdc.raw(), 0x91);
    }

    #[test]
    fn stat_select_masks_pipeline_bits() {
        let stat = StatSelect::new(0xFF);
        assert_eq!(stat.raw(), 0x78);
        assert!(stat.mode_selected(0));
        assert!(stat.mode_selected(1));
        assert!(stat.mode_selected(2));
        assert!(!stat.mode_selected(3));
        assert!(stat.lyc_selected());
    }

    #[test]
    fn dmg_palette_splits_fields() {
        let pal = DmgPalette::new(0xE4);
        assert_eq!(pal.shade(0), 0);
        assert_eq!(pal.shade(1), 1);
        assert_eq!(pal.shade(2), 2);
        assert_eq!(pal.shade(3), 3);

        let pal = DmgPalette::new(0xFC);
        assert_eq!(pal.shade(0), 0);
        assert_eq!(pal.shade(1), 3);
    }

    #[test]
    fn length_duty_splits_fields() {
        let reg = LengthDuty::new(0x9F);
        assert_eq!(reg.duty(), 2);
        assert_eq!(reg.duty_ratio(), 0.5);
        assert_eq!(reg.length(), 0x1F);
        assert_eq!(LengthDuty::new(0x00).duty_ratio(), 0.125);
    }

    #[test]
    fn period_register_merges_halves() {
        let mut reg = PeriodReg::default();
        reg.set_low(0x34);
        reg.set_high(0xC6);
        assert_eq!(reg.period(), 0x634);
        assert!(reg.length_enable());
        reg.set_high(0x01);
        assert_eq!(reg.period(), 0x134);
        assert!(!reg.length_enable());
    }

    #[test]
    fn noise_clock_treats_divisor_zero_as_half() {
        assert_eq!(NoiseReg::new(0x00).lfsr_clock_hz(), 524_288.0);
        assert_eq!(NoiseReg::new(0x21).lfsr_clock_hz(), 65_536.0);
        assert!(NoiseReg::new(0x08).width7());
        let reg = NoiseReg::new(0x5B);
        assert_eq!(reg.clock_shift(), 5);
        assert_eq!(reg.divisor(), 3);
        assert!(reg.width7());
    }

    #[test]
    fn panning_routes_by_ear() {
        let pan = Panning::new(0x21);
        assert_eq!(pan.route(0), (false, true));
        assert_eq!(pan.route(1), (true, false));
        assert_eq!(pan.route(2), (false, false));
    }
}
