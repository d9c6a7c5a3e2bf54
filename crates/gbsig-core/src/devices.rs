//! Device aggregate: owns the pixel pipeline, the synthesis driver and the
//! interrupt flag byte they raise bits in. The CPU side holds a handle to
//! this and polls [`Devices::take_interrupts`].

use crate::apu::{Apu, AudioConfig};
use crate::hardware::Model;
use crate::ppu::Ppu;

pub struct Devices {
    pub ppu: Ppu,
    pub apu: Apu,
    /// Pending interrupt flags (IF, 0xFF0F). Bits 0-1 are owned here.
    pub if_reg: u8,
    model: Model,
    double_speed: bool,
    /// Odd CPU cycle carried over while halving in double speed.
    half_cycle: u32,
}

impl Devices {
    pub fn new(model: Model, audio: AudioConfig) -> Self {
        Self {
            ppu: Ppu::new_with_mode(model.is_cgb()),
            apu: Apu::new_with_config(audio),
            if_reg: 0,
            model,
            double_speed: false,
            half_cycle: 0,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn double_speed(&self) -> bool {
        self.double_speed
    }

    /// Double speed doubles the CPU clock only; both signal generators keep
    /// running off the base clock.
    pub fn set_double_speed(&mut self, on: bool) {
        if on && !self.model.is_cgb() {
            log::warn!("double speed requested on DMG; ignoring");
            return;
        }
        self.double_speed = on;
        self.half_cycle = 0;
    }

    /// Advances both generators by `cycles` CPU cycles. Returns true when
    /// an HBlank period began, which is when the bus should service
    /// [`Devices::run_vram_dma`].
    pub fn step(&mut self, cycles: u32) -> bool {
        let cycles = if self.double_speed {
            self.halve_cycles(cycles)
        } else {
            cycles
        };
        if cycles == 0 {
            return false;
        }
        let hblank = self.ppu.step(cycles, &mut self.if_reg);
        self.apu.step(cycles);
        hblank
    }

    /// CPU cycles to base-clock cycles in double speed, carrying the odd
    /// half cycle into the next call.
    fn halve_cycles(&mut self, cycles: u32) -> u32 {
        let total = u64::from(cycles) + u64::from(self.half_cycle);
        self.half_cycle = (total & 1) as u32;
        (total / 2) as u32
    }

    /// Returns and clears the pending interrupt bits.
    pub fn take_interrupts(&mut self) -> u8 {
        std::mem::take(&mut self.if_reg)
    }

    /// Copies every VRAM-DMA block that is ready, reading source bytes
    /// through `read_src`. Returns the number of blocks copied.
    pub fn run_vram_dma<F: FnMut(u16) -> u8>(&mut self, mut read_src: F) -> usize {
        let mut copied = 0;
        while let Some(block) = self.ppu.next_dma_block() {
            for i in 0..0x10u16 {
                let byte = read_src(block.src.wrapping_add(i));
                self.ppu.write_vram(block.dst.wrapping_add(i), byte);
            }
            copied += 1;
        }
        copied
    }

    pub fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF51..=0xFF55 | 0xFF68..=0xFF6C => {
                self.ppu.read_reg(addr)
            }
            _ => 0xFF,
        }
    }

    pub fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF51..=0xFF55 | 0xFF68..=0xFF6C => {
                self.ppu.write_reg(addr, val, &mut self.if_reg)
            }
            _ => log::debug!("unmapped I/O write {:04X} <- {:02X}", addr, val),
        }
    }

    /// Reads any address this aggregate owns: VRAM, OAM or I/O.
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xFE00..=0xFE9F => self.ppu.read_oam(addr),
            0xFF00..=0xFF7F => self.read_io(addr),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xFE00..=0xFE9F => self.ppu.write_oam(addr, val),
            0xFF00..=0xFF7F => self.write_io(addr, val),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_speed_halves_and_carries_odd_cycles() {
        let mut dev = Devices::new(Model::Cgb, AudioConfig::default());
        dev.set_double_speed(true);
        dev.step(3);
        assert_eq!(dev.half_cycle, 1);
        dev.step(1);
        assert_eq!(dev.half_cycle, 0);
    }

    #[test]
    fn halving_the_largest_step_does_not_overflow() {
        let mut dev = Devices::new(Model::Cgb, AudioConfig::default());
        dev.set_double_speed(true);
        assert_eq!(dev.halve_cycles(u32::MAX), u32::MAX / 2);
        assert_eq!(dev.half_cycle, 1);
        assert_eq!(dev.halve_cycles(u32::MAX), u32::MAX / 2 + 1);
        assert_eq!(dev.half_cycle, 0);
    }

    #[test]
    fn dmg_refuses_double_speed() {
        let mut dev = Devices::new(Model::Dmg, AudioConfig::default());
        dev.set_double_speed(true);
        assert!(!dev.double_speed());
    }
}
