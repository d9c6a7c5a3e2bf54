//! Game Boy / Game Boy Color signal generators.
//!
//! This crate contains the pixel pipeline and the audio synthesis engine,
//! both driven by an external cycle counter. The CPU, bus, cartridge and
//! presentation live elsewhere and drive the core through [`devices`] or the
//! individual units.

/// Audio synthesis: channel oscillators, mixer and the cycle-to-sample driver.
pub mod apu;

/// Bounded single-producer/single-consumer audio byte stream.
pub mod audio_stream;

/// Device aggregate and I/O address routing.
pub mod devices;

/// Console model selection.
pub mod hardware;

/// Palette resolution and lookup tables.
pub mod palette;

/// Pixel pipeline state machine.
pub mod ppu;

/// Register decoding shared by the pipeline and the oscillators.
pub mod registers;

/// Scanline compositor.
pub mod render;
