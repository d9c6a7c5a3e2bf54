//! Audio synthesis: four channel oscillators, the stereo mixer and the
//! driver that turns CPU cycles into output frames.
//!
//! All channel timers (length, envelope, sweep, LFSR) count in output
//! samples rather than CPU cycles, so one call to [`Apu::next_frame`]
//! advances every oscillator by exactly one sample period.

use crate::audio_stream::{AudioConsumer, AudioProducer, audio_stream};
use crate::registers::{
    EnvelopeReg, LengthDuty, MasterVolume, NoiseReg, Panning, PeriodReg, SweepReg,
};

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

pub const CPU_CLOCK_HZ: u32 = 4_194_304;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const LENGTH_CLOCK_HZ: u32 = 256;
const SWEEP_CLOCK_HZ: u32 = 128;
const ENVELOPE_CLOCK_HZ: u32 = 64;

const SQUARE_LENGTH_MAX: u16 = 64;
const WAVE_LENGTH_MAX: u16 = 256;
const MAX_PERIOD: u16 = 2047;
const LFSR_SEED: u16 = 0x7FFF;

/// Register values left behind by the boot ROM. Write-only period bytes are
/// omitted, and channel status bits are not restored: every channel starts
/// silent.
const POWER_ON_REGS: [(u16, u8); 13] = [
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF16, 0x3F),
    (0xFF17, 0x00),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF20, 0xFF),
    (0xFF21, 0x00),
    (0xFF22, 0x00),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
];

/// Output format and buffering for the synthesis driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Output frames per second.
    pub sample_rate: u32,
    /// Audio stream size in bytes (4 bytes per stereo frame).
    pub stream_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::with_sample_rate(DEFAULT_SAMPLE_RATE)
    }
}

impl AudioConfig {
    /// One second of buffering at `sample_rate`.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            stream_capacity: sample_rate as usize * 4,
        }
    }
}

fn normalize_rate(rate: u32) -> u32 {
    if rate == 0 {
        log::warn!("sample rate 0 is invalid; using {DEFAULT_SAMPLE_RATE}");
        DEFAULT_SAMPLE_RATE
    } else {
        rate
    }
}

/// Per-sample tick periods derived from the output rate.
#[derive(Clone, Copy, Debug)]
struct SampleClocks {
    rate: f64,
    length: u32,
    sweep: u32,
    envelope: u32,
}

impl SampleClocks {
    fn new(sample_rate: u32) -> Self {
        Self {
            rate: sample_rate as f64,
            length: (sample_rate / LENGTH_CLOCK_HZ).max(1),
            sweep: (sample_rate / SWEEP_CLOCK_HZ).max(1),
            envelope: (sample_rate / ENVELOPE_CLOCK_HZ).max(1),
        }
    }
}

#[derive(Default, Clone, Copy)]
struct Envelope {
    volume: u8,
    counter: u32,
}

impl Envelope {
    fn trigger(&mut self, reg: &EnvelopeReg) {
        self.volume = reg.initial_volume();
        self.counter = 0;
    }

    /// One sample of envelope time. A period of 0 freezes the volume.
    fn tick(&mut self, reg: &EnvelopeReg, samples_per_step: u32) {
        let period = reg.period() as u32;
        if period == 0 {
            return;
        }
        self.counter += 1;
        let threshold = samples_per_step * period;
        while self.counter >= threshold {
            self.counter -= threshold;
            if reg.increase() {
                if self.volume < 15 {
                    self.volume += 1;
                }
            } else if self.volume > 0 {
                self.volume -= 1;
            }
        }
    }
}

#[derive(Default, Clone, Copy)]
struct LengthTimer {
    elapsed: u16,
    counter: u32,
}

impl LengthTimer {
    fn trigger(&mut self, start: u16) {
        self.elapsed = start;
        self.counter = 0;
    }

    /// One sample of length time. Returns true when the timer reaches `max`.
    fn tick(&mut self, max: u16, samples_per_step: u32) -> bool {
        self.counter += 1;
        while self.counter >= samples_per_step {
            self.counter -= samples_per_step;
            self.elapsed += 1;
            if self.elapsed >= max {
                return true;
            }
        }
        false
    }
}

enum SweepEvent {
    Idle,
    Update(u16),
    Overflow,
}

#[derive(Default, Clone, Copy)]
struct Sweep {
    shadow: u16,
    timer: u8,
    counter: u32,
    enabled: bool,
}

impl Sweep {
    fn calculate(&self, reg: &SweepReg) -> u16 {
        let delta = self.shadow >> reg.shift();
        if reg.negate() {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow + delta
        }
    }

    fn reload_timer(&mut self, reg: &SweepReg) {
        self.timer = if reg.pace() == 0 { 8 } else { reg.pace() };
    }

    /// Returns false if the initial overflow check disables the channel.
    fn trigger(&mut self, reg: &SweepReg, period: u16) -> bool {
        self.shadow = period;
        self.counter = 0;
        self.reload_timer(reg);
        self.enabled = reg.pace() != 0 || reg.shift() != 0;
        !(reg.shift() != 0 && self.calculate(reg) > MAX_PERIOD)
    }

    fn tick(&mut self, reg: &SweepReg, samples_per_step: u32) -> SweepEvent {
        self.counter += 1;
        if self.counter < samples_per_step {
            return SweepEvent::Idle;
        }
        self.counter -= samples_per_step;
        if !self.enabled {
            return SweepEvent::Idle;
        }
        self.timer = self.timer.saturating_sub(1);
        if self.timer != 0 {
            return SweepEvent::Idle;
        }
        self.reload_timer(reg);
        if reg.pace() == 0 {
            return SweepEvent::Idle;
        }
        let next = self.calculate(reg);
        if next > MAX_PERIOD {
            return SweepEvent::Overflow;
        }
        if reg.shift() == 0 {
            return SweepEvent::Idle;
        }
        self.shadow = next;
        if self.calculate(reg) > MAX_PERIOD {
            return SweepEvent::Overflow;
        }
        SweepEvent::Update(next)
    }
}

#[derive(Default, Clone)]
struct SquareChannel {
    enabled: bool,
    duty: LengthDuty,
    envelope_reg: EnvelopeReg,
    period: PeriodReg,
    envelope: Envelope,
    length: LengthTimer,
    phase: f64,
    sweep_reg: SweepReg,
    sweep: Option<Sweep>,
}

impl SquareChannel {
    fn new(with_sweep: bool) -> Self {
        Self {
            sweep: with_sweep.then(Sweep::default),
            ..Self::default()
        }
    }

    fn frequency_hz(&self) -> f64 {
        131_072.0 / (2048.0 - self.period.period() as f64)
    }

    fn trigger(&mut self) {
        self.enabled = true;
        self.envelope.trigger(&self.envelope_reg);
        self.length.trigger(self.duty.length() as u16);
        self.phase = 0.0;
        let period = self.period.period();
        if let Some(sweep) = self.sweep.as_mut() {
            if !sweep.trigger(&self.sweep_reg, period) {
                self.enabled = false;
            }
        }
    }

    fn sample(&mut self, clocks: &SampleClocks) -> f64 {
        self.phase = (self.phase + self.frequency_hz() / clocks.rate).fract();

        if self.enabled
            && self.period.length_enable()
            && self.length.tick(SQUARE_LENGTH_MAX, clocks.length)
        {
            self.enabled = false;
        }

        if let Some(sweep) = self.sweep.as_mut() {
            match sweep.tick(&self.sweep_reg, clocks.sweep) {
                SweepEvent::Idle => {}
                SweepEvent::Update(period) => self.period.set_period(period),
                SweepEvent::Overflow => {
                    sweep.enabled = false;
                    self.enabled = false;
                }
            }
        }

        self.envelope.tick(&self.envelope_reg, clocks.envelope);

        let vol = self.envelope.volume as f64 / 15.0;
        if self.phase < self.duty.duty_ratio() {
            vol
        } else {
            -vol
        }
    }
}

#[derive(Clone)]
struct WaveChannel {
    enabled: bool,
    dac_enabled: bool,
    length_load: u8,
    level: u8,
    period: PeriodReg,
    length: LengthTimer,
    phase: f64,
    position: u8,
    ram: [u8; 0x10],
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length_load: 0,
            level: 0,
            period: PeriodReg::default(),
            length: LengthTimer::default(),
            phase: 0.0,
            position: 0,
            ram: [0; 0x10],
        }
    }
}

impl WaveChannel {
    fn frequency_hz(&self) -> f64 {
        (65_536.0 / (2048.0 - self.period.period() as f64)) * 32.0
    }

    fn trigger(&mut self) {
        self.enabled = true;
        self.length.trigger(self.length_load as u16);
        self.phase = 0.0;
        self.position = 0;
    }

    /// Resets registers but keeps wave RAM, which survives power cycles.
    fn power_off(&mut self) {
        let ram = self.ram;
        *self = Self {
            ram,
            ..Self::default()
        };
    }

    fn current_nibble(&self) -> u8 {
        let byte = self.ram[(self.position / 2) as usize];
        if self.position & 1 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    fn sample(&mut self, clocks: &SampleClocks) -> f64 {
        self.phase += self.frequency_hz() / clocks.rate;
        let wraps = self.phase as u32;
        self.phase -= wraps as f64;
        self.position = ((self.position as u32 + wraps) % 32) as u8;

        if self.enabled
            && self.period.length_enable()
            && self.length.tick(WAVE_LENGTH_MAX, clocks.length)
        {
            self.enabled = false;
        }

        if !self.dac_enabled {
            return 0.0;
        }
        let nibble = self.current_nibble();
        let shifted = match self.level {
            0 => return 0.0,
            1 => nibble,
            2 => nibble >> 1,
            _ => nibble >> 2,
        };
        shifted as f64 / 7.5 - 1.0
    }
}

#[derive(Clone)]
struct NoiseChannel {
    enabled: bool,
    length_load: u8,
    length_enable: bool,
    envelope_reg: EnvelopeReg,
    noise_reg: NoiseReg,
    envelope: Envelope,
    length: LengthTimer,
    lfsr: u16,
    lfsr_counter: u32,
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            length_load: 0,
            length_enable: false,
            envelope_reg: EnvelopeReg::default(),
            noise_reg: NoiseReg::default(),
            envelope: Envelope::default(),
            length: LengthTimer::default(),
            lfsr: LFSR_SEED,
            lfsr_counter: 0,
        }
    }
}

impl NoiseChannel {
    fn trigger(&mut self) {
        self.enabled = true;
        self.envelope.trigger(&self.envelope_reg);
        self.length.trigger(self.length_load as u16);
        self.lfsr = LFSR_SEED;
        self.lfsr_counter = 0;
    }

    fn clock_lfsr(&mut self) {
        let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 1;
        self.lfsr = (self.lfsr >> 1) | (feedback << 14);
        if self.noise_reg.width7() {
            self.lfsr = (self.lfsr & !(1 << 6)) | (feedback << 6);
        }
    }

    fn sample(&mut self, clocks: &SampleClocks) -> f64 {
        // At least one sample per LFSR clock bounds the work per tick when
        // the LFSR runs faster than the output rate.
        let per_clock = ((clocks.rate / self.noise_reg.lfsr_clock_hz()) as u32).max(1);
        self.lfsr_counter += 1;
        while self.lfsr_counter >= per_clock {
            self.lfsr_counter -= per_clock;
            self.clock_lfsr();
        }

        if self.enabled
            && self.length_enable
            && self.length.tick(SQUARE_LENGTH_MAX, clocks.length)
        {
            self.enabled = false;
        }

        self.envelope.tick(&self.envelope_reg, clocks.envelope);

        let vol = self.envelope.volume as f64 / 15.0;
        if self.lfsr & 1 == 0 { vol } else { -vol }
    }
}

pub struct Apu {
    power: bool,
    nr50: MasterVolume,
    nr51: Panning,
    ch1: SquareChannel,
    ch2: SquareChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,
    sample_rate: u32,
    clocks: SampleClocks,
    cycles_per_sample: f64,
    cycle_acc: f64,
    stream_capacity: usize,
    producer: Option<AudioProducer>,
    last_output: [f64; 4],
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    pub fn new() -> Self {
        Self::new_with_config(AudioConfig::default())
    }

    pub fn new_with_config(config: AudioConfig) -> Self {
        let sample_rate = normalize_rate(config.sample_rate);
        let mut apu = Self {
            power: true,
            nr50: MasterVolume::default(),
            nr51: Panning::default(),
            ch1: SquareChannel::new(true),
            ch2: SquareChannel::new(false),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            sample_rate,
            clocks: SampleClocks::new(sample_rate),
            cycles_per_sample: CPU_CLOCK_HZ as f64 / sample_rate as f64,
            cycle_acc: 0.0,
            stream_capacity: config.stream_capacity,
            producer: None,
            last_output: [0.0; 4],
        };
        for (addr, val) in POWER_ON_REGS {
            apu.write_reg(addr, val);
        }
        apu
    }

    /// Creates the audio stream and returns its read half. Frames produced
    /// before this call are discarded; calling it again replaces the stream.
    pub fn enable_output(&mut self) -> AudioConsumer {
        let (producer, consumer) = audio_stream(self.stream_capacity);
        self.producer = Some(producer);
        consumer
    }

    pub fn output_enabled(&self) -> bool {
        self.producer.is_some()
    }

    /// Diagnostics of the attached stream, if any.
    pub fn stream_stats(&self) -> Option<crate::audio_stream::StreamStats> {
        self.producer.as_ref().map(AudioProducer::stats)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Changes the output rate. Channel phases carry over; tick counters
    /// are rescaled lazily on their next expiry.
    pub fn set_sample_rate(&mut self, rate: u32) {
        let rate = normalize_rate(rate);
        self.sample_rate = rate;
        self.clocks = SampleClocks::new(rate);
        self.cycles_per_sample = CPU_CLOCK_HZ as f64 / rate as f64;
    }

    fn read_mask(addr: u16) -> u8 {
        match addr {
            0xFF10 => 0x80,
            0xFF11 => 0x3F,
            0xFF12 => 0x00,
            0xFF13 => 0xFF,
            0xFF14 => 0xBF,
            0xFF16 => 0x3F,
            0xFF17 => 0x00,
            0xFF18 => 0xFF,
            0xFF19 => 0xBF,
            0xFF1A => 0x7F,
            0xFF1B => 0xFF,
            0xFF1C => 0x9F,
            0xFF1D => 0xFF,
            0xFF1E => 0xBF,
            0xFF20 => 0xFF,
            0xFF21 => 0x00,
            0xFF22 => 0x00,
            0xFF23 => 0xBF,
            0xFF24 => 0x00,
            0xFF25 => 0x00,
            0xFF26 => 0x70,
            0xFF30..=0xFF3F => 0x00,
            _ => 0xFF,
        }
    }

    fn status_bits(&self) -> u8 {
        let mut val = 0;
        if self.ch1.enabled {
            val |= 0x01;
        }
        if self.ch2.enabled {
            val |= 0x02;
        }
        if self.ch3.enabled {
            val |= 0x04;
        }
        if self.ch4.enabled {
            val |= 0x08;
        }
        val
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        let length_bit = |p: &PeriodReg| if p.length_enable() { 0x40 } else { 0 };
        let raw = match addr {
            0xFF10 => self.ch1.sweep_reg.raw(),
            0xFF11 => self.ch1.duty.raw(),
            0xFF12 => self.ch1.envelope_reg.raw(),
            0xFF14 => length_bit(&self.ch1.period),
            0xFF16 => self.ch2.duty.raw(),
            0xFF17 => self.ch2.envelope_reg.raw(),
            0xFF19 => length_bit(&self.ch2.period),
            0xFF1A => {
                if self.ch3.dac_enabled {
                    0x80
                } else {
                    0
                }
            }
            0xFF1C => self.ch3.level << 5,
            0xFF1E => length_bit(&self.ch3.period),
            0xFF21 => self.ch4.envelope_reg.raw(),
            0xFF22 => self.ch4.noise_reg.raw(),
            0xFF23 => {
                if self.ch4.length_enable {
                    0x40
                } else {
                    0
                }
            }
            0xFF24 => self.nr50.raw(),
            0xFF25 => self.nr51.raw(),
            0xFF26 => {
                let power = if self.power { 0x80 } else { 0 };
                power | self.status_bits()
            }
            0xFF30..=0xFF3F => self.ch3.ram[(addr - 0xFF30) as usize],
            _ => 0,
        };
        raw | Self::read_mask(addr)
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if !self.power && addr != 0xFF26 && !(0xFF30..=0xFF3F).contains(&addr) {
            return;
        }
        apu_trace!("apu write {:04X} <- {:02X}", addr, val);

        match addr {
            0xFF10 => self.ch1.sweep_reg.set(val),
            0xFF11 => self.ch1.duty.set(val),
            0xFF12 => self.ch1.envelope_reg.set(val),
            0xFF13 => self.ch1.period.set_low(val),
            0xFF14 => {
                self.ch1.period.set_high(val);
                if val & 0x80 != 0 {
                    self.ch1.trigger();
                    apu_trace!("ch1 trigger period={}", self.ch1.period.period());
                }
            }
            0xFF16 => self.ch2.duty.set(val),
            0xFF17 => self.ch2.envelope_reg.set(val),
            0xFF18 => self.ch2.period.set_low(val),
            0xFF19 => {
                self.ch2.period.set_high(val);
                if val & 0x80 != 0 {
                    self.ch2.trigger();
                    apu_trace!("ch2 trigger period={}", self.ch2.period.period());
                }
            }
            0xFF1A => self.ch3.dac_enabled = val & 0x80 != 0,
            0xFF1B => self.ch3.length_load = val,
            0xFF1C => self.ch3.level = (val >> 5) & 0x03,
            0xFF1D => self.ch3.period.set_low(val),
            0xFF1E => {
                self.ch3.period.set_high(val);
                if val & 0x80 != 0 {
                    self.ch3.trigger();
                    apu_trace!("ch3 trigger period={}", self.ch3.period.period());
                }
            }
            0xFF20 => self.ch4.length_load = val & 0x3F,
            0xFF21 => self.ch4.envelope_reg.set(val),
            0xFF22 => self.ch4.noise_reg.set(val),
            0xFF23 => {
                self.ch4.length_enable = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch4.trigger();
                    apu_trace!("ch4 trigger nr43={:02X}", self.ch4.noise_reg.raw());
                }
            }
            0xFF24 => self.nr50.set(val),
            0xFF25 => self.nr51.set(val),
            0xFF26 => {
                let on = val & 0x80 != 0;
                if self.power && !on {
                    log::debug!("APU powered off");
                    self.power_off();
                } else if !self.power && on {
                    log::debug!("APU powered on");
                }
                self.power = on;
            }
            0xFF30..=0xFF3F => self.ch3.ram[(addr - 0xFF30) as usize] = val,
            _ => {}
        }
    }

    fn power_off(&mut self) {
        let sweep_ch1 = self.ch1.sweep.is_some();
        self.ch1 = SquareChannel::new(sweep_ch1);
        self.ch2 = SquareChannel::new(false);
        self.ch3.power_off();
        self.ch4 = NoiseChannel::default();
        self.nr50 = MasterVolume::default();
        self.nr51 = Panning::default();
    }

    fn mix(&self, outputs: [f64; 4]) -> (i16, i16) {
        let enabled = [
            self.ch1.enabled,
            self.ch2.enabled,
            self.ch3.enabled,
            self.ch4.enabled,
        ];
        let master_l = self.nr50.left() as f64 / 7.0;
        let master_r = self.nr50.right() as f64 / 7.0;
        let mut left = 0.0;
        let mut right = 0.0;
        for (ch, &out) in outputs.iter().enumerate() {
            if !self.power || !enabled[ch] {
                continue;
            }
            let (to_left, to_right) = self.nr51.route(ch);
            if to_left {
                left += out * master_l;
            }
            if to_right {
                right += out * master_r;
            }
        }
        (
            ((left / 4.0) * 32767.0) as i16,
            ((right / 4.0) * 32767.0) as i16,
        )
    }

    /// Advances every channel by one sample period and returns the mixed
    /// stereo frame.
    pub fn next_frame(&mut self) -> (i16, i16) {
        let clocks = self.clocks;
        let outputs = [
            self.ch1.sample(&clocks),
            self.ch2.sample(&clocks),
            self.ch3.sample(&clocks),
            self.ch4.sample(&clocks),
        ];
        self.last_output = outputs;
        self.mix(outputs)
    }

    /// Accumulates `cycles` CPU cycles and emits one frame per elapsed sample
    /// period into the audio stream.
    pub fn step(&mut self, cycles: u32) {
        self.cycle_acc += cycles as f64;
        while self.cycle_acc >= self.cycles_per_sample {
            self.cycle_acc -= self.cycles_per_sample;
            let (left, right) = self.next_frame();
            if let Some(producer) = self.producer.as_ref() {
                producer.push_stereo(left, right);
            }
        }
    }

    /// Unmixed output of channel `ch` (1..=4) for the last generated sample,
    /// in -1.0..=1.0.
    pub fn channel_output(&self, ch: usize) -> f64 {
        match ch {
            1..=4 => self.last_output[ch - 1],
            _ => 0.0,
        }
    }

    /// Status bit of channel `ch` (1..=4) as reported in NR52.
    pub fn channel_enabled(&self, ch: usize) -> bool {
        match ch {
            1..=4 => self.status_bits() & (1 << (ch - 1)) != 0,
            _ => false,
        }
    }

    pub fn powered(&self) -> bool {
        self.power
    }

    pub fn ch1_frequency(&self) -> u16 {
        self.ch1.period.period()
    }

    pub fn ch1_volume(&self) -> u8 {
        self.ch1.envelope.volume
    }

    pub fn ch1_length(&self) -> u16 {
        self.ch1.length.elapsed
    }

    pub fn ch1_phase(&self) -> f64 {
        self.ch1.phase
    }

    pub fn ch1_sweep_shadow(&self) -> u16 {
        self.ch1.sweep.map_or(0, |s| s.shadow)
    }

    pub fn ch2_frequency(&self) -> u16 {
        self.ch2.period.period()
    }

    pub fn ch2_volume(&self) -> u8 {
        self.ch2.envelope.volume
    }

    pub fn ch2_length(&self) -> u16 {
        self.ch2.length.elapsed
    }

    pub fn ch3_length(&self) -> u16 {
        self.ch3.length.elapsed
    }

    pub fn ch3_position(&self) -> u8 {
        self.ch3.position
    }

    pub fn ch4_length(&self) -> u16 {
        self.ch4.length.elapsed
    }

    pub fn ch4_volume(&self) -> u8 {
        self.ch4.envelope.volume
    }

    pub fn ch4_lfsr(&self) -> u16 {
        self.ch4.lfsr
    }
}
