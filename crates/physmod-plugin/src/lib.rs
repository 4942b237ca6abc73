// physmod: finite-difference physical modeling instrument plugin (CLAP + VST3).

use nih_plug::prelude::*;
use physmod_dsp::exciter::ExciterKind;
use physmod_dsp::{Action, ExciterId, GuardStats, Instrument, presets};
use std::num::NonZeroU32;
use std::sync::Arc;

mod params;
use params::{PhysmodParams, PresetChoice};

const MAX_BLOCK_SIZE: usize = 8192;
/// Room for triggers queued within one block.
const EVENT_CAPACITY: usize = 256;
/// The exciter MIDI notes play.
const PLAYED: ExciterId = ExciterId(0);

#[derive(Clone, Copy, PartialEq)]
enum Played {
    Pluck,
    Hammer,
    Bow,
}

struct Physmod {
    params: Arc<PhysmodParams>,

    /// One built instrument per preset, so switching never allocates.
    instruments: Vec<Instrument>,
    active: usize,
    /// Notes currently holding the bow.
    held: u32,

    // Pre-allocated scratch buffers
    left_buf: Vec<f64>,
    right_buf: Vec<f64>,

    guard: GuardStats,
    sample_rate: f64,
}

impl Default for Physmod {
    fn default() -> Self {
        Self {
            params: Arc::new(PhysmodParams::default()),
            instruments: Vec::new(),
            active: 0,
            held: 0,
            left_buf: vec![0.0; MAX_BLOCK_SIZE],
            right_buf: vec![0.0; MAX_BLOCK_SIZE],
            guard: GuardStats::default(),
            sample_rate: 44100.0,
        }
    }
}

impl Physmod {
    fn played_kind(&self) -> Option<Played> {
        let exciter = self.instruments.get(self.active)?.exciter(PLAYED)?;
        Some(match exciter.kind() {
            ExciterKind::Pluck(_) => Played::Pluck,
            ExciterKind::Hammer(_) => Played::Hammer,
            ExciterKind::Bow(_) => Played::Bow,
        })
    }

    fn trigger(&mut self, action: Action) {
        if let Some(inst) = self.instruments.get_mut(self.active) {
            if let Err(e) = inst.trigger(PLAYED, action) {
                nih_debug_assert_failure!("trigger rejected: {}", e);
            }
        }
    }

    fn note_on(&mut self, velocity: f32) {
        let velocity = velocity.clamp(0.01, 1.0) as f64;
        match self.played_kind() {
            Some(Played::Pluck) => self.trigger(Action::Pluck),
            Some(Played::Hammer) => {
                let speed = self.params.strike_speed.value() as f64 * velocity;
                self.trigger(Action::Strike { velocity: speed });
            }
            Some(Played::Bow) => {
                let speed = self.params.bow_speed.value() as f64 * velocity;
                let force = self.params.bow_force.value() as f64;
                self.trigger(Action::SetBowVelocity(speed));
                self.trigger(Action::SetBowForce(force));
                self.trigger(Action::BowOn);
                self.held += 1;
            }
            None => {}
        }
    }

    fn note_off(&mut self) {
        if self.played_kind() == Some(Played::Bow) && self.held > 0 {
            self.held -= 1;
            if self.held == 0 {
                self.trigger(Action::BowOff);
            }
        }
    }

    /// Switch instruments when the preset parameter moved.
    fn follow_preset(&mut self) {
        let wanted = self.params.preset.value().index();
        if wanted != self.active && wanted < self.instruments.len() {
            self.active = wanted;
            self.held = 0;
            self.instruments[wanted].reset();
        }
    }

    /// Render a sub-block of audio from the active instrument.
    fn render_subblock(&mut self, offset: usize, len: usize) {
        let Some(inst) = self.instruments.get_mut(self.active) else {
            self.left_buf[offset..offset + len].fill(0.0);
            self.right_buf[offset..offset + len].fill(0.0);
            return;
        };
        inst.process_block(
            &mut self.left_buf[offset..offset + len],
            &mut self.right_buf[offset..offset + len],
        );
    }
}

impl Plugin for Physmod {
    const NAME: &'static str = "physmod";
    const VENDOR: &'static str = "physmod";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: None,
        main_output_channels: NonZeroU32::new(2),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::Basic;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate as f64;

        // Build every preset at the host rate
        self.instruments.clear();
        for choice in PresetChoice::ALL {
            let Some(config) = presets::by_name(choice.preset_name(), self.sample_rate) else {
                nih_error!("missing preset {}", choice.preset_name());
                return false;
            };
            match Instrument::from_config(&config) {
                Ok(mut inst) => {
                    inst.reserve_events(EVENT_CAPACITY);
                    self.instruments.push(inst);
                }
                Err(e) => {
                    nih_error!("preset {} failed to build: {}", choice.preset_name(), e);
                    return false;
                }
            }
        }
        self.active = self.params.preset.value().index();

        // Ensure buffers are large enough
        let max_samples = buffer_config.max_buffer_size as usize;
        if self.left_buf.len() < max_samples {
            self.left_buf.resize(max_samples, 0.0);
            self.right_buf.resize(max_samples, 0.0);
        }

        true
    }

    fn reset(&mut self) {
        for inst in &mut self.instruments {
            inst.reset();
        }
        self.held = 0;
    }

    fn deactivate(&mut self) {
        if !self.guard.is_clean() {
            nih_warn!("numerical guard rails fired: {:?}", self.guard);
            self.guard = GuardStats::default();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let num_samples = buffer.samples();
        self.follow_preset();

        // Event-splitting process loop: split at each MIDI event for sample-accuracy
        let mut next_event = context.next_event();
        let mut block_start: usize = 0;

        while block_start < num_samples {
            // Process all events at or before current position
            loop {
                match next_event {
                    Some(ref event) if (event.timing() as usize) <= block_start => {
                        match event {
                            NoteEvent::NoteOn { velocity, .. } => self.note_on(*velocity),
                            NoteEvent::NoteOff { .. } => self.note_off(),
                            _ => {}
                        }
                        next_event = context.next_event();
                    }
                    _ => break,
                }
            }

            // Find next event boundary (or end of buffer)
            let block_end = match next_event {
                Some(ref event) => (event.timing() as usize).min(num_samples),
                None => num_samples,
            };
            let block_len = block_end - block_start;

            if block_len > 0 {
                self.render_subblock(block_start, block_len);
            }

            block_start = block_end;
        }

        // Drain any remaining events
        while let Some(event) = next_event {
            match event {
                NoteEvent::NoteOn { velocity, .. } => self.note_on(velocity),
                NoteEvent::NoteOff { .. } => self.note_off(),
                _ => {}
            }
            next_event = context.next_event();
        }

        for (i, mut channel_samples) in buffer.iter_samples().enumerate() {
            // Per-sample smoothing prevents zipper noise on volume changes
            let volume = self.params.volume.smoothed.next() as f64;
            if let Some(s) = channel_samples.get_mut(0) {
                *s = (self.left_buf[i] * volume) as f32;
            }
            if let Some(s) = channel_samples.get_mut(1) {
                *s = (self.right_buf[i] * volume) as f32;
            }
        }

        if let Some(inst) = self.instruments.get_mut(self.active) {
            self.guard.merge(&inst.take_guard_stats());
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for Physmod {
    const CLAP_ID: &'static str = "com.physmod.fdtd-instrument";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Finite-difference physical modeling of strings, bars, membranes and plates");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::Instrument,
        ClapFeature::Synthesizer,
        ClapFeature::Custom("physical-modeling"),
    ];
}

impl Vst3Plugin for Physmod {
    const VST3_CLASS_ID: [u8; 16] = *b"PhysmodFDTDSynth";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Instrument, Vst3SubCategory::Synth];
}

nih_export_clap!(Physmod);
nih_export_vst3!(Physmod);
