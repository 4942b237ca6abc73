//! Standard MIDI file reading: note on/off times in seconds.

use anyhow::{Context, Result, bail};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

/// Microseconds per quarter note until the file says otherwise (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub seconds: f64,
    pub key: u8,
    /// 1-127 for note-on, 0 for note-off.
    pub velocity: u8,
}

impl NoteEvent {
    pub fn is_on(&self) -> bool {
        self.velocity > 0
    }
}

pub fn read_notes(path: &Path) -> Result<Vec<NoteEvent>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading MIDI file {}", path.display()))?;
    let smf = Smf::parse(&bytes).with_context(|| format!("parsing MIDI file {}", path.display()))?;
    notes_from_smf(&smf)
}

/// Merge all tracks onto one tick timeline and convert through the tempo map.
pub fn notes_from_smf(smf: &Smf) -> Result<Vec<NoteEvent>> {
    enum Kind {
        Tempo(u32),
        Note { key: u8, velocity: u8 },
    }

    let mut timeline: Vec<(u64, Kind)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            let kind = match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => Kind::Tempo(t.as_int()),
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => Kind::Note {
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    },
                    MidiMessage::NoteOff { key, .. } => Kind::Note {
                        key: key.as_int(),
                        velocity: 0,
                    },
                    _ => continue,
                },
                _ => continue,
            };
            timeline.push((tick, kind));
        }
    }
    // Stable: same-tick events keep track order
    timeline.sort_by_key(|(tick, _)| *tick);

    let mut notes = Vec::new();
    match smf.header.timing {
        Timing::Metrical(tpq) => {
            let tpq = tpq.as_int();
            if tpq == 0 {
                bail!("MIDI file has zero ticks per quarter note");
            }
            let mut tempo = DEFAULT_TEMPO_US;
            let mut last_tick = 0u64;
            let mut seconds = 0.0;
            for (tick, kind) in timeline {
                seconds += (tick - last_tick) as f64 * tempo as f64 * 1e-6 / tpq as f64;
                last_tick = tick;
                match kind {
                    Kind::Tempo(t) => tempo = t,
                    Kind::Note { key, velocity } => notes.push(NoteEvent {
                        seconds,
                        key,
                        velocity,
                    }),
                }
            }
        }
        Timing::Timecode(fps, subframes) => {
            let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
            if ticks_per_second <= 0.0 {
                bail!("MIDI file has a zero timecode rate");
            }
            for (tick, kind) in timeline {
                if let Kind::Note { key, velocity } = kind {
                    notes.push(NoteEvent {
                        seconds: tick as f64 / ticks_per_second,
                        key,
                        velocity,
                    });
                }
            }
        }
    }
    Ok(notes)
}
