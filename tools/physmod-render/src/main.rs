//! physmod-render: offline WAV renderer for physmod instruments.
//!
//! Builds an instrument from a built-in preset or a JSON description, fires
//! exciter events given on the command line or read from a MIDI file, and
//! writes 24-bit stereo WAV.

use anyhow::{Context, Result, bail};
use clap::Parser;
use physmod_dsp::exciter::ExciterKind;
use physmod_dsp::{Action, Event, ExciterId, Instrument, InstrumentConfig, presets};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

mod midi;

const BLOCK: usize = 512;

/// Render a physmod instrument to a WAV file
#[derive(Parser, Debug)]
#[command(name = "physmod-render")]
#[command(version)]
struct Cli {
    /// Built-in preset (see --list-presets)
    #[arg(short, long, default_value = "plucked_string", conflicts_with = "config")]
    preset: String,

    /// Instrument description as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the resolved instrument as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// List built-in presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Duration in seconds
    #[arg(short, long, default_value_t = 2.0)]
    duration: f64,

    /// Override the instrument's sample rate
    #[arg(short = 'r', long)]
    sample_rate: Option<f64>,

    /// Exciter trigger as <exciter>@<seconds>[:<value>]. The value is the
    /// strike speed for hammers, the bow speed for bows, or "off" to lift a
    /// bow. Repeatable.
    #[arg(short, long = "event", value_name = "EVENT")]
    events: Vec<EventSpec>,

    /// Standard MIDI file whose notes play one exciter
    #[arg(long)]
    midi: Option<PathBuf>,

    /// Exciter the MIDI notes play
    #[arg(long, default_value_t = 0)]
    midi_exciter: usize,

    /// Hammer speed at full velocity, m/s
    #[arg(long, default_value_t = 2.0)]
    strike_speed: f64,

    /// Bow speed at full velocity, m/s
    #[arg(long, default_value_t = 0.2)]
    bow_speed: f64,

    /// Output WAV file
    #[arg(short, long, default_value = "physmod.wav")]
    output: PathBuf,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log instrument construction details
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum EventValue {
    Speed(f64),
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct EventSpec {
    exciter: usize,
    seconds: f64,
    value: Option<EventValue>,
}

impl FromStr for EventSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exciter, rest) = s
            .split_once('@')
            .ok_or_else(|| format!("'{s}' is not <exciter>@<seconds>[:<value>]"))?;
        let (time, value) = match rest.split_once(':') {
            Some((t, v)) => (t, Some(v)),
            None => (rest, None),
        };
        let exciter = exciter
            .trim()
            .parse()
            .map_err(|_| format!("invalid exciter index '{exciter}'"))?;
        let seconds: f64 = time
            .trim()
            .parse()
            .map_err(|_| format!("invalid event time '{time}'"))?;
        if !(seconds.is_finite() && seconds >= 0.0) {
            return Err(format!("event time must be non-negative, got {seconds}"));
        }
        let value = match value.map(str::trim) {
            None => None,
            Some("off") => Some(EventValue::Off),
            Some(v) => Some(EventValue::Speed(
                v.parse().map_err(|_| format!("invalid event value '{v}'"))?,
            )),
        };
        Ok(Self {
            exciter,
            seconds,
            value,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::WARN
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();

    if cli.list_presets {
        for name in presets::NAMES {
            println!("{name}");
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if !(cli.duration.is_finite() && cli.duration > 0.0) {
        bail!("duration must be positive, got {}", cli.duration);
    }

    let mut inst = Instrument::from_config(&config).context("building instrument")?;
    let sample_rate = inst.sample_rate();

    let mut scheduled = 0;
    for spec in &cli.events {
        scheduled += schedule_spec(&mut inst, spec, cli.strike_speed)?;
    }
    if let Some(path) = &cli.midi {
        let notes = midi::read_notes(path)?;
        tracing::info!(notes = notes.len(), file = %path.display(), "loaded MIDI");
        scheduled += schedule_midi(&mut inst, &notes, ExciterId(cli.midi_exciter), &cli)?;
    }
    if cli.events.is_empty() && cli.midi.is_none() {
        // Play exciter 0 once at the start
        let spec = EventSpec {
            exciter: 0,
            seconds: 0.0,
            value: None,
        };
        scheduled += schedule_spec(&mut inst, &spec, cli.strike_speed)?;
    }

    let num_samples = (cli.duration * sample_rate).round() as usize;
    tracing::info!(
        modules = inst.module_ids().count(),
        events = scheduled,
        duration = cli.duration,
        "rendering {}",
        cli.output.display()
    );

    let mut left = vec![0.0; num_samples];
    let mut right = vec![0.0; num_samples];
    for (l, r) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)) {
        inst.process_block(l, r);
    }

    let peak = left
        .iter()
        .chain(right.iter())
        .map(|x| x.abs())
        .fold(0.0f64, f64::max);
    tracing::info!("peak amplitude: {peak:.6} ({:.1} dBFS)", 20.0 * peak.log10());
    if peak > 1.0 {
        tracing::warn!("output clipped; lower output.gain in the instrument");
    }

    let stats = inst.take_guard_stats();
    if stats.is_clean() {
        tracing::info!("guard rails: clean");
    } else {
        stats.report();
    }

    write_wav(&cli.output, &left, &right, sample_rate.round() as u32)?;
    tracing::info!("written: {}", cli.output.display());
    Ok(())
}

fn load_config(cli: &Cli) -> Result<InstrumentConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => {
            let rate = cli.sample_rate.unwrap_or(44100.0);
            presets::by_name(&cli.preset, rate).with_context(|| {
                format!(
                    "unknown preset '{}' (available: {})",
                    cli.preset,
                    presets::NAMES.join(", ")
                )
            })?
        }
    };
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }
    Ok(config)
}

fn exciter_kind<'a>(inst: &'a Instrument, id: ExciterId) -> Result<&'a ExciterKind> {
    inst.exciter(id)
        .map(|e| e.kind())
        .with_context(|| format!("no exciter {}", id.0))
}

fn sample_at(inst: &Instrument, seconds: f64) -> u64 {
    (seconds * inst.sample_rate()).round() as u64
}

/// Turn one command-line event into instrument events. Returns how many were queued.
fn schedule_spec(inst: &mut Instrument, spec: &EventSpec, strike_speed: f64) -> Result<usize> {
    let id = ExciterId(spec.exciter);
    let at = sample_at(inst, spec.seconds);
    let actions: Vec<Action> = match (exciter_kind(inst, id)?, spec.value) {
        (ExciterKind::Pluck(_), None) => vec![Action::Pluck],
        (ExciterKind::Pluck(_), Some(_)) => bail!("pluck events take no value"),
        (ExciterKind::Hammer(_), None) => vec![Action::Strike {
            velocity: strike_speed,
        }],
        (ExciterKind::Hammer(_), Some(EventValue::Speed(v))) => {
            vec![Action::Strike { velocity: v }]
        }
        (ExciterKind::Hammer(_), Some(EventValue::Off)) => bail!("hammers cannot be lifted"),
        (ExciterKind::Bow(_), None) => vec![Action::BowOn],
        (ExciterKind::Bow(_), Some(EventValue::Speed(v))) => {
            vec![Action::SetBowVelocity(v), Action::BowOn]
        }
        (ExciterKind::Bow(_), Some(EventValue::Off)) => vec![Action::BowOff],
    };
    let count = actions.len();
    for action in actions {
        inst.schedule(Event {
            at,
            exciter: id,
            action,
        })
        .with_context(|| format!("event for exciter {} at {} s", spec.exciter, spec.seconds))?;
    }
    Ok(count)
}

/// Map note-ons to the exciter's action; note-offs lift a bow once no key holds it.
fn schedule_midi(
    inst: &mut Instrument,
    notes: &[midi::NoteEvent],
    id: ExciterId,
    cli: &Cli,
) -> Result<usize> {
    let is_bow = matches!(exciter_kind(inst, id)?, ExciterKind::Bow(_));
    let is_pluck = matches!(exciter_kind(inst, id)?, ExciterKind::Pluck(_));
    let mut held = [false; 128];
    let mut count = 0;
    for note in notes {
        let at = sample_at(inst, note.seconds);
        let velocity = note.velocity as f64 / 127.0;
        let key = (note.key & 0x7f) as usize;
        let actions: Vec<Action> = if note.is_on() {
            held[key] = true;
            if is_pluck {
                vec![Action::Pluck]
            } else if is_bow {
                vec![Action::SetBowVelocity(cli.bow_speed * velocity), Action::BowOn]
            } else {
                vec![Action::Strike {
                    velocity: cli.strike_speed * velocity,
                }]
            }
        } else {
            let was_held = std::mem::replace(&mut held[key], false);
            if is_bow && was_held && !held.iter().any(|&h| h) {
                vec![Action::BowOff]
            } else {
                Vec::new()
            }
        };
        for action in actions {
            inst.schedule(Event {
                at,
                exciter: id,
                action,
            })?;
            count += 1;
        }
    }
    Ok(count)
}

fn write_wav(path: &Path, left: &[f64], right: &[f64], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    let scale = (1 << 23) as f64 - 1.0;
    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample((l.clamp(-1.0, 1.0) * scale) as i32)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * scale) as i32)?;
    }
    writer.finalize()?;
    Ok(())
}
