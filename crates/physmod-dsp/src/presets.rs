//! Ready-made instruments.
//!
//! Each preset is a plain [`InstrumentConfig`]; callers can edit it before
//! building. Exciter 0 is always the one a host should trigger.

use crate::config::{InstrumentConfig, ModuleConfig};
use crate::connection::{ConnectionConfig, Coupling, Endpoint};
use crate::exciter::{BowParams, ExciterConfig, ExciterParams, HammerParams, PluckParams};
use crate::io::{Channel, IoPoint};
use crate::resonator::{
    BarParams, Location, MembraneParams, OutputKind, PlateParams, ResonatorConfig, StringParams,
};

pub const NAMES: [&str; 6] = [
    "plucked_string",
    "bowed_string",
    "hammered_bar",
    "struck_plate",
    "membrane_drum",
    "coupled_string_plate",
];

pub fn by_name(name: &str, sample_rate: f64) -> Option<InstrumentConfig> {
    Some(match name {
        "plucked_string" => plucked_string(sample_rate),
        "bowed_string" => bowed_string(sample_rate),
        "hammered_bar" => hammered_bar(sample_rate),
        "struck_plate" => struck_plate(sample_rate),
        "membrane_drum" => membrane_drum(sample_rate),
        "coupled_string_plate" => coupled_string_plate(sample_rate),
        _ => return None,
    })
}

fn stereo_taps(module: ModuleConfig, left: Location, right: Location) -> ModuleConfig {
    module
        .with_output(IoPoint::new(left, Channel::Left))
        .with_output(IoPoint::new(right, Channel::Right))
}

/// Steel string at 110 Hz, plucked a quarter of the way along.
pub fn plucked_string(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 300.0;
    config.modules.push(stereo_taps(
        ModuleConfig::new("string", ResonatorConfig::StiffString(StringParams::default())),
        Location::along(0.2),
        Location::along(0.75),
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.25),
        model: ExciterParams::Pluck(PluckParams::default()),
    });
    config
}

/// The same string under a bow near the bridge. `BowOn` starts it.
pub fn bowed_string(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 0.05;
    let string = ResonatorConfig::StiffString(StringParams::default());
    config.modules.push(ModuleConfig::new("string", string).with_output(
        IoPoint::new(Location::along(0.9), Channel::Both).with_kind(OutputKind::Velocity),
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.11),
        model: ExciterParams::Bow(BowParams::default()),
    });
    config
}

/// Free-free steel bar hung on soft cords at the nodes of its first mode.
pub fn hammered_bar(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 500.0;
    config.modules.push(stereo_taps(
        ModuleConfig::new("bar", ResonatorConfig::Bar(BarParams::default())),
        Location::along(0.05),
        Location::along(0.95),
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.4),
        model: ExciterParams::Hammer(HammerParams::default()),
    });
    for node in [0.224, 0.776] {
        config.connections.push(ConnectionConfig {
            first: Endpoint {
                module: 0,
                location: Location::along(node),
            },
            second: None,
            coupling: Coupling::LinearSpring {
                stiffness: 1000.0,
                damping: 1.0,
            },
            points: None,
        });
    }
    config
}

/// Simply supported steel plate struck off centre.
pub fn struck_plate(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 2000.0;
    config.modules.push(stereo_taps(
        ModuleConfig::new("plate", ResonatorConfig::ThinPlate(PlateParams::default())),
        Location::new(0.2, 0.7),
        Location::new(0.75, 0.3),
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::new(0.3, 0.4),
        model: ExciterParams::Hammer(HammerParams::default()),
    });
    config
}

/// Clamped drum head hit by a soft felt mallet.
pub fn membrane_drum(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 100.0;
    config.modules.push(stereo_taps(
        ModuleConfig::new("head", ResonatorConfig::Membrane(MembraneParams::default())),
        Location::new(0.3, 0.6),
        Location::new(0.65, 0.35),
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::new(0.45, 0.5),
        model: ExciterParams::Hammer(HammerParams {
            mass: 0.01,
            stiffness: 1e6,
            exponent: 2.0,
            damping: 0.0,
        }),
    });
    config
}

/// Plucked string whose end drives a plate through a spring.
pub fn coupled_string_plate(sample_rate: f64) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(sample_rate);
    config.output.gain = 300.0;
    config.modules.push(
        ModuleConfig::new("string", ResonatorConfig::StiffString(StringParams::default()))
            .with_output(IoPoint::new(Location::along(0.3), Channel::Left)),
    );
    config.modules.push(
        ModuleConfig::new("plate", ResonatorConfig::ThinPlate(PlateParams::default()))
            .with_output(IoPoint::new(Location::new(0.7, 0.6), Channel::Right).with_gain(4.0)),
    );
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.2),
        model: ExciterParams::Pluck(PluckParams::default()),
    });
    config.connections.push(ConnectionConfig {
        first: Endpoint {
            module: 0,
            location: Location::along(0.95),
        },
        second: Some(Endpoint {
            module: 1,
            location: Location::new(0.3, 0.4),
        }),
        coupling: Coupling::LinearSpring {
            stiffness: 5e4,
            damping: 0.5,
        },
        points: None,
    });
    config
}
