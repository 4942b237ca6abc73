//! End-to-end behaviour of whole instruments.

use physmod_dsp::connection::ConnectionConfig;
use physmod_dsp::exciter::{BowParams, PluckParams};
use physmod_dsp::resonator::{
    BarParams, MembraneParams, PlateParams, Resonator, ResonatorModel, StiffMembraneParams,
    StringParams,
};
use physmod_dsp::*;
use pretty_assertions::assert_eq;

const SR: f64 = 44100.0;

fn string_module(params: StringParams, tap: f64, kind: OutputKind) -> ModuleConfig {
    ModuleConfig::new("string", ResonatorConfig::StiffString(params))
        .with_output(IoPoint::new(Location::along(tap), Channel::Both).with_kind(kind))
}

fn raw_output(config: &mut InstrumentConfig) {
    config.output.gain = 1.0;
    config.output.dc_block = false;
}

fn rms(x: &[f64]) -> f64 {
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

fn lossless() -> StringParams {
    StringParams {
        sigma0: 0.0,
        sigma1: 0.0,
        ..StringParams::default()
    }
}

fn two_strings(coupling: Coupling, second: StringParams) -> InstrumentConfig {
    let mut config = InstrumentConfig::new(SR);
    raw_output(&mut config);
    config
        .modules
        .push(string_module(lossless(), 0.3, OutputKind::Displacement));
    config
        .modules
        .push(string_module(second, 0.6, OutputKind::Displacement));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.5),
        model: ExciterParams::Pluck(PluckParams::default()),
    });
    config.connections.push(ConnectionConfig {
        first: Endpoint {
            module: 0,
            location: Location::along(0.7),
        },
        second: Some(Endpoint {
            module: 1,
            location: Location::along(0.4),
        }),
        coupling,
        points: None,
    });
    config
}

#[test]
fn test_plucked_string_peak_and_decay() {
    let mut config = InstrumentConfig::new(SR);
    raw_output(&mut config);
    config.modules.push(string_module(
        StringParams::default(),
        0.5,
        OutputKind::Displacement,
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.5),
        model: ExciterParams::Pluck(PluckParams {
            amplitude: 1.0,
            width: 0.1,
        }),
    });
    let mut inst = Instrument::from_config(&config).unwrap();
    inst.trigger(ExciterId(0), Action::Pluck).unwrap();

    let n = 2 * SR as usize;
    let out: Vec<f64> = (0..n).map(|_| inst.process_sample().left).collect();

    let early_peak = out[..100].iter().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(
        (0.1..=10.0).contains(&early_peak),
        "peak in the first 100 samples {early_peak} is not of the order of the pluck"
    );
    assert!(out.iter().all(|v| v.is_finite() && v.abs() < 10.0), "output not bounded");

    let window = SR as usize / 10;
    let first = rms(&out[..window]);
    let last = rms(&out[n - window..]);
    assert!(last < 0.5 * first, "no decay: first {first}, last {last}");
    assert!(inst.guard_stats().is_clean(), "{:?}", inst.guard_stats());
}

#[test]
fn test_bowed_string_reaches_limit_cycle() {
    let mut config = InstrumentConfig::new(SR);
    raw_output(&mut config);
    config.modules.push(string_module(
        StringParams::default(),
        0.9,
        OutputKind::Velocity,
    ));
    config.exciters.push(ExciterConfig {
        target: 0,
        location: Location::along(0.11),
        model: ExciterParams::Bow(BowParams::default()),
    });
    let mut inst = Instrument::from_config(&config).unwrap();
    inst.trigger(ExciterId(0), Action::BowOn).unwrap();

    let n = 2 * SR as usize;
    let out: Vec<f64> = (0..n).map(|_| inst.process_sample().left).collect();
    assert!(out.iter().all(|v| v.is_finite() && v.abs() < 100.0), "velocity not bounded");

    let window = SR as usize / 10;
    let middle = rms(&out[n / 2..n / 2 + window]);
    let last = rms(&out[n - window..]);
    assert!(last > 1e-3, "bowed string fell silent: rms {last}");
    assert!(last > 0.5 * middle, "oscillation decays: {middle} -> {last}");

    let stats = inst.guard_stats();
    assert_eq!(stats.divergence_resets, 0);
    assert_eq!(stats.non_finite_forces, 0);

    // Lifting the bow lets the string ring down.
    inst.trigger(ExciterId(0), Action::BowOff).unwrap();
    let tail: Vec<f64> = (0..n).map(|_| inst.process_sample().left).collect();
    assert!(rms(&tail[n - window..]) < 0.3 * last);
}

#[test]
fn test_rigid_connection_holds_points_together() {
    let config = two_strings(
        Coupling::Rigid,
        StringParams {
            tension: 500.0,
            ..lossless()
        },
    );
    let mut inst = Instrument::from_config(&config).unwrap();
    let i1 = inst
        .module(ModuleId(0))
        .unwrap()
        .model()
        .index_of(Location::along(0.7))
        .unwrap();
    let i2 = inst
        .module(ModuleId(1))
        .unwrap()
        .model()
        .index_of(Location::along(0.4))
        .unwrap();
    inst.trigger(ExciterId(0), Action::Pluck).unwrap();

    let mut moved = 0.0f64;
    for n in 0..5000 {
        inst.process_sample();
        let a = inst.module_state(ModuleId(0)).unwrap().values[i1];
        let b = inst.module_state(ModuleId(1)).unwrap().values[i2];
        moved = moved.max(a.abs());
        assert!((a - b).abs() < 1e-12, "sample {n}: {a} vs {b}");
    }
    assert!(moved > 1e-6, "connection point never moved");
}

#[test]
fn test_removed_connection_matches_independent_evolution() {
    let config = two_strings(
        Coupling::LinearSpring {
            stiffness: 2e4,
            damping: 0.1,
        },
        StringParams::default(),
    );
    let mut coupled = Instrument::from_config(&config).unwrap();
    coupled.trigger(ExciterId(0), Action::Pluck).unwrap();
    for _ in 0..2000 {
        coupled.process_sample();
    }
    assert!(
        coupled.module_state(ModuleId(1)).unwrap().values.iter().any(|v| *v != 0.0),
        "the spring never drove the second string"
    );

    // Each string alone, from the same state.
    let mut first_alone = coupled.clone();
    first_alone.stage(Edit::RemoveModule(ModuleId(1))).unwrap();
    let mut second_alone = coupled.clone();
    second_alone.stage(Edit::RemoveModule(ModuleId(0))).unwrap();

    coupled
        .stage(Edit::RemoveConnection(ConnectionId(0)))
        .unwrap();
    for n in 0..3000 {
        coupled.process_sample();
        first_alone.process_sample();
        second_alone.process_sample();
        assert_eq!(
            coupled.module_state(ModuleId(0)).unwrap().values,
            first_alone.module_state(ModuleId(0)).unwrap().values,
            "first string diverged at sample {n}"
        );
        assert_eq!(
            coupled.module_state(ModuleId(1)).unwrap().values,
            second_alone.module_state(ModuleId(1)).unwrap().values,
            "second string diverged at sample {n}"
        );
    }
}

#[test]
fn test_lossless_coupled_energy_is_conserved() {
    let config = two_strings(
        Coupling::NonlinearSpring {
            linear: 1e3,
            stiffness: 1e9,
            exponent: 3.0,
            damping: 0.0,
        },
        StringParams {
            length: 0.7,
            ..lossless()
        },
    );
    let mut inst = Instrument::from_config(&config).unwrap();
    inst.trigger(ExciterId(0), Action::Pluck).unwrap();
    inst.process_sample();
    let e0 = inst.energy();
    assert!(e0 > 0.0);
    for n in 0..20000 {
        inst.process_sample();
        let e = inst.energy();
        assert!(
            ((e - e0) / e0).abs() < 1e-8,
            "sample {n}: energy drifted from {e0} to {e}"
        );
    }
    assert_eq!(inst.guard_stats().solver_fallbacks, 0);
}

#[test]
fn test_every_resonator_decays_without_blowing_up() {
    let cases: [(ResonatorConfig, usize); 5] = [
        (ResonatorConfig::StiffString(StringParams::default()), 200_000),
        (ResonatorConfig::Bar(BarParams::default()), 44_100),
        (ResonatorConfig::Membrane(MembraneParams::default()), 11_025),
        (ResonatorConfig::ThinPlate(PlateParams::default()), 11_025),
        (ResonatorConfig::StiffMembrane(StiffMembraneParams::default()), 11_025),
    ];
    for (resonator, samples) in cases {
        let mut config = InstrumentConfig::new(SR);
        raw_output(&mut config);
        config.modules.push(
            ModuleConfig::new("object", resonator.clone())
                .with_output(IoPoint::new(Location::new(0.3, 0.4), Channel::Both)),
        );
        config.exciters.push(ExciterConfig {
            target: 0,
            location: Location::new(0.4, 0.45),
            model: ExciterParams::Pluck(PluckParams {
                amplitude: 1e-3,
                width: 0.3,
            }),
        });
        let mut inst = Instrument::from_config(&config).unwrap();
        inst.trigger(ExciterId(0), Action::Pluck).unwrap();
        inst.process_sample();
        let e0 = inst.module_energy(ModuleId(0)).unwrap();
        for _ in 1..samples {
            let f = inst.process_sample();
            assert!(f.left.is_finite(), "{resonator:?}: non-finite output");
        }
        let e = inst.module_energy(ModuleId(0)).unwrap();
        assert!(e0 > 0.0, "{resonator:?}: pluck added no energy");
        assert!(e < 0.9 * e0, "{resonator:?}: energy {e0} -> {e}");
        assert!(inst.guard_stats().is_clean(), "{resonator:?}: {:?}", inst.guard_stats());
    }
}

#[test]
fn test_rotation_keeps_computed_values() {
    let configs = [
        ResonatorConfig::StiffString(StringParams::default()),
        ResonatorConfig::Bar(BarParams::default()),
        ResonatorConfig::Membrane(MembraneParams::default()),
        ResonatorConfig::ThinPlate(PlateParams::default()),
    ];
    for config in configs {
        let mut r = Resonator::from_config(&config, SR).unwrap();
        let model = r.model_mut();
        let n = model.point_count();
        for i in 0..n {
            model.impose(i, 1e-4 * ((i * 7919) % 13) as f64);
        }
        let center = model.index_of(Location::default()).unwrap();
        model.add_force(center, 0.5);
        let predicted: Vec<f64> = (0..n).map(|i| model.predict(i)).collect();
        assert!(model.calculate_scheme());
        model.update_states();
        for i in 0..n {
            assert_eq!(
                model.output(i, OutputKind::Displacement).to_bits(),
                predicted[i].to_bits(),
                "{} point {i}",
                r_kind(&config)
            );
        }
    }
}

fn r_kind(config: &ResonatorConfig) -> &'static str {
    match config {
        ResonatorConfig::StiffString(_) => "stiff string",
        ResonatorConfig::Bar(_) => "bar",
        ResonatorConfig::Membrane(_) => "membrane",
        ResonatorConfig::ThinPlate(_) => "thin plate",
        ResonatorConfig::StiffMembrane(_) => "stiff membrane",
    }
}

#[test]
fn test_bad_weights_rejected_at_build_time() {
    let mut config = two_strings(Coupling::Rigid, lossless());
    config.connections[0].points = Some(vec![
        PointPair {
            first: Location::along(0.6),
            second: Location::along(0.3),
            weight: 0.5,
        },
        PointPair {
            first: Location::along(0.7),
            second: Location::along(0.4),
            weight: 0.4,
        },
    ]);
    match Instrument::from_config(&config) {
        Err(ConfigError::WeightSum { sum }) => assert!((sum - 0.9).abs() < 1e-12, "sum {sum}"),
        Err(e) => panic!("wrong error: {e}"),
        Ok(_) => panic!("weights summing to 0.9 were accepted"),
    }

    config.connections[0].points = Some(Vec::new());
    assert_eq!(
        Instrument::from_config(&config).err(),
        Some(ConfigError::EmptyPointList)
    );
}

#[test]
fn test_config_survives_json_and_rebuild() {
    let mut config = presets::coupled_string_plate(48000.0);
    config.exciters.push(ExciterConfig {
        target: 1,
        location: Location::new(0.6, 0.2),
        model: ExciterParams::Bow(BowParams {
            force: 0.1,
            ..BowParams::default()
        }),
    });
    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: InstrumentConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    let inst = Instrument::from_config(&parsed).unwrap();
    assert_eq!(inst.to_config(), config);
}
