//! The instrument: resonators, exciters and connections advanced together,
//! one sample at a time.
//!
//! Every sample runs the same fixed sequence:
//!
//! ```text
//! staged edits -> due events -> Exciting -> Connecting -> Scheme -> Output
//! ```
//!
//! Exciters and connections all read the state left by the previous sample
//! (plus the forces added before them) and only add forces; the scheme phase
//! then advances every module at once. Structural edits are staged by the host
//! and applied at the start of the next sample, so the graph never changes
//! mid-sample.
//!
//! Objects live in slots addressed by stable ids. Removing one leaves a
//! tombstone; ids never shift. In [`Edit`]s, module references inside
//! exciter and connection configs are slot ids.

use std::collections::VecDeque;

use crate::config::{InstrumentConfig, ModuleConfig, OutputConfig};
use crate::connection::{Connection, ConnectionConfig, ModelStore};
use crate::diagnostics::GuardStats;
use crate::error::{ConfigError, ConfigResult, positive};
use crate::exciter::{Action, Excitation, Exciter, ExciterConfig, ExciterKind};
use crate::filters::DcBlocker;
use crate::io::{Channel, InOutInfo, IoPoint};
use crate::resonator::{OutputKind, Resonator, ResonatorModel};
use crate::solver::SolverSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExciterId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub usize);

/// Id handed back by [`Instrument::stage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotId {
    Module(ModuleId),
    Exciter(ExciterId),
    Connection(ConnectionId),
}

/// Where the instrument is within a sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Between samples; the only state a caller ever observes.
    #[default]
    Idle,
    Exciting,
    Connecting,
    Scheme,
    Output,
}

/// One stereo output sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f64,
    pub right: f64,
}

/// A trigger for one exciter, stamped with the sample index it fires at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub at: u64,
    pub exciter: ExciterId,
    pub action: Action,
}

/// A structural change, applied at the next sample boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    AddModule(ModuleConfig),
    RemoveModule(ModuleId),
    AddExciter(ExciterConfig),
    RemoveExciter(ExciterId),
    AddConnection(ConnectionConfig),
    RemoveConnection(ConnectionId),
}

/// Read-only view of a module's current displacement.
#[derive(Clone, Copy, Debug)]
pub struct StateView<'a> {
    /// Row-major, `rows * columns` values.
    pub values: &'a [f64],
    pub columns: usize,
    pub rows: usize,
}

/// Output tap resolved to a grid index, with channel gains folded in.
#[derive(Clone, Copy, Debug)]
struct Tap {
    index: usize,
    kind: OutputKind,
    left: f64,
    right: f64,
}

/// A resonator with its name and input/output points.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    resonator: Resonator,
    io: InOutInfo,
    taps: Vec<Tap>,
}

impl Module {
    fn new(config: &ModuleConfig, sample_rate: f64) -> ConfigResult<Self> {
        let resonator = Resonator::from_config(&config.resonator, sample_rate)?;
        let mut io = InOutInfo::default();
        let mut taps = Vec::with_capacity(config.outputs.len());
        for point in &config.outputs {
            if !point.gain.is_finite() {
                return Err(ConfigError::invalid(
                    "gain",
                    format!("tap gain must be finite, got {}", point.gain),
                ));
            }
            let index = resonator.model().index_of(point.location)?;
            let (left, right) = point.channel.gains();
            taps.push(Tap {
                index,
                kind: point.kind,
                left: left * point.gain,
                right: right * point.gain,
            });
            io.add_output(*point);
        }
        Ok(Self {
            name: config.name.clone(),
            resonator,
            io,
            taps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resonator(&self) -> &Resonator {
        &self.resonator
    }

    pub fn model(&self) -> &dyn ResonatorModel {
        self.resonator.model()
    }

    pub fn io(&self) -> &InOutInfo {
        &self.io
    }

    fn to_config(&self) -> ModuleConfig {
        ModuleConfig {
            name: self.name.clone(),
            resonator: self.resonator.to_config(),
            outputs: self.io.outputs().to_vec(),
        }
    }
}

impl ModelStore for [Option<Module>] {
    fn model(&self, id: ModuleId) -> Option<&dyn ResonatorModel> {
        self.get(id.0)?.as_ref().map(|m| m.resonator.model())
    }

    fn model_mut(&mut self, id: ModuleId) -> Option<&mut dyn ResonatorModel> {
        self.get_mut(id.0)?.as_mut().map(|m| m.resonator.model_mut())
    }
}

/// An edit that passed validation, holding the built object.
#[derive(Clone, Debug)]
enum Staged {
    AddModule(ModuleId, Box<Module>),
    RemoveModule(ModuleId),
    AddExciter(ExciterId, Box<Exciter>),
    RemoveExciter(ExciterId),
    AddConnection(ConnectionId, Box<Connection>),
    RemoveConnection(ConnectionId),
}

/// Objects taken out of the graph on the audio path, dropped later on the
/// host's side by the next `stage`.
#[derive(Clone, Debug, Default)]
struct Retired {
    modules: Vec<Module>,
    exciters: Vec<Exciter>,
    connections: Vec<Connection>,
}

impl Retired {
    fn clear(&mut self) {
        self.modules.clear();
        self.exciters.clear();
        self.connections.clear();
    }
}

/// The input point an exciter registers on its target.
fn contact_point(exciter: &Exciter) -> IoPoint {
    IoPoint::new(exciter.location(), Channel::Both)
}

#[derive(Clone)]
pub struct Instrument {
    sample_rate: f64,
    k: f64,
    modules: Vec<Option<Module>>,
    exciters: Vec<Option<Exciter>>,
    connections: Vec<Option<Connection>>,
    pending: Vec<Staged>,
    retired: Retired,
    events: VecDeque<Event>,
    output: OutputConfig,
    dc: Option<[DcBlocker; 2]>,
    solver: SolverSettings,
    stats: GuardStats,
    phase: Phase,
    clock: u64,
}

impl Instrument {
    /// Build every module, exciter and connection of `config`. Module
    /// references are list indices and become slot ids unchanged.
    pub fn from_config(config: &InstrumentConfig) -> ConfigResult<Self> {
        let sample_rate = config.sample_rate;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        if !config.output.gain.is_finite() {
            return Err(ConfigError::invalid(
                "gain",
                format!("output gain must be finite, got {}", config.output.gain),
            ));
        }
        if config.solver.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be at least 1"));
        }
        positive("tolerance", config.solver.tolerance)?;
        positive("abs_tolerance", config.solver.abs_tolerance)?;

        let mut inst = Self {
            sample_rate,
            k: 1.0 / sample_rate,
            modules: Vec::with_capacity(config.modules.len()),
            exciters: Vec::with_capacity(config.exciters.len()),
            connections: Vec::with_capacity(config.connections.len()),
            pending: Vec::new(),
            retired: Retired::default(),
            events: VecDeque::new(),
            output: config.output,
            dc: config
                .output
                .dc_block
                .then(|| [DcBlocker::new(sample_rate), DcBlocker::new(sample_rate)]),
            solver: config.solver,
            stats: GuardStats::default(),
            phase: Phase::Idle,
            clock: 0,
        };

        for m in &config.modules {
            let module = Module::new(m, sample_rate)?;
            let model = module.model();
            tracing::debug!(
                name = %module.name,
                kind = module.resonator.kind_name(),
                points = model.point_count(),
                spacing = model.spacing(),
                courant = model.courant(),
                "module built"
            );
            inst.modules.push(Some(module));
        }
        for e in &config.exciters {
            let exciter = inst.build_exciter(e)?;
            inst.install_exciter(exciter);
        }
        for c in &config.connections {
            let connection = inst.build_connection(c)?;
            inst.connections.push(Some(connection));
        }

        tracing::info!(
            sample_rate,
            modules = inst.modules.len(),
            exciters = inst.exciters.len(),
            connections = inst.connections.len(),
            "instrument ready"
        );
        Ok(inst)
    }

    /// Describe the live instrument. Tombstones are skipped and the remaining
    /// ids compacted, so the result rebuilds an equivalent instrument.
    /// Staged edits and scheduled events are not included.
    pub fn to_config(&self) -> InstrumentConfig {
        let slot = |id: ModuleId| self.modules[..id.0].iter().filter(|m| m.is_some()).count();
        InstrumentConfig {
            sample_rate: self.sample_rate,
            modules: self.modules.iter().flatten().map(Module::to_config).collect(),
            exciters: self
                .exciters
                .iter()
                .flatten()
                .map(|e| ExciterConfig {
                    target: slot(e.target()),
                    location: e.location(),
                    model: e.params(),
                })
                .collect(),
            connections: self
                .connections
                .iter()
                .flatten()
                .map(|c| c.to_config(slot))
                .collect(),
            output: self.output,
            solver: self.solver,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Samples processed so far.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)?.as_ref()
    }

    pub fn exciter(&self, id: ExciterId) -> Option<&Exciter> {
        self.exciters.get(id.0)?.as_ref()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.0)?.as_ref()
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_some())
            .map(|(i, _)| ModuleId(i))
    }

    pub fn exciter_ids(&self) -> impl Iterator<Item = ExciterId> + '_ {
        self.exciters
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| ExciterId(i))
    }

    /// Current displacement of one module, for visualisation.
    pub fn module_state(&self, id: ModuleId) -> Option<StateView<'_>> {
        let model = self.module(id)?.model();
        let dims = model.dims();
        Some(StateView {
            values: model.state(),
            columns: dims.columns,
            rows: dims.rows,
        })
    }

    /// Discrete energy of one module.
    pub fn module_energy(&self, id: ModuleId) -> Option<f64> {
        Some(self.module(id)?.model().energy())
    }

    /// Energy of every module, every connection spring and every hammer.
    pub fn energy(&self) -> f64 {
        let store = self.modules.as_slice();
        let modules: f64 = store.iter().flatten().map(|m| m.model().energy()).sum();
        let springs: f64 = self.connections.iter().flatten().map(|c| c.energy(store)).sum();
        let hammers: f64 = self
            .exciters
            .iter()
            .flatten()
            .filter_map(|e| match (e.kind(), store.model(e.target())) {
                (ExciterKind::Hammer(h), Some(model)) => Some(h.energy(model, e.index(), self.k)),
                _ => None,
            })
            .sum();
        modules + springs + hammers
    }

    pub fn guard_stats(&self) -> GuardStats {
        self.stats
    }

    /// Return the guard-rail counters and zero them.
    pub fn take_guard_stats(&mut self) -> GuardStats {
        std::mem::take(&mut self.stats)
    }

    /// Edits waiting for the next sample boundary.
    pub fn pending_edits(&self) -> usize {
        self.pending.len()
    }

    /// Events not yet fired.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Make room for `additional` events so scheduling from an audio
    /// callback does not allocate.
    pub fn reserve_events(&mut self, additional: usize) {
        self.events.reserve(additional);
    }

    /// Validate an edit against the live graph plus everything already
    /// staged, build what it adds, and queue it for the next sample.
    pub fn stage(&mut self, edit: Edit) -> ConfigResult<SlotId> {
        self.retired.clear();
        let staged = match &edit {
            Edit::AddModule(config) => {
                let queued = self.count_staged(|s| matches!(s, Staged::AddModule(..)));
                let id = ModuleId(self.modules.len() + queued);
                let module = Module::new(config, self.sample_rate)?;
                Staged::AddModule(id, Box::new(module))
            }
            Edit::RemoveModule(id) => {
                if self.staged_model(*id).is_none() {
                    return Err(ConfigError::UnknownModule(id.0));
                }
                Staged::RemoveModule(*id)
            }
            Edit::AddExciter(config) => {
                let queued = self.count_staged(|s| matches!(s, Staged::AddExciter(..)));
                let id = ExciterId(self.exciters.len() + queued);
                let exciter = self.build_exciter(config)?;
                Staged::AddExciter(id, Box::new(exciter))
            }
            Edit::RemoveExciter(id) => {
                if self.staged_exciter(*id).is_none() {
                    return Err(ConfigError::UnknownExciter(id.0));
                }
                Staged::RemoveExciter(*id)
            }
            Edit::AddConnection(config) => {
                let queued = self.count_staged(|s| matches!(s, Staged::AddConnection(..)));
                let id = ConnectionId(self.connections.len() + queued);
                let connection = self.build_connection(config)?;
                Staged::AddConnection(id, Box::new(connection))
            }
            Edit::RemoveConnection(id) => {
                if self.staged_connection(*id).is_none() {
                    return Err(ConfigError::UnknownConnection(id.0));
                }
                Staged::RemoveConnection(*id)
            }
        };
        let slot = match &staged {
            Staged::AddModule(id, _) | Staged::RemoveModule(id) => SlotId::Module(*id),
            Staged::AddExciter(id, _) | Staged::RemoveExciter(id) => SlotId::Exciter(*id),
            Staged::AddConnection(id, _) | Staged::RemoveConnection(id) => SlotId::Connection(*id),
        };
        tracing::debug!(?slot, "edit staged");
        self.pending.push(staged);
        self.reserve_pending();
        Ok(slot)
    }

    /// Queue a trigger. Events are kept in time order; ties fire in the
    /// order they were scheduled. Events stamped in the past fire at the
    /// start of the next sample.
    pub fn schedule(&mut self, event: Event) -> ConfigResult<()> {
        event.action.validate()?;
        let exciter = self
            .staged_exciter(event.exciter)
            .ok_or(ConfigError::UnknownExciter(event.exciter.0))?;
        if !exciter.accepts(&event.action) {
            return Err(ConfigError::ExciterMismatch {
                exciter: event.exciter.0,
                kind: exciter.kind_name(),
                action: event.action.name(),
            });
        }
        let at = self.events.partition_point(|e| e.at <= event.at);
        self.events.insert(at, event);
        Ok(())
    }

    /// Trigger right away, at the start of the next sample.
    pub fn trigger(&mut self, exciter: ExciterId, action: Action) -> ConfigResult<()> {
        self.schedule(Event {
            at: self.clock,
            exciter,
            action,
        })
    }

    /// Silence every module and drop pending events. Structure and clock
    /// are kept.
    pub fn reset(&mut self) {
        for m in self.modules.iter_mut().flatten() {
            m.resonator.model_mut().clear();
        }
        for e in self.exciters.iter_mut().flatten() {
            e.reset();
        }
        if let Some(dc) = &mut self.dc {
            dc.iter_mut().for_each(DcBlocker::reset);
        }
        self.events.clear();
    }

    /// Advance every module by one sample.
    pub fn process_sample(&mut self) -> Frame {
        self.apply_staged();
        self.fire_events();
        let k = self.k;

        self.phase = Phase::Exciting;
        for exciter in self.exciters.iter_mut().flatten() {
            if let Some(model) = self.modules.as_mut_slice().model_mut(exciter.target()) {
                exciter.prepare(model, k);
            }
        }
        for exciter in self.exciters.iter_mut().flatten() {
            if let Some(model) = self.modules.as_mut_slice().model_mut(exciter.target()) {
                match exciter.excite(model, k, &self.solver) {
                    Excitation::Fallback => self.stats.solver_fallbacks += 1,
                    Excitation::NonFinite => self.stats.non_finite_forces += 1,
                    Excitation::Idle | Excitation::Applied => {}
                }
            }
        }

        self.phase = Phase::Connecting;
        for connection in self.connections.iter_mut().flatten() {
            let report = connection.apply(self.modules.as_mut_slice(), k, &self.solver);
            self.stats.solver_fallbacks += u64::from(report.fallbacks);
            self.stats.non_finite_forces += u64::from(report.non_finite);
        }

        self.phase = Phase::Scheme;
        for (i, slot) in self.modules.iter_mut().enumerate() {
            let Some(module) = slot else {
                continue;
            };
            let model = module.resonator.model_mut();
            if model.calculate_scheme() {
                model.update_states();
            } else {
                model.clear();
                self.stats.divergence_resets += 1;
                for exciter in self.exciters.iter_mut().flatten() {
                    if exciter.target() == ModuleId(i) {
                        exciter.reset();
                    }
                }
            }
        }

        self.phase = Phase::Output;
        let (mut left, mut right) = (0.0, 0.0);
        for module in self.modules.iter().flatten() {
            let model = module.resonator.model();
            for tap in &module.taps {
                let v = model.output(tap.index, tap.kind);
                left += v * tap.left;
                right += v * tap.right;
            }
        }
        left *= self.output.gain;
        right *= self.output.gain;
        if !(left.is_finite() && right.is_finite()) {
            self.stats.non_finite_output += 1;
            left = 0.0;
            right = 0.0;
        }
        if let Some([dc_l, dc_r]) = &mut self.dc {
            left = dc_l.process(left);
            right = dc_r.process(right);
        }

        self.clock += 1;
        self.phase = Phase::Idle;
        Frame { left, right }
    }

    /// Alias of [`process_sample`](Self::process_sample).
    pub fn process_frame(&mut self) -> Frame {
        self.process_sample()
    }

    /// Fill two channel buffers. Processes as many samples as the shorter
    /// buffer holds.
    pub fn process_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let frame = self.process_sample();
            *l = frame.left;
            *r = frame.right;
        }
    }

    fn count_staged(&self, pred: impl Fn(&Staged) -> bool) -> usize {
        self.pending.iter().filter(|s| pred(s)).count()
    }

    /// Model of a module that will exist once the staged edits apply.
    fn staged_model(&self, id: ModuleId) -> Option<&dyn ResonatorModel> {
        if self
            .pending
            .iter()
            .any(|s| matches!(s, Staged::RemoveModule(r) if *r == id))
        {
            return None;
        }
        if let Some(model) = self.modules.as_slice().model(id) {
            return Some(model);
        }
        self.pending.iter().find_map(|s| match s {
            Staged::AddModule(pid, m) if *pid == id => Some(m.model()),
            _ => None,
        })
    }

    fn staged_exciter(&self, id: ExciterId) -> Option<&Exciter> {
        if self
            .pending
            .iter()
            .any(|s| matches!(s, Staged::RemoveExciter(r) if *r == id))
        {
            return None;
        }
        let exciter = self.exciter(id).or_else(|| {
            self.pending.iter().find_map(|s| match s {
                Staged::AddExciter(pid, e) if *pid == id => Some(e.as_ref()),
                _ => None,
            })
        })?;
        self.staged_model(exciter.target()).map(|_| exciter)
    }

    fn staged_connection(&self, id: ConnectionId) -> Option<&Connection> {
        if self
            .pending
            .iter()
            .any(|s| matches!(s, Staged::RemoveConnection(r) if *r == id))
        {
            return None;
        }
        let connection = self.connection(id).or_else(|| {
            self.pending.iter().find_map(|s| match s {
                Staged::AddConnection(pid, c) if *pid == id => Some(c.as_ref()),
                _ => None,
            })
        })?;
        let first = self.staged_model(connection.first()).is_some();
        let second = connection
            .second()
            .is_none_or(|m| self.staged_model(m).is_some());
        (first && second).then_some(connection)
    }

    fn build_exciter(&self, config: &ExciterConfig) -> ConfigResult<Exciter> {
        let target = ModuleId(config.target);
        let model = self
            .staged_model(target)
            .ok_or(ConfigError::UnknownModule(config.target))?;
        Exciter::new(&config.model, config.location, target, model)
    }

    fn build_connection(&self, config: &ConnectionConfig) -> ConfigResult<Connection> {
        let first = ModuleId(config.first.module);
        let first_model = self
            .staged_model(first)
            .ok_or(ConfigError::UnknownModule(first.0))?;
        let second = match config.second {
            Some(endpoint) => {
                let id = ModuleId(endpoint.module);
                let model = self
                    .staged_model(id)
                    .ok_or(ConfigError::UnknownModule(id.0))?;
                Some((id, model))
            }
            None => None,
        };
        Connection::new(config, (first, first_model), second)
    }

    /// Make room for everything the queued edits will push, so applying
    /// them inside `process_sample` never allocates.
    fn reserve_pending(&mut self) {
        let modules = self.count_staged(|s| matches!(s, Staged::AddModule(..)));
        let exciters = self.count_staged(|s| matches!(s, Staged::AddExciter(..)));
        let connections = self.count_staged(|s| matches!(s, Staged::AddConnection(..)));
        let removed = self.count_staged(|s| matches!(s, Staged::RemoveModule(_)));
        self.modules.reserve(modules);
        self.exciters.reserve(exciters);
        self.connections.reserve(connections);

        // `retired` is empty here; each object can be retired at most once
        self.retired.modules.reserve(removed);
        self.retired.exciters.reserve(self.exciters.len() + exciters);
        self.retired.connections.reserve(self.connections.len() + connections);

        // Input points for queued exciters, on live or queued targets
        for i in 0..self.pending.len() {
            let Staged::AddExciter(_, exciter) = &self.pending[i] else {
                continue;
            };
            let target = exciter.target();
            let inputs = self.count_staged(
                |s| matches!(s, Staged::AddExciter(_, e) if e.target() == target),
            );
            if let Some(module) = self.modules.get_mut(target.0).and_then(Option::as_mut) {
                module.io.reserve_inputs(inputs);
            } else if let Some(Staged::AddModule(_, module)) = self
                .pending
                .iter_mut()
                .find(|s| matches!(s, Staged::AddModule(id, _) if *id == target))
            {
                module.io.reserve_inputs(inputs);
            }
        }
    }

    fn install_exciter(&mut self, exciter: Exciter) {
        if let Some(module) = self.modules.get_mut(exciter.target().0).and_then(Option::as_mut) {
            module.io.add_input(contact_point(&exciter));
        }
        self.exciters.push(Some(exciter));
    }

    fn apply_staged(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.pending);
        for staged in pending.drain(..) {
            self.apply(staged);
        }
        self.pending = pending;
    }

    fn apply(&mut self, staged: Staged) {
        match staged {
            Staged::AddModule(_, module) => self.modules.push(Some(*module)),
            Staged::RemoveModule(id) => self.remove_module(id),
            Staged::AddExciter(_, exciter) => {
                if self.module(exciter.target()).is_some() {
                    self.install_exciter(*exciter);
                } else {
                    self.stats.dropped_edits += 1;
                    self.exciters.push(None);
                }
            }
            Staged::RemoveExciter(id) => self.remove_exciter(id),
            Staged::AddConnection(_, connection) => {
                let live = self.module(connection.first()).is_some()
                    && connection.second().is_none_or(|m| self.module(m).is_some());
                if live {
                    self.connections.push(Some(*connection));
                } else {
                    self.stats.dropped_edits += 1;
                    self.connections.push(None);
                }
            }
            Staged::RemoveConnection(id) => {
                match self.connections.get_mut(id.0).and_then(Option::take) {
                    Some(c) => self.retired.connections.push(c),
                    None => self.stats.dropped_edits += 1,
                }
            }
        }
    }

    fn remove_module(&mut self, id: ModuleId) {
        let Some(module) = self.modules.get_mut(id.0).and_then(Option::take) else {
            self.stats.dropped_edits += 1;
            return;
        };
        self.retired.modules.push(module);
        for slot in &mut self.exciters {
            if slot.as_ref().is_some_and(|e| e.target() == id) {
                if let Some(e) = slot.take() {
                    self.retired.exciters.push(e);
                }
            }
        }
        for slot in &mut self.connections {
            if slot.as_ref().is_some_and(|c| c.touches(id)) {
                if let Some(c) = slot.take() {
                    self.retired.connections.push(c);
                }
            }
        }
    }

    fn remove_exciter(&mut self, id: ExciterId) {
        let Some(exciter) = self.exciters.get_mut(id.0).and_then(Option::take) else {
            self.stats.dropped_edits += 1;
            return;
        };
        if let Some(module) = self.modules.get_mut(exciter.target().0).and_then(Option::as_mut) {
            module.io.remove_input(&contact_point(&exciter));
        }
        self.retired.exciters.push(exciter);
    }

    fn fire_events(&mut self) {
        while let Some(event) = self.events.front().copied() {
            if event.at > self.clock {
                break;
            }
            self.events.pop_front();
            let triggered = match self.exciters.get_mut(event.exciter.0).and_then(Option::as_mut) {
                Some(exciter) => exciter.trigger(event.action),
                None => false,
            };
            if !triggered {
                self.stats.dropped_edits += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Coupling, Endpoint};
    use crate::exciter::{ExciterParams, HammerParams, PluckParams};
    use crate::resonator::{Location, ResonatorConfig, StringParams};

    fn lossless_string() -> ResonatorConfig {
        ResonatorConfig::StiffString(StringParams {
            sigma0: 0.0,
            sigma1: 0.0,
            ..StringParams::default()
        })
    }

    fn one_string() -> InstrumentConfig {
        let mut config = InstrumentConfig::new(44100.0);
        config.output.dc_block = false;
        config.modules.push(
            ModuleConfig::new("string", ResonatorConfig::StiffString(StringParams::default()))
                .with_output(IoPoint::new(Location::along(0.3), Channel::Both)),
        );
        config.exciters.push(ExciterConfig {
            target: 0,
            location: Location::along(0.5),
            model: ExciterParams::Pluck(PluckParams::default()),
        });
        config
    }

    #[test]
    fn test_invalid_sample_rate() {
        let mut config = one_string();
        config.sample_rate = 0.0;
        assert!(matches!(
            Instrument::from_config(&config),
            Err(ConfigError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut config = one_string();
        config.exciters[0].target = 3;
        assert_eq!(
            Instrument::from_config(&config).err(),
            Some(ConfigError::UnknownModule(3))
        );
    }

    #[test]
    fn test_output_tap_out_of_range() {
        let mut config = one_string();
        config.modules[0].outputs[0].location = Location::along(1.2);
        assert!(matches!(
            Instrument::from_config(&config),
            Err(ConfigError::LocationOutOfRange { .. })
        ));
    }

    #[test]
    fn test_exciter_registers_input() {
        let inst = Instrument::from_config(&one_string()).unwrap();
        let io = inst.module(ModuleId(0)).unwrap().io();
        assert_eq!(io.inputs().len(), 1);
        assert_eq!(io.inputs()[0].location, Location::along(0.5));
        assert_eq!(io.outputs().len(), 1);
    }

    #[test]
    fn test_silent_until_plucked() {
        let mut inst = Instrument::from_config(&one_string()).unwrap();
        inst.schedule(Event {
            at: 10,
            exciter: ExciterId(0),
            action: Action::Pluck,
        })
        .unwrap();
        for n in 0..10 {
            let f = inst.process_sample();
            assert_eq!(f, Frame::default(), "sample {n} should be silent");
        }
        let mut peak = 0.0f64;
        for _ in 0..100 {
            peak = peak.max(inst.process_sample().left.abs());
        }
        assert!(peak > 1e-5, "pluck produced no output: {peak}");
        assert_eq!(inst.pending_events(), 0);
        assert_eq!(inst.phase(), Phase::Idle);
        assert_eq!(inst.clock(), 110);
    }

    #[test]
    fn test_mismatched_action_rejected() {
        let mut inst = Instrument::from_config(&one_string()).unwrap();
        let err = inst.trigger(ExciterId(0), Action::BowOn).unwrap_err();
        assert!(matches!(err, ConfigError::ExciterMismatch { exciter: 0, .. }), "{err}");
        assert_eq!(
            inst.trigger(ExciterId(7), Action::Pluck),
            Err(ConfigError::UnknownExciter(7))
        );
        assert_eq!(inst.pending_events(), 0);
    }

    #[test]
    fn test_events_kept_in_time_order() {
        let mut inst = Instrument::from_config(&one_string()).unwrap();
        for at in [5, 2, 9] {
            inst.schedule(Event {
                at,
                exciter: ExciterId(0),
                action: Action::Pluck,
            })
            .unwrap();
        }
        let stamps: Vec<u64> = inst.events.iter().map(|e| e.at).collect();
        assert_eq!(stamps, vec![2, 5, 9]);
        for _ in 0..6 {
            inst.process_sample();
        }
        assert_eq!(inst.pending_events(), 1);
    }

    #[test]
    fn test_staged_edits_apply_at_next_sample() {
        let mut inst = Instrument::from_config(&one_string()).unwrap();
        let id = inst
            .stage(Edit::AddModule(ModuleConfig::new("second", lossless_string())))
            .unwrap();
        assert_eq!(id, SlotId::Module(ModuleId(1)));
        assert!(inst.module(ModuleId(1)).is_none());

        // Exciter on the staged module validates against pending state.
        let hammer = inst
            .stage(Edit::AddExciter(ExciterConfig {
                target: 1,
                location: Location::along(0.2),
                model: ExciterParams::Hammer(HammerParams::default()),
            }))
            .unwrap();
        assert_eq!(hammer, SlotId::Exciter(ExciterId(1)));
        inst.trigger(ExciterId(1), Action::Strike { velocity: 1.0 })
            .unwrap();

        assert_eq!(inst.pending_edits(), 2);
        inst.process_sample();
        assert_eq!(inst.pending_edits(), 0);
        assert!(inst.module(ModuleId(1)).is_some());
        assert!(inst.exciter(ExciterId(1)).is_some());
        assert!(inst.guard_stats().is_clean());
    }

    #[test]
    fn test_queued_edits_apply_without_reallocating() {
        let mut inst = Instrument::from_config(&one_string()).unwrap();
        for name in ["a", "b", "c"] {
            inst.stage(Edit::AddModule(ModuleConfig::new(name, lossless_string())))
                .unwrap();
        }
        for location in [0.2, 0.4] {
            inst.stage(Edit::AddExciter(ExciterConfig {
                target: 0,
                location: Location::along(location),
                model: ExciterParams::Pluck(PluckParams::default()),
            }))
            .unwrap();
        }
        let modules = inst.modules.as_ptr();
        let exciters = inst.exciters.as_ptr();
        let inputs = inst.module(ModuleId(0)).unwrap().io().inputs().as_ptr();

        inst.process_sample();
        assert_eq!(inst.modules.len(), 4);
        assert_eq!(inst.exciters.len(), 3);
        assert_eq!(inst.module(ModuleId(0)).unwrap().io().inputs().len(), 3);
        assert!(inst.modules.as_ptr() == modules, "modules reallocated");
        assert!(inst.exciters.as_ptr() == exciters, "exciters reallocated");
        assert!(
            inst.module(ModuleId(0)).unwrap().io().inputs().as_ptr() == inputs,
            "input points reallocated"
        );

        for id in 0..3 {
            inst.stage(Edit::RemoveExciter(ExciterId(id))).unwrap();
        }
        let retired = inst.retired.exciters.as_ptr();
        inst.process_sample();
        assert_eq!(inst.retired.exciters.len(), 3);
        assert!(inst.retired.exciters.as_ptr() == retired, "retired exciters reallocated");
    }

    #[test]
    fn test_remove_module_takes_exciters_and_connections() {
        let mut config = one_string();
        config.modules.push(ModuleConfig::new("other", lossless_string()));
        config.connections.push(ConnectionConfig {
            first: Endpoint {
                module: 0,
                location: Location::along(0.7),
            },
            second: Some(Endpoint {
                module: 1,
                location: Location::along(0.7),
            }),
            coupling: Coupling::Rigid,
            points: None,
        });
        let mut inst = Instrument::from_config(&config).unwrap();
        inst.stage(Edit::RemoveModule(ModuleId(0))).unwrap();

        // Already staged for removal: a second removal or a new exciter on it
        // is refused.
        assert_eq!(
            inst.stage(Edit::RemoveModule(ModuleId(0))),
            Err(ConfigError::UnknownModule(0))
        );
        assert_eq!(
            inst.trigger(ExciterId(0), Action::Pluck),
            Err(ConfigError::UnknownExciter(0))
        );

        inst.process_sample();
        assert!(inst.module(ModuleId(0)).is_none());
        assert!(inst.exciter(ExciterId(0)).is_none());
        assert!(inst.connection(ConnectionId(0)).is_none());
        assert_eq!(inst.module_ids().collect::<Vec<_>>(), vec![ModuleId(1)]);

        // Ids do not shift.
        let id = inst
            .stage(Edit::AddModule(ModuleConfig::new("third", lossless_string())))
            .unwrap();
        assert_eq!(id, SlotId::Module(ModuleId(2)));
    }

    #[test]
    fn test_to_config_compacts_ids() {
        let mut config = one_string();
        config.modules.insert(0, ModuleConfig::new("doomed", lossless_string()));
        config.exciters[0].target = 1;
        let mut inst = Instrument::from_config(&config).unwrap();
        inst.stage(Edit::RemoveModule(ModuleId(0))).unwrap();
        inst.process_sample();

        let saved = inst.to_config();
        assert_eq!(saved.modules.len(), 1);
        assert_eq!(saved.modules[0].name, "string");
        assert_eq!(saved.exciters.len(), 1);
        assert_eq!(saved.exciters[0].target, 0);
        assert!(Instrument::from_config(&saved).is_ok());
    }

    #[test]
    fn test_divergent_module_is_cleared() {
        let mut config = one_string();
        config.exciters[0].model = ExciterParams::Pluck(PluckParams {
            amplitude: 2e6,
            width: 0.2,
        });
        let mut inst = Instrument::from_config(&config).unwrap();
        inst.trigger(ExciterId(0), Action::Pluck).unwrap();
        let f = inst.process_sample();
        assert_eq!(f, Frame::default());
        let stats = inst.take_guard_stats();
        assert_eq!(stats.divergence_resets, 1);
        assert!(inst.guard_stats().is_clean());
        assert!(inst.module_state(ModuleId(0)).unwrap().values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_non_finite_output_is_silenced() {
        let mut config = one_string();
        config.output.gain = 1e306;
        config.exciters[0].model = ExciterParams::Pluck(PluckParams {
            amplitude: 1e5,
            width: 0.6,
        });
        let mut inst = Instrument::from_config(&config).unwrap();
        inst.trigger(ExciterId(0), Action::Pluck).unwrap();
        let f = inst.process_sample();
        assert_eq!(f, Frame::default());
        assert_eq!(inst.guard_stats().non_finite_output, 1);
    }

    #[test]
    fn test_module_state_view() {
        let inst = Instrument::from_config(&one_string()).unwrap();
        let view = inst.module_state(ModuleId(0)).unwrap();
        assert_eq!(view.rows, 1);
        assert_eq!(view.values.len(), view.columns * view.rows);
        assert!(inst.module_state(ModuleId(4)).is_none());
    }

    #[test]
    fn test_process_block_matches_samples() {
        let mut a = Instrument::from_config(&one_string()).unwrap();
        let mut b = Instrument::from_config(&one_string()).unwrap();
        a.trigger(ExciterId(0), Action::Pluck).unwrap();
        b.trigger(ExciterId(0), Action::Pluck).unwrap();
        let (mut left, mut right) = (vec![0.0; 64], vec![0.0; 64]);
        a.process_block(&mut left, &mut right);
        for i in 0..64 {
            let f = b.process_sample();
            assert_eq!((left[i], right[i]), (f.left, f.right), "sample {i}");
        }
    }
}
