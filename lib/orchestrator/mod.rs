//! Sequencing stack usage measurements for a host debugger.
//!
//! The `Orchestrator` sits between a host IDE and the rest of this crate. The
//! host wires its debugger events to `on_enter_break_mode`,
//! `on_enter_run_mode` and `on_enter_design_mode`, forwards refresh requests
//! to `refresh`, and calls `poll` (or `wait`) to collect scan results. After
//! each call the host displays `status()`.
//!
//! A refresh checks, in order, that the project carries the instrumentation,
//! that the target is halted, and that the device has a recognised internal
//! SRAM. It then starts a worker thread which reads and scans that SRAM. Only
//! one worker runs at a time: a refresh while scanning is ignored.
//!
//! Every debugger mode change starts a new session generation. A scan which
//! finishes in an older generation than the current one is stale, and its
//! result is discarded.

mod status;
mod worker;

pub use self::status::{Status, HELP_TEXT};
pub use self::worker::ScanReport;

use crate::device::Device;
use crate::instrument::CanaryPattern;
use crate::memory::TargetMemory;
use crate::region::{self, SramAliases};
use crate::Error;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use self::worker::{ScanJob, Worker};

/// The debugger's execution mode.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum DebugMode {
    /// No debug session.
    Design,
    /// The target is running.
    Run,
    /// The target is halted.
    Break,
}

/// The host project the instrumentation is added to.
pub trait Project {
    /// Returns true if the project contains the instrumentation source.
    fn has_instrumentation(&self) -> bool;
}

/// An attached debug target.
pub trait Target: Send + Sync {
    /// The device catalogue of the target.
    fn device(&self) -> Device;

    /// The memory read capability of the target.
    fn memory(&self) -> &dyn TargetMemory;
}

/// The host debugger's current session.
pub trait Session {
    fn mode(&self) -> DebugMode;

    /// The launched target, if there is one.
    fn target(&self) -> Option<Arc<dyn Target>>;
}

/// Settings for stack measurements.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    aliases: SramAliases,
    pattern: CanaryPattern,
}

impl Config {
    pub fn new(aliases: SramAliases, pattern: CanaryPattern) -> Config {
        Config { aliases, pattern }
    }

    /// Parse a `Config` from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Config, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn aliases(&self) -> &SramAliases {
        &self.aliases
    }

    pub fn pattern(&self) -> &CanaryPattern {
        &self.pattern
    }
}

/// The orchestrator's state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
    /// The project lacks the instrumentation.
    NotInstrumented,
    /// Instrumented, with no scan in flight.
    InstrumentedIdle,
    /// A scan is in flight.
    Scanning,
}

/// Drives refreshes and debugger events into a displayable `Status`.
pub struct Orchestrator<P: Project, S: Session> {
    config: Config,
    project: P,
    session: S,
    state: State,
    status: Status,
    generation: u64,
    worker: Option<Worker>,
}

impl<P: Project, S: Session> Orchestrator<P, S> {
    /// Create a new `Orchestrator` with the default `Config`.
    pub fn new(project: P, session: S) -> Orchestrator<P, S> {
        Orchestrator::with_config(Config::default(), project, session)
    }

    pub fn with_config(config: Config, project: P, session: S) -> Orchestrator<P, S> {
        let state = if project.has_instrumentation() {
            State::InstrumentedIdle
        } else {
            State::NotInstrumented
        };
        let status = mode_status(session.mode());
        Orchestrator {
            config,
            project,
            session,
            state,
            status,
            generation: 0,
            worker: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project(&self) -> &P {
        &self.project
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The current session generation. It advances on every mode change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true while a scan is in flight.
    pub fn is_scanning(&self) -> bool {
        self.worker.is_some()
    }

    /// Handle a request to measure stack usage.
    ///
    /// Does nothing while a scan is in flight.
    pub fn refresh(&mut self) -> &Status {
        if self.is_scanning() {
            debug!("Refresh ignored, a scan is already in flight");
            return &self.status;
        }

        self.status = match self.start_scan() {
            Ok(status) => status,
            Err(Error::UnsupportedDevice(device)) => {
                debug!("Refresh did not start a scan: unsupported device {}", device);
                Status::UnsupportedDevice { device }
            }
            Err(e) => {
                debug!("Refresh did not start a scan: {}", e);
                Status::from_error(&e, "", 0)
            }
        };

        &self.status
    }

    fn start_scan(&mut self) -> Result<Status, Error> {
        if !self.project.has_instrumentation() {
            self.state = State::NotInstrumented;
            return Err(Error::MissingInstrumentation);
        }
        self.state = State::InstrumentedIdle;

        match self.session.mode() {
            DebugMode::Break => {}
            DebugMode::Run => return Err(Error::TargetBusy),
            DebugMode::Design => return Ok(Status::NotInDebugSession),
        }

        let target = match self.session.target() {
            Some(target) => target,
            None => return Ok(Status::NotInDebugSession),
        };

        let device = target.device();
        let selected = region::select_internal_sram_with(&device, self.config.aliases())
            .ok_or_else(|| Error::UnsupportedDevice(device.name().to_string()))?;

        let job = ScanJob {
            generation: self.generation,
            device: device.name().to_string(),
            address_space: selected.address_space().name().to_string(),
            segment: selected.segment().clone(),
            pattern: *self.config.pattern(),
        };

        self.worker = Some(Worker::spawn(target, job)?);
        self.state = State::Scanning;

        Ok(Status::Calculating {
            device: device.name().to_string(),
        })
    }

    /// Collect the result of the in-flight scan, if it has finished.
    ///
    /// Returns the new status when a scan completed during this call.
    pub fn poll(&mut self) -> Option<&Status> {
        let report = self.worker.as_mut()?.try_report()?;
        self.complete(report);
        Some(&self.status)
    }

    /// Block until the in-flight scan, if any, completes.
    pub fn wait(&mut self) -> &Status {
        if let Some(mut worker) = self.worker.take() {
            let report = worker.wait_report();
            self.complete(report);
        }
        &self.status
    }

    fn complete(&mut self, report: ScanReport) {
        self.worker = None;
        self.state = State::InstrumentedIdle;

        if report.generation() != self.generation {
            debug!(
                "Discarding stale scan from generation {}, now {}",
                report.generation(),
                self.generation
            );
            return;
        }

        self.status = report.into_status();
    }

    /// The debugger halted the target.
    pub fn on_enter_break_mode(&mut self) -> &Status {
        self.enter_mode(DebugMode::Break)
    }

    /// The debugger resumed the target.
    pub fn on_enter_run_mode(&mut self) -> &Status {
        self.enter_mode(DebugMode::Run)
    }

    /// The debug session ended.
    pub fn on_enter_design_mode(&mut self) -> &Status {
        self.enter_mode(DebugMode::Design)
    }

    fn enter_mode(&mut self, mode: DebugMode) -> &Status {
        self.generation += 1;
        self.status = mode_status(mode);
        &self.status
    }
}

fn mode_status(mode: DebugMode) -> Status {
    match mode {
        DebugMode::Break => Status::RefreshRequired,
        DebugMode::Run => Status::TargetRunning,
        DebugMode::Design => Status::NotInDebugSession,
    }
}
