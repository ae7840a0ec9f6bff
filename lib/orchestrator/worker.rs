//! The scan worker.
//!
//! Reading a whole internal SRAM over a debug transport blocks for the length
//! of the transfer, so each scan runs on its own thread and hands its
//! `Status` back over a one-slot channel.

use crate::device::MemorySegment;
use crate::instrument::CanaryPattern;
use crate::memory::MemorySnapshot;
use crate::orchestrator::{Status, Target};
use crate::scanner;
use crate::Error;
use log::{debug, warn};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A finished scan, tagged with the session generation it was started in.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanReport {
    generation: u64,
    status: Status,
}

impl ScanReport {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn into_status(self) -> Status {
        self.status
    }
}

/// Everything a worker needs to read and scan one region.
#[derive(Clone, Debug)]
pub(crate) struct ScanJob {
    pub(crate) generation: u64,
    pub(crate) device: String,
    pub(crate) address_space: String,
    pub(crate) segment: MemorySegment,
    pub(crate) pattern: CanaryPattern,
}

/// A scan in flight.
#[derive(Debug)]
pub(crate) struct Worker {
    job: ScanJob,
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<ScanReport>,
}

impl Worker {
    /// Start a worker thread for `job`.
    pub(crate) fn spawn(target: Arc<dyn Target>, job: ScanJob) -> Result<Worker, Error> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let thread_job = job.clone();

        let handle = thread::Builder::new()
            .name("stackcheck-scan".to_string())
            .spawn(move || {
                let report = ScanReport {
                    generation: thread_job.generation,
                    status: measure(target.as_ref(), &thread_job),
                };
                if sender.send(report).is_err() {
                    debug!("Scan finished after its orchestrator was dropped");
                }
            })?;

        Ok(Worker {
            job,
            handle: Some(handle),
            receiver,
        })
    }

    /// Take the report if the worker has finished, without blocking.
    pub(crate) fn try_report(&mut self) -> Option<ScanReport> {
        match self.receiver.try_recv() {
            Ok(report) => Some(self.finish(report)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.abandoned()),
        }
    }

    /// Block until the worker has finished and take its report.
    pub(crate) fn wait_report(&mut self) -> ScanReport {
        match self.receiver.recv() {
            Ok(report) => self.finish(report),
            Err(_) => self.abandoned(),
        }
    }

    fn finish(&mut self, report: ScanReport) -> ScanReport {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Scan worker of {} panicked after reporting", self.job.device);
            }
        }
        report
    }

    /// The worker died without reporting.
    fn abandoned(&mut self) -> ScanReport {
        let panicked = match self.handle.take() {
            Some(handle) => handle.join().is_err(),
            None => false,
        };
        if panicked {
            warn!("Scan worker of {} panicked before reporting", self.job.device);
        } else {
            warn!("Scan worker of {} exited without a report", self.job.device);
        }

        ScanReport {
            generation: self.job.generation,
            status: Status::from_error(
                &Error::ReadFailure("scan worker exited".to_string()),
                &self.job.device,
                self.job.segment.size(),
            ),
        }
    }
}

/// Read and scan the region described by `job`.
///
/// Every failure is folded into the returned `Status`.
pub(crate) fn measure(target: &dyn Target, job: &ScanJob) -> Status {
    let snapshot =
        match MemorySnapshot::capture(target.memory(), &job.address_space, &job.segment) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not read {} of {}: {}", job.segment, job.device, e);
                return Status::from_error(&e, &job.device, job.segment.size());
            }
        };

    let scan = match scanner::scan_boundaries(snapshot.bytes(), job.segment.size(), &job.pattern) {
        Ok(scan) => scan,
        Err(e) => return Status::from_error(&e, &job.device, job.segment.size()),
    };

    match scan.conclusive() {
        Ok(usage) => {
            debug!("{}: stack usage {}", job.device, usage);
            Status::Usage {
                device: job.device.clone(),
                usage,
            }
        }
        Err(e) => {
            debug!("{}: no canary found in {}", job.device, job.segment);
            Status::from_error(&e, &job.device, job.segment.size())
        }
    }
}
