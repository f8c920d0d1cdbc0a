use std::fmt;
use std::sync::Arc;

use crate::proto::point::{Group, Indexed, IndexedSample, Point};
use crate::proto::Result;
use crate::regmap::RegisterMap;
use crate::sink::{Emission, Sink};

/// Decides which samples are significant.
///
/// One policy is selected per deployment; a dispatcher never mixes them.
#[derive(Debug, Clone)]
pub enum Policy {
    /// Significant iff the index matches a configured register.
    Map(Arc<RegisterMap>),
    /// Significant iff the index equals a fixed target.
    Index(u32),
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Map(map) => f.write_fmt(format_args!("register map ({} points)", map.len())),
            Policy::Index(index) => f.write_fmt(format_args!("index {}", index)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Active,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Sample matched and was handed to the sink.
    Emitted(Emission),
    /// Analog sample without a matching register.
    Skipped,
    /// Non-analog point, acknowledged and dropped.
    Ignored(Group),
    /// Delivered after shutdown.
    Stopped,
}

/// Filters the analog sample stream and forwards significant samples.
pub struct Dispatcher<S: Sink> {
    policy: Policy,
    sink: S,
    state: DispatchState,
    samples: u64,
}

impl<S: Sink> Dispatcher<S> {
    pub fn new(policy: Policy, sink: S) -> Self {
        Self {
            policy,
            sink,
            state: DispatchState::Idle,
            samples: 0,
        }
    }

    pub fn with_map(map: Arc<RegisterMap>, sink: S) -> Self {
        Self::new(Policy::Map(map), sink)
    }

    pub fn with_index(index: u32, sink: S) -> Self {
        Self::new(Policy::Index(index), sink)
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Number of analog samples seen since the session started.
    pub fn samples_seen(&self) -> u64 {
        self.samples
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Handle one analog sample.
    pub fn on_sample(&mut self, sample: &IndexedSample) -> Result<DispatchOutcome> {
        match self.state {
            DispatchState::Stopped => return Ok(DispatchOutcome::Stopped),
            DispatchState::Idle => {
                log::debug!("Sample stream started, policy: {}", self.policy);
                self.state = DispatchState::Active;
            }
            DispatchState::Active => {}
        }
        self.samples += 1;

        let emission = match &self.policy {
            Policy::Map(map) => map.lookup(sample.index).map(|entry| Emission {
                name: entry.name.clone(),
                engineering_value: entry.to_engineering(sample.value),
                raw_index: sample.index,
                asset_name: entry.asset_name.clone(),
                out_station: entry.out_station,
                timestamp: sample.timestamp,
            }),
            Policy::Index(target) if *target == sample.index => Some(Emission {
                name: format!("index-{}", target),
                engineering_value: sample.value,
                raw_index: sample.index,
                asset_name: None,
                out_station: None,
                timestamp: sample.timestamp,
            }),
            Policy::Index(_) => None,
        };

        match emission {
            Some(emission) => {
                self.sink.emit(&emission)?;
                Ok(DispatchOutcome::Emitted(emission))
            }
            None => {
                log::debug!("[{}] filtered out", sample.index);
                Ok(DispatchOutcome::Skipped)
            }
        }
    }

    /// Handle one point of any kind; only analog values reach the policy.
    pub fn process(&mut self, point: &Indexed<Point>) -> Result<DispatchOutcome> {
        match point.as_analog() {
            Some(sample) => self.on_sample(&sample),
            None => {
                let group = point.value.group();
                log::trace!("[{}] ignoring {} point", point.index, group);
                Ok(DispatchOutcome::Ignored(group))
            }
        }
    }

    /// Handle a delivered batch in order, returning the number of emissions.
    pub fn process_batch<'a, I>(&mut self, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Indexed<Point>>,
    {
        let mut emitted = 0;
        for point in points {
            if let DispatchOutcome::Emitted(_) = self.process(point)? {
                emitted += 1;
            }
        }
        Ok(emitted)
    }

    /// Enter the terminal state and flush the sink.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != DispatchState::Stopped {
            self.state = DispatchState::Stopped;
            self.sink.flush()?;
        }
        Ok(())
    }
}
