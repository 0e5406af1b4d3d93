use std::{fmt, io::Write};

use log::info;
use serde::Serialize;

use crate::{
    cache::Cache,
    config::Geometry,
    error::Result,
    replace::Outcome,
    trace::{Event, Op},
};

/// Run totals. `misses` includes evictions; `evictions` counts only the
/// misses that displaced a valid line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Stats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::MissFill => self.misses += 1,
            Outcome::MissEvict => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
    }

    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn miss_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => self.misses as f64 / n as f64,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

/// Outcomes of one event: none for ignored events, two for a modify.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcomes {
    slots: [Option<Outcome>; 2],
}

impl Outcomes {
    fn push(&mut self, outcome: Outcome) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(outcome);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }
}

impl fmt::Display for Outcomes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, outcome) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{outcome}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub geometry: Geometry,
    #[serde(flatten)]
    pub stats: Stats,
    pub accesses: u64,
    pub miss_rate: f64,
}

/// Feeds trace events to a cache, strictly in order, and keeps the totals.
#[derive(Debug)]
pub struct Driver {
    cache: Cache,
    stats: Stats,
    events: u64,
    heartbeat: u64,
}

impl Driver {
    pub fn new(cache: Cache) -> Self {
        Driver {
            cache,
            stats: Stats::default(),
            events: 0,
            heartbeat: 0,
        }
    }

    /// Logs progress every `interval` events. 0 disables it.
    pub fn with_heartbeat(mut self, interval: u64) -> Self {
        self.heartbeat = interval;
        self
    }

    pub fn step(&mut self, event: &Event) -> Outcomes {
        let accesses = match event.op {
            Op::Load | Op::Store => 1,
            Op::Modify => 2,
            Op::Other(_) => 0,
        };
        let mut outcomes = Outcomes::default();
        for _ in 0..accesses {
            let outcome = self.cache.access(event.address);
            self.stats.record(outcome);
            outcomes.push(outcome);
        }

        self.events += 1;
        if self.heartbeat != 0 && self.events % self.heartbeat == 0 {
            info!("Events: {} ({})", self.events, self.stats);
        }
        outcomes
    }

    /// Applies `events` in order. With `verbose`, every event that touched
    /// the cache is echoed along with its outcomes, e.g. `M 20,1 miss hit`.
    pub fn run<'a, I>(&mut self, events: I, mut verbose: Option<&mut dyn Write>) -> Result<()>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            let outcomes = self.step(event);
            if outcomes.is_empty() {
                continue;
            }
            if let Some(out) = verbose.as_mut() {
                writeln!(
                    out,
                    "{} {:x},{} {}",
                    event.op, event.address, event.size, outcomes
                )?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Events seen so far, ignored ones included.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn report(&self) -> Report {
        Report {
            geometry: self.cache.geometry(),
            stats: self.stats,
            accesses: self.stats.accesses(),
            miss_rate: self.stats.miss_rate(),
        }
    }
}
