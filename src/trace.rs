use std::{
    fmt, fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info};
use xz2::read::XzDecoder;

use crate::error::TraceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Load,
    Store,
    /// Load followed by a store to the same address.
    Modify,
    /// Anything else, e.g. `I` instruction fetches. Does not touch the cache.
    Other(char),
}

impl Op {
    fn from_char(c: char) -> Op {
        match c {
            'L' => Op::Load,
            'S' => Op::Store,
            'M' => Op::Modify,
            other => Op::Other(other),
        }
    }

    fn as_char(self) -> char {
        match self {
            Op::Load => 'L',
            Op::Store => 'S',
            Op::Modify => 'M',
            Op::Other(c) => c,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub op: Op,
    pub address: u64,
    /// Access width in bytes. Only used for reporting.
    pub size: u32,
}

/// Parses one line of a lackey trace, e.g. ` M 0421c7f0,4`.
/// Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Event>, String> {
    let line = line.trim();
    let mut chars = line.chars();
    let Some(op) = chars.next() else {
        return Ok(None);
    };
    let rest = chars.as_str();
    if !rest.starts_with(char::is_whitespace) {
        return Err(format!("expected whitespace after operation in {line:?}"));
    }
    let (address, size) = rest
        .trim_start()
        .split_once(',')
        .ok_or_else(|| format!("expected <address>,<size> in {line:?}"))?;
    let address = u64::from_str_radix(address.trim(), 16)
        .map_err(|err| format!("bad address {address:?}: {err}"))?;
    let size = size
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("bad size {size:?}: {err}"))?;
    Ok(Some(Event {
        op: Op::from_char(op),
        address,
        size,
    }))
}

/// Event blocks as produced by the reader thread. An `Err` is always the last
/// message on the channel.
pub type Block = Result<Vec<Event>, TraceError>;

pub struct Trace {
    pub rec: Receiver<Block>,
    thread: JoinHandle<()>,
}

impl Trace {
    /// Opens `path` and starts parsing it on a background thread. Files ending
    /// in `.xz` are decompressed on the fly.
    pub fn read(
        path: PathBuf,
        events_per_block: usize,
        blocks_per_queue: usize,
    ) -> Result<Trace, TraceError> {
        let stream = fs::File::open(&path).map_err(|source| TraceError::Open {
            path: path.clone(),
            source,
        })?;
        let reader: Box<dyn BufRead + Send> = if is_xz(&path) {
            debug!("decompressing {} as xz", path.display());
            Box::new(BufReader::new(XzDecoder::new(stream)))
        } else {
            Box::new(BufReader::new(stream))
        };
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue.max(1));
        let events_per_block = events_per_block.max(1);

        info!("reading trace {}", path.display());
        let thread =
            thread::spawn(move || Trace::run_thread(reader, events_per_block, sender));

        Ok(Trace {
            rec: receiver,
            thread,
        })
    }

    /// Waits for the reader thread once the channel has been drained.
    pub fn join(self) {
        drop(self.rec);
        if self.thread.join().is_err() {
            log::error!("trace reader thread panicked");
        }
    }

    fn run_thread(reader: Box<dyn BufRead + Send>, events_per_block: usize, queue: Sender<Block>) {
        let mut buffer = Vec::with_capacity(events_per_block);
        for (idx, line) in reader.lines().enumerate() {
            let parsed = line.map_err(TraceError::from).and_then(|line| {
                parse_line(&line).map_err(|reason| TraceError::Parse {
                    line: idx + 1,
                    reason,
                })
            });
            match parsed {
                Ok(Some(event)) => buffer.push(event),
                Ok(None) => continue,
                Err(err) => {
                    let _ = queue.send(Err(err));
                    return;
                }
            }
            if buffer.len() == events_per_block {
                let full = std::mem::replace(&mut buffer, Vec::with_capacity(events_per_block));
                if queue.send(Ok(full)).is_err() {
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let _ = queue.send(Ok(buffer));
        }
    }
}

fn is_xz(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "xz")
}
