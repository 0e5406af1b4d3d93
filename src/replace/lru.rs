//! Ranked LRU over the lines of one set.
//!
//! Each valid line carries a `recency` rank, 0 being the most recently used.
//! Ranks of the valid lines in a set are always exactly `0..valid_count`, so
//! the victim of a full set is the line ranked `E - 1`.

use crate::cache::Line;

use super::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit(usize),
    Miss,
}

/// Runs one access against a set: lookup, then fill or evict on a miss.
pub fn access(lines: &mut [Line], tag: u64) -> Outcome {
    match lookup(lines, tag) {
        Lookup::Hit(way) => {
            let prev = lines[way].recency;
            promote(lines, way, prev);
            Outcome::Hit
        }
        Lookup::Miss => match fill(lines, tag) {
            Some(_) => Outcome::MissFill,
            None => {
                evict(lines, tag);
                Outcome::MissEvict
            }
        },
    }
}

pub fn lookup(lines: &[Line], tag: u64) -> Lookup {
    lines
        .iter()
        .position(|line| line.valid && line.tag == tag)
        .map_or(Lookup::Miss, Lookup::Hit)
}

/// Places `tag` in the first invalid line. Returns `None` if the set is full.
pub fn fill(lines: &mut [Line], tag: u64) -> Option<usize> {
    let way = lines.iter().position(|line| !line.valid)?;
    // An empty line is older than everything resident.
    let prev = lines.iter().filter(|line| line.valid).count();
    let line = &mut lines[way];
    line.valid = true;
    line.tag = tag;
    promote(lines, way, prev);
    Some(way)
}

/// Replaces the least recently used line of a full set with `tag`.
pub fn evict(lines: &mut [Line], tag: u64) -> usize {
    let way = victim(lines);
    let prev = lines[way].recency;
    lines[way].tag = tag;
    promote(lines, way, prev);
    way
}

/// Highest ranked valid line, lowest index on ties.
pub fn victim(lines: &[Line]) -> usize {
    lines
        .iter()
        .enumerate()
        .filter(|(_way, line)| line.valid)
        .fold(None, |best: Option<(usize, usize)>, (way, line)| match best {
            Some((_, rank)) if rank >= line.recency => best,
            _ => Some((way, line.recency)),
        })
        .map_or(0, |(way, _rank)| way)
}

/// Moves `way` to the front of the recency order. Lines younger than its
/// previous rank `prev` age by one, older lines keep their rank.
pub fn promote(lines: &mut [Line], way: usize, prev: usize) {
    for (other, line) in lines.iter_mut().enumerate() {
        if other != way && line.valid && line.recency < prev {
            line.recency += 1;
        }
    }
    lines[way].recency = 0;
}
