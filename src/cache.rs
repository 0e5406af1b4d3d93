use std::ops::Range;

use log::{debug, trace};

use crate::{
    config::Geometry,
    error::{Error, Result},
    replace::{lru, Outcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: u64,
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug, Clone, Copy)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn new(shift: u32, bits: u32) -> Self {
        let mask = 1u64.checked_shl(bits).map_or(u64::MAX, |m| m - 1);
        BitSection { shift, mask }
    }

    fn apply(&self, num: u64) -> u64 {
        num.checked_shr(self.shift).unwrap_or(0) & self.mask
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub valid: bool,
    pub tag: u64,
    pub recency: usize,
}

/// Set-associative cache with LRU replacement.
///
/// All `S * E` lines live in one flat vector; set `i` owns the range
/// `i * E..(i + 1) * E`. Nothing is reallocated after construction.
#[derive(Debug)]
pub struct Cache {
    geometry: Geometry,
    lines: Vec<Line>,
    n_sets: usize,
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
}

impl Cache {
    pub fn new(geometry: Geometry) -> Result<Self> {
        let ways = geometry.ways();
        let alloc_err = || Error::Allocation {
            sets: 1u128 << geometry.set_bits(),
            ways,
        };
        let n_sets = geometry.n_sets().ok_or_else(alloc_err)?;
        let n_lines = n_sets.checked_mul(ways).ok_or_else(alloc_err)?;

        let mut lines = Vec::new();
        lines
            .try_reserve_exact(n_lines)
            .map_err(|_| alloc_err())?;
        lines.resize(n_lines, Line::default());

        let block_bits = geometry.block_bits();
        let set_bits = geometry.set_bits();
        debug!(
            "allocated {n_sets} sets x {ways} ways ({n_lines} lines), block size 2^{block_bits}"
        );

        Ok(Cache {
            geometry,
            lines,
            n_sets,
            offset_sec: BitSection::new(0, block_bits),
            set_sec: BitSection::new(block_bits, set_bits),
            tag_sec: BitSection::new(block_bits + set_bits, u64::BITS),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn n_sets(&self) -> usize {
        self.n_sets
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        Addr {
            offset: self.offset_sec.apply(addr),
            // Bounded by `n_sets`, which is a `usize`.
            set: self.set_sec.apply(addr) as usize,
            tag: self.tag_sec.apply(addr),
        }
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        let ways = self.geometry.ways();
        set * ways..(set + 1) * ways
    }

    /// Lines of one set, in way order.
    pub fn set(&self, set: usize) -> &[Line] {
        &self.lines[self.get_set(set)]
    }

    pub fn access(&mut self, address: u64) -> Outcome {
        let addr = self.split_addr(address);
        let range = self.get_set(addr.set);
        let outcome = lru::access(&mut self.lines[range], addr.tag);
        trace!(
            "{address:#x} -> set {} tag {:#x} offset {:#x}: {outcome}",
            addr.set,
            addr.tag,
            addr.offset
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::replace::Outcome::{Hit, MissEvict, MissFill};

    fn cache(s: u32, e: usize, b: u32) -> Cache {
        Cache::new(Geometry::new(s, e, b).unwrap()).unwrap()
    }

    fn run(cache: &mut Cache, addrs: &[u64]) -> Vec<Outcome> {
        addrs.iter().map(|&a| cache.access(a)).collect()
    }

    #[test]
    fn split_addr_strips_offset_and_set_bits() {
        let c = cache(4, 1, 4);
        assert_eq!(
            c.split_addr(0xdead_beef),
            Addr {
                offset: 0xf,
                set: 0xe,
                tag: 0xdead_be,
            }
        );
    }

    #[rstest]
    #[case(0, 64)]
    #[case(8, 56)]
    #[case(0, 0)]
    fn split_addr_handles_full_width(#[case] s: u32, #[case] b: u32) {
        let c = cache(s, 1, b);
        let addr = c.split_addr(u64::MAX);
        if s + b == 64 {
            assert_eq!(addr.tag, 0);
        } else {
            assert_eq!(addr.tag, u64::MAX);
        }
        assert_eq!(addr.set, c.n_sets() - 1);
    }

    #[test]
    fn starts_with_every_line_invalid() {
        let c = cache(3, 4, 2);
        assert_eq!(c.n_sets(), 8);
        for set in 0..c.n_sets() {
            assert_eq!(c.set(set).len(), 4);
            assert!(c.set(set).iter().all(|line| !line.valid));
        }
    }

    #[rstest]
    #[case(0, 1, 0)]
    #[case(2, 2, 3)]
    #[case(4, 8, 6)]
    fn fresh_cache_never_hits(#[case] s: u32, #[case] e: usize, #[case] b: u32) {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..64 {
            let mut c = cache(s, e, b);
            assert_ne!(c.access(rng.u64(..)), Hit);
        }
    }

    #[test]
    fn direct_mapped_single_line() {
        let mut c = cache(0, 1, 0);
        assert_eq!(
            run(&mut c, &[0x10, 0x20, 0x10]),
            vec![MissFill, MissEvict, MissEvict]
        );
    }

    #[test]
    fn two_way_hit_after_fill() {
        let mut c = cache(1, 2, 0);
        assert_eq!(run(&mut c, &[0x0, 0x4, 0x0]), vec![MissFill, MissFill, Hit]);
    }

    #[test]
    fn lru_evicts_least_recent_not_first_loaded() {
        // One set, two ways: A, B, A, C must push out B.
        let mut c = cache(0, 2, 4);
        let (a, b, x) = (0x100, 0x200, 0x300);
        assert_eq!(run(&mut c, &[a, b, a, x]), vec![MissFill, MissFill, Hit, MissEvict]);
        assert_eq!(c.access(a), Hit);
        assert_eq!(c.access(b), MissEvict);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    #[case(16)]
    fn one_more_tag_than_ways_evicts_once(#[case] e: usize) {
        let mut c = cache(2, e, 3);
        // Same set (index 1), distinct tags.
        let addrs: Vec<u64> = (0..=e as u64).map(|t| (t << 5) | (1 << 3)).collect();
        let outcomes = run(&mut c, &addrs);
        assert!(outcomes[..e].iter().all(|&o| o == MissFill));
        assert_eq!(outcomes[e], MissEvict);
    }

    #[test]
    fn repeated_access_keeps_hitting() {
        let mut c = cache(2, 2, 2);
        c.access(0x40);
        c.access(0x80);
        for _ in 0..10 {
            assert_eq!(c.access(0x80), Hit);
        }
    }

    #[test]
    fn offset_bits_share_a_block() {
        let mut c = cache(2, 1, 4);
        assert_eq!(c.access(0x120), MissFill);
        assert_eq!(c.access(0x12f), Hit);
        assert_eq!(c.access(0x130), MissFill);
    }

    #[test]
    fn recency_ranks_stay_contiguous() {
        let mut rng = fastrand::Rng::with_seed(42);
        let mut c = cache(2, 4, 2);
        for _ in 0..5_000 {
            c.access(rng.u64(0..512));
            for set in 0..c.n_sets() {
                let mut ranks: Vec<usize> = c
                    .set(set)
                    .iter()
                    .filter(|line| line.valid)
                    .map(|line| line.recency)
                    .collect();
                ranks.sort_unstable();
                assert_eq!(ranks, (0..ranks.len()).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn unrepresentable_set_count_is_an_allocation_error() {
        let err = Cache::new(Geometry::new(64, 1, 0).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Allocation { ways: 1, .. }));
    }

    #[test]
    fn oversized_line_count_is_an_allocation_error() {
        let err = Cache::new(Geometry::new(40, usize::MAX / 2, 0).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
    }
}
