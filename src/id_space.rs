use std::fmt;
use std::str::FromStr;

/// Step used on the `k` axis by production runs (odd `k` only).
pub const DEFAULT_K_STEP: u64 = 2;

/// One unit of trackable work, stored in the ledgers as `"{n}_{k}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndividualId {
    pub n: u64,
    pub k: u64,
}

impl IndividualId {
    pub fn new(n: u64, k: u64) -> Self {
        Self { n, k }
    }
}

impl fmt::Display for IndividualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.n, self.k)
    }
}

impl FromStr for IndividualId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (n, k) = s
            .split_once('_')
            .ok_or_else(|| format!("expected N_K, got '{}'", s))?;
        let n = n.parse::<u64>().map_err(|e| format!("bad n in '{}': {}", s, e))?;
        let k = k.parse::<u64>().map_err(|e| format!("bad k in '{}': {}", s, e))?;
        Ok(Self { n, k })
    }
}

/// Half-open interval `[kmin, kmax)` on the `k` axis for a fixed `n`.
///
/// `kmin >= kmax` is an empty range: it enumerates nothing and is never
/// submitted or archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KRange {
    pub n: u64,
    pub kmin: u64,
    pub kmax: u64,
    pub step: u64,
}

impl KRange {
    pub fn new(n: u64, kmin: u64, kmax: u64, step: u64) -> Self {
        Self { n, kmin, kmax, step }
    }

    pub fn is_empty(&self) -> bool {
        self.kmin >= self.kmax
    }

    /// Number of IDs the range enumerates: `ceil((kmax - kmin) / step)`.
    pub fn len(&self) -> u64 {
        if self.is_empty() || self.step == 0 {
            return 0;
        }
        (self.kmax - self.kmin).div_ceil(self.step)
    }

    /// Ordered IDs `n_kmin, n_(kmin+step), ..., n_(kmax-step)`. Restartable:
    /// every call yields a fresh iterator.
    pub fn ids(self) -> impl Iterator<Item = IndividualId> {
        enumerate(self)
    }

    pub fn id_list(&self) -> Vec<IndividualId> {
        self.ids().collect()
    }

    /// True when the range starts on the step lattice from `1` and ends
    /// within `max_k(n)`, i.e. it could have come out of [`partition`].
    pub fn in_space(&self) -> bool {
        self.step > 0 && self.kmin >= 1 && (self.kmin - 1) % self.step == 0 && self.kmax <= max_k(self.n)
    }
}

impl fmt::Display for KRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.kmin, self.kmax)
    }
}

/// Enumerate the constituent IDs of `range`. Empty when `kmin >= kmax`.
pub fn enumerate(range: KRange) -> impl Iterator<Item = IndividualId> {
    let KRange { n, kmin, kmax, step } = range;
    let count = range.len();
    (0..count).map(move |i| IndividualId::new(n, kmin + i * step))
}

/// Exclusive upper bound of the `k` axis for a space of size `n`.
pub fn max_k(n: u64) -> u64 {
    n / 2
}

/// Consecutive ranges of `batch_width` k-units covering `[1, n/2)`, the last
/// one clipped to the boundary.
///
/// `batch_width` and `step` must be positive and `batch_width` a multiple of
/// `step`, otherwise ranges after the first would start off the step lattice.
pub fn partition(n: u64, batch_width: u64, step: u64) -> Partition {
    assert!(step > 0, "k step must be positive");
    assert!(batch_width > 0, "batch width must be positive");
    assert!(
        batch_width % step == 0,
        "batch width {} is not a multiple of step {}",
        batch_width,
        step
    );
    Partition {
        n,
        next_kmin: 1,
        limit: max_k(n),
        batch_width,
        step,
    }
}

/// Iterator returned by [`partition`], in strictly increasing `kmin` order.
#[derive(Debug, Clone)]
pub struct Partition {
    n: u64,
    next_kmin: u64,
    limit: u64,
    batch_width: u64,
    step: u64,
}

impl Iterator for Partition {
    type Item = KRange;

    fn next(&mut self) -> Option<KRange> {
        if self.next_kmin >= self.limit {
            return None;
        }
        let kmin = self.next_kmin;
        let kmax = kmin.saturating_add(self.batch_width).min(self.limit);
        self.next_kmin = kmax;
        Some(KRange::new(self.n, kmin, kmax, self.step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrips_through_ledger_form() {
        let id = IndividualId::new(2097152, 1025);
        assert_eq!(id.to_string(), "2097152_1025");
        assert_eq!("2097152_1025".parse::<IndividualId>().unwrap(), id);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("".parse::<IndividualId>().is_err());
        assert!("1024".parse::<IndividualId>().is_err());
        assert!("1024_".parse::<IndividualId>().is_err());
        assert!("x_3".parse::<IndividualId>().is_err());
        assert!("1024_3_5".parse::<IndividualId>().is_err());
    }

    #[test]
    fn test_enumerate_len_and_parity() {
        for kmin in [1u64, 3, 7, 101] {
            for width in 1..40u64 {
                let r = KRange::new(1024, kmin, kmin + width, 2);
                let ids = r.id_list();
                assert_eq!(ids.len() as u64, width.div_ceil(2));
                assert_eq!(ids.len() as u64, r.len());
                for id in &ids {
                    assert!(id.k >= kmin && id.k < kmin + width);
                    assert_eq!(id.k % 2, 1);
                    assert_eq!(id.n, 1024);
                }
            }
        }
    }

    #[test]
    fn test_enumerate_empty_range() {
        assert_eq!(enumerate(KRange::new(16, 5, 5, 2)).count(), 0);
        assert_eq!(enumerate(KRange::new(16, 9, 3, 2)).count(), 0);
        assert!(KRange::new(16, 9, 3, 2).is_empty());
    }

    #[test]
    fn test_enumerate_is_restartable() {
        let r = KRange::new(16, 1, 8, 2);
        let first: Vec<_> = r.ids().collect();
        let second: Vec<_> = r.ids().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partition_small_space() {
        let ranges: Vec<_> = partition(16, 4, 2).collect();
        assert_eq!(ranges, vec![KRange::new(16, 1, 5, 2), KRange::new(16, 5, 8, 2)]);

        let ids: Vec<String> = ranges[0].ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["16_1", "16_3"]);
        let ids: Vec<String> = ranges[1].ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["16_5", "16_7"]);
    }

    #[test]
    fn test_partition_covers_axis_exactly_once() {
        for n in [4u64, 8, 16, 30, 64, 1000, 4096] {
            for width in [2u64, 4, 6, 10, 64] {
                let ranges: Vec<_> = partition(n, width, 2).collect();
                let mut expected_next = 1;
                for r in &ranges {
                    assert_eq!(r.kmin, expected_next, "gap or overlap at n={} w={}", n, width);
                    assert!(r.kmin < r.kmax);
                    assert!(r.kmax - r.kmin <= width);
                    expected_next = r.kmax;
                }
                assert_eq!(expected_next, max_k(n).max(1));

                let total: u64 = ranges.iter().map(|r| r.len()).sum();
                let odd_ks = (1..max_k(n)).filter(|k| k % 2 == 1).count() as u64;
                assert_eq!(total, odd_ks);
            }
        }
    }

    #[test]
    fn test_in_space() {
        assert!(KRange::new(16, 1, 5, 2).in_space());
        assert!(KRange::new(16, 5, 8, 2).in_space());
        assert!(!KRange::new(16, 1, 2_000_001, 2).in_space());
        assert!(!KRange::new(16, 2, 6, 2).in_space());
        assert!(!KRange::new(16, 0, 4, 2).in_space());
        assert!(partition(1024, 16, 2).all(|r| r.in_space()));
    }

    #[test]
    fn test_partition_tiny_space_is_empty() {
        assert_eq!(partition(2, 4, 2).count(), 0);
        assert_eq!(partition(0, 4, 2).count(), 0);
    }

    #[test]
    #[should_panic]
    fn test_partition_rejects_zero_width() {
        let _ = partition(16, 0, 2);
    }
}
