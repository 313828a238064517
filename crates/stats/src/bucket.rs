//! Discrete time buckets: the unit of aggregation before durable
//! persistence.

use std::{
    fmt,
    time::Duration,
};

pub const TIME_UNIT_MINUTE: Duration = Duration::from_secs(60);
pub const TIME_UNIT_HOUR: Duration = Duration::from_secs(3600);
pub const TIME_UNIT_DAY: Duration = Duration::from_secs(24 * 3600);
pub const TIME_UNIT_WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Index of a fixed-width time interval: bucket `i` covers unix seconds
/// `[i * width, (i + 1) * width)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BucketIndex(u64);

impl BucketIndex {
    /// Bucket containing `timestamp` (unix seconds). Plain floor division;
    /// `bucket_width` must be a positive whole number of seconds, and
    /// pre-epoch timestamps are out of scope.
    pub fn of(timestamp: u64, bucket_width: Duration) -> Self {
        BucketIndex(timestamp / bucket_width.as_secs())
    }

    /// The bucket `offset` widths earlier, or `None` before bucket zero.
    pub fn checked_sub(self, offset: u64) -> Option<Self> {
        self.0.checked_sub(offset).map(BucketIndex)
    }

    /// Unix seconds at which this bucket begins.
    pub fn start_timestamp(self, bucket_width: Duration) -> u64 {
        self.0 * bucket_width.as_secs()
    }
}

impl fmt::Display for BucketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        BucketIndex,
        TIME_UNIT_DAY,
    };

    #[test]
    fn test_bucket_of_floors() {
        assert_eq!(BucketIndex::of(0, TIME_UNIT_DAY), BucketIndex(0));
        assert_eq!(BucketIndex::of(86399, TIME_UNIT_DAY), BucketIndex(0));
        assert_eq!(BucketIndex::of(86400, TIME_UNIT_DAY), BucketIndex(1));
        assert_eq!(BucketIndex::of(1000, TIME_UNIT_DAY).start_timestamp(TIME_UNIT_DAY), 0);
    }

    #[test]
    fn test_checked_sub_stops_at_bucket_zero() {
        let bucket = BucketIndex::of(86400, TIME_UNIT_DAY);
        assert_eq!(bucket.checked_sub(1), Some(BucketIndex(0)));
        assert_eq!(bucket.checked_sub(2), None);
    }

    proptest! {
        #[test]
        fn proptest_bucket_of_monotonic(
            t in 0u64..=u32::MAX as u64,
            dt in 0u64..=86400 * 30,
            w in 1u64..=86400 * 7,
        ) {
            let width = std::time::Duration::from_secs(w);
            prop_assert!(BucketIndex::of(t, width) <= BucketIndex::of(t + dt, width));
        }

        #[test]
        fn proptest_bucket_of_periodic(
            t in 0u64..=u32::MAX as u64,
            k in 0u64..1000,
            w in 1u64..=86400 * 7,
        ) {
            let width = std::time::Duration::from_secs(w);
            prop_assert_eq!(
                BucketIndex::of(t + k * w, width).checked_sub(k),
                Some(BucketIndex::of(t, width))
            );
        }
    }
}
