//! Runtime trait for abstracting away OS-esque features and allow different
//! implementations for test, dev, prod, etc.

use std::{
    future::Future,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};

use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[derive(Error, Debug)]
pub enum JoinError {
    #[error("Future canceled")]
    Canceled,
    #[error("Future panicked: {0:?}")]
    Panicked(anyhow::Error),
}

impl From<tokio::task::JoinError> for JoinError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            JoinError::Canceled
        } else {
            JoinError::Panicked(anyhow::anyhow!("{:?}", e.into_panic()))
        }
    }
}

pub trait SpawnHandle: Send + Sync {
    type Future: Future<Output = Result<(), JoinError>>;
    fn shutdown(&mut self);
    fn into_join_future(self) -> Self::Future;
}

/// An operating-system abstraction for the pipeline: time and task spawning
/// behave differently between test and prod (a test clock only moves when
/// the test advances it), so everything that reads the wall clock is
/// parameterized by a `Runtime` implementation.
pub trait Runtime: Clone + Sync + Send + 'static {
    /// Spawn handle type returned by `spawn`.
    type Handle: SpawnHandle;

    /// Spawn a future on the runtime's executor.
    fn spawn(
        &self,
        name: &'static str,
        f: impl Future<Output = ()> + Send + 'static,
    ) -> Self::Handle;

    /// Return (a potentially-virtualized) system time. Compare with
    /// `std::time::UNIX_EPOCH` to obtain a Unix timestamp.
    fn system_time(&self) -> SystemTime;

    fn unix_timestamp(&self) -> UnixTimestamp {
        UnixTimestamp(
            self.system_time()
                .duration_since(UNIX_EPOCH)
                .expect("Failed to compute unix timestamp"),
        )
    }
}

/// Abstraction over a unix timestamp. Internally it stores a Duration since
/// the unix epoch. Only works for timestamps past the epoch.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnixTimestamp(Duration);

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        UnixTimestamp(Duration::from_secs(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    /// Time elapsed since `earlier`, clamped to zero if the clock went
    /// backwards in between.
    pub fn duration_since(&self, earlier: UnixTimestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}
