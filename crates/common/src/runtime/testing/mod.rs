//! Test implementation of the Runtime trait.
//!
//! Tasks run on the ambient tokio test executor; the clock is virtual and
//! only moves when a test calls `advance_time`. Flushing in this codebase is
//! driven entirely by `process` calls, so nothing here needs to wake sleepers.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};

use cmd_util::env::config_test;
use parking_lot::Mutex;

use super::{
    JoinError,
    Runtime,
    SpawnHandle,
};

struct TestRuntimeState {
    now: SystemTime,
}

#[derive(Clone)]
pub struct TestRuntime {
    state: Arc<Mutex<TestRuntimeState>>,
}

impl TestRuntime {
    pub fn new() -> Self {
        config_test();
        Self {
            state: Arc::new(Mutex::new(TestRuntimeState { now: UNIX_EPOCH })),
        }
    }

    pub fn advance_time(&self, duration: Duration) {
        self.state.lock().now += duration;
    }
}

pub struct TestFutureHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SpawnHandle for TestFutureHandle {
    type Future = Pin<Box<dyn Future<Output = Result<(), JoinError>> + Send>>;

    fn shutdown(&mut self) {
        self.handle.abort();
    }

    fn into_join_future(self) -> Self::Future {
        Box::pin(async move { self.handle.await.map_err(JoinError::from) })
    }
}

impl Runtime for TestRuntime {
    type Handle = TestFutureHandle;

    fn spawn(
        &self,
        _name: &'static str,
        f: impl Future<Output = ()> + Send + 'static,
    ) -> TestFutureHandle {
        TestFutureHandle {
            handle: tokio::spawn(f),
        }
    }

    fn system_time(&self) -> SystemTime {
        self.state.lock().now
    }
}
