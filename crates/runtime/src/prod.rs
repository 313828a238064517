//! Production implementation of the Runtime trait.

use std::{
    future::Future,
    pin::Pin,
    time::SystemTime,
};

use common::runtime::{
    JoinError,
    Runtime,
    SpawnHandle,
};
use futures::{
    FutureExt,
    TryFutureExt,
};
use tokio::runtime::{
    Builder,
    Handle as TokioRuntimeHandle,
    Runtime as TokioRuntime,
};

/// Set a consistent thread stack size regardless of environment. This is
/// 2x Rust's default: https://doc.rust-lang.org/nightly/std/thread/index.html#stack-size
pub const STACK_SIZE: usize = 4 * 1024 * 1024;

pub struct FutureHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SpawnHandle for FutureHandle {
    type Future = Pin<Box<dyn Future<Output = Result<(), JoinError>> + Send>>;

    fn shutdown(&mut self) {
        self.handle.abort();
    }

    fn into_join_future(self) -> Self::Future {
        self.handle.map_err(|e| e.into()).boxed()
    }
}

/// Runtime for running in production that reads the real wall clock and
/// spawns onto a multi-threaded tokio executor.
#[derive(Clone)]
pub struct ProdRuntime {
    rt: TokioRuntimeHandle,
}

impl ProdRuntime {
    pub fn init_tokio() -> anyhow::Result<TokioRuntime> {
        assert!(
            TokioRuntimeHandle::try_current().is_err(),
            "Tried to create a `ProdRuntime` from within a Tokio context. Are you using \
             `#[tokio::main]` or `#[tokio::test]`?"
        );
        let mut tokio_builder = Builder::new_multi_thread();
        tokio_builder.thread_stack_size(STACK_SIZE);
        let tokio_rt = tokio_builder.enable_all().build()?;
        Ok(tokio_rt)
    }

    /// Create a new tokio-based runtime.
    /// Expected usage:
    /// ```rust
    /// use runtime::prod::ProdRuntime;
    /// fn main() -> anyhow::Result<()> {
    ///     let tokio = ProdRuntime::init_tokio()?;
    ///     let rt = ProdRuntime::new(&tokio);
    ///     rt.block_on(async {});
    ///     Ok(())
    /// }
    /// ```
    /// The `tokio_rt` should live for the duration of `main`. At the end of
    /// `main` its `Drop` will run and join all spawned futures, which should
    /// include all references to the handle `ProdRuntime`. If `ProdRuntime`
    /// is used after the associated `TokioRuntime` has been dropped, it will
    /// panic.
    pub fn new(tokio_rt: &TokioRuntime) -> Self {
        Self {
            rt: tokio_rt.handle().clone(),
        }
    }

    pub fn block_on<F: Future>(&self, f: F) -> F::Output {
        self.rt.block_on(f)
    }
}

impl Runtime for ProdRuntime {
    type Handle = FutureHandle;

    fn spawn(
        &self,
        _name: &'static str,
        f: impl Future<Output = ()> + Send + 'static,
    ) -> FutureHandle {
        let handle = self.rt.spawn(f);
        FutureHandle { handle }
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
mod tests {
    use common::runtime::{
        Runtime,
        SpawnHandle,
    };

    use super::ProdRuntime;

    #[test]
    fn test_spawn_and_join() -> anyhow::Result<()> {
        let tokio_rt = ProdRuntime::init_tokio()?;
        let rt = ProdRuntime::new(&tokio_rt);
        let handle = rt.spawn("test_task", async {});
        rt.block_on(handle.into_join_future())?;
        Ok(())
    }
}
