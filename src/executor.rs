//! Where blocking jobs (HTTP requests) run.

use anyhow::{Context, Result};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn spawn(&self, name: &str, job: Job) -> Result<()>;
}

/// One detached thread per job.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn spawn(&self, name: &str, job: Job) -> Result<()> {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(job)
            .with_context(|| format!("spawn {} worker", name))?;
        Ok(())
    }
}

/// Runs the job on the calling thread before returning.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn spawn(&self, _name: &str, job: Job) -> Result<()> {
        job();
        Ok(())
    }
}
