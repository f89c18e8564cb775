//! Supervisor around rendering.
//!
//! A render that panics or returns an error trips the boundary. While
//! tripped, guarded renders are not attempted and callers show the
//! recovery screen instead. `reset` clears the failure so the next render
//! runs again.
//!
//! Outside dev mode a panic caught by the boundary is not reported by the
//! process panic hook; the boundary's own log line is all that is written.

use anyhow::Result;
use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static QUIET_PANICS: Cell<bool> = const { Cell::new(false) };
    static SILENCED: Cell<u64> = const { Cell::new(0) };
}

static INSTALL_HOOK: Once = Once::new();

/// Wrap the process panic hook so panics raised on a thread inside a quiet
/// guard are swallowed. Every other panic still reaches the previous hook.
fn install_quiet_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if QUIET_PANICS.with(Cell::get) {
                SILENCED.with(|n| n.set(n.get() + 1));
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f` with hook output suppressed for panics on this thread.
fn quietly<R>(f: impl FnOnce() -> R) -> R {
    install_quiet_hook();
    let was_quiet = QUIET_PANICS.with(|q| q.replace(true));
    let out = f();
    QUIET_PANICS.with(|q| q.set(was_quiet));
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    Reload,
    Reset,
}

impl RecoveryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::Reload => "reload",
            RecoveryAction::Reset => "reset",
        }
    }
}

/// What to show in place of the failed view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryScreen {
    pub title: String,
    pub message: String,
    pub actions: Vec<RecoveryAction>,
    /// Failure details, only filled in dev mode.
    pub details: Option<String>,
}

#[derive(Debug, Default)]
pub struct RenderBoundary {
    dev_mode: bool,
    failure: Option<String>,
    failures: u64,
}

impl RenderBoundary {
    pub fn new(dev_mode: bool) -> Self {
        Self {
            dev_mode,
            ..Self::default()
        }
    }

    /// Run one render. Returns `None` if the boundary is tripped or the
    /// render failed.
    pub fn guard<T>(&mut self, render: impl FnOnce() -> Result<T>) -> Option<T> {
        if self.failure.is_some() {
            return None;
        }
        let outcome = if self.dev_mode {
            catch_unwind(AssertUnwindSafe(render))
        } else {
            quietly(|| catch_unwind(AssertUnwindSafe(render)))
        };
        let failure = match outcome {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => format!("{:#}", err),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.failures += 1;
        if self.dev_mode {
            log::error!("RenderBoundary: render failed: {}", failure);
        } else {
            log::error!("RenderBoundary: render failed");
        }
        self.failure = Some(failure);
        None
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Number of failures caught since construction.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn reset(&mut self) {
        if self.failure.take().is_some() {
            log::info!("RenderBoundary: reset");
        }
    }

    pub fn recovery_screen(&self) -> Option<RecoveryScreen> {
        let failure = self.failure.as_ref()?;
        Some(RecoveryScreen {
            title: "Something went wrong".to_string(),
            message: "The dashboard hit an unexpected error. Reload or reset to continue."
                .to_string(),
            actions: vec![RecoveryAction::Reload, RecoveryAction::Reset],
            details: self.dev_mode.then(|| failure.clone()),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "render panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn passes_through_successful_renders() {
        let mut boundary = RenderBoundary::new(false);
        assert_eq!(boundary.guard(|| Ok(7)), Some(7));
        assert!(!boundary.is_failed());
        assert!(boundary.recovery_screen().is_none());
    }

    #[test]
    fn panic_trips_until_reset() {
        let mut boundary = RenderBoundary::new(true);
        let out: Option<()> = boundary.guard(|| panic!("bad canvas"));
        assert!(out.is_none());
        assert!(boundary.is_failed());

        let screen = boundary.recovery_screen().unwrap();
        assert_eq!(
            screen.actions,
            vec![RecoveryAction::Reload, RecoveryAction::Reset]
        );
        assert_eq!(screen.details.as_deref(), Some("bad canvas"));

        let mut called = false;
        let _ = boundary.guard(|| {
            called = true;
            Ok(())
        });
        assert!(!called);

        boundary.reset();
        assert_eq!(boundary.guard(|| Ok(1)), Some(1));
        assert_eq!(boundary.failures(), 1);
    }

    #[test]
    fn details_hidden_outside_dev_mode() {
        let mut boundary = RenderBoundary::new(false);
        let _: Option<()> = boundary.guard(|| Err(anyhow!("font missing")));
        let screen = boundary.recovery_screen().unwrap();
        assert!(screen.details.is_none());
    }

    #[test]
    fn panics_are_silent_outside_dev_mode() {
        let silenced = || SILENCED.with(Cell::get);
        let before = silenced();

        let mut boundary = RenderBoundary::new(false);
        let _: Option<()> = boundary.guard(|| panic!("quiet failure"));
        assert!(boundary.is_failed());
        assert_eq!(silenced(), before + 1);
        assert!(!QUIET_PANICS.with(Cell::get));

        let mut boundary = RenderBoundary::new(true);
        let _: Option<()> = boundary.guard(|| panic!("loud failure"));
        assert!(boundary.is_failed());
        assert_eq!(silenced(), before + 1);
    }
}
