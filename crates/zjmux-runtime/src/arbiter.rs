//! FocusArbiter: run an action against a pane identified by name when the
//! only way to reach it is to focus it.
//!
//! zellij's `action` verbs apply to whichever pane has focus, and focus is
//! session-global. Each arbitration therefore holds that session's focus
//! lock for the whole chain:
//!
//! snapshot layout → locate → switch tab → cycle focus → action → restore tab
//!
//! Locks are per session and FIFO, so two sessions never wait on each other
//! and callers on one session run in arrival order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use zjmux_core::{LocateError, Located, PaneDescriptor, ParsedLayout, SessionTarget, TabDescriptor};
use zjmux_zellij::{Action, ZellijError, dump_screen};

use crate::layout_source;
use crate::locate::text_locate;
use crate::services::{Services, blocking};

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("layout unavailable: {0}")]
    LayoutUnavailable(#[source] ZellijError),

    #[error(transparent)]
    PaneNotFound(#[from] LocateError),

    #[error("{step} failed: {source}")]
    Process {
        step: &'static str,
        #[source]
        source: ZellijError,
    },
}

// ─── Per-session locks ───────────────────────────────────────────────

/// One async mutex per session key, created on first use and kept for the
/// life of the process.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn for_key(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

// ─── Focus planning ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusPlan {
    /// Tab to switch to first; `None` when the target's tab is already focused.
    pub switch_to: Option<String>,
    /// Tab to go back to afterwards.
    pub restore_to: Option<String>,
    /// `focus-next-pane` presses after the switch.
    pub steps: usize,
}

impl FocusPlan {
    pub fn new(layout: &ParsedLayout, target: &PaneDescriptor) -> Self {
        let switch_to = (!target.tab_focused).then(|| target.tab_name.clone());
        let restore_to = match &switch_to {
            Some(_) => layout
                .focused_tab()
                .map(|t| t.name.clone())
                .filter(|orig| *orig != target.tab_name),
            None => None,
        };
        let steps = layout
            .tabs
            .iter()
            .find(|t| t.index == target.tab_index)
            .map_or(0, |tab| focus_steps(tab, target));
        Self {
            switch_to,
            restore_to,
            steps,
        }
    }
}

/// Presses of focus-next needed to land on `target`.
///
/// The ring is the tab's terminal panes sharing the target's floating flag.
/// With a known focused pane the distance is relative to it; otherwise
/// (the tab was not focused, so the dump carries no focus marker for it)
/// the target's position in the ring is used as an absolute count.
pub fn focus_steps(tab: &TabDescriptor, target: &PaneDescriptor) -> usize {
    let ring: Vec<&PaneDescriptor> = tab.terminal_panes(target.floating).collect();
    let Some(pos) = ring.iter().position(|p| p.pane_index == target.pane_index) else {
        return 0;
    };
    let count = ring.len();
    match ring.iter().position(|p| p.focused) {
        Some(focused) => (pos + count - focused) % count,
        None => pos % count,
    }
}

// ─── Arbitration ─────────────────────────────────────────────────────

/// Handed to the action once its pane has focus.
#[derive(Clone)]
pub struct FocusedPane {
    pub services: Arc<Services>,
    pub target: SessionTarget,
    pub pane: PaneDescriptor,
}

impl FocusedPane {
    pub async fn run(&self, action: Action) -> Result<String, ZellijError> {
        layout_source::run(&self.services, &self.target, action).await
    }

    pub async fn dump_screen(&self, full: bool) -> Result<String, ZellijError> {
        let runner = Arc::clone(&self.services.runner);
        let target = self.target.clone();
        blocking(move || dump_screen(&runner, &target, full)).await
    }
}

#[derive(Debug)]
pub struct FocusOutcome<T> {
    pub located: Located,
    /// The action's own result. Errors and panics are captured, not raised.
    pub result: Result<T, String>,
    pub steps: usize,
    pub switched_tab: bool,
    /// False only when a needed tab restore failed.
    pub restored: bool,
}

/// Focus `name` in `target`, run `action`, put the original tab back.
///
/// The action runs as its own task so a panic inside it still reaches the
/// restore step. The focus lock is released on every exit path.
pub async fn with_pane_focus<T, F, Fut>(
    services: &Arc<Services>,
    target: &SessionTarget,
    name: &str,
    action: F,
) -> Result<FocusOutcome<T>, ArbiterError>
where
    F: FnOnce(FocusedPane) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let key = services.key(target);
    let lock = services.focus_locks.for_key(&key);
    let _guard = lock.lock().await;
    debug!(%key, name, "focus lock acquired");

    let layout = layout_source::snapshot(services, target)
        .await
        .map_err(ArbiterError::LayoutUnavailable)?;
    let located = text_locate(services, target, &layout, name)?;
    let plan = FocusPlan::new(&layout, &located.pane);
    debug!(?plan, "focus plan");

    if let Some(tab) = &plan.switch_to {
        layout_source::run(services, target, Action::GoToTabName(tab.clone()))
            .await
            .map_err(|source| ArbiterError::Process {
                step: "switch tab",
                source,
            })?;
    }

    let cycled = cycle_focus(services, target, plan.steps).await;
    let result = match &cycled {
        Ok(()) => {
            let pane = FocusedPane {
                services: Arc::clone(services),
                target: target.clone(),
                pane: located.pane.clone(),
            };
            Some(run_captured(action(pane)).await)
        }
        Err(_) => None,
    };

    let restored = match &plan.restore_to {
        Some(tab) => match layout_source::run(services, target, Action::GoToTabName(tab.clone())).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%target, %tab, error = %e, "failed to restore original tab");
                false
            }
        },
        None => true,
    };

    match (cycled, result) {
        (Err(source), _) => Err(ArbiterError::Process {
            step: "cycle focus",
            source,
        }),
        (Ok(()), result) => Ok(FocusOutcome {
            located,
            result: result.unwrap_or_else(|| Err("action did not run".to_string())),
            steps: plan.steps,
            switched_tab: plan.switch_to.is_some(),
            restored,
        }),
    }
}

async fn cycle_focus(services: &Services, target: &SessionTarget, steps: usize) -> Result<(), ZellijError> {
    for _ in 0..steps {
        layout_source::run(services, target, Action::FocusNextPane).await?;
    }
    Ok(())
}

async fn run_captured<T, Fut>(fut: Fut) -> Result<T, String>
where
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(join) if join.is_panic() => Err("action panicked".to_string()),
        Err(join) => Err(format!("action aborted: {join}")),
    }
}
