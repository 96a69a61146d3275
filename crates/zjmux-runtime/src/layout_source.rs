//! Layout reads through the per-session cache, and layout-mutating actions
//! that keep the cache honest.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use zjmux_core::{ParsedLayout, SessionTarget};
use zjmux_zellij::{Action, ZellijError, dump_layout, run_action};

use crate::services::{Services, blocking};

/// Raw `dump-layout` text for `target`, cached for the layout TTL.
pub async fn layout_text(services: &Services, target: &SessionTarget) -> Result<String, ZellijError> {
    let key = services.key(target);
    let cached = services
        .cache()
        .get(&key, Instant::now())
        .map(str::to_string);
    if let Some(dump) = cached {
        debug!(%key, "layout cache hit");
        return Ok(dump);
    }

    let runner = Arc::clone(&services.runner);
    let t = target.clone();
    let dump = blocking(move || dump_layout(&runner, &t)).await?;
    services.cache().set(key, dump.clone(), Instant::now());
    Ok(dump)
}

pub async fn snapshot(services: &Services, target: &SessionTarget) -> Result<ParsedLayout, ZellijError> {
    let dump = layout_text(services, target).await?;
    Ok(ParsedLayout::parse(&dump))
}

/// Run `action` against `target`, dropping the cached layout if it moves panes.
///
/// The entry is dropped even when the action fails: a half-applied mutation
/// leaves the layout as unknown as a completed one.
pub async fn run(services: &Services, target: &SessionTarget, action: Action) -> Result<String, ZellijError> {
    let mutating = action.is_layout_mutating();
    let runner = Arc::clone(&services.runner);
    let t = target.clone();
    let result = blocking(move || run_action(&runner, &t, &action)).await;
    if mutating {
        services.cache().invalidate(&services.key(target));
    }
    result
}
