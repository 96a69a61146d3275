//! PaneLocator: control plane first, then the text strategies.
//!
//! A control-plane hit yields zellij's numeric pane id and short-circuits the
//! text path. Every failure there (plugin missing, pipe timeout, garbage
//! output) silently degrades to the text strategies over a layout snapshot.

use std::sync::Arc;

use tracing::{debug, info};
use zjmux_core::{
    ControlPane, LocateError, Located, ParsedLayout, RegisteredPane, SessionTarget, locate,
    resolve_control_pane,
};

use crate::services::{Services, blocking};

/// The registration for `name`, if it was made for `target`'s session.
pub fn registered_for(services: &Services, target: &SessionTarget, name: &str) -> Option<RegisteredPane> {
    let session = services.session_name(target);
    services
        .registry()
        .get(name)
        .filter(|r| r.session == session)
        .cloned()
}

/// Ask the pane-bridge plugin. `None` means "use the text path".
pub async fn control_pane(
    services: &Arc<Services>,
    target: &SessionTarget,
    name: &str,
) -> Option<ControlPane> {
    if !services.control.is_available() {
        return None;
    }
    let s = Arc::clone(services);
    let t = target.clone();
    let panes = match blocking(move || s.control.list_panes(&t)).await {
        Ok(panes) => panes,
        Err(e) => {
            debug!(%target, error = %e, "control plane lookup failed, using layout");
            return None;
        }
    };

    let registered = registered_for(services, target, name);
    let hit = resolve_control_pane(name, registered.as_ref(), &panes)?.clone();
    if registered.is_some() {
        services.registry().set_pane_id(name, hit.id);
    }
    debug!(%target, name, pane_id = hit.id, "control plane match");
    Some(hit)
}

/// Text strategies over one snapshot, keeping the registry in step.
///
/// A hit refreshes the registration's placement; a miss for a registered
/// name proves the pane is gone, so its registration is dropped.
pub fn text_locate(
    services: &Services,
    target: &SessionTarget,
    layout: &ParsedLayout,
    name: &str,
) -> Result<Located, LocateError> {
    let registered = registered_for(services, target, name);
    let panes = layout.panes();
    match locate(name, registered.as_ref(), &panes) {
        Ok(found) => {
            if registered.is_some() {
                services.registry().update_placement(name, &found.pane);
            }
            debug!(
                name,
                strategy = found.strategy.as_str(),
                tab = %found.pane.tab_name,
                pane_index = found.pane.pane_index,
                "located pane"
            );
            Ok(found)
        }
        Err(e) => {
            if registered.is_some() {
                services.registry().remove(name);
                info!(name, "registered pane no longer in layout, dropped");
            }
            Err(e)
        }
    }
}
