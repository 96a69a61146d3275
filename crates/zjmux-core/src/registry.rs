//! Registry of panes created under a caller-chosen logical name.
//!
//! Entries are keyed by a small integer [`PaneHandle`]; the logical name is a
//! secondary index. Placement (tab, ordinal, floating) is the last value seen
//! in a layout dump and only feeds the ordinal fallback of the locator.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::layout::PaneDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneHandle(u32);

impl PaneHandle {
    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPane {
    pub handle: PaneHandle,
    pub name: String,
    /// Session the pane lives in; `None` when the caller's session has no name.
    pub session: Option<String>,
    /// `None` when registered before a tab was known ("current" tab).
    pub tab_name: Option<String>,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub pane_index: Option<usize>,
    pub floating: bool,
    /// Stable numeric id from the control plane, once discovered.
    pub pane_id: Option<u32>,
}

/// Input for [`PaneRegistry::register`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneRegistration {
    pub name: String,
    pub session: Option<String>,
    pub tab_name: Option<String>,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub pane_index: Option<usize>,
    pub floating: bool,
    pub pane_id: Option<u32>,
}

impl PaneRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Take tab, ordinal and floating flag from a freshly located descriptor.
    #[must_use]
    pub fn placed_at(mut self, pane: &PaneDescriptor) -> Self {
        self.tab_name = Some(pane.tab_name.clone());
        self.pane_index = Some(pane.pane_index);
        self.floating = pane.floating;
        self
    }
}

#[derive(Debug, Default)]
pub struct PaneRegistry {
    panes: BTreeMap<PaneHandle, RegisteredPane>,
    by_name: HashMap<String, PaneHandle>,
    next_handle: u32,
}

impl PaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pane. Re-registering a name keeps its handle and replaces
    /// everything else, including the creation timestamp.
    pub fn register(&mut self, reg: PaneRegistration, now: DateTime<Utc>) -> PaneHandle {
        let handle = match self.by_name.get(&reg.name) {
            Some(&h) => h,
            None => {
                let h = PaneHandle(self.next_handle);
                self.next_handle += 1;
                self.by_name.insert(reg.name.clone(), h);
                h
            }
        };
        self.panes.insert(
            handle,
            RegisteredPane {
                handle,
                name: reg.name,
                session: reg.session,
                tab_name: reg.tab_name,
                command: reg.command,
                cwd: reg.cwd,
                created_at: now,
                pane_index: reg.pane_index,
                floating: reg.floating,
                pane_id: reg.pane_id,
            },
        );
        handle
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPane> {
        self.by_name.get(name).and_then(|h| self.panes.get(h))
    }

    pub fn by_handle(&self, handle: PaneHandle) -> Option<&RegisteredPane> {
        self.panes.get(&handle)
    }

    pub fn remove(&mut self, name: &str) -> Option<RegisteredPane> {
        let handle = self.by_name.remove(name)?;
        self.panes.remove(&handle)
    }

    /// Record the control-plane id for a pane. Returns false if unknown.
    pub fn set_pane_id(&mut self, name: &str, pane_id: u32) -> bool {
        match self.get_mut(name) {
            Some(p) => {
                p.pane_id = Some(pane_id);
                true
            }
            None => false,
        }
    }

    /// Refresh the last-known placement from a located descriptor.
    pub fn update_placement(&mut self, name: &str, pane: &PaneDescriptor) -> bool {
        match self.get_mut(name) {
            Some(p) => {
                p.tab_name = Some(pane.tab_name.clone());
                p.pane_index = Some(pane.pane_index);
                p.floating = pane.floating;
                true
            }
            None => false,
        }
    }

    /// All registrations in handle (creation) order.
    pub fn list(&self) -> Vec<&RegisteredPane> {
        self.panes.values().collect()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut RegisteredPane> {
        let handle = *self.by_name.get(name)?;
        self.panes.get_mut(&handle)
    }
}
