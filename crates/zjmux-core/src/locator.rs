//! Name → live pane resolution over a parsed layout.
//!
//! Strategies run in a fixed order and the first hit wins:
//! marker, then substring, then the registered ordinal. The control-plane
//! path (numeric pane ids) is tried by the runtime before any of these; its
//! matching rules live in [`resolve_control_pane`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::PaneDescriptor;
use crate::marker::has_marker;
use crate::registry::RegisteredPane;
use crate::types::ControlPane;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ControlPlane,
    Marker,
    Substring,
    Ordinal,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ControlPlane => "control_plane",
            Self::Marker => "marker",
            Self::Substring => "substring",
            Self::Ordinal => "ordinal",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocateQuery<'a> {
    pub name: &'a str,
    pub registered: Option<&'a RegisteredPane>,
}

/// One resolution strategy over text-derived descriptors.
pub trait PaneResolver: Send + Sync {
    fn strategy(&self) -> Strategy;
    fn resolve<'p>(&self, query: &LocateQuery<'_>, panes: &'p [PaneDescriptor])
    -> Option<&'p PaneDescriptor>;
}

/// Pane whose launch command carries `name=<name>`.
pub struct MarkerResolver;

impl PaneResolver for MarkerResolver {
    fn strategy(&self) -> Strategy {
        Strategy::Marker
    }

    fn resolve<'p>(
        &self,
        query: &LocateQuery<'_>,
        panes: &'p [PaneDescriptor],
    ) -> Option<&'p PaneDescriptor> {
        panes.iter().find(|p| {
            p.is_terminal()
                && p.command
                    .as_deref()
                    .is_some_and(|cmd| has_marker(cmd, query.name))
        })
    }
}

/// Case-insensitive containment in name or command. First match in scan
/// order wins, so ambiguous names resolve to the earliest pane.
pub struct SubstringResolver;

impl PaneResolver for SubstringResolver {
    fn strategy(&self) -> Strategy {
        Strategy::Substring
    }

    fn resolve<'p>(
        &self,
        query: &LocateQuery<'_>,
        panes: &'p [PaneDescriptor],
    ) -> Option<&'p PaneDescriptor> {
        let needle = query.name.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let contains = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        };
        panes
            .iter()
            .find(|p| p.is_terminal() && (contains(&p.name) || contains(&p.command)))
    }
}

/// Same tab, same floating flag, same ordinal as the registration.
pub struct OrdinalResolver;

impl PaneResolver for OrdinalResolver {
    fn strategy(&self) -> Strategy {
        Strategy::Ordinal
    }

    fn resolve<'p>(
        &self,
        query: &LocateQuery<'_>,
        panes: &'p [PaneDescriptor],
    ) -> Option<&'p PaneDescriptor> {
        let reg = query.registered?;
        let index = reg.pane_index?;
        panes.iter().find(|p| {
            let same_tab = match reg.tab_name.as_deref() {
                Some(tab) => p.tab_name == tab,
                None => p.tab_focused,
            };
            same_tab && p.floating == reg.floating && p.pane_index == index && p.is_terminal()
        })
    }
}

/// The default resolver chain.
pub fn default_resolvers() -> [&'static dyn PaneResolver; 3] {
    [&MarkerResolver, &SubstringResolver, &OrdinalResolver]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub pane: PaneDescriptor,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("pane '{name}' not found (visible: {})", candidates.join(", "))]
    NotFound {
        name: String,
        candidates: Vec<String>,
    },
}

/// Locate `name` with the default resolver chain.
pub fn locate(
    name: &str,
    registered: Option<&RegisteredPane>,
    panes: &[PaneDescriptor],
) -> Result<Located, LocateError> {
    locate_with(&default_resolvers(), name, registered, panes)
}

pub fn locate_with(
    resolvers: &[&dyn PaneResolver],
    name: &str,
    registered: Option<&RegisteredPane>,
    panes: &[PaneDescriptor],
) -> Result<Located, LocateError> {
    let query = LocateQuery { name, registered };
    resolvers
        .iter()
        .find_map(|r| {
            r.resolve(&query, panes).map(|pane| Located {
                pane: pane.clone(),
                strategy: r.strategy(),
            })
        })
        .ok_or_else(|| LocateError::NotFound {
            name: name.to_string(),
            candidates: visible_candidates(panes),
        })
}

/// Names (else commands) of every terminal pane with one, in scan order.
pub fn visible_candidates(panes: &[PaneDescriptor]) -> Vec<String> {
    panes
        .iter()
        .filter(|p| p.is_terminal())
        .filter_map(|p| p.label().map(str::to_string))
        .collect()
}

/// Match a logical name against control-plane panes.
///
/// Order: the registered numeric id if it is still listed, then the launch
/// marker, then an exact title, then a substring of title or command.
pub fn resolve_control_pane<'p>(
    name: &str,
    registered: Option<&RegisteredPane>,
    panes: &'p [ControlPane],
) -> Option<&'p ControlPane> {
    let terminals = || panes.iter().filter(|p| !p.is_plugin);

    if let Some(id) = registered.and_then(|r| r.pane_id) {
        if let Some(p) = terminals().find(|p| p.id == id) {
            return Some(p);
        }
    }
    if let Some(p) = terminals().find(|p| p.command.as_deref().is_some_and(|c| has_marker(c, name))) {
        return Some(p);
    }
    if name.is_empty() {
        return None;
    }
    if let Some(p) = terminals().find(|p| p.title.eq_ignore_ascii_case(name)) {
        return Some(p);
    }
    let needle = name.to_lowercase();
    terminals().find(|p| {
        p.title.to_lowercase().contains(&needle)
            || p.command
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&needle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_layout;
    use crate::registry::{PaneRegistration, PaneRegistry};
    use chrono::Utc;

    const DUMP: &str = r#"layout {
    tab name="build" focus=true {
        pane size=1 borderless=true {
            plugin location="zellij:tab-bar"
        }
        pane command="bash" name="Renamed Title" focus=true {
            args "-c" "cargo watch" "name=watcher"
        }
        pane command="htop"
        pane
    }
    tab name="logs" {
        pane command="tail" {
            args "-f" "/var/log/syslog"
        }
        pane
    }
}
"#;

    fn registered(name: &str, tab: Option<&str>, index: usize) -> RegisteredPane {
        let mut reg = PaneRegistry::new();
        let mut r = PaneRegistration::new(name);
        r.tab_name = tab.map(str::to_string);
        r.pane_index = Some(index);
        reg.register(r, Utc::now());
        reg.get(name).cloned().expect("registered")
    }

    #[test]
    fn marker_beats_title() {
        let panes = parse_layout(DUMP);
        let hit = locate("watcher", None, &panes).expect("found");
        assert_eq!(hit.strategy, Strategy::Marker);
        assert_eq!(hit.pane.name.as_deref(), Some("Renamed Title"));
    }

    #[test]
    fn substring_in_name_or_command() {
        let panes = parse_layout(DUMP);
        let hit = locate("HTOP", None, &panes).expect("found");
        assert_eq!(hit.strategy, Strategy::Substring);
        assert_eq!(hit.pane.pane_index, 2);

        let hit = locate("syslog", None, &panes).expect("found");
        assert_eq!(hit.pane.tab_name, "logs");
    }

    #[test]
    fn substring_first_match_wins() {
        let panes = parse_layout(DUMP);
        // "a" appears in several commands; the earliest terminal pane wins.
        let hit = locate("a", None, &panes).expect("found");
        assert_eq!(hit.pane.tab_name, "build");
        assert_eq!(hit.pane.pane_index, 1);
    }

    #[test]
    fn substring_skips_plugins() {
        let panes = parse_layout(DUMP);
        assert!(locate("tab-bar", None, &panes).is_err());
    }

    #[test]
    fn ordinal_fallback_uses_registered_tab() {
        let panes = parse_layout(DUMP);
        let reg = registered("gone-title", Some("logs"), 1);
        let hit = locate("gone-title", Some(&reg), &panes).expect("found");
        assert_eq!(hit.strategy, Strategy::Ordinal);
        assert_eq!(hit.pane.tab_name, "logs");
        assert_eq!(hit.pane.pane_index, 1);
    }

    #[test]
    fn ordinal_fallback_without_tab_uses_focused_tab() {
        let panes = parse_layout(DUMP);
        let reg = registered("anon", None, 3);
        let hit = locate("anon", Some(&reg), &panes).expect("found");
        assert_eq!(hit.pane.tab_name, "build");
        assert_eq!(hit.pane.pane_index, 3);
    }

    #[test]
    fn ordinal_respects_floating_flag() {
        let panes = parse_layout(DUMP);
        let mut reg = registered("float", Some("logs"), 1);
        reg.floating = true;
        assert!(locate("float", Some(&reg), &panes).is_err());
    }

    #[test]
    fn split_containers_never_resolve() {
        let dump = r#"layout {
    tab name="dev" focus=true {
        pane split_direction="vertical" name="outer" {
            pane command="htop"
            pane
        }
    }
}"#;
        let panes = parse_layout(dump);
        assert!(panes[0].is_container);
        assert!(locate("outer", None, &panes).is_err());
        assert!(locate("outer", Some(&registered("outer", Some("dev"), 0)), &panes).is_err());

        let hit = locate("anon", Some(&registered("anon", Some("dev"), 2)), &panes).expect("found");
        assert_eq!(hit.strategy, Strategy::Ordinal);
        assert_eq!(hit.pane.pane_index, 2);
        assert_eq!(visible_candidates(&panes), vec!["htop".to_string()]);
    }

    #[test]
    fn not_found_lists_candidates() {
        let panes = parse_layout(DUMP);
        let err = locate("nothing-matches", None, &panes).expect_err("missing");
        let LocateError::NotFound { name, candidates } = err;
        assert_eq!(name, "nothing-matches");
        assert_eq!(
            candidates,
            vec![
                "Renamed Title".to_string(),
                "htop".to_string(),
                "tail -f /var/log/syslog".to_string(),
            ]
        );
    }

    #[test]
    fn empty_name_matches_nothing() {
        let panes = parse_layout(DUMP);
        assert!(locate("", None, &panes).is_err());
    }

    #[test]
    fn custom_resolver_chain() {
        let panes = parse_layout(DUMP);
        let only_ordinal: [&dyn PaneResolver; 1] = [&OrdinalResolver];
        assert!(locate_with(&only_ordinal, "htop", None, &panes).is_err());
    }

    fn control(id: u32, title: &str, command: Option<&str>) -> ControlPane {
        ControlPane {
            id,
            title: title.to_string(),
            command: command.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn control_pane_precedence() {
        let panes = vec![
            ControlPane {
                is_plugin: true,
                ..control(0, "worker", None)
            },
            control(1, "shell", Some("bash")),
            control(2, "worker-2", Some("bash -c run name=worker")),
            control(3, "Worker", None),
        ];
        // marker beats exact title
        assert_eq!(resolve_control_pane("worker", None, &panes).map(|p| p.id), Some(2));
        // exact title beats substring
        assert_eq!(resolve_control_pane("WORKER", None, &panes).map(|p| p.id), Some(3));
        assert_eq!(resolve_control_pane("hel", None, &panes).map(|p| p.id), Some(1));

        let mut reg = registered("worker", None, 0);
        reg.pane_id = Some(1);
        assert_eq!(resolve_control_pane("worker", Some(&reg), &panes).map(|p| p.id), Some(1));
        reg.pane_id = Some(99);
        assert_eq!(resolve_control_pane("worker", Some(&reg), &panes).map(|p| p.id), Some(2));
    }
}
