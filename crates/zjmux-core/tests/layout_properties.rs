//! Property tests over generated layout dumps.

use chrono::Utc;
use proptest::prelude::*;
use zjmux_core::locator::visible_candidates;
use zjmux_core::{LocateError, PaneRegistration, PaneRegistry, locate, parse_layout};

#[derive(Debug, Clone)]
struct PaneSpec {
    name: Option<String>,
    command: Option<String>,
}

fn arb_pane() -> impl Strategy<Value = PaneSpec> {
    (
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of(prop_oneof![
            Just("htop".to_string()),
            Just("bash".to_string()),
            Just("tail".to_string()),
        ]),
    )
        .prop_map(|(name, command)| PaneSpec { name, command })
}

fn arb_tabs() -> impl Strategy<Value = Vec<Vec<PaneSpec>>> {
    proptest::collection::vec(proptest::collection::vec(arb_pane(), 0..6), 1..5)
}

fn render_pane(out: &mut String, pane: &PaneSpec, indent: &str) {
    out.push_str(indent);
    out.push_str("pane");
    if let Some(cmd) = &pane.command {
        out.push_str(&format!(" command=\"{cmd}\""));
    }
    if let Some(name) = &pane.name {
        out.push_str(&format!(" name=\"{name}\""));
    }
    out.push('\n');
}

fn render(tabs: &[Vec<PaneSpec>], focused: usize, with_templates: bool) -> String {
    let mut out = String::from("layout {\n");
    for (i, panes) in tabs.iter().enumerate() {
        let focus = if i == focused { " focus=true" } else { "" };
        out.push_str(&format!("    tab name=\"t{i}\"{focus} {{\n"));
        for pane in panes {
            render_pane(&mut out, pane, "        ");
        }
        out.push_str("    }\n");
    }
    if with_templates {
        out.push_str("    new_tab_template {\n        pane name=\"TEMPLATE\"\n    }\n");
        out.push_str("    swap_tiled_layout name=\"vertical\" {\n        tab max_panes=5 {\n            pane split_direction=\"vertical\" {\n                pane name=\"TEMPLATE\"\n                pane { children; }\n            }\n        }\n    }\n");
    }
    out.push_str("}\n");
    out
}

proptest! {
    #[test]
    fn pane_counts_and_ordinals(tabs in arb_tabs(), focused in 0usize..5) {
        let dump = render(&tabs, focused, false);
        let panes = parse_layout(&dump);
        let total: usize = tabs.iter().map(Vec::len).sum();
        prop_assert_eq!(panes.len(), total);

        for (i, specs) in tabs.iter().enumerate() {
            let tab = format!("t{i}");
            let ordinals: Vec<usize> = panes
                .iter()
                .filter(|p| p.tab_name == tab)
                .map(|p| p.pane_index)
                .collect();
            prop_assert_eq!(ordinals, (0..specs.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn template_panes_never_appear(tabs in arb_tabs()) {
        let dump = render(&tabs, 0, true);
        let panes = parse_layout(&dump);
        let total: usize = tabs.iter().map(Vec::len).sum();
        prop_assert_eq!(panes.len(), total);
        prop_assert!(panes.iter().all(|p| p.name.as_deref() != Some("TEMPLATE")));
    }

    #[test]
    fn locate_is_idempotent(tabs in arb_tabs(), needle in "[a-z]{1,3}") {
        let panes = parse_layout(&render(&tabs, 0, false));
        let first = locate(&needle, None, &panes);
        let second = locate(&needle, None, &panes);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(&a.pane.tab_name, &b.pane.tab_name);
                prop_assert_eq!(a.pane.pane_index, b.pane.pane_index);
                prop_assert_eq!(a.pane.focused, b.pane.focused);
                prop_assert_eq!(a.strategy, b.strategy);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "results diverged"),
        }
    }

    #[test]
    fn register_then_locate_keeps_ordinal(tabs in arb_tabs(), pick in any::<prop::sample::Index>()) {
        let panes = parse_layout(&render(&tabs, 0, false));
        prop_assume!(!panes.is_empty());
        let target = pick.get(&panes);

        let mut registry = PaneRegistry::new();
        let name = "zz-registered";
        registry.register(PaneRegistration::new(name).placed_at(target), Utc::now());
        let hit = locate(name, registry.get(name), &panes).expect("ordinal fallback");
        prop_assert_eq!(&hit.pane.tab_name, &target.tab_name);
        prop_assert_eq!(hit.pane.pane_index, target.pane_index);
    }

    #[test]
    fn miss_reports_all_visible(tabs in arb_tabs()) {
        let panes = parse_layout(&render(&tabs, 0, false));
        // Generated names are lowercase letters only; digits never match.
        let err = locate("0000", None, &panes).expect_err("no match");
        let LocateError::NotFound { candidates, .. } = err;
        prop_assert_eq!(candidates, visible_candidates(&panes));
    }
}
