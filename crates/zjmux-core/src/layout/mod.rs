//! Layout dump parsing: `zellij action dump-layout` text → tabs and panes.
//!
//! The dump describes live tabs plus templates for layouts that do not exist
//! yet (swap layouts, the new-tab template). Only live tabs directly under
//! the root `layout` node contribute panes.
//!
//! Pane ordinals (`pane_index`) count every emitted pane of a tab in document
//! order, floating panes and split containers included. They are stable within one parse only:
//! zellij has no persistent pane identifier in the dump.

mod lexer;
pub mod node;

use serde::{Deserialize, Serialize};

use node::{Node, parse_document};

/// Sections describing alternate or future layouts, never live panes.
const TEMPLATE_SECTIONS: &[&str] = &[
    "swap_tiled_layout",
    "swap_floating_layout",
    "new_tab_template",
    "default_tab_template",
];

fn is_template(node: &Node) -> bool {
    TEMPLATE_SECTIONS.contains(&node.name.as_str())
}

/// One live pane, as seen in a single layout dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneDescriptor {
    pub tab_name: String,
    pub tab_index: usize,
    pub tab_focused: bool,
    pub pane_index: usize,
    pub floating: bool,
    pub name: Option<String>,
    /// Program and arguments joined by spaces; plugin location for plugin panes.
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub size: Option<String>,
    /// Own focus marker present *and* the tab is the focused tab.
    pub focused: bool,
    pub is_plugin: bool,
    /// A split: its block holds the child panes that follow it.
    #[serde(default)]
    pub is_container: bool,
}

impl PaneDescriptor {
    /// Display name, else launched command. `None` for anonymous shells.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.command.as_deref())
    }

    /// A pane with its own terminal: neither a plugin nor a split container.
    pub fn is_terminal(&self) -> bool {
        !self.is_plugin && !self.is_container
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabDescriptor {
    pub name: String,
    pub index: usize,
    pub focused: bool,
    pub panes: Vec<PaneDescriptor>,
}

impl TabDescriptor {
    /// Terminal panes with the given floating flag, in ordinal order.
    pub fn terminal_panes(&self, floating: bool) -> impl Iterator<Item = &PaneDescriptor> {
        self.panes
            .iter()
            .filter(move |p| p.is_terminal() && p.floating == floating)
    }
}

/// A parsed layout dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLayout {
    pub tabs: Vec<TabDescriptor>,
}

impl ParsedLayout {
    /// Parse a raw dump. Never fails; unrecognised text is skipped.
    pub fn parse(raw: &str) -> Self {
        let doc = parse_document(raw);
        let mut walker = Walker::default();
        match doc.iter().find(|n| n.name == "layout") {
            Some(root) => walker.layout(&root.children),
            None => walker.layout(&doc),
        }
        Self { tabs: walker.tabs }
    }

    /// All panes in scan order.
    pub fn panes(&self) -> Vec<PaneDescriptor> {
        self.tabs.iter().flat_map(|t| t.panes.iter().cloned()).collect()
    }

    pub fn focused_tab(&self) -> Option<&TabDescriptor> {
        self.tabs.iter().find(|t| t.focused)
    }

    pub fn tab(&self, name: &str) -> Option<&TabDescriptor> {
        self.tabs.iter().find(|t| t.name == name)
    }
}

/// Parse a raw dump into its ordered pane descriptors.
pub fn parse_layout(raw: &str) -> Vec<PaneDescriptor> {
    ParsedLayout::parse(raw).panes()
}

#[derive(Default)]
struct Walker {
    tabs: Vec<TabDescriptor>,
}

impl Walker {
    fn layout(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node.name.as_str() {
                _ if is_template(node) => {}
                "tab" => {
                    let index = self.tabs.len();
                    self.tabs.push(TabDescriptor {
                        name: node
                            .prop("name")
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("Tab #{}", index + 1)),
                        index,
                        focused: node.flag("focus"),
                        panes: Vec::new(),
                    });
                    self.tab_body(&node.children);
                }
                // Layouts without tab nodes describe a single implicit tab.
                "pane" | "floating_panes" => {
                    if self.tabs.is_empty() {
                        self.tabs.push(TabDescriptor {
                            name: "Tab #1".to_string(),
                            index: 0,
                            focused: true,
                            panes: Vec::new(),
                        });
                    }
                    self.tab_body(std::slice::from_ref(node));
                }
                _ => {}
            }
        }
    }

    fn tab_body(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node.name.as_str() {
                "pane" => self.pane(node, false),
                "floating_panes" => {
                    for child in node.children.iter().filter(|c| c.name == "pane") {
                        self.pane(child, true);
                    }
                }
                _ => {}
            }
        }
    }

    fn pane(&mut self, node: &Node, floating: bool) {
        let Some(tab) = self.tabs.last_mut() else {
            return;
        };

        // A split is emitted at its own ordinal, then its children after it.
        let is_container = node.has_child("pane");
        let (is_plugin, command) = match node.child("plugin") {
            _ if is_container => (false, None),
            Some(plugin) => (
                true,
                plugin
                    .prop("location")
                    .or(plugin.args.first().map(String::as_str))
                    .map(str::to_string),
            ),
            None => (false, launch_command(node)),
        };

        let cwd = node
            .prop("cwd")
            .or_else(|| node.child("cwd").and_then(|c| c.args.first().map(String::as_str)))
            .map(str::to_string);

        let pane_index = tab.panes.len();
        let descriptor = PaneDescriptor {
            tab_name: tab.name.clone(),
            tab_index: tab.index,
            tab_focused: tab.focused,
            pane_index,
            floating,
            name: node.prop("name").map(str::to_string),
            command,
            cwd,
            size: node.prop("size").map(str::to_string),
            focused: node.flag("focus") && tab.focused && !is_container,
            is_plugin,
            is_container,
        };
        tab.panes.push(descriptor);

        if is_container {
            for child in node.children.iter().filter(|c| c.name == "pane") {
                self.pane(child, floating);
            }
        }
    }
}

fn launch_command(node: &Node) -> Option<String> {
    let program = node.prop("command").or_else(|| node.prop("edit"))?;
    let mut parts = vec![program.to_string()];
    if let Some(args) = node.child("args") {
        parts.extend(args.args.iter().cloned());
    }
    Some(parts.join(" "))
}
