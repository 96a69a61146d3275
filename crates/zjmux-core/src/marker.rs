//! Launch-argument markers.
//!
//! Panes created through zjmux carry a trailing `name=<name>` argument in
//! their launch command. zellij echoes the launch command back in every
//! layout dump, so the marker survives title changes made by the program
//! running in the pane.

pub const MARKER_PREFIX: &str = "name=";

/// The marker argument for a logical pane name.
pub fn marker_for(name: &str) -> String {
    format!("{MARKER_PREFIX}{name}")
}

/// Every marker name embedded in a command line.
pub fn marker_names(command: &str) -> impl Iterator<Item = &str> {
    command
        .split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| matches!(c, '"' | '\'' | '#' | ';')))
        .filter_map(|tok| tok.strip_prefix(MARKER_PREFIX))
        .filter(|name| !name.is_empty())
}

/// True if `command` carries exactly the marker for `name`.
pub fn has_marker(command: &str, name: &str) -> bool {
    !name.is_empty() && marker_names(command).any(|m| m == name)
}

/// Quote `s` for a POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Launch argv for a marked pane: `sh -c <script> name=<name>`.
///
/// The marker lands in `$0` of the shell, where it is inert. Without a
/// command the pane runs the user's login shell.
pub fn launch_args(command: Option<&str>, name: &str) -> Vec<String> {
    let script = match command.map(str::trim).filter(|c| !c.is_empty()) {
        Some(cmd) => cmd.to_string(),
        None => "exec \"${SHELL:-sh}\"".to_string(),
    };
    vec!["sh".into(), "-c".into(), script, marker_for(name)]
}
