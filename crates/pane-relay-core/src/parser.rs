//! Relay line grammar and target resolution.
//!
//! A relay line looks like `@<targets> <command>`, optionally behind a
//! list marker (`-`, `*`, `•`, `1.`, `2)`, `>`). Targets are either `all`
//! or a comma-separated list of pane numbers (`2`, `pane3`). Anything that
//! does not match, resolves to no pane, or carries an empty command is not
//! a relay line, and the caller handles it as ordinary text.

use std::collections::HashMap;

use crate::{
    ansi,
    traits::{PaneDirectory, SessionId},
};

const QUOTES: [char; 3] = ['"', '\'', '`'];

/// Ordered, duplicate-free, non-empty set of session ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet(Vec<SessionId>);

impl TargetSet {
    /// Build a set keeping first-seen order. `None` when no id is given.
    pub fn new(ids: impl IntoIterator<Item = SessionId>) -> Option<Self> {
        let mut unique: Vec<SessionId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        (!unique.is_empty()).then_some(Self(unique))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no targets. A constructed set never does.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SessionId> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[SessionId] {
        &self.0
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<SessionId> {
        self.0.clone()
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a SessionId;
    type IntoIter = std::slice::Iter<'a, SessionId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A relay line resolved against the pane directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRelayCommand {
    targets: TargetSet,
    command: String,
}

impl ParsedRelayCommand {
    #[must_use]
    pub const fn targets(&self) -> &TargetSet {
        &self.targets
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn into_parts(self) -> (TargetSet, String) {
        (self.targets, self.command)
    }
}

/// Target token as written, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetSpec {
    All,
    Panes(Vec<u64>),
}

/// Parse one line of terminal text typed or printed in `source`.
pub fn parse<D>(raw: &str, source: SessionId, directory: &D) -> Option<ParsedRelayCommand>
where
    D: PaneDirectory + ?Sized,
{
    let stripped = ansi::strip(raw);
    let (token, raw_command) = split_relay_line(stripped.trim())?;

    let command = normalize_command(raw_command);
    if command.is_empty() {
        return None;
    }

    let members = directory.workspace_members(source)?;
    let siblings: Vec<SessionId> = members.iter().copied().filter(|id| *id != source).collect();

    let targets = match token {
        TargetSpec::All => resolve_all(source, &siblings, directory),
        TargetSpec::Panes(numbers) => resolve_numbers(&numbers, &members, &siblings, directory),
    }?;

    tracing::debug!(%source, targets = targets.len(), command = %command, "Parsed relay line");
    Some(ParsedRelayCommand { targets, command })
}

/// Trim, then strip one layer of matching quotes and trim again.
#[must_use]
pub fn normalize_command(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    if let (Some(first), Some(last)) = (chars.next(), chars.next_back()) {
        if first == last && QUOTES.contains(&first) {
            return chars.as_str().trim().to_string();
        }
    }
    trimmed.to_string()
}

fn split_relay_line(line: &str) -> Option<(TargetSpec, &str)> {
    let rest = strip_list_marker(line).trim_start();
    let rest = rest.strip_prefix('@')?;
    let (token, rest) = take_target_token(rest)?;

    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let command = rest.trim_start();
    (!command.is_empty()).then_some((token, command))
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•', '>']) {
        return rest;
    }
    let (digits, rest) = split_leading_digits(line);
    if digits.is_empty() {
        return line;
    }
    rest.strip_prefix(['.', ')']).unwrap_or(line)
}

fn take_target_token(rest: &str) -> Option<(TargetSpec, &str)> {
    if let Some(after) = strip_prefix_ignore_case(rest, "all") {
        return Some((TargetSpec::All, after));
    }

    let mut numbers = Vec::new();
    let mut cursor = rest;
    loop {
        cursor = strip_prefix_ignore_case(cursor, "pane").unwrap_or(cursor);
        let (digits, after) = split_leading_digits(cursor);
        if digits.is_empty() {
            return None;
        }
        // Zero and values too large to address a pane are dropped.
        if let Ok(n) = digits.parse::<u64>() {
            if n > 0 {
                numbers.push(n);
            }
        }
        match after.strip_prefix(',') {
            Some(next) => cursor = next,
            None => return Some((TargetSpec::Panes(numbers), after)),
        }
    }
}

fn resolve_all<D>(source: SessionId, siblings: &[SessionId], directory: &D) -> Option<TargetSet>
where
    D: PaneDirectory + ?Sized,
{
    let managed = directory.managed_targets(source);
    if managed.is_empty() {
        TargetSet::new(siblings.iter().copied())
    } else {
        TargetSet::new(managed.into_iter().filter(|id| siblings.contains(id)))
    }
}

fn resolve_numbers<D>(
    numbers: &[u64],
    members: &[SessionId],
    siblings: &[SessionId],
    directory: &D,
) -> Option<TargetSet>
where
    D: PaneDirectory + ?Sized,
{
    let mut requested: Vec<u64> = Vec::with_capacity(numbers.len());
    for n in numbers {
        if !requested.contains(n) {
            requested.push(*n);
        }
    }
    if requested.is_empty() {
        return None;
    }

    // First pane to claim a number keeps it; renamed duplicates are ignored.
    let mut table: HashMap<u64, SessionId> = HashMap::new();
    for id in members {
        if let Some(n) = directory.title_of(*id).as_deref().and_then(title_number) {
            table.entry(n).or_insert(*id);
        }
    }

    TargetSet::new(
        requested
            .iter()
            .filter_map(|n| table.get(n).copied())
            .filter(|id| siblings.contains(id)),
    )
}

/// Number of a pane titled `Pane <n>` (case-insensitive, anything may follow).
fn title_number(title: &str) -> Option<u64> {
    let rest = strip_prefix_ignore_case(title, "pane")?;
    let spaced = rest.trim_start();
    if spaced.len() == rest.len() {
        return None;
    }
    let (digits, _) = split_leading_digits(spaced);
    digits.parse().ok()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn split_leading_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}
