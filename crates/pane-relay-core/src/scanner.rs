//! Passive relay detection on a pane's output.

use crate::{
    parser::{self, ParsedRelayCommand},
    traits::{PaneDirectory, SessionId},
};

/// Default cap on a buffered output line, in bytes.
pub const DEFAULT_MAX_PENDING_LINE: usize = 64 * 1024;

/// Reassembles output lines across chunks and reports the relay commands
/// printed in them. Never alters or holds back the output itself.
#[derive(Debug, Clone)]
pub struct OutputScanner {
    pending_line: String,
    max_pending_line: usize,
    discarding: bool,
}

impl Default for OutputScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_LINE)
    }
}

impl OutputScanner {
    #[must_use]
    pub const fn new(max_pending_line: usize) -> Self {
        Self {
            pending_line: String::new(),
            max_pending_line,
            discarding: false,
        }
    }

    /// Partial line carried over from earlier chunks.
    #[must_use]
    pub fn pending_line(&self) -> &str {
        &self.pending_line
    }

    /// Scan an output chunk of `pane`.
    ///
    /// CR is ignored and LF completes a line. A line that grows past the
    /// cap is dropped up to its LF.
    pub fn feed<D>(
        &mut self,
        chunk: &str,
        pane: SessionId,
        directory: &D,
    ) -> Vec<ParsedRelayCommand>
    where
        D: PaneDirectory + ?Sized,
    {
        let mut found = Vec::new();
        for c in chunk.chars() {
            match c {
                '\r' => {}
                '\n' => {
                    let line = std::mem::take(&mut self.pending_line);
                    if std::mem::take(&mut self.discarding) {
                        continue;
                    }
                    if let Some(command) = parser::parse(&line, pane, directory) {
                        tracing::debug!(%pane, command = command.command(), "Relay command in output");
                        found.push(command);
                    }
                }
                _ if self.discarding => {}
                _ => {
                    if self.pending_line.len() + c.len_utf8() > self.max_pending_line {
                        tracing::debug!(%pane, "Output line over {} bytes, discarding", self.max_pending_line);
                        self.pending_line.clear();
                        self.discarding = true;
                    } else {
                        self.pending_line.push(c);
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::directory::WorkspaceDirectory;

    fn setup() -> (WorkspaceDirectory, Vec<SessionId>) {
        let dir = WorkspaceDirectory::new();
        let ws = dir.create_workspace("main");
        let ids: Vec<SessionId> = (1..=3).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            dir.add_pane(ws, *id, format!("Pane {}", n + 1)).unwrap();
        }
        (dir, ids)
    }

    #[test]
    fn test_detects_printed_command() {
        let (dir, ids) = setup();
        let mut scanner = OutputScanner::default();

        let found = scanner.feed("thinking...\r\n@2 cargo test\r\n$ ", ids[0], &dir);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].command(), "cargo test");
        assert_eq!(found[0].targets().as_slice(), &[ids[1]]);
        assert_eq!(scanner.pending_line(), "$ ");
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let (dir, ids) = setup();
        let output = "- \x1b[1m@all\x1b[0m \"make\"\r\nnoise\r\n@pane3 ls\n";

        let mut whole = OutputScanner::default();
        let expected = whole.feed(output, ids[0], &dir);
        assert_eq!(expected.len(), 2);

        for split in 1..output.len() {
            if !output.is_char_boundary(split) {
                continue;
            }
            let mut scanner = OutputScanner::default();
            let mut found = scanner.feed(&output[..split], ids[0], &dir);
            found.extend(scanner.feed(&output[split..], ids[0], &dir));
            assert_eq!(found, expected, "split at {split}");
        }
    }

    #[test]
    fn test_unterminated_line_is_not_parsed() {
        let (dir, ids) = setup();
        let mut scanner = OutputScanner::default();
        assert!(scanner.feed("@2 ls", ids[0], &dir).is_empty());
        assert_eq!(scanner.feed("\n", ids[0], &dir).len(), 1);
    }

    #[test]
    fn test_overlong_line_is_dropped() {
        let (dir, ids) = setup();
        let mut scanner = OutputScanner::new(8);

        assert!(scanner.feed("@2 ls -la /tmp", ids[0], &dir).is_empty());
        assert!(scanner.feed(" more\n", ids[0], &dir).is_empty());

        // The next line is scanned normally.
        assert_eq!(scanner.feed("@2 pwd\n", ids[0], &dir).len(), 1);
    }

    #[test]
    fn test_self_target_is_ignored() {
        let (dir, ids) = setup();
        let mut scanner = OutputScanner::default();
        assert!(scanner.feed("@1 ls\n", ids[0], &dir).is_empty());
    }
}
