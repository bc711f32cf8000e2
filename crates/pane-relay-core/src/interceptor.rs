//! Keystroke interception for one pane.
//!
//! The interceptor sits between the keyboard and the session. Text typed
//! at the start of a line beginning with `@` is held back (compose mode)
//! until the line ends; if it turns out to be a relay command it never
//! reaches the session, otherwise it is forwarded as if typed normally.

use crate::{
    parser::{self, ParsedRelayCommand},
    traits::{PaneDirectory, SessionId},
};

const DEL: char = '\x7f';
const BS: char = '\x08';

/// Interception mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Keystrokes go straight to the session.
    #[default]
    Passthrough,
    /// Keystrokes are buffered until the line ends.
    Compose,
}

/// What the host must do after feeding a chunk, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Write this text to the pane's own session.
    Forward(String),
    /// Dispatch this command; nothing is written for the line.
    Relay(ParsedRelayCommand),
}

/// Per-pane keystroke state machine.
#[derive(Debug, Clone)]
pub struct InputInterceptor {
    mode: InputMode,
    line_buffer: String,
    compose_buffer: String,
    line_ending: String,
}

impl Default for InputInterceptor {
    fn default() -> Self {
        Self::new("\r")
    }
}

impl InputInterceptor {
    /// Create an interceptor that terminates forwarded compose lines with
    /// `line_ending`.
    #[must_use]
    pub fn new(line_ending: impl Into<String>) -> Self {
        Self {
            mode: InputMode::Passthrough,
            line_buffer: String::new(),
            compose_buffer: String::new(),
            line_ending: line_ending.into(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> InputMode {
        self.mode
    }

    /// Text typed on the current line so far.
    #[must_use]
    pub fn line_buffer(&self) -> &str {
        &self.line_buffer
    }

    /// Text held back in compose mode.
    #[must_use]
    pub fn compose_buffer(&self) -> &str {
        &self.compose_buffer
    }

    /// Feed a keystroke or paste chunk typed into `pane`.
    pub fn feed<D>(&mut self, chunk: &str, pane: SessionId, directory: &D) -> Vec<InputAction>
    where
        D: PaneDirectory + ?Sized,
    {
        let mut actions = Actions::default();
        let mut saw_terminator = false;

        for c in chunk.chars() {
            let terminator = is_terminator(c);
            saw_terminator |= terminator;

            match self.mode {
                InputMode::Passthrough => {
                    if c == '@' && self.line_buffer.is_empty() {
                        self.compose_buffer.clear();
                        self.compose_buffer.push(c);
                        self.mode = InputMode::Compose;
                        tracing::debug!(%pane, "Entered compose mode");
                        continue;
                    }
                    actions.forward_char(c);
                    if terminator {
                        self.line_buffer.clear();
                    } else if is_erase(c) {
                        self.line_buffer.pop();
                    } else {
                        self.line_buffer.push(c);
                    }
                }
                InputMode::Compose => {
                    if terminator {
                        self.finish_compose(pane, directory, &mut actions);
                    } else if is_erase(c) {
                        self.compose_buffer.pop();
                    } else {
                        self.compose_buffer.push(c);
                    }
                }
            }
        }

        // A paste that ends inside a new `@` line is handed to the session
        // as typed text rather than left invisible in the buffer.
        if self.mode == InputMode::Compose && saw_terminator {
            let pending = std::mem::take(&mut self.compose_buffer);
            tracing::debug!(%pane, "Flushing trailing compose text from chunk");
            actions.forward(&pending);
            self.line_buffer = pending;
            self.mode = InputMode::Passthrough;
        }

        actions.finish()
    }

    fn finish_compose<D>(&mut self, pane: SessionId, directory: &D, actions: &mut Actions)
    where
        D: PaneDirectory + ?Sized,
    {
        let line = std::mem::take(&mut self.compose_buffer);
        self.line_buffer.clear();
        self.mode = InputMode::Passthrough;

        match parser::parse(&line, pane, directory) {
            Some(command) => actions.relay(command),
            None => {
                tracing::debug!(%pane, "Compose line is not a relay command, forwarding");
                actions.forward(&line);
                actions.forward(&self.line_ending);
            }
        }
    }
}

const fn is_terminator(c: char) -> bool {
    matches!(c, '\r' | '\n')
}

const fn is_erase(c: char) -> bool {
    matches!(c, DEL | BS)
}

/// Ordered actions with adjacent forwards merged.
#[derive(Default)]
struct Actions {
    done: Vec<InputAction>,
    pending: String,
}

impl Actions {
    fn forward(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn forward_char(&mut self, c: char) {
        self.pending.push(c);
    }

    fn relay(&mut self, command: ParsedRelayCommand) {
        self.flush();
        self.done.push(InputAction::Relay(command));
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.done
                .push(InputAction::Forward(std::mem::take(&mut self.pending)));
        }
    }

    fn finish(mut self) -> Vec<InputAction> {
        self.flush();
        self.done
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::directory::WorkspaceDirectory;

    struct Fixture {
        dir: WorkspaceDirectory,
        ids: Vec<SessionId>,
        interceptor: InputInterceptor,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = WorkspaceDirectory::new();
            let ws = dir.create_workspace("main");
            let ids: Vec<SessionId> = (1..=3).map(|_| Uuid::new_v4()).collect();
            for (n, id) in ids.iter().enumerate() {
                dir.add_pane(ws, *id, format!("Pane {}", n + 1)).unwrap();
            }
            Self {
                dir,
                ids,
                interceptor: InputInterceptor::default(),
            }
        }

        fn feed(&mut self, chunk: &str) -> Vec<InputAction> {
            self.interceptor.feed(chunk, self.ids[0], &self.dir)
        }

        /// Feed one char at a time, as a keyboard would.
        fn type_keys(&mut self, keys: &str) -> Vec<InputAction> {
            let mut buf = [0; 4];
            keys.chars()
                .flat_map(|c| self.feed(c.encode_utf8(&mut buf)))
                .collect()
        }
    }

    fn forwarded(actions: &[InputAction]) -> String {
        actions
            .iter()
            .filter_map(|a| match a {
                InputAction::Forward(text) => Some(text.as_str()),
                InputAction::Relay(_) => None,
            })
            .collect()
    }

    fn relays(actions: &[InputAction]) -> Vec<&ParsedRelayCommand> {
        actions
            .iter()
            .filter_map(|a| match a {
                InputAction::Relay(cmd) => Some(cmd),
                InputAction::Forward(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_relay_line_is_never_forwarded() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("@2 ls\n");

        assert_eq!(forwarded(&actions), "");
        let relays = relays(&actions);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].targets().as_slice(), &[fx.ids[1]]);
        assert_eq!(relays[0].command(), "ls");
        assert_eq!(fx.interceptor.mode(), InputMode::Passthrough);
    }

    #[test]
    fn test_failed_compose_is_forwarded_with_cr() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("@bogus\n");
        assert_eq!(actions, vec![InputAction::Forward("@bogus\r".into())]);
    }

    #[test]
    fn test_compose_holds_keys_until_line_end() {
        let mut fx = Fixture::new();
        assert!(fx.type_keys("@2 l").is_empty());
        assert_eq!(fx.interceptor.mode(), InputMode::Compose);
        assert_eq!(fx.interceptor.compose_buffer(), "@2 l");
    }

    #[test]
    fn test_passthrough_forwards_raw() {
        let mut fx = Fixture::new();
        let actions = fx.feed("ls -la\r");
        assert_eq!(actions, vec![InputAction::Forward("ls -la\r".into())]);
        assert_eq!(fx.interceptor.line_buffer(), "");
    }

    #[test]
    fn test_at_sign_mid_line_passes_through() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("echo @2 x\r");
        assert_eq!(forwarded(&actions), "echo @2 x\r");
        assert!(relays(&actions).is_empty());
    }

    #[test]
    fn test_erase_in_compose_edits_buffer() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("@3\x7f2 ls\r");
        assert_eq!(relays(&actions)[0].targets().as_slice(), &[fx.ids[1]]);
        assert_eq!(forwarded(&actions), "");
    }

    #[test]
    fn test_erase_back_to_line_start_reenables_compose() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("a\x08@2 ls\r");
        assert_eq!(forwarded(&actions), "a\x08");
        assert_eq!(relays(&actions).len(), 1);
    }

    #[test]
    fn test_erasing_the_at_sign_still_forwards_line() {
        let mut fx = Fixture::new();
        let actions = fx.type_keys("@\x7fpwd\r");
        assert_eq!(forwarded(&actions), "pwd\r");
    }

    #[test]
    fn test_pasted_lines_keep_order() {
        let mut fx = Fixture::new();
        let actions = fx.feed("x\r@2 ls\ry");
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0], InputAction::Forward("x\r".into()));
        assert!(matches!(&actions[1], InputAction::Relay(cmd) if cmd.command() == "ls"));
        assert_eq!(actions[2], InputAction::Forward("y".into()));
    }

    #[test]
    fn test_pasted_relay_lines() {
        let mut fx = Fixture::new();
        let actions = fx.feed("@2 ls\r@all pwd\r");
        let relays = relays(&actions);
        assert_eq!(relays.len(), 2);
        assert_eq!(relays[1].targets().as_slice(), &[fx.ids[1], fx.ids[2]]);
        assert_eq!(forwarded(&actions), "");
    }

    #[test]
    fn test_chunk_ending_in_compose_is_flushed() {
        let mut fx = Fixture::new();
        let actions = fx.feed("pwd\r@2 l");
        assert_eq!(actions, vec![InputAction::Forward("pwd\r@2 l".into())]);
        assert_eq!(fx.interceptor.mode(), InputMode::Passthrough);
        assert_eq!(fx.interceptor.line_buffer(), "@2 l");

        // The rest of the line now goes straight through.
        assert_eq!(fx.feed("s\r"), vec![InputAction::Forward("s\r".into())]);
    }

    #[test]
    fn test_terminated_compose_is_not_flushed_twice() {
        let mut fx = Fixture::new();
        let actions = fx.feed("@nope\r");
        assert_eq!(actions, vec![InputAction::Forward("@nope\r".into())]);
    }

    #[test]
    fn test_custom_line_ending() {
        let mut fx = Fixture::new();
        fx.interceptor = InputInterceptor::new("\n");
        assert_eq!(forwarded(&fx.type_keys("@x\r")), "@x\n");
    }
}
