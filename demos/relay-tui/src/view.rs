//! What the demo shows for each pane.

use pane_relay_core::{DisplayMsg, SessionId, ansi};

const MAX_LINES: usize = 2000;

/// Screen lines of one pane, rebuilt from its display messages.
pub struct PaneView {
    pub id: SessionId,
    pub title: String,
    pub exited: bool,
    lines: Vec<String>,
    partial: String,
}

impl PaneView {
    pub fn new(id: SessionId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            exited: false,
            lines: Vec::new(),
            partial: String::new(),
        }
    }

    pub fn apply(&mut self, msg: DisplayMsg) {
        match msg {
            DisplayMsg::Output(chunk) => self.push_output(&chunk),
            DisplayMsg::Status(line) => self.push_line(format!("[relay] {line}")),
            DisplayMsg::Exited => {
                self.exited = true;
                self.push_line("[session ended]".to_string());
            }
        }
    }

    /// Last `height` lines, the line being typed included.
    pub fn tail(&self, height: usize) -> Vec<&str> {
        let mut lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        lines.push(&self.partial);
        let skip = lines.len().saturating_sub(height);
        lines.split_off(skip)
    }

    fn push_output(&mut self, chunk: &str) {
        for c in ansi::strip(chunk).chars() {
            match c {
                '\n' => {
                    let line = std::mem::take(&mut self.partial);
                    self.lines.push(line);
                }
                '\x08' => {
                    self.partial.pop();
                }
                '\t' => self.partial.push_str("    "),
                c if c.is_control() => {}
                c => self.partial.push(c),
            }
        }
        self.trim();
    }

    /// The line being typed stays last.
    fn push_line(&mut self, line: String) {
        self.lines.push(line);
        self.trim();
    }

    fn trim(&mut self) {
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> PaneView {
        PaneView::new(SessionId::nil(), "Pane 1")
    }

    #[test]
    fn test_output_lines() {
        let mut pane = view();
        pane.apply(DisplayMsg::Output("\x1b[32mone\x1b[0m\r\ntw".into()));
        pane.apply(DisplayMsg::Output("o\r\n$ ".into()));
        assert_eq!(pane.tail(10), vec!["one", "two", "$ "]);
        assert_eq!(pane.tail(1), vec!["$ "]);
    }

    #[test]
    fn test_backspace_echo() {
        let mut pane = view();
        pane.apply(DisplayMsg::Output("lsx\x08 \x08".into()));
        assert_eq!(pane.tail(1), vec!["ls"]);
    }

    #[test]
    fn test_status_and_exit() {
        let mut pane = view();
        pane.apply(DisplayMsg::Output("$ ".into()));
        pane.apply(DisplayMsg::Status("sent=2 failed=0 cmd=\"ls\"".into()));
        pane.apply(DisplayMsg::Exited);

        assert!(pane.exited);
        assert_eq!(
            pane.tail(3),
            vec!["[relay] sent=2 failed=0 cmd=\"ls\"", "[session ended]", "$ "]
        );
    }
}
