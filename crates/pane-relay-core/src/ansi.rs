//! CSI/OSC escape stripping.
//!
//! Only the two escape families that commonly wrap visible text are
//! recognised. Any other `ESC x` pair loses its ESC and keeps `x`.

use std::{iter::Peekable, str::Chars};

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// Remove CSI and OSC sequences, keeping every other char in order.
///
/// Control chars other than ESC (CR, TAB, ...) are preserved.
#[must_use]
pub fn strip(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ESC {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                skip_csi(&mut chars);
            }
            Some(']') => {
                chars.next();
                skip_osc(&mut chars);
            }
            _ => {}
        }
    }

    out
}

/// Text suitable for searching pane history: escapes stripped, CR and DEL
/// dropped, and every control char except LF and TAB removed.
#[must_use]
pub fn normalize_for_search(chunk: &str) -> String {
    strip(chunk)
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_ascii_control())
        .collect()
}

// Parameters and intermediates run until the final byte in 0x40..=0x7E.
fn skip_csi(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if ('\x40'..='\x7e').contains(&c) {
            break;
        }
    }
}

// Terminated by BEL or ST (ESC \).
fn skip_osc(chars: &mut Peekable<Chars<'_>>) {
    while let Some(c) = chars.next() {
        if c == BEL {
            break;
        }
        if c == ESC && chars.peek() == Some(&'\\') {
            chars.next();
            break;
        }
    }
}
