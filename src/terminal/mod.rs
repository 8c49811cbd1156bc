//! Terminal handling for interactive mode
//!
//! Raw mode so single keypresses arrive immediately, plus the little
//! rendering the status line needs.

pub mod util;

pub use util::{get_terminal_size, is_tty, RawModeGuard};

use crate::session::words;

/// Render the status line for a session
///
/// The word being spoken is wrapped in brackets; the line is cut to
/// `width` columns around it.
pub fn status_line(text: &str, highlighted: Option<usize>, percent: f32, width: usize) -> String {
    let prefix = format!("[{:>3.0}%] ", percent.clamp(0.0, 100.0));
    let budget = width.saturating_sub(prefix.chars().count()).max(10);

    let mut rendered = Vec::new();
    let mut focus = 0;
    for (i, word) in words(text).into_iter().enumerate() {
        if Some(i) == highlighted {
            focus = rendered.iter().map(|w: &String| w.chars().count() + 1).sum();
            rendered.push(format!("[{}]", word));
        } else {
            rendered.push(word.to_string());
        }
    }
    let line: Vec<char> = rendered.join(" ").chars().collect();

    let start = if line.len() <= budget {
        0
    } else {
        focus.saturating_sub(budget / 3).min(line.len() - budget)
    };
    let end = (start + budget).min(line.len());
    let visible: String = line[start..end].iter().collect();

    format!("{}{}", prefix, visible)
}
