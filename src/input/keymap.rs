//! Key bindings for interactive mode

use std::collections::HashMap;

/// Key sequence type
pub type KeySequence = Vec<u8>;

/// Action bound to a key in interactive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Speak the text, or restart it from the beginning
    Speak,
    Stop,
    TogglePause,
    RefreshVoices,
    Quit,
}

/// One-line summary of the bindings, shown the first time
pub const SHORTCUT_HELP: &str =
    "Shortcuts: Enter speak/restart, Space pause/resume, Esc stop, r refresh voices, q quit";

/// Create the default keymap
pub fn create_default_keymap() -> HashMap<KeySequence, Shortcut> {
    let mut map = HashMap::new();

    // Enter arrives as CR in raw mode, LF from some terminals
    map.insert(b"\r".to_vec(), Shortcut::Speak);
    map.insert(b"\n".to_vec(), Shortcut::Speak);

    map.insert(b"\x1b".to_vec(), Shortcut::Stop);
    map.insert(b" ".to_vec(), Shortcut::TogglePause);

    map.insert(b"r".to_vec(), Shortcut::RefreshVoices);
    map.insert(b"R".to_vec(), Shortcut::RefreshVoices);

    map.insert(b"q".to_vec(), Shortcut::Quit);
    map.insert(b"Q".to_vec(), Shortcut::Quit);
    map.insert(b"\x03".to_vec(), Shortcut::Quit); // Ctrl-C
    map.insert(b"\x04".to_vec(), Shortcut::Quit); // Ctrl-D

    map
}

/// Split a read from stdin into shortcuts
///
/// A single read may carry several keypresses. Escape sequences (arrow
/// keys and the like) are skipped whole rather than read as Esc.
pub fn parse_input(keymap: &HashMap<KeySequence, Shortcut>, input: &[u8]) -> Vec<Shortcut> {
    let mut shortcuts = Vec::new();
    let mut i = 0;

    while i < input.len() {
        if input[i] == 0x1b && i + 1 < input.len() && matches!(input[i + 1], b'[' | b'O') {
            // CSI/SS3: skip to the final byte
            i += 2;
            while i < input.len() && !(0x40..=0x7e).contains(&input[i]) {
                i += 1;
            }
            i += 1;
            continue;
        }
        if let Some(shortcut) = keymap.get(&input[i..i + 1]) {
            shortcuts.push(*shortcut);
        }
        i += 1;
    }

    shortcuts
}
