//! Keyboard input for interactive mode

pub mod keymap;

pub use keymap::{create_default_keymap, parse_input, KeySequence, Shortcut, SHORTCUT_HELP};
