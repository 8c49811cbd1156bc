//! Clipboard integration

use crate::{ReadAloudError, Result};
use arboard::Clipboard;
use log::debug;

/// Get text from system clipboard
pub fn get_from_clipboard() -> Result<String> {
    debug!("Getting text from clipboard");

    let mut clipboard = Clipboard::new()
        .map_err(|e| ReadAloudError::Other(format!("Failed to open clipboard: {}", e)))?;

    let text = clipboard
        .get_text()
        .map_err(|e| ReadAloudError::Other(format!("Failed to get from clipboard: {}", e)))?;

    debug!("Got {} chars from clipboard", text.len());
    Ok(text)
}
