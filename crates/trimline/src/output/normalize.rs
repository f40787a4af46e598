//! Line normalization applied before any other stage.
//!
//! Executors hand over text that still carries terminal artifacts: trailing
//! padding from column-aligned tools and carriage-return status updates that
//! a terminal would have overwritten in place. Both are rewritten here so the
//! compressor and the character accounting see one logical line per update.

/// Normalize raw command output.
///
/// - `\r\n` becomes `\n`; a lone `\r` starts a new line.
/// - Trailing whitespace is removed from every line.
/// - Trailing blank lines are dropped.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    for line in unified.split('\n') {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let kept = out.trim_end_matches('\n').len();
    out.truncate(kept);
    out
}
