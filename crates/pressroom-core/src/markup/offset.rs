//! UTF-16 offset mapping.
//!
//! Telegram declares entity offsets in UTF-16 code units. Rust strings are
//! UTF-8, so every wire offset has to be translated to a byte position on a
//! code-point boundary before the text can be sliced.

/// Translates a UTF-16 code-unit offset into a byte index of `text`.
///
/// Offsets past the encoded length clamp to `text.len()`; upstream data can
/// be inconsistent after concurrent edits. An offset landing between the two
/// code units of a surrogate-pair character maps to the boundary *before*
/// that character, so a character is never split.
pub fn map_utf16_offset(text: &str, utf16_offset: u32) -> usize {
    let mut remaining = utf16_offset as usize;
    for (byte_idx, ch) in text.char_indices() {
        let units = ch.len_utf16();
        if remaining < units {
            return byte_idx;
        }
        remaining -= units;
    }
    text.len()
}
