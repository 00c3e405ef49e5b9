//! Small helpers shared across crates.

/// Upper bound for `error_message` stored in the registry.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Truncate an error message to at most `max_chars` characters.
///
/// Counts Unicode scalar values so a multi-byte character is never split.
pub fn truncate_error_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
