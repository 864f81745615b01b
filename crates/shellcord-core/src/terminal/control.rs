//! Translation of chat input into terminal bytes

/// Control byte for a caret token such as `^C`
#[must_use]
pub fn control_byte(token: &str) -> Option<u8> {
    match token.trim().to_ascii_uppercase().as_str() {
        "^C" => Some(0x03),
        "^D" => Some(0x04),
        "^V" => Some(0x16),
        "^X" => Some(0x18),
        "^Z" => Some(0x1a),
        "^\\" => Some(0x1c),
        _ => None,
    }
}

/// Bytes to write for one line of controller input.
///
/// A control token becomes its single byte; anything else is sent as typed
/// followed by a newline.
#[must_use]
pub fn translate_input(text: &str) -> Vec<u8> {
    match control_byte(text) {
        Some(byte) => vec![byte],
        None => format!("{}\n", text).into_bytes(),
    }
}
