//! Named virtual-key table.
//!
//! Input sequences refer to keys by name ("esc", "space", ...). Resolving the
//! name is separate from sending the key so an unknown name is reported before
//! anything reaches the OS.

/// Win32 virtual-key codes for the names the automation uses.
const VIRTUAL_KEYS: &[(&str, u16)] = &[
    ("backspace", 0x08),
    ("tab", 0x09),
    ("enter", 0x0D),
    ("shift", 0x10),
    ("ctrl", 0x11),
    ("alt", 0x12),
    ("caps_lock", 0x14),
    ("esc", 0x1B),
    ("space", 0x20),
    ("left_arrow", 0x25),
    ("up_arrow", 0x26),
    ("right_arrow", 0x27),
    ("down_arrow", 0x28),
    ("win", 0x5B),
];

/// Resolves a key name (case-insensitive) to its virtual-key code.
pub fn virtual_key(name: &str) -> Option<u16> {
    let lower = name.to_ascii_lowercase();

    // Single letters and digits map directly onto their ASCII uppercase code.
    if let [c] = lower.as_bytes() {
        if c.is_ascii_digit() || c.is_ascii_lowercase() {
            return Some(c.to_ascii_uppercase() as u16);
        }
    }

    VIRTUAL_KEYS
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(_, code)| *code)
}
