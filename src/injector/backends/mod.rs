#[cfg(feature = "wayland")]
pub mod wayland;

#[cfg(feature = "x11")]
pub mod x11;

// Modifiers released on connect and on drop, so a run neither starts nor ends
// with one stuck down. If the user is physically holding one of these, the
// target app may briefly disagree about modifier state until it is tapped again.
pub(crate) const COMMON_MODIFIER_KEYCODES: [u32; 6] = [
    crate::keyboard::KEY_LEFTSHIFT,
    crate::keyboard::KEY_RIGHTSHIFT,
    crate::keyboard::KEY_LEFTCTRL,
    crate::keyboard::KEY_RIGHTCTRL,
    crate::keyboard::KEY_LEFTALT,
    crate::keyboard::KEY_RIGHTALT,
];

#[cfg(test)]
mod tests {
    use super::COMMON_MODIFIER_KEYCODES;
    use crate::keyboard::{KEY_LEFTSHIFT, KEY_RESERVED};

    #[test]
    fn common_modifiers_include_the_shift_used_for_typing() {
        assert!(COMMON_MODIFIER_KEYCODES.contains(&KEY_LEFTSHIFT));
        assert!(!COMMON_MODIFIER_KEYCODES.contains(&KEY_RESERVED));
    }
}
