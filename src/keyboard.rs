//! Fixed US-QWERTY character to keystroke table.
//!
//! Keys are identified by Linux evdev keycodes (see `linux/input-event-codes.h`).
//! The table is deliberately static: it does not look at the host layout, so
//! characters that need another layout (or anything outside printable ASCII)
//! simply have no entry and are skipped by the caller.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

/// Reserved "no such key" value. Never produced by [`resolve`].
pub const KEY_RESERVED: u32 = 0;

pub const KEY_ESC: u32 = 1;

pub const KEY_1: u32 = 2;
pub const KEY_2: u32 = 3;
pub const KEY_3: u32 = 4;
pub const KEY_4: u32 = 5;
pub const KEY_5: u32 = 6;
pub const KEY_6: u32 = 7;
pub const KEY_7: u32 = 8;
pub const KEY_8: u32 = 9;
pub const KEY_9: u32 = 10;
pub const KEY_0: u32 = 11;

pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_I: u32 = 23;
pub const KEY_O: u32 = 24;
pub const KEY_P: u32 = 25;

pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;

pub const KEY_LEFTCTRL: u32 = 29;

pub const KEY_A: u32 = 30;
pub const KEY_S: u32 = 31;
pub const KEY_D: u32 = 32;
pub const KEY_F: u32 = 33;
pub const KEY_G: u32 = 34;
pub const KEY_H: u32 = 35;
pub const KEY_J: u32 = 36;
pub const KEY_K: u32 = 37;
pub const KEY_L: u32 = 38;

pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;

pub const KEY_LEFTSHIFT: u32 = 42;

pub const KEY_BACKSLASH: u32 = 43;

pub const KEY_Z: u32 = 44;
pub const KEY_X: u32 = 45;
pub const KEY_C: u32 = 46;
pub const KEY_V: u32 = 47;
pub const KEY_B: u32 = 48;
pub const KEY_N: u32 = 49;
pub const KEY_M: u32 = 50;

pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;

pub const KEY_RIGHTSHIFT: u32 = 54;

pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;

pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

/// Characters that need Shift on a US layout. Case folding does not apply to
/// these, so each one is listed with the key that produces it.
pub const SHIFTED_SYMBOLS: [(char, u32); 21] = [
    ('~', KEY_GRAVE),
    ('!', KEY_1),
    ('@', KEY_2),
    ('#', KEY_3),
    ('$', KEY_4),
    ('%', KEY_5),
    ('^', KEY_6),
    ('&', KEY_7),
    ('*', KEY_8),
    ('(', KEY_9),
    (')', KEY_0),
    ('_', KEY_MINUS),
    ('+', KEY_EQUAL),
    ('{', KEY_LEFTBRACE),
    ('}', KEY_RIGHTBRACE),
    ('|', KEY_BACKSLASH),
    (':', KEY_SEMICOLON),
    ('"', KEY_APOSTROPHE),
    ('<', KEY_COMMA),
    ('>', KEY_DOT),
    ('?', KEY_SLASH),
];

fn letter_keycode(upper: char) -> Option<u32> {
    let keycode = match upper {
        'A' => KEY_A,
        'B' => KEY_B,
        'C' => KEY_C,
        'D' => KEY_D,
        'E' => KEY_E,
        'F' => KEY_F,
        'G' => KEY_G,
        'H' => KEY_H,
        'I' => KEY_I,
        'J' => KEY_J,
        'K' => KEY_K,
        'L' => KEY_L,
        'M' => KEY_M,
        'N' => KEY_N,
        'O' => KEY_O,
        'P' => KEY_P,
        'Q' => KEY_Q,
        'R' => KEY_R,
        'S' => KEY_S,
        'T' => KEY_T,
        'U' => KEY_U,
        'V' => KEY_V,
        'W' => KEY_W,
        'X' => KEY_X,
        'Y' => KEY_Y,
        'Z' => KEY_Z,
        _ => return None,
    };
    Some(keycode)
}

fn unshifted_keycode(c: char) -> Option<u32> {
    let keycode = match c {
        '1' => KEY_1,
        '2' => KEY_2,
        '3' => KEY_3,
        '4' => KEY_4,
        '5' => KEY_5,
        '6' => KEY_6,
        '7' => KEY_7,
        '8' => KEY_8,
        '9' => KEY_9,
        '0' => KEY_0,
        '`' => KEY_GRAVE,
        '-' => KEY_MINUS,
        '=' => KEY_EQUAL,
        '[' => KEY_LEFTBRACE,
        ']' => KEY_RIGHTBRACE,
        '\\' => KEY_BACKSLASH,
        ';' => KEY_SEMICOLON,
        '\'' => KEY_APOSTROPHE,
        ',' => KEY_COMMA,
        '.' => KEY_DOT,
        '/' => KEY_SLASH,
        ' ' => KEY_SPACE,
        '\n' => KEY_ENTER,
        '\t' => KEY_TAB,
        _ => return None,
    };
    Some(keycode)
}

fn shifted_keycode(c: char) -> Option<u32> {
    SHIFTED_SYMBOLS
        .iter()
        .find(|(symbol, _)| *symbol == c)
        .map(|(_, keycode)| *keycode)
}

/// Resolve a character to the keystroke that types it on a US layout.
///
/// Returns `None` for anything outside the fixed table (including `'\r'`,
/// so CRLF text produces one Enter per line).
pub fn resolve(c: char) -> Option<KeyStroke> {
    if c.is_ascii_alphabetic() {
        return letter_keycode(c.to_ascii_uppercase()).map(|keycode| KeyStroke {
            keycode,
            shift: c.is_ascii_uppercase(),
        });
    }

    if let Some(keycode) = unshifted_keycode(c) {
        return Some(KeyStroke {
            keycode,
            shift: false,
        });
    }

    shifted_keycode(c).map(|keycode| KeyStroke {
        keycode,
        shift: true,
    })
}

pub fn is_fully_typable(text: &str) -> bool {
    text.chars().all(|c| resolve(c).is_some())
}

pub fn find_first_unsupported_char(text: &str) -> Option<(usize, char)> {
    text.char_indices().find(|&(_idx, c)| resolve(c).is_none())
}

/// Distinct characters of `text` that have no keystroke, in first-seen order.
pub fn unsupported_chars(text: &str) -> Vec<char> {
    let mut out: Vec<char> = Vec::new();
    for c in text.chars() {
        if resolve(c).is_none() && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Every character the table can type, in a stable order.
pub fn typable_chars() -> impl Iterator<Item = char> {
    ['\n', '\t', ' ']
        .into_iter()
        .chain((33u8..=126u8).map(char::from))
        .filter(|c| resolve(*c).is_some())
}
