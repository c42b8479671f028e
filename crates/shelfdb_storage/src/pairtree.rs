//! Pairtree path codec.
//!
//! Maps an object key to a short, filesystem-safe directory chain and back.
//! Encoding happens in three steps:
//!
//! 1. Reserved characters are escaped to a three character `^hh` token.
//! 2. `/`, `:` and `.` are substituted with `=`, `+` and `,`.
//! 3. The result is split into two character segments (the last one may be
//!    a single character), each followed by a separator.
//!
//! Grouping counts Unicode scalar values, not bytes, so `"Hänggi-P"` becomes
//! `Hä/ng/gi/-P/`. Every reserved character is escaped before step two, so
//! the mapping is injective and [`decode`] inverts [`encode`] exactly.
//!
//! ```rust
//! use shelfdb_storage::pairtree;
//!
//! assert_eq!(pairtree::encode("abcdefg"), "ab/cd/ef/g/");
//! assert_eq!(pairtree::decode("ab/cd/ef/g/"), "abcdefg");
//! ```

use std::path::PathBuf;

/// Separator used in stored pairtree paths.
pub const SEPARATOR: char = '/';

/// Characters escaped in step one, with their hex token.
const RESERVED: [(char, &str); 12] = [
    (' ', "20"),
    ('"', "22"),
    ('*', "2a"),
    ('+', "2b"),
    (',', "2c"),
    ('<', "3c"),
    ('=', "3d"),
    ('>', "3e"),
    ('?', "3f"),
    ('\\', "5c"),
    ('^', "5e"),
    ('|', "7c"),
];

/// Characters substituted in step two.
const SUBSTITUTED: [(char, char); 3] = [('/', '='), (':', '+'), ('.', ',')];

fn escape_token(c: char) -> Option<&'static str> {
    RESERVED
        .iter()
        .find_map(|(reserved, hex)| (*reserved == c).then_some(*hex))
}

fn unescape_token(hex: &str) -> Option<char> {
    RESERVED
        .iter()
        .find_map(|(reserved, token)| token.eq_ignore_ascii_case(hex).then_some(*reserved))
}

/// Applies the two substitution steps without grouping.
#[must_use]
pub fn char_encode(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if let Some(hex) = escape_token(c) {
            out.push('^');
            out.push_str(hex);
        } else if let Some((_, safe)) = SUBSTITUTED.iter().find(|(from, _)| *from == c) {
            out.push(*safe);
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverses [`char_encode`].
///
/// Step two is undone first, then `^hh` tokens are expanded left to right.
/// A `^` that does not start a known token is kept as is.
#[must_use]
pub fn char_decode(encoded: &str) -> String {
    let unsubstituted: Vec<char> = encoded
        .chars()
        .map(|c| {
            SUBSTITUTED
                .iter()
                .find_map(|(from, safe)| (*safe == c).then_some(*from))
                .unwrap_or(c)
        })
        .collect();

    let mut out = String::with_capacity(encoded.len());
    let mut i = 0;
    while i < unsubstituted.len() {
        let c = unsubstituted[i];
        if c == '^' && i + 2 < unsubstituted.len() {
            let hex: String = unsubstituted[i + 1..i + 3].iter().collect();
            if let Some(original) = unescape_token(&hex) {
                out.push(original);
                i += 3;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Encodes a key into a pairtree path using `/` separators.
///
/// The empty key encodes to the empty path.
#[must_use]
pub fn encode(key: &str) -> String {
    let encoded: Vec<char> = char_encode(key).chars().collect();
    let mut path = String::with_capacity(encoded.len() * 3 / 2 + 1);
    for pair in encoded.chunks(2) {
        path.extend(pair);
        path.push(SEPARATOR);
    }
    path
}

/// Encodes a key into a relative filesystem path using the platform separator.
#[must_use]
pub fn encode_path(key: &str) -> PathBuf {
    let encoded: Vec<char> = char_encode(key).chars().collect();
    encoded
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect()
}

/// Decodes a pairtree path back into the key it was produced from.
///
/// Both `/` and the platform separator are accepted. Walking stops after a
/// single character segment or at the first segment longer than two
/// characters, which marks the start of the object's own files.
#[must_use]
pub fn decode(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for segment in path.split(|c| c == SEPARATOR || c == std::path::MAIN_SEPARATOR) {
        match segment.chars().count() {
            0 => continue,
            1 => {
                encoded.push_str(segment);
                break;
            }
            2 => encoded.push_str(segment),
            _ => break,
        }
    }
    char_decode(&encoded)
}
