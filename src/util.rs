//! Small utility helpers used across modules.

use rand::Rng;

const PARTICIPANT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a participant id: 'P' followed by 6 random alphanumerics,
/// e.g. "P3K9M2A". Short on purpose so subjects can read it back to us.
pub fn generate_participant_id() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(7);
    out.push('P');
    for _ in 0..6 {
        let idx = rng.gen_range(0..PARTICIPANT_ALPHABET.len());
        out.push(PARTICIPANT_ALPHABET[idx] as char);
    }
    out
}

/// True when `id` matches the `P` + 6 alphanumerics shape we mint.
pub fn is_valid_participant_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 7
        && bytes[0] == b'P'
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}… ({} bytes total)", &s[..end], s.len())
    }
}
