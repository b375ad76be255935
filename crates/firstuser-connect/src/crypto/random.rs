// Random string generation for access codes, key ids and secrets.

use rand::Rng;

/// Character set: a-z, A-Z, 0-9, -, _
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

/// Length of a generated access code.
pub const ACCESS_CODE_LENGTH: usize = 32;

/// Generate a random string of the specified length from `[a-zA-Z0-9\-_]`.
pub fn generate_random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a one-time access code. The raw value is handed to the caller
/// exactly once; only its hash is ever persisted.
pub fn generate_access_code() -> String {
    generate_random_string(ACCESS_CODE_LENGTH)
}
