// Crypto module — secret hashing, HMAC signing, random generation.

pub mod random;
pub mod signing;

pub use random::{generate_access_code, generate_random_string};
pub use signing::{
    constant_time_equal, hash_secret, make_signature, sha256_hex, verify_signature,
};
