//! Cryptographic primitives shared by every flow.
//!
//! Everything that touches secrets lives here: password hashing, random token
//! generation, digests, and constant-time comparison. Handlers never hash or
//! compare secret material on their own.

pub mod password;
pub mod tokens;

pub use password::{hash_password, verify_password};
pub use tokens::{
    constant_time_eq, generate_token_base64url, generate_token_hex, pkce_challenge_s256,
    sha256_hex,
};
