//! Identifier generation.
//!
//! An identifier is the table's prefix followed by a hyphenated UUIDv4.
//! The token comes from the OS CSPRNG, so independent processes minting
//! concurrently do not collide in practice.

use uuid::Uuid;

/// Mint a fresh identifier in the namespace `prefix`.
pub fn generate(prefix: &str) -> String {
    let token = Uuid::new_v4();
    let mut id = String::with_capacity(prefix.len() + 36);
    id.push_str(prefix);
    id.push_str(&token.hyphenated().to_string());
    id
}

/// True when `identifier` belongs to the namespace `prefix`.
pub fn has_prefix(identifier: &str, prefix: &str) -> bool {
    identifier.starts_with(prefix)
}
