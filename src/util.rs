pub mod blob;
pub mod validating_body;

/// Lower-case hex SHA-256 of the given bytes
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}
