// services/qr_service.rs
use rand::RngCore;
use subtle::ConstantTimeEq;

const TOKEN_BYTES: usize = 16;
const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Proof-of-pickup tokens. A token is minted when a driver is assigned and
/// consumed when the transfer starts; it is an opaque credential, carries no
/// decodable data, and is only ever compared against the stored value.
pub struct QrTokenService;

impl QrTokenService {
    /// 128 bits from the OS-seeded rng, hex-encoded.
    pub fn mint() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Constant-time comparison. Structurally invalid input (wrong length,
    /// non-hex) is false, never an error.
    pub fn verify(stored: &str, presented: &str) -> bool {
        if presented.len() != TOKEN_LEN || stored.len() != TOKEN_LEN {
            return false;
        }
        if !presented.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        stored.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1
    }
}
