//! Human-readable public codes
//!
//! Account ids are long base58 strings. For log lines and verbal
//! verification we show a short digit code instead.

use sha2::{Digest, Sha256};

const CODE_DIGITS: usize = 20;
const GROUP_SIZE: usize = 4;

/// Format an account id as `dddd.dddd.dddd.dddd.dddd`.
///
/// Digits come from the SHA-256 of the account id's decoded key bytes. An
/// account id that is not valid base58 is hashed as raw text.
pub fn formatted_public_code(account_id: &str) -> String {
    let key_bytes = bs58::decode(account_id)
        .into_vec()
        .unwrap_or_else(|_| account_id.as_bytes().to_vec());
    let digest = Sha256::digest(&key_bytes);

    let digits: Vec<char> = digest
        .iter()
        .take(CODE_DIGITS)
        .map(|b| char::from(b'0' + b % 10))
        .collect();

    digits
        .chunks(GROUP_SIZE)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AccountKeypair;

    #[test]
    fn test_public_code_shape() {
        let code = formatted_public_code(&AccountKeypair::generate().account_id());
        let groups: Vec<&str> = code.split('.').collect();
        assert_eq!(groups.len(), 5);
        assert!(groups
            .iter()
            .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn test_public_code_differs_between_accounts() {
        let a = formatted_public_code(&AccountKeypair::from_seed(&[1u8; 32]).account_id());
        let b = formatted_public_code(&AccountKeypair::from_seed(&[2u8; 32]).account_id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_public_code_of_garbage_account() {
        let code = formatted_public_code("0OIl");
        assert_eq!(code.len(), 24);
    }
}
