// src/chain/storage.rs
//! Storage-key layout of `SubtensorModule::TaoDividendsPerSubnet`, SS58 addresses and
//! SCALE value decoding.
//!
//! The map is a double map `(Identity u16 netuid, Blake2_128Concat AccountId) -> u64`, so a
//! full key is
//! `twox128("SubtensorModule") ++ twox128("TaoDividendsPerSubnet") ++ netuid_le ++
//!  blake2_128(account) ++ account`.

use crate::error::{DividendError, Result};
use blake2::digest::consts::U16;
use blake2::{Blake2b, Blake2b512, Digest};

type Blake2b128 = Blake2b<U16>;

/// twox128("SubtensorModule")
const PALLET_PREFIX: &str = "658faa385070e074c85bf6b568cf0555";
/// twox128("TaoDividendsPerSubnet")
const STORAGE_PREFIX: &str = "161711b56e44201be00565e057c65c77";

/// Generic Substrate address format, used by Bittensor.
pub const SS58_FORMAT: u8 = 42;

const ACCOUNT_LEN: usize = 32;
const SS58_CHECKSUM_LEN: usize = 2;
const FULL_KEY_LEN: usize = 32 + 2 + 16 + ACCOUNT_LEN;

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(trimmed).map_err(|e| DividendError::ParseError(format!("bad hex '{}': {}", raw, e)))
}

fn map_prefix() -> Vec<u8> {
    let mut prefix = Vec::with_capacity(32);
    // Both constants are valid hex literals.
    prefix.extend(hex::decode(PALLET_PREFIX).unwrap_or_default());
    prefix.extend(hex::decode(STORAGE_PREFIX).unwrap_or_default());
    prefix
}

/// Prefix covering every account of one subnet.
pub fn subnet_prefix(netuid: u16) -> Vec<u8> {
    let mut key = map_prefix();
    key.extend_from_slice(&netuid.to_le_bytes());
    key
}

pub fn dividend_key(netuid: u16, account: &[u8; ACCOUNT_LEN]) -> Vec<u8> {
    let mut key = subnet_prefix(netuid);
    key.extend_from_slice(&Blake2b128::digest(account));
    key.extend_from_slice(account);
    key
}

/// Recovers the account id from a full storage key.
pub fn account_from_key(key: &[u8]) -> Result<[u8; ACCOUNT_LEN]> {
    if key.len() != FULL_KEY_LEN {
        return Err(DividendError::ParseError(format!(
            "unexpected storage key length {} (expected {})",
            key.len(),
            FULL_KEY_LEN
        )));
    }
    let mut account = [0u8; ACCOUNT_LEN];
    account.copy_from_slice(&key[FULL_KEY_LEN - ACCOUNT_LEN..]);
    Ok(account)
}

fn ss58_checksum(payload: &[u8]) -> [u8; SS58_CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(b"SS58PRE");
    hasher.update(payload);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

pub fn ss58_encode(account: &[u8; ACCOUNT_LEN]) -> String {
    let mut payload = Vec::with_capacity(1 + ACCOUNT_LEN + SS58_CHECKSUM_LEN);
    payload.push(SS58_FORMAT);
    payload.extend_from_slice(account);
    let checksum = ss58_checksum(&payload);
    payload.extend_from_slice(&checksum);
    bs58::encode(payload).into_string()
}

pub fn ss58_decode(address: &str) -> Result<[u8; ACCOUNT_LEN]> {
    let invalid = |why: &str| DividendError::InvalidInput(format!("invalid SS58 address '{}': {}", address, why));

    let raw = bs58::decode(address)
        .into_vec()
        .map_err(|e| invalid(&e.to_string()))?;
    if raw.len() != 1 + ACCOUNT_LEN + SS58_CHECKSUM_LEN {
        return Err(invalid("wrong length"));
    }
    if raw[0] != SS58_FORMAT {
        return Err(invalid("unexpected network prefix"));
    }
    let (payload, checksum) = raw.split_at(1 + ACCOUNT_LEN);
    if ss58_checksum(payload) != checksum {
        return Err(invalid("checksum mismatch"));
    }
    let mut account = [0u8; ACCOUNT_LEN];
    account.copy_from_slice(&payload[1..]);
    Ok(account)
}

/// SCALE `u64` (little endian).
pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        DividendError::ParseError(format!("expected 8 bytes for u64, got {}", bytes.len()))
    })?;
    Ok(u64::from_le_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    fn alice() -> [u8; 32] {
        let mut account = [0u8; 32];
        account.copy_from_slice(&hex::decode(ALICE_HEX).unwrap());
        account
    }

    #[test]
    fn ss58_matches_well_known_address() {
        assert_eq!(ss58_encode(&alice()), ALICE);
        assert_eq!(ss58_decode(ALICE).unwrap(), alice());
    }

    #[test]
    fn ss58_rejects_corrupted_checksum() {
        let mut corrupted = ALICE.to_string();
        corrupted.replace_range(47.., "Z");
        assert!(matches!(ss58_decode(&corrupted), Err(DividendError::InvalidInput(_))));
        assert!(ss58_decode("not-base58-0OIl").is_err());
    }

    #[test]
    fn dividend_key_layout() {
        let key = dividend_key(18, &alice());
        assert_eq!(
            hex::encode(&key),
            concat!(
                "658faa385070e074c85bf6b568cf0555",
                "161711b56e44201be00565e057c65c77",
                "1200",
                "de1e86a9a8c739864cf3cc5ec2bea59f",
                "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d"
            )
        );
        assert!(key.starts_with(&subnet_prefix(18)));
        assert_eq!(account_from_key(&key).unwrap(), alice());
        assert!(account_from_key(&key[1..]).is_err());
    }

    #[test]
    fn decodes_scale_u64() {
        assert_eq!(decode_u64(&from_hex("0xfa00000000000000").unwrap()).unwrap(), 250);
        assert!(decode_u64(&[1, 2, 3]).is_err());
    }
}
