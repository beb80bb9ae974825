use std::str::FromStr;

use ethers::{types::Address, utils::to_checksum};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address is not 20 hex-encoded bytes")]
    Malformed,
    #[error("address checksum mismatch")]
    BadChecksum,
}

/// Parses a wallet address the way wallets display it.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase and
/// all-uppercase input is accepted as is. The `0x` prefix is optional but
/// must be lowercase, and surrounding whitespace is rejected.
pub fn parse_wallet_address(raw: &str) -> Result<Address, AddressError> {
    if raw.is_empty() {
        return Err(AddressError::Empty);
    }
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::Malformed);
    }
    let address = Address::from_str(hex).map_err(|_| AddressError::Malformed)?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None)[2..] != *hex {
        return Err(AddressError::BadChecksum);
    }
    Ok(address)
}

/// EIP-55 display form, used for cache keys and responses.
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}
