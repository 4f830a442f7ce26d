//! Address parsing and display helpers.
//!
//! Every string address entering the crate goes through [`parse_address`]
//! before any network call is made.

use alloy::primitives::Address;

use crate::GuardError;

/// Parse a `0x`-prefixed 20-byte hex address.
///
/// All-lowercase and all-uppercase input is accepted as-is. Mixed-case input
/// must carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address, GuardError> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| GuardError::InvalidAddress(format!("missing 0x prefix: {trimmed:?}")))?;

    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GuardError::InvalidAddress(format!(
            "expected 40 hex characters: {trimmed:?}"
        )));
    }

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        let normalized = format!("0x{hex}");
        return Address::parse_checksummed(&normalized, None)
            .map_err(|e| GuardError::InvalidAddress(format!("bad checksum {trimmed:?}: {e}")));
    }

    hex.parse::<Address>()
        .map_err(|e| GuardError::InvalidAddress(format!("{trimmed:?}: {e}")))
}

/// Parse an address that must also be non-zero (owners, contracts, spenders).
pub fn parse_account(input: &str) -> Result<Address, GuardError> {
    let address = parse_address(input)?;
    if address == Address::ZERO {
        return Err(GuardError::InvalidAddress(
            "zero address is not a valid account".to_string(),
        ));
    }
    Ok(address)
}

/// Truncated checksummed form, e.g. `0x5FbD...0aa3`.
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Serde adapter that routes deserialized addresses through [`parse_address`].
pub(crate) fn deserialize_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
    parse_address(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_parse_checksummed() {
        let addr = parse_address(TOKEN).unwrap();
        assert_eq!(addr.to_checksum(None), TOKEN);
    }

    #[test]
    fn test_parse_lowercase_canonicalizes() {
        let addr = parse_address(&TOKEN.to_lowercase()).unwrap();
        assert_eq!(addr.to_string(), TOKEN);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "0x", "5FbDB2315678afecb367f032d93F642f64180aa3", "0x1234", "0xZZbDB2315678afecb367f032d93F642f64180aa3"] {
            assert!(
                matches!(parse_address(bad), Err(GuardError::InvalidAddress(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_rejects_bad_checksum() {
        // Flip the case of one letter in a checksummed address
        let bad = "0x5fbDB2315678afecb367f032d93F642f64180aa3";
        assert!(matches!(parse_address(bad), Err(GuardError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_account_rejects_zero() {
        let zero = format!("0x{}", "0".repeat(40));
        assert!(parse_address(&zero).is_ok());
        assert!(matches!(parse_account(&zero), Err(GuardError::InvalidAddress(_))));
    }

    #[test]
    fn test_short_address() {
        let addr = parse_address(TOKEN).unwrap();
        assert_eq!(short_address(&addr), "0x5FbD...0aa3");
    }
}
