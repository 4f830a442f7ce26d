use std::fmt;

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize, Serializer};

use crate::address::short_address;
use crate::constants::{ALL_ITEMS_LABEL, ALL_NFTS_LABEL, MAX_TOKEN_DECIMALS, UNLIMITED_LABEL};

/// Token standards with distinct approval models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenStandard {
    /// Per-spender numeric allowance.
    #[serde(rename = "ERC20", alias = "erc20")]
    Erc20,
    /// Per-token approval plus collection-wide operator approval.
    #[serde(rename = "ERC721", alias = "erc721")]
    Erc721,
    /// Collection-wide operator approval only.
    #[serde(rename = "ERC1155", alias = "erc1155")]
    Erc1155,
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenStandard::Erc20 => "ERC20",
            TokenStandard::Erc721 => "ERC721",
            TokenStandard::Erc1155 => "ERC1155",
        };
        f.write_str(name)
    }
}

/// Identity of an approval: `(standard, contract, spender, token_id)`.
///
/// `token_id` is `Some` only for ERC-721 single-token approvals, so an
/// operator-wide approval and a per-token approval for the same spender are
/// distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalKey {
    pub standard: TokenStandard,
    pub contract: Address,
    pub spender: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<U256>,
}

impl fmt::Display for ApprovalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.standard, self.contract, self.spender)?;
        if let Some(id) = self.token_id {
            write!(f, ":#{id}")?;
        }
        Ok(())
    }
}

/// A spending permission currently granted by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub standard: TokenStandard,
    pub contract: Address,
    pub spender: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<U256>,
    /// Raw ERC-20 allowance. `None` for NFT approvals.
    #[serde(serialize_with = "serialize_amount", skip_serializing_if = "Option::is_none")]
    pub amount: Option<U256>,
    pub is_unlimited: bool,
    pub asset_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spender_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    pub value_at_risk: String,
}

impl ApprovalRecord {
    /// ERC-20 allowance of `amount` raw units.
    pub fn erc20(contract: Address, spender: Address, amount: U256) -> Self {
        Self::build(TokenStandard::Erc20, contract, spender, None, Some(amount))
    }

    /// ERC-721 collection-wide operator approval.
    pub fn erc721_operator(contract: Address, spender: Address) -> Self {
        Self::build(TokenStandard::Erc721, contract, spender, None, None)
    }

    /// ERC-721 approval of a single token.
    pub fn erc721_token(contract: Address, spender: Address, token_id: U256) -> Self {
        Self::build(TokenStandard::Erc721, contract, spender, Some(token_id), None)
    }

    /// ERC-1155 collection-wide operator approval.
    pub fn erc1155_operator(contract: Address, spender: Address) -> Self {
        Self::build(TokenStandard::Erc1155, contract, spender, None, None)
    }

    fn build(
        standard: TokenStandard,
        contract: Address,
        spender: Address,
        token_id: Option<U256>,
        amount: Option<U256>,
    ) -> Self {
        let mut record = Self {
            standard,
            contract,
            spender,
            token_id,
            amount,
            is_unlimited: amount == Some(U256::MAX),
            asset_label: short_address(&contract),
            spender_label: None,
            symbol: None,
            decimals: None,
            value_at_risk: String::new(),
        };
        record.refresh_value_at_risk();
        record
    }

    pub fn key(&self) -> ApprovalKey {
        ApprovalKey {
            standard: self.standard,
            contract: self.contract,
            spender: self.spender,
            token_id: self.token_id,
        }
    }

    /// Whether this record still grants spending rights. Revoked approvals are
    /// represented by absence, so inactive records are never stored.
    pub fn is_active(&self) -> bool {
        match self.standard {
            TokenStandard::Erc20 => self.amount.is_some_and(|a| !a.is_zero()),
            _ => self.spender != Address::ZERO,
        }
    }

    /// Set the ERC-20 symbol and decimals and recompute the display strings.
    pub fn set_token_metadata(&mut self, symbol: Option<String>, decimals: Option<u8>) {
        if let Some(symbol) = symbol {
            self.asset_label = symbol.clone();
            self.symbol = Some(symbol);
        }
        if decimals.is_some() {
            self.decimals = decimals;
        }
        self.refresh_value_at_risk();
    }

    pub fn set_asset_label(&mut self, label: impl Into<String>) {
        self.asset_label = label.into();
        self.refresh_value_at_risk();
    }

    fn refresh_value_at_risk(&mut self) {
        self.value_at_risk = match (self.standard, self.token_id) {
            (TokenStandard::Erc20, _) => {
                let amount = self.amount.unwrap_or_default();
                if self.is_unlimited {
                    UNLIMITED_LABEL.to_string()
                } else {
                    let shown = match self.decimals {
                        Some(decimals) => format_amount(amount, decimals),
                        None => amount.to_string(),
                    };
                    match &self.symbol {
                        Some(symbol) => format!("{shown} {symbol}"),
                        None => shown,
                    }
                }
            }
            (TokenStandard::Erc721, Some(id)) => format!("Token #{id}"),
            (TokenStandard::Erc721, None) => ALL_NFTS_LABEL.to_string(),
            (TokenStandard::Erc1155, _) => ALL_ITEMS_LABEL.to_string(),
        };
    }
}

/// Format a raw token amount with `decimals` places, trimming trailing zeros.
///
/// Falls back to the raw integer when `decimals` exceeds what U256 can scale.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if decimals > MAX_TOKEN_DECIMALS {
        return amount.to_string();
    }
    match format_units(amount, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => amount.to_string(),
    }
}

fn serialize_amount<S: Serializer>(amount: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
    match amount {
        Some(value) => serializer.serialize_str(&value.to_string()),
        None => serializer.serialize_none(),
    }
}
