//! Per-standard reads and revoke calldata.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

use crate::abi::{IERC1155, IERC20, IERC20Metadata, IERC721};
use crate::approval::{ApprovalKey, ApprovalRecord, TokenStandard};
use crate::chain::ChainReader;
use crate::GuardError;

async fn read<R, C>(reader: &R, contract: Address, call: C, what: &str) -> Result<C::Return, GuardError>
where
    R: ChainReader,
    C: SolCall + Send,
{
    let data = Bytes::from(call.abi_encode());
    let raw = reader
        .call(contract, data)
        .await
        .map_err(|e| GuardError::ProbeFailed(format!("{what} on {contract}: {e}")))?;
    C::abi_decode_returns(&raw)
        .map_err(|e| GuardError::ProbeFailed(format!("{what} on {contract} returned malformed data: {e}")))
}

/// Query the ERC-20 allowance that `owner` has granted to `spender`.
pub async fn allowance<R: ChainReader>(
    reader: &R,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, GuardError> {
    read(reader, token, IERC20::allowanceCall { owner, spender }, "allowance").await
}

/// Query the ERC-721 / ERC-1155 operator flag.
pub async fn is_approved_for_all<R: ChainReader>(
    reader: &R,
    standard: TokenStandard,
    contract: Address,
    owner: Address,
    operator: Address,
) -> Result<bool, GuardError> {
    match standard {
        TokenStandard::Erc1155 => {
            let call = IERC1155::isApprovedForAllCall { account: owner, operator };
            read(reader, contract, call, "isApprovedForAll").await
        }
        _ => {
            let call = IERC721::isApprovedForAllCall { owner, operator };
            read(reader, contract, call, "isApprovedForAll").await
        }
    }
}

/// Query the address approved for a single ERC-721 token.
pub async fn get_approved<R: ChainReader>(
    reader: &R,
    contract: Address,
    token_id: U256,
) -> Result<Address, GuardError> {
    read(reader, contract, IERC721::getApprovedCall { tokenId: token_id }, "getApproved").await
}

/// Query the current holder of an ERC-721 token.
pub async fn owner_of<R: ChainReader>(
    reader: &R,
    contract: Address,
    token_id: U256,
) -> Result<Address, GuardError> {
    read(reader, contract, IERC721::ownerOfCall { tokenId: token_id }, "ownerOf").await
}

/// The address `owner` has approved for `token_id`, or `None` when `owner`
/// does not hold the token or nothing is approved.
///
/// A per-token approval belongs to whoever holds the token, so one left on a
/// token that was transferred away is not the owner's to revoke.
pub async fn owned_token_approval<R: ChainReader>(
    reader: &R,
    contract: Address,
    owner: Address,
    token_id: U256,
) -> Result<Option<Address>, GuardError> {
    if owner_of(reader, contract, token_id).await? != owner {
        return Ok(None);
    }
    let approved = get_approved(reader, contract, token_id).await?;
    Ok((approved != Address::ZERO).then_some(approved))
}

pub async fn symbol<R: ChainReader>(reader: &R, token: Address) -> Result<String, GuardError> {
    read(reader, token, IERC20Metadata::symbolCall {}, "symbol").await
}

pub async fn name<R: ChainReader>(reader: &R, token: Address) -> Result<String, GuardError> {
    read(reader, token, IERC20Metadata::nameCall {}, "name").await
}

pub async fn decimals<R: ChainReader>(reader: &R, token: Address) -> Result<u8, GuardError> {
    read(reader, token, IERC20Metadata::decimalsCall {}, "decimals").await
}

/// Read the current on-chain state of `key` for `owner`.
///
/// Returns the live record, or `None` when the approval no longer exists.
pub async fn current_state<R: ChainReader>(
    reader: &R,
    owner: Address,
    key: &ApprovalKey,
) -> Result<Option<ApprovalRecord>, GuardError> {
    let record = match (key.standard, key.token_id) {
        (TokenStandard::Erc20, _) => {
            let amount = allowance(reader, key.contract, owner, key.spender).await?;
            Some(ApprovalRecord::erc20(key.contract, key.spender, amount))
        }
        (TokenStandard::Erc721, Some(token_id)) => {
            let approved = owned_token_approval(reader, key.contract, owner, token_id).await?;
            (approved == Some(key.spender))
                .then(|| ApprovalRecord::erc721_token(key.contract, key.spender, token_id))
        }
        (standard, _) => {
            let approved =
                is_approved_for_all(reader, standard, key.contract, owner, key.spender).await?;
            approved.then(|| match standard {
                TokenStandard::Erc1155 => {
                    ApprovalRecord::erc1155_operator(key.contract, key.spender)
                }
                _ => ApprovalRecord::erc721_operator(key.contract, key.spender),
            })
        }
    };
    Ok(record.filter(ApprovalRecord::is_active))
}

/// Whether `key` no longer grants spending rights on chain.
pub async fn is_revoked<R: ChainReader>(
    reader: &R,
    owner: Address,
    key: &ApprovalKey,
) -> Result<bool, GuardError> {
    Ok(current_state(reader, owner, key).await?.is_none())
}

/// Calldata that clears the approval identified by `key`.
///
/// - ERC-20: `approve(spender, 0)`
/// - ERC-721 single token: `approve(address(0), tokenId)`
/// - ERC-721 / ERC-1155 operator: `setApprovalForAll(spender, false)`
pub fn revoke_calldata(key: &ApprovalKey) -> Bytes {
    let encoded = match (key.standard, key.token_id) {
        (TokenStandard::Erc20, _) => IERC20::approveCall {
            spender: key.spender,
            value: U256::ZERO,
        }
        .abi_encode(),
        (TokenStandard::Erc721, Some(token_id)) => IERC721::approveCall {
            to: Address::ZERO,
            tokenId: token_id,
        }
        .abi_encode(),
        (TokenStandard::Erc721, None) => IERC721::setApprovalForAllCall {
            operator: key.spender,
            approved: false,
        }
        .abi_encode(),
        (TokenStandard::Erc1155, _) => IERC1155::setApprovalForAllCall {
            operator: key.spender,
            approved: false,
        }
        .abi_encode(),
    };
    Bytes::from(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, hex};

    const TOKEN: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
    const SPENDER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");

    #[test]
    fn test_erc20_revoke_calldata() {
        let key = ApprovalRecord::erc20(TOKEN, SPENDER, U256::from(5u64)).key();
        let data = revoke_calldata(&key);
        let expected = hex::decode(
            "095ea7b3\
             00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8\
             0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert_eq!(data.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_operator_revoke_calldata() {
        let key = ApprovalRecord::erc1155_operator(TOKEN, SPENDER).key();
        let data = revoke_calldata(&key);
        assert_eq!(&data[..4], &[0xa2, 0x2c, 0xb4, 0x65]);
        // approved == false
        assert!(data[36..68].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_token_revoke_targets_zero_address() {
        let key = ApprovalRecord::erc721_token(TOKEN, SPENDER, U256::from(5u64)).key();
        let decoded = IERC721::approveCall::abi_decode(&revoke_calldata(&key)).unwrap();
        assert_eq!(decoded.to, Address::ZERO);
        assert_eq!(decoded.tokenId, U256::from(5u64));
    }
}
