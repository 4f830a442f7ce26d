//! In-memory chain for exercising the engines without a node.
//!
//! [`MockChain`] decodes calldata with the same `sol!` bindings the engines
//! encode with and simulates ERC-20 allowances, ERC-721 token and operator
//! approvals, and ERC-1155 operator approvals. Reads against an address with
//! no deployed contract return empty data, as an `eth_call` to an EOA does.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;

use crate::abi::{IERC1155, IERC20, IERC20Metadata, IERC721};
use crate::chain::{ChainReader, ChainReceipt, ChainWriter};
use crate::GuardError;

#[derive(Debug, Default)]
struct Erc20State {
    symbol: String,
    decimals: u8,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Debug, Default)]
struct Erc721State {
    name: String,
    owners: HashMap<U256, Address>,
    token_approvals: HashMap<U256, Address>,
    operators: HashSet<(Address, Address)>,
}

#[derive(Debug, Default)]
struct Erc1155State {
    operators: HashSet<(Address, Address)>,
}

#[derive(Debug, Default)]
struct MockState {
    erc20: HashMap<Address, Erc20State>,
    erc721: HashMap<Address, Erc721State>,
    erc1155: HashMap<Address, Erc1155State>,
    offline: bool,
    /// Block number queries answered before going offline.
    block_queries_left: Option<usize>,
    failing_reads: HashSet<Address>,
    ignored_writes: HashSet<Address>,
    read_delay: Duration,
    receipt_delay: Duration,
    block: u64,
    /// 1-based send attempt number -> injected behaviour.
    send_failures: HashMap<usize, String>,
    reverts: HashSet<usize>,
    withheld_receipts: HashSet<usize>,
    send_attempts: usize,
    receipts: HashMap<TxHash, ChainReceipt>,
}

/// Simulated token contracts owned by a single signer.
#[derive(Debug)]
pub struct MockChain {
    signer: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    /// New chain whose transactions are sent from `signer`.
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            state: Mutex::new(MockState {
                block: 1,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn deploy_erc20(&self, token: Address, symbol: &str, decimals: u8) {
        self.state().erc20.insert(
            token,
            Erc20State {
                symbol: symbol.to_string(),
                decimals,
                ..Erc20State::default()
            },
        );
    }

    pub fn deploy_erc721(&self, contract: Address, name: &str) {
        self.state().erc721.insert(
            contract,
            Erc721State {
                name: name.to_string(),
                ..Erc721State::default()
            },
        );
    }

    pub fn deploy_erc1155(&self, contract: Address) {
        self.state().erc1155.insert(contract, Erc1155State::default());
    }

    /// Set an ERC-20 allowance directly, as `owner` calling `approve` would.
    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        if let Some(erc20) = self.state().erc20.get_mut(&token) {
            erc20.allowances.insert((owner, spender), amount);
        }
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state()
            .erc20
            .get(&token)
            .and_then(|t| t.allowances.get(&(owner, spender)).copied())
            .unwrap_or_default()
    }

    /// Set an operator flag on an ERC-721 or ERC-1155 contract.
    pub fn set_operator(&self, contract: Address, owner: Address, operator: Address, approved: bool) {
        let mut guard = self.state();
        let state = &mut *guard;
        let operators = if let Some(nft) = state.erc721.get_mut(&contract) {
            &mut nft.operators
        } else if let Some(multi) = state.erc1155.get_mut(&contract) {
            &mut multi.operators
        } else {
            return;
        };
        if approved {
            operators.insert((owner, operator));
        } else {
            operators.remove(&(owner, operator));
        }
    }

    pub fn operator_of(&self, contract: Address, owner: Address, operator: Address) -> bool {
        let state = self.state();
        state
            .erc721
            .get(&contract)
            .map(|n| n.operators.contains(&(owner, operator)))
            .or_else(|| {
                state
                    .erc1155
                    .get(&contract)
                    .map(|m| m.operators.contains(&(owner, operator)))
            })
            .unwrap_or(false)
    }

    pub fn mint_erc721(&self, contract: Address, token_id: U256, owner: Address) {
        if let Some(nft) = self.state().erc721.get_mut(&contract) {
            nft.owners.insert(token_id, owner);
        }
    }

    /// Approve `spender` for one token, as the token owner calling `approve` would.
    pub fn set_token_approval(&self, contract: Address, token_id: U256, spender: Address) {
        if let Some(nft) = self.state().erc721.get_mut(&contract) {
            nft.token_approvals.insert(token_id, spender);
        }
    }

    pub fn token_approval_of(&self, contract: Address, token_id: U256) -> Address {
        self.state()
            .erc721
            .get(&contract)
            .and_then(|n| n.token_approvals.get(&token_id).copied())
            .unwrap_or_default()
    }

    /// Move a token to `to`, clearing its single-token approval.
    pub fn transfer_erc721(&self, contract: Address, token_id: U256, to: Address) {
        if let Some(nft) = self.state().erc721.get_mut(&contract) {
            nft.owners.insert(token_id, to);
            nft.token_approvals.remove(&token_id);
        }
    }

    /// Answer `n` more block number queries, then go offline.
    pub fn go_offline_after_block_queries(&self, n: usize) {
        self.state().block_queries_left = Some(n);
    }

    /// Make every call fail as if no node were reachable.
    pub fn go_offline(&self) {
        self.state().offline = true;
    }

    pub fn go_online(&self) {
        self.state().offline = false;
    }

    /// Make reads against `contract` revert.
    pub fn fail_reads_from(&self, contract: Address) {
        self.state().failing_reads.insert(contract);
    }

    /// Accept transactions to `contract` without changing its state.
    pub fn ignore_writes_to(&self, contract: Address) {
        self.state().ignored_writes.insert(contract);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    pub fn set_receipt_delay(&self, delay: Duration) {
        self.state().receipt_delay = delay;
    }

    /// Reject the `nth` (1-based) submission with `reason`.
    pub fn fail_send(&self, nth: usize, reason: &str) {
        self.state().send_failures.insert(nth, reason.to_string());
    }

    /// Mine the `nth` (1-based) submission as reverted.
    pub fn revert_transaction(&self, nth: usize) {
        self.state().reverts.insert(nth);
    }

    /// Never confirm the `nth` (1-based) submission.
    pub fn withhold_receipt(&self, nth: usize) {
        self.state().withheld_receipts.insert(nth);
    }

    /// Number of transactions accepted for broadcast.
    pub fn transactions_sent(&self) -> usize {
        let state = self.state();
        state.send_attempts - state.send_failures.keys().filter(|n| **n <= state.send_attempts).count()
    }

    fn read(state: &MockState, to: Address, data: &[u8]) -> Result<Bytes, GuardError> {
        let revert = || GuardError::ChainError("execution reverted".to_string());
        if state.failing_reads.contains(&to) {
            return Err(revert());
        }
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(revert)?;

        if let Some(erc20) = state.erc20.get(&to) {
            let encoded = match selector {
                IERC20::allowanceCall::SELECTOR => {
                    let call = IERC20::allowanceCall::abi_decode(data).map_err(|_| revert())?;
                    let amount = erc20
                        .allowances
                        .get(&(call.owner, call.spender))
                        .copied()
                        .unwrap_or_default();
                    IERC20::allowanceCall::abi_encode_returns(&amount)
                }
                IERC20Metadata::symbolCall::SELECTOR => {
                    IERC20Metadata::symbolCall::abi_encode_returns(&erc20.symbol)
                }
                IERC20Metadata::decimalsCall::SELECTOR => {
                    IERC20Metadata::decimalsCall::abi_encode_returns(&erc20.decimals)
                }
                _ => return Err(revert()),
            };
            return Ok(Bytes::from(encoded));
        }

        if let Some(nft) = state.erc721.get(&to) {
            let encoded = match selector {
                IERC721::isApprovedForAllCall::SELECTOR => {
                    let call = IERC721::isApprovedForAllCall::abi_decode(data).map_err(|_| revert())?;
                    let approved = nft.operators.contains(&(call.owner, call.operator));
                    IERC721::isApprovedForAllCall::abi_encode_returns(&approved)
                }
                IERC721::getApprovedCall::SELECTOR => {
                    let call = IERC721::getApprovedCall::abi_decode(data).map_err(|_| revert())?;
                    if !nft.owners.contains_key(&call.tokenId) {
                        return Err(revert());
                    }
                    let approved = nft
                        .token_approvals
                        .get(&call.tokenId)
                        .copied()
                        .unwrap_or_default();
                    IERC721::getApprovedCall::abi_encode_returns(&approved)
                }
                IERC721::ownerOfCall::SELECTOR => {
                    let call = IERC721::ownerOfCall::abi_decode(data).map_err(|_| revert())?;
                    let owner = nft.owners.get(&call.tokenId).copied().ok_or_else(revert)?;
                    IERC721::ownerOfCall::abi_encode_returns(&owner)
                }
                IERC20Metadata::nameCall::SELECTOR => {
                    IERC20Metadata::nameCall::abi_encode_returns(&nft.name)
                }
                _ => return Err(revert()),
            };
            return Ok(Bytes::from(encoded));
        }

        if let Some(multi) = state.erc1155.get(&to) {
            let encoded = match selector {
                IERC1155::isApprovedForAllCall::SELECTOR => {
                    let call = IERC1155::isApprovedForAllCall::abi_decode(data).map_err(|_| revert())?;
                    let approved = multi.operators.contains(&(call.account, call.operator));
                    IERC1155::isApprovedForAllCall::abi_encode_returns(&approved)
                }
                _ => return Err(revert()),
            };
            return Ok(Bytes::from(encoded));
        }

        // No contract at this address
        Ok(Bytes::new())
    }

    /// Apply a transaction from `from`. Returns whether it succeeded.
    fn execute(state: &mut MockState, from: Address, to: Address, data: &[u8]) -> bool {
        if state.ignored_writes.contains(&to) {
            return true;
        }
        let Some(selector) = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) else {
            return false;
        };

        if let Some(erc20) = state.erc20.get_mut(&to) {
            return match IERC20::approveCall::abi_decode(data) {
                Ok(call) if selector == IERC20::approveCall::SELECTOR => {
                    erc20.allowances.insert((from, call.spender), call.value);
                    true
                }
                _ => false,
            };
        }

        if let Some(nft) = state.erc721.get_mut(&to) {
            return match selector {
                IERC721::setApprovalForAllCall::SELECTOR => {
                    match IERC721::setApprovalForAllCall::abi_decode(data) {
                        Ok(call) => {
                            if call.approved {
                                nft.operators.insert((from, call.operator));
                            } else {
                                nft.operators.remove(&(from, call.operator));
                            }
                            true
                        }
                        Err(_) => false,
                    }
                }
                IERC721::approveCall::SELECTOR => match IERC721::approveCall::abi_decode(data) {
                    Ok(call) => {
                        let Some(owner) = nft.owners.get(&call.tokenId).copied() else {
                            return false;
                        };
                        if owner != from && !nft.operators.contains(&(owner, from)) {
                            return false;
                        }
                        if call.to == Address::ZERO {
                            nft.token_approvals.remove(&call.tokenId);
                        } else {
                            nft.token_approvals.insert(call.tokenId, call.to);
                        }
                        true
                    }
                    Err(_) => false,
                },
                _ => false,
            };
        }

        if let Some(multi) = state.erc1155.get_mut(&to) {
            return match IERC1155::setApprovalForAllCall::abi_decode(data) {
                Ok(call) if selector == IERC1155::setApprovalForAllCall::SELECTOR => {
                    if call.approved {
                        multi.operators.insert((from, call.operator));
                    } else {
                        multi.operators.remove(&(from, call.operator));
                    }
                    true
                }
                _ => false,
            };
        }

        false
    }
}

fn offline_error() -> GuardError {
    GuardError::ProviderUnavailable("mock chain is offline".to_string())
}

impl ChainReader for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GuardError> {
        let delay = {
            let state = self.state();
            if state.offline {
                return Err(offline_error());
            }
            state.read_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        Self::read(&state, to, &data)
    }

    async fn block_number(&self) -> Result<u64, GuardError> {
        let mut state = self.state();
        match state.block_queries_left {
            Some(0) => {
                state.offline = true;
                state.block_queries_left = None;
            }
            Some(left) => state.block_queries_left = Some(left - 1),
            None => {}
        }
        if state.offline {
            return Err(offline_error());
        }
        Ok(state.block)
    }
}

impl ChainWriter for MockChain {
    fn signer_address(&self) -> Result<Address, GuardError> {
        Ok(self.signer)
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash, GuardError> {
        let mut state = self.state();
        if state.offline {
            return Err(offline_error());
        }
        state.send_attempts += 1;
        let nth = state.send_attempts;
        if let Some(reason) = state.send_failures.get(&nth) {
            return Err(GuardError::ChainError(reason.clone()));
        }

        let hash = keccak256((nth as u64).to_be_bytes());
        if state.withheld_receipts.contains(&nth) {
            return Ok(hash);
        }

        let success = !state.reverts.contains(&nth) && Self::execute(&mut state, self.signer, to, &data);
        state.block += 1;
        state.receipts.insert(
            hash,
            ChainReceipt {
                transaction_hash: hash,
                success,
                gas_used: if success { 46_000 } else { 21_000 },
            },
        );
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, GuardError> {
        let delay = self.state().receipt_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().receipts.get(&hash).copied())
    }
}
