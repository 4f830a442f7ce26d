//! Solidity bindings for the token standards probed and revoked by this crate.
//!
//! Calldata is built with `SolCall::abi_encode` and return data decoded with
//! `SolCall::abi_decode_returns`, so selectors and argument layout match the
//! standard ABIs bit for bit.

use alloy::sol;

sol! {
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }

    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }

    interface IERC721 {
        function isApprovedForAll(address owner, address operator) external view returns (bool);
        function setApprovalForAll(address operator, bool approved) external;
        function getApproved(uint256 tokenId) external view returns (address);
        function approve(address to, uint256 tokenId) external;
        function ownerOf(uint256 tokenId) external view returns (address);
    }

    interface IERC1155 {
        function isApprovedForAll(address account, address operator) external view returns (bool);
        function setApprovalForAll(address operator, bool approved) external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_selectors_match_standard_abi() {
        assert_eq!(IERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IERC721::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IERC721::isApprovedForAllCall::SELECTOR, [0xe9, 0x85, 0xe9, 0xc5]);
        assert_eq!(IERC1155::isApprovedForAllCall::SELECTOR, [0xe9, 0x85, 0xe9, 0xc5]);
        assert_eq!(IERC721::setApprovalForAllCall::SELECTOR, [0xa2, 0x2c, 0xb4, 0x65]);
        assert_eq!(IERC721::getApprovedCall::SELECTOR, [0x08, 0x18, 0x12, 0xfc]);
    }
}
