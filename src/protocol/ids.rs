//! Deterministic identifiers.
//!
//! ```text
//!   market_id = SHA256( token[20] | strike as uint256 BE[32] | underlying[20] )
//!   epoch_id  = SHA256( market_id[32] | begin u64 BE | end u64 BE )
//!   vault     = SHA256( "vault" | market_id[32] | side )[..20]
//! ```
//!
//! Ids are pure functions of their content. Callers check them against the
//! set of existing ids before inserting.

use super::types::{Address, Amount, EpochId, MarketId, Timestamp, VaultSide};
use sha2::{Digest, Sha256};

fn strike_word(strike: Amount) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&strike.to_be_bytes());
    word
}

pub fn market_id(token: Address, strike: Amount, underlying: Address) -> MarketId {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(strike_word(strike));
    hasher.update(underlying.as_bytes());
    MarketId(hasher.finalize().into())
}

pub fn epoch_id(market_id: MarketId, begin: Timestamp, end: Timestamp) -> EpochId {
    let mut hasher = Sha256::new();
    hasher.update(market_id.as_bytes());
    hasher.update(begin.to_be_bytes());
    hasher.update(end.to_be_bytes());
    EpochId(hasher.finalize().into())
}

pub fn vault_address(market_id: MarketId, side: VaultSide) -> Address {
    let mut label = Vec::with_capacity(5 + 32 + 1);
    label.extend_from_slice(b"vault");
    label.extend_from_slice(market_id.as_bytes());
    label.push(side.index() as u8);
    Address::derive(label)
}

pub fn controller_address(factory: Address, nonce: u64) -> Address {
    let mut label = Vec::with_capacity(10 + 20 + 8);
    label.extend_from_slice(b"controller");
    label.extend_from_slice(factory.as_bytes());
    label.extend_from_slice(&nonce.to_be_bytes());
    Address::derive(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::WAD;

    #[test]
    fn test_market_id_is_content_addressed() {
        let token = Address::derive("usdc");
        let weth = Address::derive("weth");
        let a = market_id(token, WAD, weth);
        let b = market_id(token, WAD, weth);
        let c = market_id(token, WAD - 1, weth);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_epoch_id_depends_on_window() {
        let market = market_id(Address::derive("usdc"), WAD, Address::derive("weth"));
        assert_ne!(epoch_id(market, 10, 20), epoch_id(market, 10, 21));
        assert_eq!(epoch_id(market, 10, 20), epoch_id(market, 10, 20));
    }

    #[test]
    fn test_vault_addresses_differ_per_side() {
        let market = market_id(Address::derive("usdc"), WAD, Address::derive("weth"));
        assert_ne!(
            vault_address(market, VaultSide::Premium),
            vault_address(market, VaultSide::Collateral)
        );
    }
}
