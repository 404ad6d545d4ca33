use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    sol,
    sol_types::SolCall,
};

use crate::constants::{COLLATERAL_TOKEN_ADDRESS, CTF_CONTRACT_ADDRESS, REDEEM_INDEX_SETS};

use ConditionalTokens::redeemPositionsCall;

sol! {
    contract ConditionalTokens {
        function redeemPositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] calldata indexSets
        ) external;
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid condition id {input:?}: {reason}")]
pub struct InvalidConditionId {
    pub input: String,
    pub reason: String,
}

/// A single `redeemPositions` call, ready to be relayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemTransaction {
    pub condition_id: B256,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

pub fn with_hex_prefix(value: &str) -> String {
    if value.starts_with("0x") {
        value.to_string()
    } else {
        format!("0x{value}")
    }
}

pub fn normalize_condition_id(condition_id: &str) -> String {
    with_hex_prefix(condition_id.trim())
}

pub fn parse_condition_id(condition_id: &str) -> Result<B256, InvalidConditionId> {
    let normalized = normalize_condition_id(condition_id);

    B256::from_str(&normalized).map_err(|e| InvalidConditionId {
        input: condition_id.to_string(),
        reason: e.to_string(),
    })
}

pub fn build_redeem_tx(condition_id: &str) -> Result<RedeemTransaction, InvalidConditionId> {
    let condition_id = parse_condition_id(condition_id)?;

    let data = redeemPositionsCall {
        collateralToken: COLLATERAL_TOKEN_ADDRESS,
        parentCollectionId: B256::ZERO,
        conditionId: condition_id,
        indexSets: REDEEM_INDEX_SETS.iter().map(|&i| U256::from(i)).collect(),
    }
    .abi_encode();

    Ok(RedeemTransaction {
        condition_id,
        to: CTF_CONTRACT_ADDRESS,
        data: data.into(),
        value: U256::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use alloy::hex;

    use super::*;

    const CONDITION: &str = "571a3c90918ed50c6df079e880f40f73f4877b1b0636996e8bd2508b4d8e7ca3";

    #[test]
    fn hex_prefix_is_added_once() {
        assert_eq!(with_hex_prefix("abc"), "0xabc");
        assert_eq!(with_hex_prefix("0xabc"), "0xabc");
    }

    #[test]
    fn prefix_is_prepended_when_missing() {
        assert_eq!(normalize_condition_id(CONDITION), format!("0x{CONDITION}"));
    }

    #[test]
    fn prefixed_id_is_left_unchanged() {
        let prefixed = format!("0x{CONDITION}");
        assert_eq!(normalize_condition_id(&prefixed), prefixed);
    }

    #[test]
    fn both_spellings_build_the_same_call() {
        let bare = build_redeem_tx(CONDITION).unwrap();
        let prefixed = build_redeem_tx(&format!("0x{CONDITION}")).unwrap();

        assert_eq!(bare, prefixed);
    }

    #[test]
    fn encodes_redeem_positions_call() {
        let tx = build_redeem_tx(CONDITION).unwrap();

        assert_eq!(tx.to, CTF_CONTRACT_ADDRESS);
        assert_eq!(tx.value, U256::ZERO);
        // redeemPositions(address,bytes32,bytes32,uint256[])
        assert_eq!(&tx.data[..4], hex::decode("01b7037c").unwrap().as_slice());
        // selector + 4 head words + array length + two elements
        assert_eq!(tx.data.len(), 4 + 32 * 7);

        let decoded = redeemPositionsCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.collateralToken, COLLATERAL_TOKEN_ADDRESS);
        assert_eq!(decoded.parentCollectionId, B256::ZERO);
        assert_eq!(decoded.conditionId, tx.condition_id);
        assert_eq!(decoded.indexSets, vec![U256::from(1), U256::from(2)]);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(build_redeem_tx("0x1234").is_err());
        assert!(build_redeem_tx(&"zz".repeat(32)).is_err());
    }
}
