//! The two invoke transactions this client knows how to request.

use shared::protocol::{Call, ExecutionRequest, InvokeTransactionParams};

/// ETH ERC-20 contract on Starknet.
pub const ETH_CONTRACT_ADDRESS: &str =
    "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";
pub const TRANSFER_ENTRYPOINT: &str = "transfer";
/// 1 wei, low half of a u256.
pub const ONE_WEI_LOW: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
pub const ZERO_HIGH: &str = "0x0";

const MULTI_CALL_TOKEN: &str = "0x4718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";
const MULTI_CALL_TARGET: &str = "0x44aa20c51f815974487cbe06ae547a16690d4ca7f8c703aa8bbffe6d7393d46";

fn call(contract_address: &str, entrypoint: &str, calldata: &[&str]) -> Call {
    Call {
        contract_address: contract_address.to_string(),
        entrypoint: entrypoint.to_string(),
        calldata: calldata.iter().map(|felt| felt.to_string()).collect(),
    }
}

pub fn fixed_multi_call_calls() -> Vec<Call> {
    vec![
        call(
            MULTI_CALL_TOKEN,
            "0x219209e083275171774dab1df80982e9df2096516f06319c5c6d71ae0a8480c",
            &[MULTI_CALL_TARGET, "0x56bc75e2d63100000", "0x0"],
        ),
        call(
            MULTI_CALL_TARGET,
            "0xd5c0f26335ab142eb700850eded4619418b0f6e98c5b92a6347b68d2f2a0c",
            &[
                "0x2d09ca739a6d3a5bed6ae8a3190db0966d57f4c4fff34e19738990596879904",
                MULTI_CALL_TOKEN,
                "0x56bc75e2d63100000",
                "0x0",
                "0x2a4c56a99f93d0b19f9a3b09640cb9fd1f4c426474a85dedfec573849ab6235",
            ],
        ),
    ]
}

pub fn fixed_multi_call(account_address: &str) -> InvokeTransactionParams {
    InvokeTransactionParams {
        account_address: account_address.to_string(),
        execution_request: ExecutionRequest {
            calls: fixed_multi_call_calls(),
        },
    }
}

/// Sends 1 wei of ETH from `account_address` back to itself.
pub fn eth_self_transfer(account_address: &str) -> InvokeTransactionParams {
    InvokeTransactionParams {
        account_address: account_address.to_string(),
        execution_request: ExecutionRequest {
            calls: vec![call(
                ETH_CONTRACT_ADDRESS,
                TRANSFER_ENTRYPOINT,
                &[account_address, ONE_WEI_LOW, ZERO_HIGH],
            )],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_transfer_targets_eth_contract_with_self_as_recipient() {
        let tx = eth_self_transfer("0xABC");
        assert_eq!(tx.account_address, "0xABC");

        let calls = &tx.execution_request.calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].contract_address, ETH_CONTRACT_ADDRESS);
        assert_eq!(calls[0].entrypoint, "transfer");
        assert_eq!(calls[0].calldata, vec!["0xABC", ONE_WEI_LOW, "0x0"]);
    }

    #[test]
    fn multi_call_is_independent_of_account() {
        let first = fixed_multi_call("0x1");
        let second = fixed_multi_call("0x2");
        assert_eq!(first.execution_request, second.execution_request);
        assert_eq!(first.execution_request.calls.len(), 2);
        assert_eq!(first.execution_request.calls[1].calldata.len(), 5);
        assert_eq!(second.account_address, "0x2");
    }
}
