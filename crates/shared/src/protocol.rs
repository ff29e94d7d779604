use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChainId, SessionTopic},
    error::ProtocolError,
};

pub const METHOD_ACCOUNT: &str = "starknet_account";
pub const METHOD_ADD_INVOKE_TRANSACTION: &str = "starknet_requestAddInvokeTransaction";
pub const EVENT_ACCOUNTS_CHANGED: &str = "accountsChanged";
pub const EVENT_CHAIN_CHANGED: &str = "chainChanged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Inputs handed to the pairing engine when it is brought up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub project_id: String,
    pub relay_url: String,
    pub metadata: AppMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeNamespace {
    pub chains: Vec<ChainId>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProperties {
    pub url: String,
    pub name: String,
    pub description: String,
    pub icons: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub required_namespaces: BTreeMap<String, ProposeNamespace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<SessionProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub topic: SessionTopic,
    pub chain_id: ChainId,
    pub request: RpcRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub contract_address: String,
    pub entrypoint: String,
    pub calldata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub calls: Vec<Call>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeTransactionParams {
    pub account_address: String,
    pub execution_request: ExecutionRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeTransactionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl InvokeTransactionResponse {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|err| ProtocolError::MalformedResponse(err.to_string()))
    }
}
