use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub const STARKNET_NAMESPACE: &str = "starknet";

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(SessionTopic);
string_newtype!(ChainId);

/// CAIP-10 account identifier: `namespace:reference:address`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    pub namespace: String,
    pub reference: String,
    pub address: String,
}

impl AccountId {
    pub fn chain_id(&self) -> ChainId {
        ChainId(format!("{}:{}", self.namespace, self.reference))
    }
}

impl FromStr for AccountId {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.splitn(3, ':');
        let (Some(namespace), Some(reference), Some(address)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::MalformedAccount(raw.to_string()));
        };

        if namespace.is_empty() || reference.is_empty() || address.is_empty() {
            return Err(ProtocolError::MalformedAccount(raw.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            reference: reference.to_string(),
            address: address.to_string(),
        })
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.reference, self.address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledNamespace {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// An approved pairing with a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub topic: SessionTopic,
    #[serde(default)]
    pub namespaces: BTreeMap<String, SettledNamespace>,
}

impl Session {
    pub fn namespace(&self, name: &str) -> Option<&SettledNamespace> {
        self.namespaces.get(name)
    }

    /// First account of `namespace`, or `None` when the namespace is absent,
    /// empty, or its first entry is not a valid account id.
    pub fn first_account(&self, namespace: &str) -> Option<Result<AccountId, ProtocolError>> {
        self.namespace(namespace)?
            .accounts
            .first()
            .map(|raw| raw.parse::<AccountId>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_caip10_account() {
        let account: AccountId = "starknet:SNSEPOLIA:0xABC".parse().expect("account");
        assert_eq!(account.namespace, "starknet");
        assert_eq!(account.reference, "SNSEPOLIA");
        assert_eq!(account.address, "0xABC");
        assert_eq!(account.chain_id(), ChainId::new("starknet:SNSEPOLIA"));
        assert_eq!(account.to_string(), "starknet:SNSEPOLIA:0xABC");
    }

    #[test]
    fn rejects_account_without_address() {
        assert_eq!(
            "starknet:SNSEPOLIA".parse::<AccountId>(),
            Err(ProtocolError::MalformedAccount("starknet:SNSEPOLIA".into()))
        );
        assert!("starknet::0x1".parse::<AccountId>().is_err());
    }

    #[test]
    fn first_account_is_none_for_missing_or_empty_namespace() {
        let mut session = Session {
            topic: SessionTopic::new("topic-1"),
            namespaces: BTreeMap::new(),
        };
        assert!(session.first_account(STARKNET_NAMESPACE).is_none());

        session
            .namespaces
            .insert(STARKNET_NAMESPACE.to_string(), SettledNamespace::default());
        assert!(session.first_account(STARKNET_NAMESPACE).is_none());
    }

    #[test]
    fn session_deserializes_from_wire_shape() {
        let session: Session = serde_json::from_value(serde_json::json!({
            "topic": "abc",
            "namespaces": {
                "starknet": {
                    "accounts": ["starknet:SNSEPOLIA:0x1", "starknet:SNSEPOLIA:0x2"],
                    "methods": ["starknet_account"],
                    "events": []
                }
            }
        }))
        .expect("session");

        let first = session
            .first_account(STARKNET_NAMESPACE)
            .expect("present")
            .expect("valid");
        assert_eq!(first.address, "0x1");
    }
}
