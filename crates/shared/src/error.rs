use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed account id '{0}': expected namespace:reference:address")]
    MalformedAccount(String),
    #[error("malformed wallet response: {0}")]
    MalformedResponse(String),
}
