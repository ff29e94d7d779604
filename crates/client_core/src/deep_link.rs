//! Wallet URL scheme links.

use url::form_urlencoded;

/// `<scheme>://wc?uri=<encoded pairing uri>`, asks the wallet to pick up a proposal.
pub fn pairing_link(scheme: &str, pairing_uri: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(pairing_uri.as_bytes()).collect();
    format!("{scheme}://wc?uri={encoded}")
}

/// `<scheme>://`, only brings the wallet to the foreground.
pub fn foreground_link(scheme: &str) -> String {
    format!("{scheme}://")
}
