//! Server features shared between the host, the server and the pipeline.

use std::sync::Arc;

use parking_lot::RwLock;

/// Capabilities published by the bound server.
///
/// Currently this is the list of addresses the server listens on. The host
/// seeds it from configuration, and a server may replace entries once it knows
/// the actual bound addresses (for example after binding port `0`).
/// Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct ServerFeatures {
    addresses: Arc<RwLock<Vec<String>>>,
}

impl ServerFeatures {
    /// Creates an empty feature set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a feature set seeded with `addresses`.
    #[must_use]
    pub fn with_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: Arc::new(RwLock::new(addresses.into_iter().map(Into::into).collect())),
        }
    }

    /// Returns a snapshot of the listening addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.read().clone()
    }

    /// Appends an address.
    pub fn add_address(&self, address: impl Into<String>) {
        self.addresses.write().push(address.into());
    }

    /// Replaces every address.
    pub fn set_addresses(&self, addresses: Vec<String>) {
        *self.addresses.write() = addresses;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_addresses() {
        let features = ServerFeatures::with_addresses(["http://localhost:5000"]);
        let clone = features.clone();
        clone.add_address("http://localhost:5001");

        assert_eq!(
            features.addresses(),
            vec!["http://localhost:5000", "http://localhost:5001"]
        );

        features.set_addresses(vec!["http://127.0.0.1:8080".to_string()]);
        assert_eq!(clone.addresses(), vec!["http://127.0.0.1:8080"]);
    }
}
