//! Image-proxy detection for pixel fetches
//!
//! Major webmail providers fetch remote images through their own proxy.
//! Whether such a fetch counts as an open depends on [`PrefetchPolicy`].

use crate::config::{PrefetchConfig, PrefetchPolicy};

#[derive(Debug, Clone)]
pub struct PrefetchClassifier {
    policy: PrefetchPolicy,
    signatures: Vec<String>,
}

impl PrefetchClassifier {
    pub fn new(policy: PrefetchPolicy, signatures: Vec<String>) -> Self {
        Self { policy, signatures }
    }

    pub fn from_config(config: &PrefetchConfig) -> Self {
        Self::new(config.policy, config.proxy_signatures.clone())
    }

    pub fn policy(&self) -> PrefetchPolicy {
        self.policy
    }

    /// True when the user agent carries a known image-proxy signature.
    pub fn is_automated_fetch(&self, user_agent: &str) -> bool {
        self.signatures
            .iter()
            .any(|signature| user_agent.contains(signature.as_str()))
    }

    /// Whether a pixel fetch with this user agent should be recorded as an open.
    pub fn should_record_open(&self, user_agent: &str) -> bool {
        let proxied = self.is_automated_fetch(user_agent);
        match self.policy {
            PrefetchPolicy::ProxyImpliesHuman => proxied,
            PrefetchPolicy::ProxyIsBot => !proxied,
        }
    }
}

impl Default for PrefetchClassifier {
    fn default() -> Self {
        Self::from_config(&PrefetchConfig::default())
    }
}
