//! CHAP (Challenge-Handshake Authentication Protocol) secret negotiation
//!
//! Host objects on the controller carry at most one CHAP secret. The driver
//! makes sure the secret matches the configured policy before a volume is
//! handed to the initiator.

use crate::controller::StorageController;
use crate::error::DriverResult;
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Length of generated secrets in bytes (hex encoded to twice this)
const CHAP_SECRET_BYTES: usize = 8;

/// CHAP secret of a host object
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChapSecret(String);

impl ChapSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        ChapSecret(secret.into())
    }

    /// The secret itself, for handing to the initiator
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChapSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChapSecret(<redacted>)")
    }
}

/// Generate a fresh random CHAP secret
pub fn generate_chap_secret() -> ChapSecret {
    let mut bytes = [0u8; CHAP_SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    ChapSecret(hex::encode(bytes))
}

/// CHAP credentials for authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapCredentials {
    /// Username for CHAP authentication (the initiator IQN)
    pub username: String,
    pub secret: ChapSecret,
}

impl ChapCredentials {
    pub fn new(username: impl Into<String>, secret: ChapSecret) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }
}

/// Result of reconciling a host's CHAP secret with the configured policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapNegotiation {
    /// CHAP enabled; a new secret was installed on the host
    Installed(ChapSecret),
    /// CHAP enabled; the host's existing secret is reused
    Reused(ChapSecret),
    /// CHAP disabled and the host has no secret
    Disabled,
    /// CHAP disabled but the host still carries a secret, left in place
    DisabledWithSecret,
}

impl ChapNegotiation {
    /// Secret to attach to the connection properties, if any
    pub fn secret(&self) -> Option<&ChapSecret> {
        match self {
            ChapNegotiation::Installed(secret) | ChapNegotiation::Reused(secret) => Some(secret),
            ChapNegotiation::Disabled | ChapNegotiation::DisabledWithSecret => None,
        }
    }

    /// Get the authentication method string
    pub fn auth_method(&self) -> &str {
        match self.secret() {
            Some(_) => "CHAP",
            None => "None",
        }
    }

    /// The host's secret disagrees with the configured policy
    pub fn is_policy_mismatch(&self) -> bool {
        matches!(self, ChapNegotiation::DisabledWithSecret)
    }
}

/// Make the host's CHAP secret match the `chap_enabled` policy
pub fn ensure_chap_secret<C: StorageController + ?Sized>(
    controller: &C,
    host: &str,
    chap_enabled: bool,
) -> DriverResult<ChapNegotiation> {
    let existing = controller.chap_secret(host)?;
    let negotiation = match (chap_enabled, existing) {
        (true, Some(secret)) => ChapNegotiation::Reused(secret),
        (true, None) => {
            log::debug!("Installing CHAP secret on host {}", host);
            ChapNegotiation::Installed(controller.install_chap_secret(host)?)
        }
        (false, Some(_)) => {
            log::warn!("CHAP secret exists for host {} but CHAP is disabled", host);
            ChapNegotiation::DisabledWithSecret
        }
        (false, None) => ChapNegotiation::Disabled,
    };
    Ok(negotiation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Connector;
    use crate::memory::{ControllerCall, InMemoryController};

    fn controller_with_host() -> (InMemoryController, String) {
        let controller = InMemoryController::new();
        let host = controller.create_host(&Connector::new("iqn.test")).unwrap();
        (controller, host)
    }

    #[test]
    fn test_generated_secrets() {
        let a = generate_chap_secret();
        let b = generate_chap_secret();
        assert_eq!(a.expose().len(), CHAP_SECRET_BYTES * 2);
        assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let secret = ChapSecret::new("hunter2hunter2");
        let creds = ChapCredentials::new("iqn.test", secret.clone());
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert!(!format!("{:?}", creds).contains("hunter2"));
        assert!(!format!("{:?}", ChapNegotiation::Reused(secret)).contains("hunter2"));
    }

    #[test]
    fn test_enabled_without_secret_installs() {
        let (controller, host) = controller_with_host();
        let negotiation = ensure_chap_secret(&controller, &host, true).unwrap();
        let installed = match &negotiation {
            ChapNegotiation::Installed(secret) => secret.clone(),
            other => panic!("unexpected negotiation: {:?}", other),
        };
        assert_eq!(controller.chap_secret(&host).unwrap(), Some(installed));
        assert_eq!(negotiation.auth_method(), "CHAP");
    }

    #[test]
    fn test_enabled_with_secret_reuses() {
        let (controller, host) = controller_with_host();
        let existing = controller.install_chap_secret(&host).unwrap();
        controller.clear_calls();

        let negotiation = ensure_chap_secret(&controller, &host, true).unwrap();
        assert_eq!(negotiation, ChapNegotiation::Reused(existing));
        assert!(!controller
            .calls()
            .iter()
            .any(|call| matches!(call, ControllerCall::InstallChapSecret { .. })));
    }

    #[test]
    fn test_disabled_with_secret_keeps_it_but_withholds_it() {
        let (controller, host) = controller_with_host();
        let existing = controller.install_chap_secret(&host).unwrap();

        let negotiation = ensure_chap_secret(&controller, &host, false).unwrap();
        assert!(negotiation.is_policy_mismatch());
        assert_eq!(negotiation.secret(), None);
        assert_eq!(negotiation.auth_method(), "None");
        assert_eq!(controller.chap_secret(&host).unwrap(), Some(existing));
    }

    #[test]
    fn test_disabled_without_secret() {
        let (controller, host) = controller_with_host();
        let negotiation = ensure_chap_secret(&controller, &host, false).unwrap();
        assert_eq!(negotiation, ChapNegotiation::Disabled);
        assert_eq!(controller.chap_secret(&host).unwrap(), None);
    }
}
