use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DashboardAuthError {
    #[error("dashboard credential missing")]
    Missing,
    #[error("dashboard credential rejected")]
    Rejected,
}

/// Password check guarding the dashboard API.
///
/// Only the digest of the configured password is kept. An unconfigured gate
/// admits every request.
#[derive(Clone)]
pub struct DashboardGate {
    hashed_password: Option<Vec<u8>>,
}

impl DashboardGate {
    pub fn new(password: Option<&str>) -> Self {
        Self {
            hashed_password: password
                .filter(|password| !password.is_empty())
                .map(hash_secret),
        }
    }

    pub fn open() -> Self {
        Self {
            hashed_password: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.hashed_password.is_none()
    }

    pub fn authorize(&self, presented: Option<&str>) -> Result<(), DashboardAuthError> {
        let Some(expected) = self.hashed_password.as_ref() else {
            return Ok(());
        };
        let presented = presented
            .filter(|value| !value.is_empty())
            .ok_or(DashboardAuthError::Missing)?;
        if expected.ct_eq(&hash_secret(presented)).unwrap_u8() == 0 {
            return Err(DashboardAuthError::Rejected);
        }
        Ok(())
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_gate_checks_password() {
        let gate = DashboardGate::new(Some("hunter2"));
        assert!(!gate.is_open());
        assert_eq!(gate.authorize(Some("hunter2")), Ok(()));
        assert_eq!(gate.authorize(Some("hunter3")), Err(DashboardAuthError::Rejected));
        assert_eq!(gate.authorize(None), Err(DashboardAuthError::Missing));
        assert_eq!(gate.authorize(Some("")), Err(DashboardAuthError::Missing));
    }

    #[test]
    fn blank_password_leaves_gate_open() {
        let gate = DashboardGate::new(Some(""));
        assert!(gate.is_open());
        assert_eq!(gate.authorize(None), Ok(()));
        assert!(DashboardGate::open().is_open());
    }
}
