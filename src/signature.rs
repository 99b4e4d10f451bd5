//! Role-scoped signatures on a maintenance record.
//!
//! The [`SignatureLedger`] keeps at most one [`Signature`] per [`Role`].
//! A signature is an attestation and is never overwritten: replacing one is
//! an explicit remove followed by an add.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConflictKind, MaintenanceError, Missing};
use crate::state_machine::Actor;

/// Signer roles. Both are required for explicit completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Technician,
    Responsible,
}

impl Role {
    /// Roles that must each hold a signature before explicit completion,
    /// in the order they are checked.
    pub const REQUIRED: [Role; 2] = [Role::Technician, Role::Responsible];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Technician => write!(f, "TECHNICIAN"),
            Role::Responsible => write!(f, "RESPONSIBLE"),
        }
    }
}

impl FromStr for Role {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TECHNICIAN" => Ok(Role::Technician),
            "RESPONSIBLE" => Ok(Role::Responsible),
            other => Err(MaintenanceError::InvalidInput(format!(
                "unknown signer role: {other}"
            ))),
        }
    }
}

/// Who is signing and the signature payload they provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    #[serde(default)]
    pub id_document: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Opaque signature blob; only checked for emptiness.
    pub payload: Vec<u8>,
}

impl SignerInfo {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            id_document: None,
            title: None,
            payload: payload.into(),
        }
    }

    pub fn validate(&self) -> Result<(), MaintenanceError> {
        if self.name.trim().is_empty() {
            return Err(MaintenanceError::InvalidInput(
                "signer name must not be empty".into(),
            ));
        }
        if self.payload.is_empty() {
            return Err(MaintenanceError::InvalidInput(
                "signature payload must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub role: Role,
    pub signer_name: String,
    pub signer_id_document: Option<String>,
    pub signer_title: Option<String>,
    pub payload: Vec<u8>,
    pub signed_by: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureLedger {
    entries: BTreeMap<Role, Signature>,
}

impl SignatureLedger {
    /// Record a signature for `role`. Fails with `Conflict` if the role is
    /// already signed.
    pub fn insert(
        &mut self,
        role: Role,
        signer: SignerInfo,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<&Signature, MaintenanceError> {
        if self.entries.contains_key(&role) {
            return Err(MaintenanceError::Conflict(ConflictKind::SignatureExists(role)));
        }
        let signature = Signature {
            role,
            signer_name: signer.name,
            signer_id_document: signer.id_document,
            signer_title: signer.title,
            payload: signer.payload,
            signed_by: actor.id.clone(),
            signed_at: at,
        };
        Ok(self.entries.entry(role).or_insert(signature))
    }

    pub fn remove(&mut self, role: Role) -> Result<Signature, MaintenanceError> {
        self.entries
            .remove(&role)
            .ok_or(MaintenanceError::NotFound(Missing::Signature(role)))
    }

    pub fn get(&self, role: Role) -> Option<&Signature> {
        self.entries.get(&role)
    }

    pub fn has(&self, role: Role) -> bool {
        self.entries.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First required role without a signature, if any.
    pub fn first_missing(&self) -> Option<Role> {
        Role::REQUIRED.into_iter().find(|role| !self.has(*role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::new("u-1", "Luis")
    }

    #[test]
    fn second_signature_for_role_conflicts() {
        let mut ledger = SignatureLedger::default();
        ledger
            .insert(Role::Technician, SignerInfo::new("Luis", b"sig-a".to_vec()), &actor(), Utc::now())
            .unwrap();

        let err = ledger
            .insert(Role::Technician, SignerInfo::new("Marta", b"sig-b".to_vec()), &actor(), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            MaintenanceError::Conflict(ConflictKind::SignatureExists(Role::Technician))
        ));
        // The original attestation is untouched.
        assert_eq!(ledger.get(Role::Technician).unwrap().signer_name, "Luis");
    }

    #[test]
    fn remove_then_add_replaces_signature() {
        let mut ledger = SignatureLedger::default();
        ledger
            .insert(Role::Responsible, SignerInfo::new("Luis", b"a".to_vec()), &actor(), Utc::now())
            .unwrap();
        let removed = ledger.remove(Role::Responsible).unwrap();
        assert_eq!(removed.signer_name, "Luis");
        assert!(ledger.is_empty());

        ledger
            .insert(Role::Responsible, SignerInfo::new("Marta", b"b".to_vec()), &actor(), Utc::now())
            .unwrap();
        assert_eq!(ledger.get(Role::Responsible).unwrap().signer_name, "Marta");
    }

    #[test]
    fn removing_unsigned_role_is_not_found() {
        let mut ledger = SignatureLedger::default();
        let err = ledger.remove(Role::Technician).unwrap_err();
        assert!(matches!(
            err,
            MaintenanceError::NotFound(Missing::Signature(Role::Technician))
        ));
    }

    #[test]
    fn first_missing_checks_technician_first() {
        let mut ledger = SignatureLedger::default();
        assert_eq!(ledger.first_missing(), Some(Role::Technician));

        ledger
            .insert(Role::Responsible, SignerInfo::new("Ana", b"x".to_vec()), &actor(), Utc::now())
            .unwrap();
        assert_eq!(ledger.first_missing(), Some(Role::Technician));

        ledger
            .insert(Role::Technician, SignerInfo::new("Luis", b"y".to_vec()), &actor(), Utc::now())
            .unwrap();
        assert_eq!(ledger.first_missing(), None);
    }

    #[test]
    fn signer_validation() {
        assert!(SignerInfo::new("Ana", b"x".to_vec()).validate().is_ok());
        assert!(matches!(
            SignerInfo::new("Ana", Vec::new()).validate(),
            Err(MaintenanceError::InvalidInput(_))
        ));
        assert!(matches!(
            SignerInfo::new("  ", b"x".to_vec()).validate(),
            Err(MaintenanceError::InvalidInput(_))
        ));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("technician".parse::<Role>().unwrap(), Role::Technician);
        assert_eq!("RESPONSIBLE".parse::<Role>().unwrap(), Role::Responsible);
        assert!("supervisor".parse::<Role>().is_err());
    }
}
