//! The lookup contract against the directory that owns principal key
//! material. The TGS only ever reads from it; writes belong to the
//! directory backend.

use crate::proto::{DerivedKey, EncryptionType, Name};
use std::collections::BTreeMap;

/// One principal as the store knows it: whether it is a service, and one
/// long term key per supported encryption type.
#[derive(Debug, Clone)]
pub struct PrincipalRecord {
    pub service: bool,
    pub keys: Vec<DerivedKey>,
}

impl PrincipalRecord {
    pub fn new_user(base_key: DerivedKey) -> Self {
        PrincipalRecord {
            service: false,
            keys: vec![base_key],
        }
    }

    pub fn new_service(base_key: DerivedKey) -> Self {
        PrincipalRecord {
            service: true,
            keys: vec![base_key],
        }
    }

    pub fn key_for_etype(&self, etype: EncryptionType) -> Option<&DerivedKey> {
        self.keys.iter().find(|key| key.etype() == etype)
    }

    /// The strongest key the principal has. With a single supported etype
    /// this is simply the first.
    pub fn preferred_key(&self) -> Option<&DerivedKey> {
        self.keys.first()
    }
}

/// `lookup` may block on I/O in a real directory; it must be safe to call
/// from any number of requests at once.
pub trait PrincipalStore: Send + Sync {
    fn lookup(&self, name: &Name) -> Option<PrincipalRecord>;
}

/// The in-memory store the tests and demo run against, and the shape the
/// TOML config loads into.
#[derive(Debug, Default)]
pub struct MemoryPrincipalStore {
    principals: BTreeMap<Name, PrincipalRecord>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: Name, record: PrincipalRecord) {
        self.principals.insert(name, record);
    }
}

impl PrincipalStore for MemoryPrincipalStore {
    fn lookup(&self, name: &Name) -> Option<PrincipalRecord> {
        self.principals.get(name).cloned()
    }
}
