use std::collections::HashMap;

use parking_lot::Mutex;

use super::ProfileStore;
use crate::{Profile, ProtocolError};

/// An in-memory [`ProfileStore`], primarily for tests and embedding
/// scenarios that don't need an on-disk database.
#[derive(Default)]
pub struct InMemoryProfileStore(Mutex<HashMap<u64, Profile>>);

impl InMemoryProfileStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn create(&self, profile: Profile) -> Result<(), ProtocolError> {
        let mut profiles = self.0.lock();
        if profiles.contains_key(&profile.client_id) {
            return Err(ProtocolError::ClientExists(profile.client_id));
        }
        profiles.insert(profile.client_id, profile);
        Ok(())
    }

    fn get(&self, client_id: u64) -> Result<Profile, ProtocolError> {
        self.0
            .lock()
            .get(&client_id)
            .cloned()
            .ok_or(ProtocolError::ClientMissing(client_id))
    }

    fn delete(&self, client_id: u64) -> Result<(), ProtocolError> {
        self.0.lock().remove(&client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn profile(id: u64) -> Profile {
        Profile {
            client_id: id,
            vault_coefs: vec![BigUint::from(1u32)],
            client_public_key_pem: "pem".to_string(),
            group_order: BigUint::from(7u32),
            verify_threshold: 1,
        }
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = InMemoryProfileStore::new();
        store.create(profile(1)).unwrap();
        assert!(matches!(
            store.create(profile(1)),
            Err(ProtocolError::ClientExists(1))
        ));
    }

    #[test]
    fn missing_get_is_reported() {
        let store = InMemoryProfileStore::new();
        assert!(matches!(
            store.get(2),
            Err(ProtocolError::ClientMissing(2))
        ));
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = InMemoryProfileStore::new();
        store.create(profile(3)).unwrap();
        assert_eq!(store.get(3).unwrap().client_id, 3);
    }
}
