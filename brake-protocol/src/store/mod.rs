//! Profile persistence. A profile is created once at enrolment and read
//! (never mutated) at every subsequent verification; the store's only job
//! is to guard against double-enrolment and missing clients.

mod file;
mod memory;

pub use file::FileProfileStore;
pub use memory::InMemoryProfileStore;

use crate::{Profile, ProtocolError};

/// Server-side storage for client profiles.
///
/// Mirrors the reserve-before-use shape of a session registry: `create`
/// fails loudly on a collision rather than overwriting, so a duplicate
/// enrolment can never silently clobber an existing profile.
pub trait ProfileStore {
    /// Persists a new profile.
    ///
    /// # Errors
    /// Returns [`ProtocolError::ClientExists`] if a profile for
    /// `profile.client_id` already exists.
    fn create(&self, profile: Profile) -> Result<(), ProtocolError>;

    /// Reads a profile by client id.
    ///
    /// # Errors
    /// Returns [`ProtocolError::ClientMissing`] if no such profile exists.
    fn get(&self, client_id: u64) -> Result<Profile, ProtocolError>;

    /// Deletes a profile by client id, if present.
    fn delete(&self, client_id: u64) -> Result<(), ProtocolError>;
}
