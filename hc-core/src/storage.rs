//! Storage boundary (spec §6): opaque blob persistence for latched state
//! that must survive a restart — a DHWT's last charge day, a building
//! model's filter state. The core only round-trips bytes under an
//! identifier/version; parsing and serialization format belong to whatever
//! entity owns the state.

use hc_error::Result;

/// Implemented by whatever owns durable storage. Called only at
/// online()/offline(), never mid-tick, so it may block briefly.
pub trait Storage: Send + Sync {
    fn dump(&self, identifier: &str, version: u32, bytes: &[u8]) -> Result<()>;
    fn fetch(&self, identifier: &str) -> Result<Option<(u32, Vec<u8>)>>;
}

/// A storage backend that persists nothing; every fetch misses. The
/// default when no real store is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStorage;

impl Storage for NullStorage {
    fn dump(&self, _identifier: &str, _version: u32, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn fetch(&self, _identifier: &str) -> Result<Option<(u32, Vec<u8>)>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_storage_always_misses() {
        let s = NullStorage;
        assert!(s.fetch("anything").unwrap().is_none());
        assert!(s.dump("anything", 1, b"data").is_ok());
    }
}
