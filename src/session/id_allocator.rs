//! Unpredictable session id allocation.

use super::table::SessionTable;
use super::types::SessionId;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

/// A cryptographically strong byte source that may fail.
pub trait EntropySource: Send {
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

/// The operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// Allocates nonzero session ids that are not in use.
///
/// Ids come from the secure source. When it fails the draw falls back to a
/// seeded PRNG instead of blocking the server; every such draw is logged and
/// counted in [`degraded_draws`](Self::degraded_draws).
pub struct SessionIdAllocator {
    secure: Box<dyn EntropySource>,
    fallback: Option<StdRng>,
    degraded_draws: u64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self::with_source(Box::new(OsEntropy))
    }

    pub fn with_source(secure: Box<dyn EntropySource>) -> Self {
        Self {
            secure,
            fallback: None,
            degraded_draws: 0,
        }
    }

    /// Draw until an id is found that is nonzero and not live in `table`.
    pub fn allocate(&mut self, table: &SessionTable) -> SessionId {
        loop {
            let id = SessionId(self.draw());
            if id.is_valid() && !table.contains(id) {
                return id;
            }
            warn!(session_id = %id, "Session id is reserved or already used, retrying");
        }
    }

    /// Number of draws served by the fallback PRNG.
    pub fn degraded_draws(&self) -> u64 {
        self.degraded_draws
    }

    fn draw(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        match self.secure.try_fill(&mut buf) {
            Ok(()) => u64::from_ne_bytes(buf),
            Err(e) => {
                self.degraded_draws += 1;
                error!(
                    error = %e,
                    degraded_draws = self.degraded_draws,
                    "Secure random source failed, session id drawn from weak PRNG"
                );
                self.fallback
                    .get_or_insert_with(|| StdRng::seed_from_u64(weak_seed()))
                    .next_u64()
            }
        }
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn weak_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ (u64::from(std::process::id()) << 32)
}
