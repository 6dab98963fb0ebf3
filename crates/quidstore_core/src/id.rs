//! Document id allocation.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Source of candidate document ids.
///
/// Ids must be valid storage ids: ASCII letters, digits, `-` and `_`.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh candidate id.
    fn generate(&self) -> String;
}

/// Generates random version 4 UUIDs in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4;

impl IdGenerator for UuidV4 {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Allocates ids that are not yet taken, with a bounded number of attempts.
#[derive(Clone)]
pub struct IdAllocator {
    generator: Arc<dyn IdGenerator>,
    max_attempts: u32,
}

impl IdAllocator {
    /// Creates an allocator.
    pub fn new(generator: Arc<dyn IdGenerator>, max_attempts: u32) -> Self {
        Self {
            generator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns a generated id for which `is_taken` reports `false`.
    ///
    /// # Errors
    ///
    /// Returns `IdExhausted` if every attempt collides, or the error of
    /// `is_taken`.
    pub fn allocate(&self, is_taken: impl Fn(&str) -> CoreResult<bool>) -> CoreResult<String> {
        for attempt in 1..=self.max_attempts {
            let id = self.generator.generate();
            if !is_taken(&id)? {
                return Ok(id);
            }
            tracing::debug!(id = %id, attempt, "id collision, regenerating");
        }
        Err(CoreError::IdExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(Arc::new(UuidV4), 8)
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
