//! Append-only, typed per-request context.
//!
//! Every request carries one [`Context`]. Middleware stages enrich it as the
//! request moves inward — the pipeline seeds the route's policy and path
//! parameters, provider resolution records which backend serves the request,
//! authentication records its outcome, session injection records the loaded
//! session — and the terminal handler reads whatever its chain produced.
//!
//! # The contract
//!
//! - A value is written **once**. Writing a capability that is already
//!   present is an error, so a later stage can never invalidate what an
//!   earlier stage observed.
//! - Values are **never removed**.
//! - Reading an absent value through [`Context::require`] is a detectable
//!   `missing context value` failure (surfaced as a 500), not a silent
//!   default. A stage that reads a capability before its writer has run is a
//!   pipeline-ordering bug, and this is how it shows up.
//!
//! Capabilities are ordinary types implementing [`Capability`]; the type is
//! its own key, so lookups are fully typed and two stages cannot collide on
//! a stringly-typed name.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::Error;

/// A value that can be stored in a request [`Context`].
///
/// The implementing type is the key: `ctx.get::<Session>()` returns the
/// `Session` written earlier in the pipeline, or `None`. `NAME` appears in
/// `missing context value` errors and log lines.
pub trait Capability: Send + Sync + 'static {
    /// Stable name for diagnostics.
    const NAME: &'static str;
}

/// The per-request capability map.
///
/// Created empty for each inbound request and dropped when the response is
/// written. Not shared across requests — each pipeline run owns exactly one.
#[derive(Default)]
pub struct Context {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a capability. Fails if the capability was already written —
    /// context values are append-only.
    pub fn set<C: Capability>(&mut self, value: C) -> Result<(), Error> {
        match self.values.entry(TypeId::of::<C>()) {
            Entry::Occupied(_) => Err(Error::OccupiedContext { key: C::NAME }),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(value));
                Ok(())
            }
        }
    }

    /// Returns the capability if an earlier stage wrote it.
    pub fn get<C: Capability>(&self) -> Option<&C> {
        self.values
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Like [`get`](Context::get), but an absent value is an error.
    ///
    /// Use this for capabilities the current stage depends on: a miss means
    /// the chain is mis-ordered, and the resulting
    /// [`Error::MissingContext`] names the capability so the broken route is
    /// findable from the log line alone.
    pub fn require<C: Capability>(&self) -> Result<&C, Error> {
        self.get::<C>().ok_or(Error::MissingContext { key: C::NAME })
    }

    pub fn contains<C: Capability>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<C>())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Marker(u32);

    impl Capability for Marker {
        const NAME: &'static str = "marker";
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut ctx = Context::new();
        ctx.set(Marker(7)).unwrap();
        assert_eq!(ctx.get::<Marker>().unwrap().0, 7);
        assert!(ctx.contains::<Marker>());
    }

    #[test]
    fn second_set_is_rejected() {
        let mut ctx = Context::new();
        ctx.set(Marker(1)).unwrap();
        let err = ctx.set(Marker(2)).unwrap_err();
        assert!(matches!(err, Error::OccupiedContext { key: "marker" }));
        // The original value survives the rejected write.
        assert_eq!(ctx.get::<Marker>().unwrap().0, 1);
    }

    #[test]
    fn require_names_the_missing_capability() {
        let ctx = Context::new();
        let err = ctx.require::<Marker>().unwrap_err();
        assert!(matches!(err, Error::MissingContext { key: "marker" }));
    }
}
