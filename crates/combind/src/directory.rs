//! Process-wide interface directory
//!
//! Maps interface ids to synthesized bindings and to default-implementation
//! factories. Entries are inserted on first successful synthesis (or
//! explicit registration) and cleared by [`shutdown`]. The lock is never
//! held across synthesis or a factory call.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::object::Object;
use crate::pointer;
use crate::synth::BoundInterface;

/// Constructs the default implementation of an interface.
pub type DefaultFactory = Arc<dyn Fn() -> Result<Object> + Send + Sync>;

#[derive(Default)]
struct Directory {
    bindings: HashMap<Guid, Arc<BoundInterface>>,
    defaults: HashMap<Guid, DefaultFactory>,
}

static DIRECTORY: LazyLock<RwLock<Directory>> = LazyLock::new(Default::default);

/// The binding registered for `iid`.
pub fn lookup(iid: &Guid) -> Option<Arc<BoundInterface>> {
    DIRECTORY.read().bindings.get(iid).cloned()
}

/// Register `bound`, returning the binding now in effect.
///
/// If an equal descriptor is already registered (another thread got there
/// first) the existing binding is kept and returned. A different descriptor
/// replaces the existing one.
pub(crate) fn register(bound: Arc<BoundInterface>) -> Arc<BoundInterface> {
    let iid = bound.iid();
    let mut dir = DIRECTORY.write();
    if let Some(existing) = dir.bindings.get(&iid) {
        if existing.descriptor() == bound.descriptor() {
            return existing.clone();
        }
        warn!(
            target: "combind::directory",
            %iid,
            previous = existing.name(),
            replacement = bound.name(),
            "replacing registered interface with a different descriptor"
        );
    }
    debug!(target: "combind::directory", %iid, interface = bound.name(), "registered");
    dir.bindings.insert(iid, bound.clone());
    bound
}

/// Ids of every registered binding.
pub fn registered_interfaces() -> Vec<Guid> {
    DIRECTORY.read().bindings.keys().copied().collect()
}

/// Register the factory that [`create_default`] uses for `iid`.
pub fn register_default_implementation<F>(iid: Guid, factory: F)
where
    F: Fn() -> Result<Object> + Send + Sync + 'static,
{
    debug!(target: "combind::directory", %iid, "default implementation registered");
    DIRECTORY.write().defaults.insert(iid, Arc::new(factory));
}

/// Construct the default implementation registered for `iid`.
pub fn create_default(iid: &Guid) -> Result<Object> {
    let factory = DIRECTORY.read().defaults.get(iid).cloned();
    match factory {
        Some(factory) => factory(),
        None => Err(Error::type_error(format!(
            "no default implementation registered for {iid:?}"
        ))),
    }
}

/// Signal process shutdown.
///
/// Sets the global shutdown flag, after which no interface pointer calls
/// `Release`, and clears the directory. Objects already bound keep working.
pub fn shutdown() {
    let first = pointer::mark_shutdown();
    let mut dir = DIRECTORY.write();
    let (bindings, defaults) = (dir.bindings.len(), dir.defaults.len());
    let cleared = std::mem::take(&mut *dir);
    drop(dir);
    if first {
        info!(target: "combind::directory", bindings, defaults, "shutdown: releases suppressed");
    }
    drop(cleared);
}
