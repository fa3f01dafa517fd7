//! Built-in producers.
//!
//! Producers are registered explicitly: call [`register_builtin`] once during
//! startup, before building a [`Registry`](crate::registry::Registry) with
//! `Registry::from_global()`.

pub mod forge;
pub mod jsonl;
pub mod shell_history;

use std::sync::Once;

use crate::producer::ProducerRef;
use crate::registry;

static REGISTER: Once = Once::new();

/// Prototypes for every built-in producer type.
pub fn builtin_prototypes() -> Vec<ProducerRef> {
    vec![
        forge::Forge::prototype(),
        jsonl::JsonLines::prototype(),
        shell_history::ShellHistory::prototype(),
    ]
}

/// Add the built-in prototypes to the process-wide catalog. Safe to call
/// more than once.
pub fn register_builtin() {
    REGISTER.call_once(|| {
        for prototype in builtin_prototypes() {
            let kind = prototype.kind().to_string();
            if let Err(e) = registry::register_prototype(prototype) {
                tracing::warn!(kind = %kind, error = %e, "built-in prototype not registered");
            }
        }
    });
}
