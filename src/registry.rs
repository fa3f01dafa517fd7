//! Producer registry.
//!
//! A [`Registry`] holds two independent catalogs:
//!
//! - **prototypes**: producer type → zero-configuration prototype, used only
//!   to dispatch [`Producer::factory`] and record reconstruction;
//! - **instances**: instance name → live, configured producer.
//!
//! A process-wide prototype catalog is filled by [`register_prototype`]
//! during startup (see [`crate::sources::register_builtin`]).
//! [`Registry::from_global`] snapshots it into a new registry whose instance
//! catalog starts empty, so separate registries never see each other's live
//! instances.
//!
//! Mutations take the write lock and reads the read lock. Locks are never held
//! across an `.await`: factories run unlocked, and only the final swap is
//! done under the write lock. Replacing an instance is atomic: the old one is
//! closed and the new one installed in the same critical section, so the name
//! is never observed absent and a failed factory leaves the old instance
//! untouched.

use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::producer::{validate_config, ProducerConfig, ProducerRef};
use crate::record::{GenericRecord, Record};

type Catalog = HashMap<String, ProducerRef>;

static GLOBAL_PROTOTYPES: LazyLock<RwLock<Catalog>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Add a prototype to the process-wide catalog.
///
/// Registration is strict: a second prototype for the same type is rejected
/// rather than shadowing the first.
pub fn register_prototype(prototype: ProducerRef) -> Result<()> {
    insert_prototype(&mut write(&GLOBAL_PROTOTYPES), prototype)
}

/// Producer types in the process-wide catalog, sorted.
pub fn global_prototype_kinds() -> Vec<String> {
    sorted_keys(&read(&GLOBAL_PROTOTYPES))
}

#[derive(Debug, Default)]
pub struct Registry {
    prototypes: RwLock<Catalog>,
    instances: RwLock<Catalog>,
}

impl Registry {
    /// Empty registry with no prototypes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with a copy of the process-wide prototype catalog.
    pub fn from_global() -> Self {
        let prototypes = read(&GLOBAL_PROTOTYPES).clone();
        Self {
            prototypes: RwLock::new(prototypes),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Add a prototype to this registry only.
    pub fn register_prototype(&self, prototype: ProducerRef) -> Result<()> {
        insert_prototype(&mut write(&self.prototypes), prototype)
    }

    pub fn prototype(&self, kind: &str) -> Result<ProducerRef> {
        read(&self.prototypes)
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType {
                kind: kind.to_string(),
            })
    }

    /// Registered producer types, sorted.
    pub fn prototype_kinds(&self) -> Vec<String> {
        sorted_keys(&read(&self.prototypes))
    }

    /// Decode raw settings into the configuration shape of `kind`.
    pub fn decode_config(
        &self,
        kind: &str,
        settings: serde_json::Value,
    ) -> Result<Box<dyn ProducerConfig>> {
        let prototype = self.prototype(kind)?;
        prototype
            .config_type()
            .decode(settings)
            .map_err(|source| RegistryError::Decode {
                kind: kind.to_string(),
                source,
            })
    }

    /// Build a `kind` producer named `name` and install it.
    ///
    /// `None` uses the prototype's default configuration. Validation (when
    /// the configuration opts in) runs before the factory. If construction
    /// fails the registry is unchanged. If an instance already lives under
    /// `name` it is closed and replaced; a failure closing it is reported as
    /// [`RegistryError::ReplacedCloseFailed`] after the new one is in place.
    pub async fn create_instance(
        &self,
        name: &str,
        kind: &str,
        config: Option<Box<dyn ProducerConfig>>,
    ) -> Result<ProducerRef> {
        let prototype = self.prototype(kind)?;
        let config = config.unwrap_or_else(|| prototype.config_type());

        validate_config(config.as_ref()).map_err(|source| RegistryError::InvalidConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            source,
        })?;

        let producer = prototype.factory(name, config).await.map_err(|source| {
            warn!(name = %name, kind = %kind, error = %source, "producer factory failed");
            RegistryError::CreationFailed {
                name: name.to_string(),
                kind: kind.to_string(),
                source,
            }
        })?;

        let replaced_close = {
            let mut instances = write(&self.instances);
            let closed = instances.remove(name).map(|previous| {
                debug!(name = %name, kind = %previous.kind(), "closing replaced instance");
                previous.close().map_err(|source| (previous.kind().to_string(), source))
            });
            instances.insert(name.to_string(), producer.clone());
            closed
        };

        info!(name = %name, kind = %kind, "producer instance created");

        match replaced_close {
            Some(Err((previous_kind, source))) => Err(RegistryError::ReplacedCloseFailed {
                name: name.to_string(),
                kind: previous_kind,
                source,
            }),
            _ => Ok(producer),
        }
    }

    pub fn get_instance(&self, name: &str) -> Result<ProducerRef> {
        read(&self.instances)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Live instance names, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        sorted_keys(&read(&self.instances))
    }

    /// Snapshot of every live instance, sorted by name.
    pub fn instances(&self) -> Vec<(String, ProducerRef)> {
        let mut all: Vec<(String, ProducerRef)> = read(&self.instances)
            .iter()
            .map(|(name, producer)| (name.clone(), producer.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Remove and close an instance. It is removed even if closing fails.
    pub fn remove_instance(&self, name: &str) -> Result<()> {
        let producer = write(&self.instances)
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;

        info!(name = %name, kind = %producer.kind(), "removing producer instance");
        producer.close().map_err(|source| RegistryError::CloseFailed {
            name: name.to_string(),
            kind: producer.kind().to_string(),
            source,
        })
    }

    /// Close every instance and empty the catalog, collecting every failure.
    pub fn close_all(&self) -> Result<()> {
        let drained: Vec<(String, ProducerRef)> = write(&self.instances).drain().collect();

        let mut failures = Vec::new();
        for (name, producer) in drained {
            if let Err(source) = producer.close() {
                warn!(name = %name, kind = %producer.kind(), error = %source, "close failed");
                failures.push(RegistryError::CloseFailed {
                    kind: producer.kind().to_string(),
                    name,
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::CloseAll(failures))
        }
    }

    /// Rebuild a typed record of producer type `kind` from storage.
    ///
    /// Dispatches through the prototype's `block_prototype()`, so the
    /// producer type need not have a live instance.
    pub fn reconstruct(
        &self,
        kind: &str,
        generic: &GenericRecord,
        origin: &str,
    ) -> Result<Box<dyn Record>> {
        let prototype = self.prototype(kind)?;
        Ok(prototype.block_prototype().reconstruct(generic, origin))
    }
}

fn insert_prototype(catalog: &mut Catalog, prototype: ProducerRef) -> Result<()> {
    let kind = prototype.kind().to_string();
    if catalog.contains_key(&kind) {
        return Err(RegistryError::AlreadyRegistered { kind });
    }
    debug!(kind = %kind, "prototype registered");
    catalog.insert(kind, prototype);
    Ok(())
}

fn sorted_keys(catalog: &Catalog) -> Vec<String> {
    let mut keys: Vec<String> = catalog.keys().cloned().collect();
    keys.sort();
    keys
}

// Every critical section is a single insert, remove or drain, so a poisoned
// lock still guards a consistent map.
fn read(lock: &RwLock<Catalog>) -> RwLockReadGuard<'_, Catalog> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<Catalog>) -> RwLockWriteGuard<'_, Catalog> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
