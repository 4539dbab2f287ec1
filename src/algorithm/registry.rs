//! Process-wide algorithm registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use super::descriptor::{
    AlgorithmDescriptor, ArgumentSchema, FreeFn, InitFn, ProcessFn, UserData,
};
use crate::error::RegistryError;
use crate::types::DataType;

/// Table of algorithms available to pipelines, keyed by name.
///
/// Descriptors are immutable once registered and are never removed. Reads
/// and registrations may come from any thread.
#[derive(Debug, Default)]
pub struct AlgorithmRegistry {
    algorithms: RwLock<HashMap<String, Arc<AlgorithmDescriptor>>>,
}

impl AlgorithmRegistry {
    /// An empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static AlgorithmRegistry {
        static GLOBAL: OnceLock<AlgorithmRegistry> = OnceLock::new();
        GLOBAL.get_or_init(AlgorithmRegistry::new)
    }

    /// Register an algorithm.
    ///
    /// Fails if the name is empty or taken, or if no `process` callback was
    /// given.
    pub fn register(&self, descriptor: AlgorithmDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if descriptor.process.is_none() {
            return Err(RegistryError::MissingProcess(descriptor.name));
        }

        let mut algorithms = self
            .algorithms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if algorithms.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }

        debug!(algorithm = %descriptor.name, "Registered algorithm");
        algorithms.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Look up an algorithm by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<AlgorithmDescriptor>> {
        self.algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Register an algorithm in the global registry from its individual parts.
#[allow(clippy::too_many_arguments)]
pub fn register_algorithm(
    name: &str,
    user_data: Option<UserData>,
    schema: Option<ArgumentSchema>,
    requested_input_type: Option<DataType>,
    supported_input_types: &[DataType],
    supported_input_band_counts: &[usize],
    init: Option<InitFn>,
    free: Option<FreeFn>,
    process: Option<ProcessFn>,
) -> Result<(), RegistryError> {
    let descriptor = AlgorithmDescriptor {
        name: name.to_string(),
        user_data,
        schema,
        requested_input_type,
        supported_input_types: supported_input_types.to_vec(),
        supported_input_band_counts: supported_input_band_counts.to_vec(),
        init,
        free,
        process,
    };
    AlgorithmRegistry::global().register(descriptor)
}
