//! Service -> PID -> definitions lookup structure.
//!
//! ```text
//! service -- pid -- definition
//!         |      |- definition
//!         |- pid -- definition
//! service -- ...
//! ```
//!
//! Definitions live in an arena owned by the registry; the lookup maps only
//! hold [`DefinitionId`]s into it. A definition listed under several services
//! is one arena entry reached through several paths, so a decode through one
//! service is visible through all of them.

use crate::conversion::UnitSystem;
use crate::definition::ParameterDefinition;
use std::collections::HashMap;

/// Stable index of a definition inside a [`DefinitionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(usize);

impl DefinitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// PID groups of one service, in first-insertion order.
#[derive(Debug, Clone, Default)]
struct ServiceEntry {
    order: Vec<u32>,
    pids: HashMap<u32, Vec<DefinitionId>>,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    unit_system: UnitSystem,
    definitions: Vec<ParameterDefinition>,
    services: HashMap<u32, ServiceEntry>,
    service_order: Vec<u32>,
}

impl DefinitionRegistry {
    pub fn new(unit_system: UnitSystem) -> Self {
        Self {
            unit_system,
            ..Default::default()
        }
    }

    /// Unit system used for constructing and decoding definitions.
    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    /// Switch the unit system. Stored values are not re-decoded; only later
    /// decodes and constructions see the new system.
    pub fn set_unit_system(&mut self, unit_system: UnitSystem) {
        self.unit_system = unit_system;
    }

    /// Number of distinct definitions, regardless of how many services
    /// reference them.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, id: DefinitionId) -> Option<&ParameterDefinition> {
        self.definitions.get(id.0)
    }

    pub fn get_mut(&mut self, id: DefinitionId) -> Option<&mut ParameterDefinition> {
        self.definitions.get_mut(id.0)
    }

    /// Every owned definition once, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.definitions.iter()
    }

    /// Service ids in first-insertion order.
    pub fn services(&self) -> &[u32] {
        &self.service_order
    }

    /// PIDs of a service in first-insertion order, empty for unknown services.
    pub fn pids(&self, service: u32) -> &[u32] {
        self.services
            .get(&service)
            .map(|entry| entry.order.as_slice())
            .unwrap_or_default()
    }

    /// Take ownership of `definition` and register it under `service`.
    pub fn append_definition(&mut self, service: u32, definition: ParameterDefinition) -> DefinitionId {
        let id = self.insert(definition);
        self.append_to_service(service, id);
        id
    }

    /// Arena insert only; callers register the id under at least one service.
    pub(crate) fn insert(&mut self, definition: ParameterDefinition) -> DefinitionId {
        let id = DefinitionId(self.definitions.len());
        self.definitions.push(definition);
        id
    }

    /// Register an already owned definition under another service. Prior
    /// entries for the same (service, PID) are kept.
    pub fn append_to_service(&mut self, service: u32, id: DefinitionId) {
        let Some(pid) = self.definitions.get(id.0).map(ParameterDefinition::pid) else {
            log::warn!("ignoring unknown definition id {} for service {service}", id.0);
            return;
        };

        if !self.services.contains_key(&service) {
            log::debug!("+SVC: {service}");
            self.service_order.push(service);
        }
        let entry = self.services.entry(service).or_default();

        if !entry.pids.contains_key(&pid) {
            log::debug!("+PID: 0x{pid:02X}");
            entry.order.push(pid);
        }
        let ids = entry.pids.entry(pid).or_default();
        ids.push(id);
        log::debug!("+{service}/0x{pid:02X} - {} item(s)", ids.len());
    }

    pub fn definition_ids(&self, service: u32, pid: u32) -> Option<&[DefinitionId]> {
        self.services
            .get(&service)
            .and_then(|entry| entry.pids.get(&pid))
            .map(Vec::as_slice)
    }

    /// All definitions registered for `(service, pid)`, in registration order.
    pub fn get_by_service_and_pid(&self, service: u32, pid: u32) -> Option<Vec<&ParameterDefinition>> {
        self.definition_ids(service, pid)
            .map(|ids| ids.iter().map(|id| &self.definitions[id.0]).collect())
    }

    /// All definitions of `service`, PID group by PID group in the order the
    /// PIDs were first registered. Empty for unknown services.
    pub fn get_by_service(&self, service: u32) -> Vec<&ParameterDefinition> {
        let Some(entry) = self.services.get(&service) else {
            return Vec::new();
        };
        entry
            .order
            .iter()
            .filter_map(|pid| entry.pids.get(pid))
            .flatten()
            .map(|id| &self.definitions[id.0])
            .collect()
    }

    /// Decode `buffer` into every definition registered for `(service, pid)`.
    ///
    /// Unregistered pairs are silently ignored. Each definition decodes
    /// independently; a failing one is disabled without affecting the rest.
    pub fn update_from_buffer(&mut self, service: u32, pid: u32, buffer: &[u8]) {
        let Some(ids) = self
            .services
            .get(&service)
            .and_then(|entry| entry.pids.get(&pid))
        else {
            return;
        };

        for id in ids {
            self.definitions[id.0].decode_from_buffer(buffer, self.unit_system);
        }
    }
}
