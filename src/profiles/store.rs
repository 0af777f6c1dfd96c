//! Hierarchical profile table
//!
//! vendor → device class → architecture → device name → numeric type.
//!
//! Tables are populated through [`ProfileStoreBuilder`] and frozen by
//! [`ProfileStoreBuilder::build`], which refuses to produce a table
//! missing any global default. After that only lookups exist.

use super::params::ParameterRecord;
use crate::device::{Architecture, DeviceClass, DeviceDescriptor, NumericType, VendorId};
use crate::diagnostics::StoreError;
use std::collections::BTreeMap;
use std::fmt;

/// Full selection key of one record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileKey {
    pub vendor: VendorId,
    pub class: DeviceClass,
    pub architecture: Architecture,
    pub name: String,
    pub numeric_type: NumericType,
}

impl ProfileKey {
    pub fn new(
        vendor: VendorId,
        class: DeviceClass,
        architecture: Architecture,
        name: impl Into<String>,
        numeric_type: NumericType,
    ) -> Self {
        Self {
            vendor,
            class,
            architecture,
            name: name.into(),
            numeric_type,
        }
    }

    /// The fallback key every table must define
    pub fn global_default(class: DeviceClass, numeric_type: NumericType) -> Self {
        Self::new(VendorId::UNKNOWN, class, Architecture::Unknown, "", numeric_type)
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{:?}/{}",
            self.vendor, self.class, self.architecture, self.name, self.numeric_type
        )
    }
}

/// Which level of the fallback chain answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Vendor, class, architecture, name and type all matched
    Exact,
    /// Vendor, class and architecture matched; empty-name entry used
    ArchitectureDefault,
    /// Unknown-vendor entry for the device class
    GlobalDefault,
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrom::Exact => write!(f, "exact match"),
            ResolvedFrom::ArchitectureDefault => write!(f, "architecture default"),
            ResolvedFrom::GlobalDefault => write!(f, "global default"),
        }
    }
}

type TypeTable = BTreeMap<NumericType, usize>;
type NameTable = BTreeMap<String, TypeTable>;
type ArchTable = BTreeMap<Architecture, NameTable>;
type ClassTable = BTreeMap<DeviceClass, ArchTable>;

/// Append-only population interface
#[derive(Debug, Clone)]
pub struct ProfileStoreBuilder<P> {
    entries: BTreeMap<ProfileKey, P>,
}

impl<P: ParameterRecord> Default for ProfileStoreBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ParameterRecord> ProfileStoreBuilder<P> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register `params` under `key`, replacing an earlier registration.
    pub fn entry(mut self, key: ProfileKey, params: P) -> Self {
        self.insert(key, params);
        self
    }

    pub fn insert(&mut self, key: ProfileKey, params: P) {
        if let Some(previous) = self.entries.insert(key.clone(), params) {
            tracing::debug!("{}: {} replaces {}", key, params, previous);
        }
    }

    /// Register `params` as the global default for every class and type.
    pub fn defaults(mut self, params: P) -> Self {
        for class in DeviceClass::ALL {
            for numeric_type in NumericType::ALL {
                self.insert(ProfileKey::global_default(class, numeric_type), params);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the table.
    pub fn build(self, table: &'static str) -> Result<ProfileStore<P>, StoreError> {
        let mut records = Vec::with_capacity(self.entries.len());
        let mut vendors: BTreeMap<VendorId, ClassTable> = BTreeMap::new();

        for (key, params) in self.entries {
            let index = records.len();
            records.push(params);
            vendors
                .entry(key.vendor)
                .or_default()
                .entry(key.class)
                .or_default()
                .entry(key.architecture)
                .or_default()
                .entry(key.name)
                .or_default()
                .insert(key.numeric_type, index);
        }

        let mut defaults = Vec::with_capacity(DeviceClass::ALL.len() * NumericType::ALL.len());
        for class in DeviceClass::ALL {
            for numeric_type in NumericType::ALL {
                let index = vendors
                    .get(&VendorId::UNKNOWN)
                    .and_then(|classes| classes.get(&class))
                    .and_then(|archs| archs.get(&Architecture::Unknown))
                    .and_then(|names| names.get(""))
                    .and_then(|types| types.get(&numeric_type))
                    .ok_or(StoreError::MissingGlobalDefault {
                        table,
                        class,
                        numeric_type,
                    })?;
                defaults.push(*index);
            }
        }

        tracing::debug!("built profile table `{}` with {} records", table, records.len());
        Ok(ProfileStore {
            table,
            records,
            vendors,
            defaults,
        })
    }
}

/// Immutable profile table
#[derive(Debug, Clone)]
pub struct ProfileStore<P> {
    table: &'static str,
    records: Vec<P>,
    vendors: BTreeMap<VendorId, ClassTable>,
    /// Record index per (class, numeric type), complete by construction
    defaults: Vec<usize>,
}

impl<P: ParameterRecord> ProfileStore<P> {
    pub fn builder() -> ProfileStoreBuilder<P> {
        ProfileStoreBuilder::new()
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Best record for `device`. Never fails.
    pub fn resolve(&self, device: &DeviceDescriptor) -> &P {
        self.resolve_with_source(device).0
    }

    /// Best record for `device` and the fallback level that produced it.
    ///
    /// A miss on vendor, class or architecture goes straight to the global
    /// default. A miss on name or numeric type keeps the architecture-level
    /// tuning. An architecture default missing the requested numeric type
    /// degrades to the global default.
    pub fn resolve_with_source(&self, device: &DeviceDescriptor) -> (&P, ResolvedFrom) {
        let global = || {
            tracing::debug!("{}: {} resolved to global default", self.table, device);
            (
                self.global_default(device.class, device.numeric_type),
                ResolvedFrom::GlobalDefault,
            )
        };

        let Some(classes) = self.vendors.get(&device.vendor) else {
            tracing::trace!("{}: vendor {} not registered", self.table, device.vendor);
            return global();
        };
        let Some(archs) = classes.get(&device.class) else {
            tracing::trace!("{}: no {} entries for vendor {}", self.table, device.class, device.vendor);
            return global();
        };
        let Some(names) = archs.get(&device.architecture) else {
            tracing::trace!("{}: architecture {} not registered", self.table, device.architecture);
            return global();
        };

        // The unknown vendor's unknown architecture is the global level
        let coarse = if device.vendor == VendorId::UNKNOWN && device.architecture == Architecture::Unknown {
            ResolvedFrom::GlobalDefault
        } else {
            ResolvedFrom::ArchitectureDefault
        };

        let architecture_default = || match names.get("").and_then(|t| t.get(&device.numeric_type)) {
            Some(&index) => {
                tracing::debug!("{}: {} resolved to {}", self.table, device, coarse);
                (&self.records[index], coarse)
            }
            None => {
                tracing::trace!(
                    "{}: architecture {} has no default for {}",
                    self.table,
                    device.architecture,
                    device.numeric_type
                );
                global()
            }
        };

        let Some(types) = names.get(device.name.as_str()) else {
            tracing::trace!("{}: device name {:?} not registered", self.table, device.name);
            return architecture_default();
        };
        match types.get(&device.numeric_type) {
            // The empty name is itself the architecture level
            Some(&index) if device.name.is_empty() => {
                tracing::debug!("{}: {} resolved to {}", self.table, device, coarse);
                (&self.records[index], coarse)
            }
            Some(&index) => {
                tracing::debug!("{}: {} resolved exactly", self.table, device);
                (&self.records[index], ResolvedFrom::Exact)
            }
            None => {
                tracing::trace!("{}: no {} entry for {:?}", self.table, device.numeric_type, device.name);
                architecture_default()
            }
        }
    }

    /// The unknown-vendor record for `class` and `numeric_type`
    pub fn global_default(&self, class: DeviceClass, numeric_type: NumericType) -> &P {
        let slot = class.index() * NumericType::ALL.len() + numeric_type.index();
        &self.records[self.defaults[slot]]
    }

    /// Every entry with its key, in key order
    pub fn entries(&self) -> impl Iterator<Item = (ProfileKey, &P)> + '_ {
        self.vendors.iter().flat_map(move |(vendor, classes)| {
            classes.iter().flat_map(move |(class, archs)| {
                archs.iter().flat_map(move |(architecture, names)| {
                    names.iter().flat_map(move |(name, types)| {
                        types.iter().map(move |(numeric_type, &index)| {
                            (
                                ProfileKey::new(*vendor, *class, *architecture, name.clone(), *numeric_type),
                                &self.records[index],
                            )
                        })
                    })
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::params::VectorAxpyParams;

    const BASE: VectorAxpyParams = VectorAxpyParams::new(1, 128, 128, true);
    const FERMI: VectorAxpyParams = VectorAxpyParams::new(1, 1024, 2048, true);

    #[test]
    fn test_missing_default_rejected() {
        let builder = ProfileStoreBuilder::new().entry(
            ProfileKey::global_default(DeviceClass::Gpu, NumericType::Float),
            BASE,
        );
        let err = builder.build("vector_axpy").unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingGlobalDefault {
                table: "vector_axpy",
                ..
            }
        ));
    }

    #[test]
    fn test_later_entry_replaces() {
        let key = ProfileKey::new(VendorId::NVIDIA, DeviceClass::Gpu, Architecture::Fermi, "", NumericType::Float);
        let store = ProfileStoreBuilder::new()
            .defaults(BASE)
            .entry(key.clone(), BASE)
            .entry(key, FERMI)
            .build("vector_axpy")
            .expect("complete table");
        let device = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
            .with_architecture(Architecture::Fermi);
        assert_eq!(store.resolve(&device), &FERMI);
        assert_eq!(store.len(), DeviceClass::ALL.len() * NumericType::ALL.len() + 1);
    }

    #[test]
    fn test_entries_round_trip_keys() {
        let store = ProfileStoreBuilder::new()
            .defaults(BASE)
            .build("vector_axpy")
            .expect("complete table");
        let keys: Vec<_> = store.entries().map(|(key, _)| key).collect();
        assert_eq!(keys.len(), store.len());
        assert!(keys.contains(&ProfileKey::global_default(DeviceClass::Cpu, NumericType::ULong)));
    }
}
