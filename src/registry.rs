//! Object registry.
//!
//! The registry owns every COSEM object of a meter. Objects refer to each
//! other only by `(class, logical name)` through [`ObjectRef`]; the registry
//! resolves those keys to [`ObjectId`]s and caches them in the references.
//!
//! References may point forward while a registry is being populated. A
//! missing target is reserved as a typed [`Object::Placeholder`] and the real
//! object later takes over the placeholder's slot, so ids handed out early
//! stay valid. [`ObjectRegistry::post_load`] binds every reference and fails
//! if any placeholder is left.
//!
//! Objects are never removed; the registry is torn down as a whole.

use std::collections::HashMap;

use log::{debug, info};

use crate::cosem::capture::ObjectRef;
use crate::cosem::clock::Clock;
use crate::cosem::data::DataObject;
use crate::cosem::demand_register::DemandRegister;
use crate::cosem::profile_generic::ProfileGeneric;
use crate::cosem::register::Register;
use crate::cosem::script_table::ScriptTable;
use crate::cosem::CosemObject;
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;

/// Stable handle to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// A registered object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Data(DataObject),
    Register(Register),
    DemandRegister(DemandRegister),
    ProfileGeneric(ProfileGeneric),
    Clock(Clock),
    ScriptTable(ScriptTable),
    /// Reserved slot for an object referenced before it was registered.
    Placeholder { object_type: ObjectType, logical_name: ObisCode },
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Data(_) => ObjectType::Data,
            Self::Register(_) => ObjectType::Register,
            Self::DemandRegister(_) => ObjectType::DemandRegister,
            Self::ProfileGeneric(_) => ObjectType::ProfileGeneric,
            Self::Clock(_) => ObjectType::Clock,
            Self::ScriptTable(_) => ObjectType::ScriptTable,
            Self::Placeholder { object_type, .. } => *object_type,
        }
    }

    pub fn logical_name(&self) -> ObisCode {
        match self {
            Self::Data(o) => o.base.logical_name,
            Self::Register(o) => o.base.logical_name,
            Self::DemandRegister(o) => o.base.logical_name,
            Self::ProfileGeneric(o) => o.base.logical_name,
            Self::Clock(o) => o.base.logical_name,
            Self::ScriptTable(o) => o.base.logical_name,
            Self::Placeholder { logical_name, .. } => *logical_name,
        }
    }

    pub fn short_name(&self) -> Option<u16> {
        self.as_cosem().and_then(|o| o.base().short_name)
    }

    pub fn key(&self) -> (ObjectType, ObisCode) {
        (self.object_type(), self.logical_name())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }

    /// The object behind the COSEM interface, unless this is a placeholder.
    pub fn as_cosem(&self) -> Option<&dyn CosemObject> {
        match self {
            Self::Data(o) => Some(o),
            Self::Register(o) => Some(o),
            Self::DemandRegister(o) => Some(o),
            Self::ProfileGeneric(o) => Some(o),
            Self::Clock(o) => Some(o),
            Self::ScriptTable(o) => Some(o),
            Self::Placeholder { .. } => None,
        }
    }

    pub fn as_cosem_mut(&mut self) -> Option<&mut dyn CosemObject> {
        match self {
            Self::Data(o) => Some(o),
            Self::Register(o) => Some(o),
            Self::DemandRegister(o) => Some(o),
            Self::ProfileGeneric(o) => Some(o),
            Self::Clock(o) => Some(o),
            Self::ScriptTable(o) => Some(o),
            Self::Placeholder { .. } => None,
        }
    }

    pub fn as_profile(&self) -> Option<&ProfileGeneric> {
        match self {
            Self::ProfileGeneric(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_profile_mut(&mut self) -> Option<&mut ProfileGeneric> {
        match self {
            Self::ProfileGeneric(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_clock(&self) -> Option<&Clock> {
        match self {
            Self::Clock(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_register(&self) -> Option<&Register> {
        match self {
            Self::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_script_table(&self) -> Option<&ScriptTable> {
        match self {
            Self::ScriptTable(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_from_object {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for Object {
            fn from(object: $ty) -> Self {
                Self::$variant(object)
            }
        })*
    };
}

impl_from_object!(
    Data(DataObject),
    Register(Register),
    DemandRegister(DemandRegister),
    ProfileGeneric(ProfileGeneric),
    Clock(Clock),
    ScriptTable(ScriptTable),
);

/// Owner of a meter's objects.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: Vec<Object>,
    by_ln: HashMap<(ObjectType, ObisCode), ObjectId>,
    by_sn: HashMap<u16, ObjectId>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, placeholders included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Registers `object`. A placeholder with the same key is replaced in
    /// place; a real object with the same key is a duplicate.
    pub fn add(&mut self, object: impl Into<Object>) -> Result<ObjectId> {
        let object = object.into();
        let (object_type, ln) = object.key();
        if object.is_placeholder() {
            return Ok(self.reserve(object_type, ln));
        }

        let short_name = object.short_name();
        if let Some(sn) = short_name {
            if self.by_sn.contains_key(&sn) {
                return Err(Error::DuplicateShortName(sn));
            }
        }

        let id = match self.by_ln.get(&(object_type, ln)) {
            Some(&id) if self.objects[id.0].is_placeholder() => {
                debug!("{object_type} {ln} takes over its placeholder");
                self.objects[id.0] = object;
                id
            }
            Some(_) => return Err(Error::DuplicateObject { object_type, ln }),
            None => {
                let id = ObjectId(self.objects.len());
                self.objects.push(object);
                self.by_ln.insert((object_type, ln), id);
                id
            }
        };
        if let Some(sn) = short_name {
            self.by_sn.insert(sn, id);
        }
        Ok(id)
    }

    /// Slot for `(object_type, ln)`, reserving a placeholder if absent.
    pub fn reserve(&mut self, object_type: ObjectType, ln: ObisCode) -> ObjectId {
        if let Some(&id) = self.by_ln.get(&(object_type, ln)) {
            return id;
        }
        debug!("reserving placeholder for {object_type} {ln}");
        let id = ObjectId(self.objects.len());
        self.objects.push(Object::Placeholder { object_type, logical_name: ln });
        self.by_ln.insert((object_type, ln), id);
        id
    }

    /// Looks up a registered object. `None` as type matches any class, first
    /// registered wins. Placeholders are never returned.
    pub fn find_by_ln(&self, object_type: Option<ObjectType>, ln: &ObisCode) -> Option<ObjectId> {
        match object_type {
            Some(object_type) => self
                .by_ln
                .get(&(object_type, *ln))
                .copied()
                .filter(|id| !self.objects[id.0].is_placeholder()),
            None => self.iter().find(|(_, o)| o.logical_name() == *ln).map(|(id, _)| id),
        }
    }

    pub fn find_by_sn(&self, sn: u16) -> Option<ObjectId> {
        self.by_sn.get(&sn).copied()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(id.0)
    }

    /// Registered objects in insertion order, placeholders skipped.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().enumerate().filter(|(_, o)| !o.is_placeholder()).map(|(i, o)| (ObjectId(i), o))
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Slot a reference points to, using the cached id when it still matches.
    pub fn resolve(&self, reference: &ObjectRef) -> Option<ObjectId> {
        match reference.id() {
            Some(id) if self.objects.get(id.0).is_some_and(|o| o.key() == reference.key()) => Some(id),
            _ => self.by_ln.get(&reference.key()).copied(),
        }
    }

    /// Binds the references of one object, reserving placeholders for
    /// targets not registered yet.
    pub fn link(&mut self, id: ObjectId) {
        let keys: Vec<(ObjectType, ObisCode)> = match self.objects.get(id.0).and_then(Object::as_cosem) {
            Some(object) => object.references().iter().map(|r| r.key()).collect(),
            None => return,
        };
        for (object_type, ln) in keys {
            self.reserve(object_type, ln);
        }

        let by_ln = &self.by_ln;
        if let Some(object) = self.objects.get_mut(id.0).and_then(Object::as_cosem_mut) {
            for reference in object.references_mut() {
                if let Some(&target) = by_ln.get(&reference.key()) {
                    reference.bind(target);
                }
            }
        }
    }

    /// Second load pass: binds every reference to its registered target.
    ///
    /// Fails with the first `(class, logical name)` that is still only a
    /// placeholder.
    pub fn post_load(&mut self) -> Result<()> {
        for index in 0..self.objects.len() {
            self.link(ObjectId(index));
        }
        if let Some(Object::Placeholder { object_type, logical_name }) =
            self.objects.iter().find(|o| o.is_placeholder())
        {
            return Err(Error::PlaceholderUnresolved { object_type: *object_type, ln: *logical_name });
        }
        info!("registry linked: {} objects", self.objects.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosem::capture::CaptureColumn;
    use crate::data::Data;
    use crate::unit::ScalerUnit;

    const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
    const PROFILE: ObisCode = ObisCode::new(1, 0, 99, 1, 0, 255);

    fn register() -> Register {
        Register::new(ENERGY, Data::DoubleLongUnsigned(0), ScalerUnit::default())
    }

    fn profile() -> ProfileGeneric {
        ProfileGeneric::new(PROFILE, 10)
            .with_capture_objects(vec![CaptureColumn::new(ObjectType::Register, ENERGY, 2, 0)])
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut registry = ObjectRegistry::new();
        registry.add(register()).unwrap();
        assert!(matches!(
            registry.add(register()),
            Err(Error::DuplicateObject { object_type: ObjectType::Register, .. })
        ));
        // Same LN under another class is a different object.
        registry.add(DataObject::new(ENERGY, Data::Null)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_add_rejects_reused_short_name() {
        let mut registry = ObjectRegistry::new();
        let mut data = DataObject::new(ObisCode::new(0, 0, 96, 1, 0, 255), Data::Null);
        data.base.short_name = Some(0x1000);
        let data_id = registry.add(data).unwrap();

        let mut energy = register();
        energy.base.short_name = Some(0x1000);
        assert!(matches!(registry.add(energy), Err(Error::DuplicateShortName(0x1000))));
        assert_eq!(registry.find_by_sn(0x1000), Some(data_id));
        assert_eq!(registry.find_by_ln(Some(ObjectType::Register), &ENERGY), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_by_ln_and_sn() {
        let mut registry = ObjectRegistry::new();
        let mut data = DataObject::new(ENERGY, Data::Null);
        data.base.short_name = Some(0x1000);
        let data_id = registry.add(data).unwrap();
        let register_id = registry.add(register()).unwrap();

        assert_eq!(registry.find_by_ln(Some(ObjectType::Register), &ENERGY), Some(register_id));
        assert_eq!(registry.find_by_ln(None, &ENERGY), Some(data_id));
        assert_eq!(registry.find_by_ln(Some(ObjectType::Clock), &ENERGY), None);
        assert_eq!(registry.find_by_sn(0x1000), Some(data_id));
        assert_eq!(registry.find_by_sn(0x2000), None);
    }

    #[test]
    fn test_forward_reference_takes_placeholder_slot() {
        let mut registry = ObjectRegistry::new();
        let profile_id = registry.add(profile()).unwrap();
        registry.link(profile_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_ln(Some(ObjectType::Register), &ENERGY), None);
        assert_eq!(registry.iter().count(), 1);

        let register_id = registry.add(register()).unwrap();
        assert_eq!(register_id, ObjectId::new(1));
        registry.post_load().unwrap();

        let profile = registry.get(profile_id).and_then(Object::as_profile).unwrap();
        assert_eq!(profile.capture_objects()[0].target.id(), Some(register_id));
        assert_eq!(registry.resolve(&profile.capture_objects()[0].target), Some(register_id));
    }

    #[test]
    fn test_post_load_reports_unresolved() {
        let mut registry = ObjectRegistry::new();
        registry.add(profile()).unwrap();
        let err = registry.post_load().unwrap_err();
        assert!(matches!(
            err,
            Error::PlaceholderUnresolved { object_type: ObjectType::Register, ln } if ln == ENERGY
        ));
    }

    #[test]
    fn test_iter_keeps_insertion_order() {
        let mut registry = ObjectRegistry::new();
        registry.add(Clock::new(ObisCode::new(0, 0, 1, 0, 0, 255))).unwrap();
        registry.add(register()).unwrap();
        registry.add(profile()).unwrap();
        let types: Vec<ObjectType> = registry.iter().map(|(_, o)| o.object_type()).collect();
        assert_eq!(types, [ObjectType::Clock, ObjectType::Register, ObjectType::ProfileGeneric]);
    }

    #[test]
    fn test_resolve_ignores_stale_cache() {
        let mut registry = ObjectRegistry::new();
        registry.add(register()).unwrap();
        let mut reference = ObjectRef::new(ObjectType::Register, ENERGY);
        reference.bind(ObjectId::new(42));
        assert_eq!(registry.resolve(&reference), Some(ObjectId::new(0)));
    }
}
