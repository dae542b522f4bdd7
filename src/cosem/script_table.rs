//! COSEM Interface Class 9: Script Table
//!
//! Scripts are lists of attribute writes and method invocations on other
//! objects. Executing one (method 1) needs the whole registry, so it is
//! carried out by [`crate::engine::ProfileEngine`]; a write that touches a
//! profile's configuration resets that profile like any other write.
//!
//! ## Attributes
//! - Attribute 1: `logical_name`
//! - Attribute 2: `scripts` - `array of structure { long-unsigned script_identifier,
//!   array of action_specification }`
//!
//! An `action_specification` is `structure { enum service_id, long-unsigned
//! class_id, octet-string logical_name, integer index, parameter }`.
//!
//! ## Methods
//! - Method 1: `execute(long-unsigned script_identifier)`

use derive_try_from_primitive::TryFromPrimitive;

use crate::cosem::capture::ObjectRef;
use crate::cosem::{CosemObject, ObjectBase};
use crate::data::Data;
use crate::error::{self, Error};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ScriptActionType {
    WriteAttribute = 1,
    ExecuteMethod = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAction {
    pub action_type: ScriptActionType,
    pub target: ObjectRef,
    /// Attribute index for writes, method index for executions.
    pub index: i8,
    pub parameter: Data,
}

impl ScriptAction {
    pub fn write(object_type: ObjectType, logical_name: ObisCode, index: i8, value: Data) -> Self {
        Self {
            action_type: ScriptActionType::WriteAttribute,
            target: ObjectRef::new(object_type, logical_name),
            index,
            parameter: value,
        }
    }

    pub fn execute(object_type: ObjectType, logical_name: ObisCode, index: i8, parameter: Data) -> Self {
        Self {
            action_type: ScriptActionType::ExecuteMethod,
            target: ObjectRef::new(object_type, logical_name),
            index,
            parameter,
        }
    }

    fn to_data(&self) -> Data {
        Data::Structure(vec![
            Data::Enum(self.action_type as u8),
            Data::LongUnsigned(self.target.object_type.class_id()),
            Data::OctetString(self.target.logical_name.to_bytes().to_vec()),
            Data::Integer(self.index),
            self.parameter.clone(),
        ])
    }

    fn from_data(data: &Data) -> error::Result<Self> {
        let Data::Structure(fields) = data else {
            return Err(Error::TypeUnmatched);
        };
        let [Data::Enum(service), Data::LongUnsigned(class_id), Data::OctetString(ln), Data::Integer(index), parameter] =
            fields.as_slice()
        else {
            return Err(Error::TypeUnmatched);
        };
        let action_type = ScriptActionType::try_from(*service).map_err(|_| Error::TypeUnmatched)?;
        let object_type = ObjectType::try_from(*class_id).map_err(|_| Error::TypeUnmatched)?;
        Ok(Self {
            action_type,
            target: ObjectRef::new(object_type, ObisCode::from_bytes(ln)?),
            index: *index,
            parameter: parameter.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub id: u16,
    pub actions: Vec<ScriptAction>,
}

impl Script {
    pub fn new(id: u16, actions: Vec<ScriptAction>) -> Self {
        Self { id, actions }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTable {
    pub base: ObjectBase,
    /// Attribute 2
    pub scripts: Vec<Script>,
}

impl ScriptTable {
    pub fn new(logical_name: ObisCode) -> Self {
        Self { base: ObjectBase::new(logical_name), scripts: Vec::new() }
    }

    pub fn script(&self, id: u16) -> Option<&Script> {
        self.scripts.iter().find(|s| s.id == id)
    }

    pub fn scripts_data(&self) -> Data {
        Data::Array(
            self.scripts
                .iter()
                .map(|script| {
                    Data::Structure(vec![
                        Data::LongUnsigned(script.id),
                        Data::Array(script.actions.iter().map(ScriptAction::to_data).collect()),
                    ])
                })
                .collect(),
        )
    }

    pub fn scripts_from_data(data: &Data) -> error::Result<Vec<Script>> {
        let Data::Array(items) = data else {
            return Err(Error::TypeUnmatched);
        };
        items
            .iter()
            .map(|item| match item {
                Data::Structure(fields) => match fields.as_slice() {
                    [Data::LongUnsigned(id), Data::Array(actions)] => Ok(Script::new(
                        *id,
                        actions.iter().map(ScriptAction::from_data).collect::<error::Result<_>>()?,
                    )),
                    _ => Err(Error::TypeUnmatched),
                },
                _ => Err(Error::TypeUnmatched),
            })
            .collect()
    }

    /// Script id carried by a method 1 invocation.
    pub fn script_id_param(params: Option<&Data>) -> error::Result<u16> {
        params
            .and_then(Data::as_u32)
            .and_then(|id| u16::try_from(id).ok())
            .ok_or(Error::TypeUnmatched)
    }
}

impl CosemObject for ScriptTable {
    fn object_type(&self) -> ObjectType {
        ObjectType::ScriptTable
    }

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn get_attribute(&self, _settings: &Settings, attribute_id: i8) -> error::Result<Data> {
        match attribute_id {
            1 => Ok(self.base.logical_name_data()),
            2 => Ok(self.scripts_data()),
            _ => Err(self.base.invalid_attribute(ObjectType::ScriptTable, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> error::Result<()> {
        match attribute_id {
            1 => Err(self.base.denied(attribute_id)),
            2 => {
                self.scripts = Self::scripts_from_data(&value)?;
                Ok(())
            }
            _ => Err(self.base.invalid_attribute(ObjectType::ScriptTable, attribute_id)),
        }
    }

    /// Execution goes through the engine; invoked directly the table can
    /// only report the method as unavailable.
    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, _params: Option<Data>) -> error::Result<Option<Data>> {
        Err(Error::MethodUndefined(method_id))
    }

    fn references(&self) -> Vec<&ObjectRef> {
        self.scripts.iter().flat_map(|s| s.actions.iter().map(|a| &a.target)).collect()
    }

    fn references_mut(&mut self) -> Vec<&mut ObjectRef> {
        self.scripts.iter_mut().flat_map(|s| s.actions.iter_mut().map(|a| &mut a.target)).collect()
    }
}
