//! COSEM Interface Class 1: Data
//!
//! A single value of any type, typically a parameter or an identifier.
//!
//! ## Attributes
//! - Attribute 1: `logical_name`
//! - Attribute 2: `value`
//!
//! # Example
//! ```
//! use cosem_ic::cosem::data::DataObject;
//! use cosem_ic::cosem::CosemObject;
//! use cosem_ic::{Data, ObisCode};
//!
//! let data_obj = DataObject::new(ObisCode::new(0, 0, 96, 1, 0, 255), Data::Unsigned(42));
//!
//! assert_eq!(data_obj.class_id(), 1);
//! assert_eq!(data_obj.version(), 0);
//! ```

use crate::cosem::{CosemObject, ObjectBase};
use crate::data::Data;
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;

/// Data object - COSEM Interface Class 1
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    pub base: ObjectBase,
    /// Attribute 2
    pub value: Data,
}

impl DataObject {
    pub fn new(logical_name: ObisCode, value: Data) -> Self {
        Self { base: ObjectBase::new(logical_name), value }
    }
}

impl CosemObject for DataObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Data
    }

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn get_attribute(&self, _settings: &Settings, attribute_id: i8) -> Result<Data> {
        match attribute_id {
            1 => Ok(self.base.logical_name_data()),
            2 => Ok(self.value.clone()),
            _ => Err(self.base.invalid_attribute(ObjectType::Data, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> Result<()> {
        match attribute_id {
            1 => Err(self.base.denied(attribute_id)),
            2 => {
                self.value = value;
                Ok(())
            }
            _ => Err(self.base.invalid_attribute(ObjectType::Data, attribute_id)),
        }
    }

    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, _params: Option<Data>) -> Result<Option<Data>> {
        Err(Error::MethodUndefined(method_id))
    }
}
