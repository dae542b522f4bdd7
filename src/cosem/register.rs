//! COSEM Interface Class 3: Register
//!
//! A metered value with its scaler and unit.
//!
//! ## Attributes
//! - Attribute 1: `logical_name`
//! - Attribute 2: `value` - raw numeric value
//! - Attribute 3: `scaler_unit` - `structure { integer scaler, enum unit }`
//!
//! ## Methods
//! - Method 1: `reset(data)` - sets the value back to zero
//!
//! # Example
//! ```
//! use cosem_ic::cosem::register::Register;
//! use cosem_ic::unit::{ScalerUnit, Unit};
//! use cosem_ic::{Data, ObisCode};
//!
//! let register = Register::new(
//!     ObisCode::new(1, 0, 1, 8, 0, 255),
//!     Data::DoubleLongUnsigned(12345),
//!     ScalerUnit::new(-2, Unit::WattHour),
//! );
//! assert_eq!(register.scaled_value(), Data::Float64(123.45));
//! ```

use crate::cosem::{CosemObject, ObjectBase};
use crate::data::Data;
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;
use crate::unit::ScalerUnit;

/// Register object - COSEM Interface Class 3
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub base: ObjectBase,
    /// Attribute 2: raw value
    pub value: Data,
    /// Attribute 3
    pub scaler_unit: ScalerUnit,
}

impl Register {
    pub fn new(logical_name: ObisCode, value: Data, scaler_unit: ScalerUnit) -> Self {
        Self { base: ObjectBase::new(logical_name), value, scaler_unit }
    }

    /// Engineering value, `raw * 10^scaler`.
    pub fn scaled_value(&self) -> Data {
        self.scaler_unit.apply(&self.value)
    }
}

impl CosemObject for Register {
    fn object_type(&self) -> ObjectType {
        ObjectType::Register
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
            3 => Ok(self.scaler_unit.to_data()),
            _ => Err(self.base.invalid_attribute(ObjectType::Register, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> Result<()> {
        match attribute_id {
            1 => Err(self.base.denied(attribute_id)),
            2 if value.is_numeric() || value.is_null() => {
                self.value = value;
                Ok(())
            }
            2 => Err(Error::TypeUnmatched),
            3 => {
                self.scaler_unit = ScalerUnit::from_data(&value)?;
                Ok(())
            }
            _ => Err(self.base.invalid_attribute(ObjectType::Register, attribute_id)),
        }
    }

    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, _params: Option<Data>) -> Result<Option<Data>> {
        match method_id {
            1 => {
                self.value = zero_like(&self.value);
                Ok(None)
            }
            _ => Err(Error::MethodUndefined(method_id)),
        }
    }
}

/// Zero of the same numeric type as `value`.
pub(crate) fn zero_like(value: &Data) -> Data {
    match value {
        Data::Integer(_) => Data::Integer(0),
        Data::Unsigned(_) => Data::Unsigned(0),
        Data::Long(_) => Data::Long(0),
        Data::LongUnsigned(_) => Data::LongUnsigned(0),
        Data::DoubleLong(_) => Data::DoubleLong(0),
        Data::Long64(_) => Data::Long64(0),
        Data::Long64Unsigned(_) => Data::Long64Unsigned(0),
        Data::Float32(_) => Data::Float32(0.0),
        Data::Float64(_) => Data::Float64(0.0),
        _ => Data::DoubleLongUnsigned(0),
    }
}
