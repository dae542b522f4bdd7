//! COSEM Demand Register (Class ID 5)
//!
//! Average demand over sliding integration periods.
//!
//! ## Attributes
//!
//! 1. **logical_name**
//! 2. **current_average_value** - numeric
//! 3. **last_average_value** - numeric
//! 4. **scaler_unit** - shared by both averages
//! 5. **status** - OctetString, BitString, unsigned or Null
//! 6. **capture_time** - when `last_average_value` was captured
//! 7. **start_time_current** - when the current period started
//! 8. **period** - integration period in seconds
//! 9. **number_of_periods**
//!
//! ## Methods
//!
//! 1. **reset** - clears both averages and restarts the period
//! 2. **next_period** - closes the current period

use crate::cosem::register::zero_like;
use crate::cosem::{CosemObject, ObjectBase};
use crate::data::{Data, DateTime};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;
use crate::unit::ScalerUnit;

#[derive(Debug, Clone, PartialEq)]
pub struct DemandRegister {
    pub base: ObjectBase,
    /// Attribute 2
    pub current_average_value: Data,
    /// Attribute 3
    pub last_average_value: Data,
    /// Attribute 4
    pub scaler_unit: ScalerUnit,
    /// Attribute 5
    pub status: Data,
    /// Attribute 6
    pub capture_time: DateTime,
    /// Attribute 7
    pub start_time_current: DateTime,
    /// Attribute 8, seconds
    pub period: u32,
    /// Attribute 9
    pub number_of_periods: u16,
}

impl DemandRegister {
    pub fn new(logical_name: ObisCode, scaler_unit: ScalerUnit, period: u32) -> Self {
        Self {
            base: ObjectBase::new(logical_name),
            current_average_value: Data::DoubleLongUnsigned(0),
            last_average_value: Data::DoubleLongUnsigned(0),
            scaler_unit,
            status: Data::Null,
            capture_time: DateTime::default(),
            start_time_current: DateTime::default(),
            period,
            number_of_periods: 1,
        }
    }

    pub fn scaled_current_value(&self) -> Data {
        self.scaler_unit.apply(&self.current_average_value)
    }

    pub fn scaled_last_value(&self) -> Data {
        self.scaler_unit.apply(&self.last_average_value)
    }

    /// Method 1.
    pub fn reset(&mut self, now: DateTime) {
        self.current_average_value = zero_like(&self.current_average_value);
        self.last_average_value = zero_like(&self.last_average_value);
        self.capture_time = now.clone();
        self.start_time_current = now;
    }

    /// Method 2: the current average becomes the last one.
    pub fn next_period(&mut self, now: DateTime) {
        self.last_average_value = core::mem::replace(&mut self.current_average_value, Data::Null);
        self.current_average_value = zero_like(&self.last_average_value);
        self.capture_time = now.clone();
        self.start_time_current = now;
    }
}

fn system_now() -> DateTime {
    DateTime::from_chrono(&chrono::Utc::now())
}

impl CosemObject for DemandRegister {
    fn object_type(&self) -> ObjectType {
        ObjectType::DemandRegister
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
            2 => Ok(self.current_average_value.clone()),
            3 => Ok(self.last_average_value.clone()),
            4 => Ok(self.scaler_unit.to_data()),
            5 => Ok(self.status.clone()),
            6 => Ok(Data::DateTime(self.capture_time.clone())),
            7 => Ok(Data::DateTime(self.start_time_current.clone())),
            8 => Ok(Data::DoubleLongUnsigned(self.period)),
            9 => Ok(Data::LongUnsigned(self.number_of_periods)),
            _ => Err(self.base.invalid_attribute(ObjectType::DemandRegister, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> Result<()> {
        match attribute_id {
            1 => return Err(self.base.denied(attribute_id)),
            2 | 3 if !(value.is_numeric() || value.is_null()) => return Err(Error::TypeUnmatched),
            2 => self.current_average_value = value,
            3 => self.last_average_value = value,
            4 => self.scaler_unit = ScalerUnit::from_data(&value)?,
            5 => match value {
                Data::Null | Data::OctetString(_) | Data::BitString(_) | Data::Unsigned(_) => self.status = value,
                _ => return Err(Error::TypeUnmatched),
            },
            6 => self.capture_time = value.as_date_time().ok_or(Error::TypeUnmatched)?,
            7 => self.start_time_current = value.as_date_time().ok_or(Error::TypeUnmatched)?,
            8 => self.period = value.as_u32().ok_or(Error::TypeUnmatched)?,
            9 => {
                self.number_of_periods = value
                    .as_u32()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or(Error::TypeUnmatched)?
            }
            _ => return Err(self.base.invalid_attribute(ObjectType::DemandRegister, attribute_id)),
        }
        Ok(())
    }

    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, _params: Option<Data>) -> Result<Option<Data>> {
        match method_id {
            1 => self.reset(system_now()),
            2 => self.next_period(system_now()),
            _ => return Err(Error::MethodUndefined(method_id)),
        }
        Ok(None)
    }
}
