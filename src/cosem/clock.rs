//! Clock (COSEM Interface Class 8)
//!
//! The meter's time source. Profiles sample it once per capture through
//! [`Clock::now`].
//!
//! # Attributes
//! 1. `logical_name`
//! 2. `time` - current date and time
//! 3. `time_zone` - deviation of local time to UTC in minutes (-720 to +720),
//!    same sign convention as the date-time deviation field
//! 4. `status` - clock status byte
//! 5. `daylight_savings_begin`
//! 6. `daylight_savings_end`
//! 7. `daylight_savings_deviation` - DST shift in minutes
//! 8. `daylight_savings_enabled`
//! 9. `clock_base` - time reference source
//!
//! # Methods
//! 1. `adjust_to_quarter`
//! 2. `adjust_to_measuring_period`
//! 3. `adjust_to_minute`
//! 4. `adjust_to_preset_time`
//! 5. `preset_adjusting_time`
//! 6. `shift_time`

use derive_try_from_primitive::TryFromPrimitive;

use crate::cosem::{CosemObject, ObjectBase};
use crate::data::{ClockStatus, Data, DataType, Date, DateTime};
use crate::error::{self, Error};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;

/// Clock base (time reference source)
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ClockBase {
    NotDefined = 0,
    /// Internal crystal oscillator
    Crystal = 1,
    Mains50Hz = 2,
    Mains60Hz = 3,
    Gps = 4,
    /// Radio controlled (e.g., DCF77, MSF, WWVB)
    Radio = 5,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    pub base: ObjectBase,
    /// Attribute 2
    pub time: DateTime,
    /// Attribute 3
    pub time_zone: i16,
    /// Attribute 4
    pub status: u8,
    /// Attribute 5
    pub daylight_savings_begin: DateTime,
    /// Attribute 6
    pub daylight_savings_end: DateTime,
    /// Attribute 7
    pub daylight_savings_deviation: i8,
    /// Attribute 8
    pub daylight_savings_enabled: bool,
    /// Attribute 9
    pub clock_base: ClockBase,
    /// Target of `adjust_to_preset_time`, set by `preset_adjusting_time`.
    pub(crate) preset_time: DateTime,
}

impl Clock {
    /// Clock with every time field wild-carded. Until attribute 2 is written,
    /// [`Clock::now`] follows the system clock.
    pub fn new(logical_name: ObisCode) -> Self {
        let mut base = ObjectBase::new(logical_name);
        for index in [2, 5, 6] {
            base.set_data_type(index, DataType::OctetString);
            base.set_ui_type(index, DataType::DateTime);
        }
        Self {
            base,
            time: DateTime::default(),
            time_zone: 0,
            status: 0,
            daylight_savings_begin: DateTime::default(),
            daylight_savings_end: DateTime::default(),
            daylight_savings_deviation: 0,
            daylight_savings_enabled: false,
            clock_base: ClockBase::NotDefined,
            preset_time: DateTime::default(),
        }
    }

    /// Whether attribute 2 pins down a single instant.
    pub fn is_set(&self) -> bool {
        self.time.to_epoch_seconds().is_some()
    }

    /// Current time with no wildcard and the deviation filled in.
    ///
    /// A clock whose time was set returns that time; otherwise the system
    /// clock is read and rendered in the configured time zone.
    pub fn now(&self) -> DateTime {
        if self.is_set() {
            let mut now = self.time.clone();
            now.time.second.get_or_insert(0);
            now.time.hundredth.get_or_insert(0);
            now.offset_minutes.get_or_insert(self.time_zone);
            now.clock_status.get_or_insert(ClockStatus::new(self.status));
            if now.date.day_of_week().is_none() {
                if let (Some(year), Some(month), Some(day)) =
                    (now.date.year(), now.date.month(), now.date.day_of_month())
                {
                    now.date = Date::new(year, month, day);
                }
            }
            return now;
        }
        let utc = chrono::Utc::now();
        DateTime::from_epoch_seconds(utc.timestamp(), self.time_zone).unwrap_or_else(|| DateTime::from_chrono(&utc))
    }

    /// Method 1: round to the nearest quarter hour.
    ///
    /// - 0-7 minutes → :00
    /// - 8-22 minutes → :15
    /// - 23-37 minutes → :30
    /// - 38-52 minutes → :45
    /// - 53-59 minutes → :00 of the next hour
    pub fn adjust_to_quarter(&mut self) {
        let hour = i64::from(self.time.time.hour.unwrap_or(0));
        let minute = i64::from(self.time.time.minute.unwrap_or(0));
        let quarter = match minute {
            0..=7 => 0,
            8..=22 => 15,
            23..=37 => 30,
            38..=52 => 45,
            _ => 60,
        };
        self.move_to(hour * 3600 + quarter * 60);
    }

    /// Method 2: assumes a 15 minute measuring period.
    pub fn adjust_to_measuring_period(&mut self) {
        self.adjust_to_quarter()
    }

    /// Method 3: round to the nearest minute, more than 30 seconds rounding up.
    pub fn adjust_to_minute(&mut self) {
        let hour = i64::from(self.time.time.hour.unwrap_or(0));
        let minute = i64::from(self.time.time.minute.unwrap_or(0));
        let second = self.time.time.second.unwrap_or(0);
        let minute = if second > 30 { minute + 1 } else { minute };
        self.move_to(hour * 3600 + minute * 60);
    }

    /// Method 4.
    pub fn adjust_to_preset_time(&mut self) {
        self.time = self.preset_time.clone();
    }

    /// Method 5: stores the time applied by a later method 4.
    pub fn preset_adjusting_time(&mut self, preset_time: DateTime) {
        self.preset_time = preset_time;
    }

    /// Method 6: shifts the time by `seconds`, rolling the date over when the
    /// time is fully specified.
    pub fn shift_time(&mut self, seconds: i16) {
        let current = self.seconds_of_day();
        self.move_to(current + i64::from(seconds));
    }

    fn seconds_of_day(&self) -> i64 {
        let t = &self.time.time;
        i64::from(t.hour.unwrap_or(0)) * 3600
            + i64::from(t.minute.unwrap_or(0)) * 60
            + i64::from(t.second.unwrap_or(0))
    }

    /// Moves the time to `target` seconds after the start of the current day
    /// (may exceed one day either way). Hundredths are cleared.
    fn move_to(&mut self, target: i64) {
        let delta = target - self.seconds_of_day();
        if let Some(epoch) = self.time.to_epoch_seconds() {
            let offset = self.time.offset_minutes.unwrap_or(0);
            if let Some(mut moved) = DateTime::from_epoch_seconds(epoch + delta, offset) {
                moved.offset_minutes = self.time.offset_minutes;
                moved.clock_status = self.time.clock_status;
                self.time = moved;
                return;
            }
        }
        let wrapped = target.rem_euclid(86_400);
        let t = &mut self.time.time;
        t.hour = Some((wrapped / 3600) as u8);
        t.minute = Some((wrapped % 3600 / 60) as u8);
        t.second = Some((wrapped % 60) as u8);
        t.hundredth = Some(0);
    }
}

impl CosemObject for Clock {
    fn object_type(&self) -> ObjectType {
        ObjectType::Clock
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
            2 => Ok(Data::DateTime(self.time.clone())),
            3 => Ok(Data::Long(self.time_zone)),
            4 => Ok(Data::Unsigned(self.status)),
            5 => Ok(Data::DateTime(self.daylight_savings_begin.clone())),
            6 => Ok(Data::DateTime(self.daylight_savings_end.clone())),
            7 => Ok(Data::Integer(self.daylight_savings_deviation)),
            8 => Ok(Data::Bool(self.daylight_savings_enabled)),
            9 => Ok(Data::Enum(self.clock_base as u8)),
            _ => Err(self.base.invalid_attribute(ObjectType::Clock, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> error::Result<()> {
        match (attribute_id, value) {
            (1, _) => return Err(self.base.denied(attribute_id)),
            (2, value) => self.time = value.as_date_time().ok_or(Error::TypeUnmatched)?,
            (3, Data::Long(tz)) if (-720..=720).contains(&tz) => self.time_zone = tz,
            (4, Data::Unsigned(status)) => self.status = status,
            (5, value) => self.daylight_savings_begin = value.as_date_time().ok_or(Error::TypeUnmatched)?,
            (6, value) => self.daylight_savings_end = value.as_date_time().ok_or(Error::TypeUnmatched)?,
            (7, Data::Integer(deviation)) => self.daylight_savings_deviation = deviation,
            (8, Data::Bool(enabled)) => self.daylight_savings_enabled = enabled,
            (8, Data::Unsigned(enabled)) => self.daylight_savings_enabled = enabled != 0,
            (9, Data::Enum(base)) => {
                self.clock_base = ClockBase::try_from(base).map_err(|_| Error::TypeUnmatched)?
            }
            (3..=9, _) => return Err(Error::TypeUnmatched),
            _ => return Err(self.base.invalid_attribute(ObjectType::Clock, attribute_id)),
        }
        Ok(())
    }

    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, params: Option<Data>) -> error::Result<Option<Data>> {
        match (method_id, params) {
            (1, _) => self.adjust_to_quarter(),
            (2, _) => self.adjust_to_measuring_period(),
            (3, _) => self.adjust_to_minute(),
            (4, _) => self.adjust_to_preset_time(),
            // preset_time alone, or structure { preset_time, validity_start, validity_end }
            (5, Some(Data::Structure(fields))) => {
                let preset = fields.first().and_then(Data::as_date_time).ok_or(Error::TypeUnmatched)?;
                self.preset_adjusting_time(preset)
            }
            (5, Some(value)) => self.preset_adjusting_time(value.as_date_time().ok_or(Error::TypeUnmatched)?),
            (6, Some(Data::Long(seconds))) => self.shift_time(seconds),
            (5 | 6, _) => return Err(Error::TypeUnmatched),
            _ => return Err(Error::MethodUndefined(method_id)),
        }
        Ok(None)
    }
}
