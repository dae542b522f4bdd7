//! COSEM object model.
//!
//! Every interface class implemented in this crate carries an [`ObjectBase`]
//! (logical name, short name, version, access tables and per-attribute type
//! information) and implements [`CosemObject`] for attribute access and
//! method invocation.
//!
//! # Example
//!
//! ```
//! use cosem_ic::cosem::{CosemObject, register::Register};
//! use cosem_ic::unit::{ScalerUnit, Unit};
//! use cosem_ic::{Data, ObisCode, Settings};
//!
//! let mut register =
//!     Register::new(ObisCode::new(1, 0, 32, 7, 0, 255), Data::LongUnsigned(0), ScalerUnit::new(-1, Unit::Volt));
//!
//! let settings = Settings::server();
//! register.set_attribute(&settings, 2, Data::LongUnsigned(2301)).unwrap();
//! assert_eq!(register.get_attribute(&settings, 2).unwrap(), Data::LongUnsigned(2301));
//! assert_eq!(register.class_id(), 3);
//! ```

use std::collections::BTreeMap;

use crate::axdr;
use crate::data::{Data, DataType};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;

pub mod capture;
pub mod clock;
pub mod data;
pub mod demand_register;
pub mod profile_generic;
pub mod register;
pub mod script_table;

use capture::ObjectRef;

/// Core trait implemented by every interface class.
///
/// Attribute 1 (logical name) is common to all classes and is served by
/// [`ObjectBase::logical_name_data`]. Access control is enforced by the
/// engine, not by the objects themselves: an object only refuses writes that
/// are never legal for its class.
pub trait CosemObject {
    fn object_type(&self) -> ObjectType;

    fn base(&self) -> &ObjectBase;

    fn base_mut(&mut self) -> &mut ObjectBase;

    fn class_id(&self) -> u16 {
        self.object_type().class_id()
    }

    fn version(&self) -> u8 {
        self.base().version
    }

    fn logical_name(&self) -> &ObisCode {
        &self.base().logical_name
    }

    /// Reads an attribute. Temporal values are returned natively; callers
    /// publishing them on the wire go through [`axdr::publish`].
    fn get_attribute(&self, settings: &Settings, attribute_id: i8) -> Result<Data>;

    fn set_attribute(&mut self, settings: &Settings, attribute_id: i8, value: Data) -> Result<()>;

    /// Invokes a method. Methods that need other objects (captures, script
    /// execution) are routed by the engine instead and never reach here.
    fn invoke_method(&mut self, settings: &Settings, method_id: i8, params: Option<Data>) -> Result<Option<Data>>;

    /// Cross-object references held by this object.
    fn references(&self) -> Vec<&ObjectRef> {
        Vec::new()
    }

    fn references_mut(&mut self) -> Vec<&mut ObjectRef> {
        Vec::new()
    }
}

/// Attribute access rights, as a set of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AttributeAccess(u8);

impl AttributeAccess {
    pub const NO_ACCESS: AttributeAccess = AttributeAccess(0x00);
    pub const READ_ONLY: AttributeAccess = AttributeAccess(0x01);
    pub const WRITE_ONLY: AttributeAccess = AttributeAccess(0x02);
    pub const READ_WRITE: AttributeAccess = AttributeAccess(0x03);
    /// Reading requires an authenticated association.
    pub const AUTHENTICATED_READ: AttributeAccess = AttributeAccess(0x04);
    /// Writing requires an authenticated association.
    pub const AUTHENTICATED_WRITE: AttributeAccess = AttributeAccess(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        AttributeAccess(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: AttributeAccess) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: AttributeAccess) -> bool {
        (self.0 & other.0) != 0
    }

    pub const fn is_no_access(&self) -> bool {
        self.0 == 0
    }

    pub fn can_read(&self, authenticated: bool) -> bool {
        self.contains(Self::READ_ONLY) && (authenticated || !self.contains(Self::AUTHENTICATED_READ))
    }

    pub fn can_write(&self, authenticated: bool) -> bool {
        self.contains(Self::WRITE_ONLY) && (authenticated || !self.contains(Self::AUTHENTICATED_WRITE))
    }

    /// Single digit used by `<Access>`.
    pub fn to_digit(self) -> u8 {
        let read = self.contains(Self::READ_ONLY);
        let write = self.contains(Self::WRITE_ONLY);
        let auth = self.intersects(Self::AUTHENTICATED_READ | Self::AUTHENTICATED_WRITE);
        match (read, write, auth) {
            (false, false, _) => 0,
            (true, false, false) => 1,
            (false, true, false) => 2,
            (true, true, false) => 3,
            (true, false, true) => 4,
            (false, true, true) => 5,
            (true, true, true) => 6,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        Some(match digit {
            0 => Self::NO_ACCESS,
            1 => Self::READ_ONLY,
            2 => Self::WRITE_ONLY,
            3 => Self::READ_WRITE,
            4 => Self::READ_ONLY | Self::AUTHENTICATED_READ,
            5 => Self::WRITE_ONLY | Self::AUTHENTICATED_WRITE,
            6 => Self::READ_WRITE | Self::AUTHENTICATED_READ | Self::AUTHENTICATED_WRITE,
            _ => return None,
        })
    }

    /// Tetrad used by `<Access3>`: `0x8000 | flags`, bit 0 read, bit 1
    /// write, bit 2 authenticated.
    pub fn to_tetrad(self) -> u16 {
        let mut flags = 0x8000;
        if self.contains(Self::READ_ONLY) {
            flags |= 0x01;
        }
        if self.contains(Self::WRITE_ONLY) {
            flags |= 0x02;
        }
        if self.intersects(Self::AUTHENTICATED_READ | Self::AUTHENTICATED_WRITE) {
            flags |= 0x04;
        }
        flags
    }

    pub fn from_tetrad(tetrad: u16) -> Option<Self> {
        if tetrad & 0x8000 == 0 {
            return None;
        }
        let read = tetrad & 0x01 != 0;
        let write = tetrad & 0x02 != 0;
        let auth = tetrad & 0x04 != 0;
        let mut access = Self::NO_ACCESS;
        if read {
            access = access | Self::READ_ONLY;
        }
        if write {
            access = access | Self::WRITE_ONLY;
        }
        if auth && read {
            access = access | Self::AUTHENTICATED_READ;
        }
        if auth && write {
            access = access | Self::AUTHENTICATED_WRITE;
        }
        Some(access)
    }
}

impl core::ops::BitOr for AttributeAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        AttributeAccess(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for AttributeAccess {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        AttributeAccess(self.0 & rhs.0)
    }
}

/// Method access rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MethodAccess(u8);

impl MethodAccess {
    pub const NO_ACCESS: MethodAccess = MethodAccess(0x00);
    pub const ACCESS: MethodAccess = MethodAccess(0x01);
    pub const AUTHENTICATED_ACCESS: MethodAccess = MethodAccess(0x02);

    pub const fn from_bits(bits: u8) -> Self {
        MethodAccess(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: MethodAccess) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn can_invoke(&self, authenticated: bool) -> bool {
        self.contains(Self::ACCESS) && (authenticated || !self.contains(Self::AUTHENTICATED_ACCESS))
    }

    pub fn to_digit(self) -> u8 {
        match (self.contains(Self::ACCESS), self.contains(Self::AUTHENTICATED_ACCESS)) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        Some(match digit {
            0 => Self::NO_ACCESS,
            1 => Self::ACCESS,
            2 => Self::ACCESS | Self::AUTHENTICATED_ACCESS,
            _ => return None,
        })
    }

    pub fn to_tetrad(self) -> u16 {
        let mut flags = 0x8000;
        if self.contains(Self::ACCESS) {
            flags |= 0x01;
        }
        if self.contains(Self::AUTHENTICATED_ACCESS) {
            flags |= 0x04;
        }
        flags
    }

    pub fn from_tetrad(tetrad: u16) -> Option<Self> {
        if tetrad & 0x8000 == 0 {
            return None;
        }
        Some(match (tetrad & 0x01 != 0, tetrad & 0x04 != 0) {
            (false, _) => Self::NO_ACCESS,
            (true, false) => Self::ACCESS,
            (true, true) => Self::ACCESS | Self::AUTHENTICATED_ACCESS,
        })
    }
}

impl core::ops::BitOr for MethodAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        MethodAccess(self.0 | rhs.0)
    }
}

/// State shared by every interface class.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBase {
    pub logical_name: ObisCode,
    /// Legacy 13-bit short-name alias.
    pub short_name: Option<u16>,
    pub version: u8,
    pub description: String,
    attribute_access: BTreeMap<i8, AttributeAccess>,
    method_access: BTreeMap<i8, MethodAccess>,
    data_types: BTreeMap<i8, DataType>,
    ui_types: BTreeMap<i8, DataType>,
}

impl ObjectBase {
    pub fn new(logical_name: ObisCode) -> Self {
        Self {
            logical_name,
            short_name: None,
            version: 0,
            description: String::new(),
            attribute_access: BTreeMap::new(),
            method_access: BTreeMap::new(),
            data_types: BTreeMap::new(),
            ui_types: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Attribute 1 as published on the wire.
    pub fn logical_name_data(&self) -> Data {
        Data::OctetString(self.logical_name.to_bytes().to_vec())
    }

    /// Access to `index`. Unless configured otherwise the logical name is
    /// read-only and every other attribute read-write.
    pub fn attribute_access(&self, index: i8) -> AttributeAccess {
        match self.attribute_access.get(&index) {
            Some(access) => *access,
            None if index == 1 => AttributeAccess::READ_ONLY,
            None => AttributeAccess::READ_WRITE,
        }
    }

    pub fn set_attribute_access(&mut self, index: i8, access: AttributeAccess) {
        self.attribute_access.insert(index, access);
    }

    pub fn method_access(&self, index: i8) -> MethodAccess {
        self.method_access.get(&index).copied().unwrap_or(MethodAccess::ACCESS)
    }

    pub fn set_method_access(&mut self, index: i8, access: MethodAccess) {
        self.method_access.insert(index, access);
    }

    pub fn data_type(&self, index: i8) -> Option<DataType> {
        self.data_types.get(&index).copied()
    }

    pub fn set_data_type(&mut self, index: i8, data_type: DataType) {
        self.data_types.insert(index, data_type);
    }

    pub fn ui_type(&self, index: i8) -> Option<DataType> {
        self.ui_types.get(&index).copied()
    }

    pub fn set_ui_type(&mut self, index: i8, ui_type: DataType) {
        self.ui_types.insert(index, ui_type);
    }

    /// Whether a data type or UI type was recorded for `index`.
    pub fn has_type_info(&self, index: i8) -> bool {
        self.data_types.contains_key(&index) || self.ui_types.contains_key(&index)
    }

    /// Interprets `value` per the types recorded for attribute `index`.
    pub fn coerce(&self, index: i8, value: Data) -> Result<Data> {
        coerce(value, self.data_type(index), self.ui_type(index))
    }

    /// `<Access>` form: one digit per attribute.
    pub fn access_string(&self, attribute_count: i8) -> String {
        (1..=attribute_count)
            .map(|index| char::from(b'0' + self.attribute_access(index).to_digit()))
            .collect()
    }

    pub fn set_access_string(&mut self, digits: &str) -> Result<()> {
        for (index, c) in (1i8..).zip(digits.trim().chars()) {
            let access = c
                .to_digit(10)
                .and_then(|d| AttributeAccess::from_digit(d as u8))
                .ok_or_else(|| Error::InvalidXml(format!("invalid access digit {c:?}")))?;
            self.attribute_access.insert(index, access);
        }
        Ok(())
    }

    /// `<Access3>` form: one hex tetrad per attribute.
    pub fn access3_string(&self, attribute_count: i8) -> String {
        (1..=attribute_count).map(|index| format!("{:04X}", self.attribute_access(index).to_tetrad())).collect()
    }

    pub fn set_access3_string(&mut self, tetrads: &str) -> Result<()> {
        for (index, tetrad) in (1i8..).zip(split_tetrads(tetrads)?) {
            let access = AttributeAccess::from_tetrad(tetrad)
                .ok_or_else(|| Error::InvalidXml(format!("invalid access tetrad {tetrad:04X}")))?;
            self.attribute_access.insert(index, access);
        }
        Ok(())
    }

    pub fn method_access_string(&self, method_count: i8) -> String {
        (1..=method_count).map(|index| char::from(b'0' + self.method_access(index).to_digit())).collect()
    }

    pub fn set_method_access_string(&mut self, digits: &str) -> Result<()> {
        for (index, c) in (1i8..).zip(digits.trim().chars()) {
            let access = c
                .to_digit(10)
                .and_then(|d| MethodAccess::from_digit(d as u8))
                .ok_or_else(|| Error::InvalidXml(format!("invalid method access digit {c:?}")))?;
            self.method_access.insert(index, access);
        }
        Ok(())
    }

    pub fn method_access3_string(&self, method_count: i8) -> String {
        (1..=method_count).map(|index| format!("{:04X}", self.method_access(index).to_tetrad())).collect()
    }

    pub fn set_method_access3_string(&mut self, tetrads: &str) -> Result<()> {
        for (index, tetrad) in (1i8..).zip(split_tetrads(tetrads)?) {
            let access = MethodAccess::from_tetrad(tetrad)
                .ok_or_else(|| Error::InvalidXml(format!("invalid method access tetrad {tetrad:04X}")))?;
            self.method_access.insert(index, access);
        }
        Ok(())
    }

    /// Error for an attribute index the class does not define.
    pub fn invalid_attribute(&self, object_type: ObjectType, index: i8) -> Error {
        Error::InvalidAttributeIndex { object_type, version: self.version, index }
    }

    pub fn denied(&self, index: i8) -> Error {
        Error::ReadWriteDenied { ln: self.logical_name, index }
    }
}

fn split_tetrads(text: &str) -> Result<Vec<u16>> {
    let text = text.trim();
    if text.len() % 4 != 0 || !text.is_ascii() {
        return Err(Error::InvalidXml(format!("access tetrads {text:?} are not 4-digit groups")));
    }
    (0..text.len())
        .step_by(4)
        .map(|at| {
            u16::from_str_radix(&text[at..at + 4], 16)
                .map_err(|_| Error::InvalidXml(format!("invalid access tetrad {:?}", &text[at..at + 4])))
        })
        .collect()
}

/// Interprets a loosely typed value by its declared types.
///
/// Only byte and text values are reinterpreted. Bytes are read as the raw
/// payload of the target type (a 12-byte octet-string becomes a date-time
/// under a date-time UI type); text is parsed by the same type, with hex for
/// octet and temporal payloads. The UI type wins over the data type. With
/// neither known the value is refused.
pub fn coerce(value: Data, data_type: Option<DataType>, ui_type: Option<DataType>) -> Result<Data> {
    let is_loose = matches!(value, Data::OctetString(_) | Data::VisibleString(_) | Data::Utf8String(_));
    let Some(target) = ui_type.or(data_type) else {
        return if is_loose { Err(Error::TypeUnmatched) } else { Ok(value) };
    };
    if !is_loose || value.data_type() == target {
        return Ok(value);
    }
    let coerced = match &value {
        Data::OctetString(bytes) => coerce_bytes(bytes, target),
        Data::VisibleString(bytes) => match target {
            DataType::OctetString | DataType::Utf8String => coerce_bytes(bytes, target),
            _ => core::str::from_utf8(bytes).ok().and_then(|text| coerce_text(text, target)),
        },
        Data::Utf8String(text) => coerce_text(text, target),
        _ => None,
    };
    coerced.ok_or(Error::TypeUnmatched)
}

fn coerce_bytes(bytes: &[u8], target: DataType) -> Option<Data> {
    match target {
        DataType::OctetString => Some(Data::OctetString(bytes.to_vec())),
        DataType::VisibleString => Some(Data::VisibleString(bytes.to_vec())),
        DataType::Utf8String => String::from_utf8(bytes.to_vec()).ok().map(Data::Utf8String),
        t if t.fixed_size() == Some(bytes.len()) => match Data::parse_value(bytes, t) {
            Ok((rest, value)) if rest.is_empty() => Some(value),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_text(text: &str, target: DataType) -> Option<Data> {
    let t = text.trim();
    Some(match target {
        DataType::Null => Data::Null,
        DataType::Bool => match t.to_ascii_lowercase().as_str() {
            "1" | "true" => Data::Bool(true),
            "0" | "false" => Data::Bool(false),
            _ => return None,
        },
        DataType::Integer => Data::Integer(t.parse().ok()?),
        DataType::Unsigned => Data::Unsigned(t.parse().ok()?),
        DataType::Long => Data::Long(t.parse().ok()?),
        DataType::LongUnsigned => Data::LongUnsigned(t.parse().ok()?),
        DataType::DoubleLong => Data::DoubleLong(t.parse().ok()?),
        DataType::DoubleLongUnsigned => Data::DoubleLongUnsigned(t.parse().ok()?),
        DataType::Long64 => Data::Long64(t.parse().ok()?),
        DataType::Long64Unsigned => Data::Long64Unsigned(t.parse().ok()?),
        DataType::Float32 => Data::Float32(t.parse().ok()?),
        DataType::Float64 => Data::Float64(t.parse().ok()?),
        DataType::Enum => Data::Enum(t.parse().ok()?),
        DataType::BitString => Data::BitString(t.parse().ok()?),
        DataType::VisibleString => Data::VisibleString(text.as_bytes().to_vec()),
        DataType::Utf8String => Data::Utf8String(text.to_string()),
        DataType::OctetString => match hex::decode(t) {
            Ok(bytes) => Data::OctetString(bytes),
            Err(_) => Data::OctetString(t.parse::<ObisCode>().ok()?.to_bytes().to_vec()),
        },
        DataType::DateTime | DataType::Date | DataType::Time => coerce_bytes(&hex::decode(t).ok()?, target)?,
        DataType::Array | DataType::Structure => {
            let value = axdr::from_bytes(&hex::decode(t).ok()?).ok()?;
            if value.data_type() != target {
                return None;
            }
            value
        }
        _ => return None,
    })
}

/// Result of a GET or SET on one attribute, as carried on the wire.
///
/// Values: 0, 1, 2, 3, 4, 9, 11-19, 250
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum DataAccessResult {
    Success = 0,
    HardwareFault = 1,
    TemporaryFailure = 2,
    ReadWriteDenied = 3,
    ObjectUndefined = 4,
    ObjectClassInconsistent = 9,
    ObjectUnavailable = 11,
    TypeUnmatched = 12,
    ScopeOfAccessViolated = 13,
    DataBlockUnavailable = 14,
    LongGetAborted = 15,
    NoLongGetInProgress = 16,
    LongSetAborted = 17,
    NoLongSetInProgress = 18,
    DataBlockNumberInvalid = 19,
    OtherReason = 250,
}

impl DataAccessResult {
    /// Returns None if the value is not a valid DataAccessResult code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::HardwareFault),
            2 => Some(Self::TemporaryFailure),
            3 => Some(Self::ReadWriteDenied),
            4 => Some(Self::ObjectUndefined),
            9 => Some(Self::ObjectClassInconsistent),
            11 => Some(Self::ObjectUnavailable),
            12 => Some(Self::TypeUnmatched),
            13 => Some(Self::ScopeOfAccessViolated),
            14 => Some(Self::DataBlockUnavailable),
            15 => Some(Self::LongGetAborted),
            16 => Some(Self::NoLongGetInProgress),
            17 => Some(Self::LongSetAborted),
            18 => Some(Self::NoLongSetInProgress),
            19 => Some(Self::DataBlockNumberInvalid),
            250 => Some(Self::OtherReason),
            _ => None,
        }
    }
}

/// Result of an ACTION, as carried on the wire. Return parameters travel
/// separately as `Option<Data>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ActionResult {
    Success = 0,
    HardwareFault = 1,
    TemporaryFailure = 2,
    ReadWriteDenied = 3,
    ObjectUndefined = 4,
    ObjectClassInconsistent = 9,
    ObjectUnavailable = 11,
    TypeUnmatched = 12,
    ScopeOfAccessViolated = 13,
    DataBlockUnavailable = 14,
    LongActionAborted = 15,
    NoLongActionInProgress = 16,
    OtherReason = 250,
}

impl From<&Error> for ActionResult {
    fn from(err: &Error) -> Self {
        match DataAccessResult::from(err) {
            DataAccessResult::Success => Self::Success,
            DataAccessResult::HardwareFault => Self::HardwareFault,
            DataAccessResult::TemporaryFailure => Self::TemporaryFailure,
            DataAccessResult::ReadWriteDenied => Self::ReadWriteDenied,
            DataAccessResult::ObjectUndefined => Self::ObjectUndefined,
            DataAccessResult::ObjectClassInconsistent => Self::ObjectClassInconsistent,
            DataAccessResult::ObjectUnavailable => Self::ObjectUnavailable,
            DataAccessResult::TypeUnmatched => Self::TypeUnmatched,
            DataAccessResult::ScopeOfAccessViolated => Self::ScopeOfAccessViolated,
            DataAccessResult::DataBlockUnavailable => Self::DataBlockUnavailable,
            DataAccessResult::NoLongGetInProgress | DataAccessResult::NoLongSetInProgress => {
                Self::NoLongActionInProgress
            }
            DataAccessResult::LongGetAborted | DataAccessResult::LongSetAborted => Self::LongActionAborted,
            DataAccessResult::DataBlockNumberInvalid | DataAccessResult::OtherReason => Self::OtherReason,
        }
    }
}
