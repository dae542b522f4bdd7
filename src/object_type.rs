use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;
#[cfg(feature = "serde")]
use serde::Serialize;

/// COSEM interface class identifier.
///
/// Only the classes this crate models are listed; anything else decodes to
/// an error and is refused by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u16)]
#[rustfmt::skip]
pub enum ObjectType {
  Data           = 1,
  Register       = 3,
  DemandRegister = 5,
  ProfileGeneric = 7,
  Clock          = 8,
  ScriptTable    = 9,
}

impl ObjectType {
    pub fn class_id(&self) -> u16 {
        *self as u16
    }

    /// Number of attributes an instance exposes at the given version.
    pub fn attribute_count(&self, _version: u8) -> i8 {
        match self {
            Self::Data => 2,
            Self::Register => 3,
            Self::DemandRegister => 9,
            Self::ProfileGeneric => 8,
            Self::Clock => 9,
            Self::ScriptTable => 2,
        }
    }

    pub fn method_count(&self) -> i8 {
        match self {
            Self::Data => 0,
            Self::Register => 1,
            Self::DemandRegister => 2,
            Self::ProfileGeneric => 2,
            Self::Clock => 6,
            Self::ScriptTable => 1,
        }
    }

    /// Highest version this crate implements for the class.
    pub fn max_version(&self) -> u8 {
        match self {
            Self::ProfileGeneric => 2,
            _ => 0,
        }
    }

    /// Classes whose attributes may appear as capture columns.
    pub fn is_capturable(&self) -> bool {
        !matches!(self, Self::ScriptTable)
    }

    /// Element name used by the XML persistence format.
    pub fn xml_name(&self) -> &'static str {
        match self {
            Self::Data => "GXDLMSData",
            Self::Register => "GXDLMSRegister",
            Self::DemandRegister => "GXDLMSDemandRegister",
            Self::ProfileGeneric => "GXDLMSProfileGeneric",
            Self::Clock => "GXDLMSClock",
            Self::ScriptTable => "GXDLMSScriptTable",
        }
    }

    pub fn from_xml_name(name: &str) -> Option<Self> {
        [
            Self::Data,
            Self::Register,
            Self::DemandRegister,
            Self::ProfileGeneric,
            Self::Clock,
            Self::ScriptTable,
        ]
        .into_iter()
        .find(|t| t.xml_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
