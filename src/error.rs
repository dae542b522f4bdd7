//! Crate-wide error type.
//!
//! Decoding errors and access denials are surfaced to the caller immediately.
//! Per-cell read failures during capture never reach this type: the engine
//! absorbs them into the row as `Data::Null`.

use thiserror::Error;

use crate::cosem::DataAccessResult;
use crate::object_type::ObjectType;
use crate::obis_code::ObisCode;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid logical name: {0:?}")]
    InvalidLogicalName(String),

    #[error("attribute index {index} out of range for {object_type:?} version {version}")]
    InvalidAttributeIndex { object_type: ObjectType, version: u8, index: i8 },

    #[error("input truncated")]
    DecodeTruncated,

    #[error("length prefix exceeds remaining input")]
    DecodeLength,

    #[error("unknown data tag 0x{0:02x}")]
    DecodeUnknownTag(u8),

    #[error("malformed value")]
    DecodeInvalid,

    #[error("read/write denied for attribute {index} of {ln}")]
    ReadWriteDenied { ln: ObisCode, index: i8 },

    #[error("hardware fault reading {ln} attribute {index}")]
    HardwareFault { ln: ObisCode, index: i8 },

    #[error("unknown access selector {0}")]
    InvalidSelector(u8),

    #[error("invalid range: {0}")]
    InvalidRange(&'static str),

    #[error("reference to {object_type:?} {ln} was never resolved")]
    PlaceholderUnresolved { object_type: ObjectType, ln: ObisCode },

    #[error("type unmatched")]
    TypeUnmatched,

    #[error("{object_type:?} {ln} is already registered")]
    DuplicateObject { object_type: ObjectType, ln: ObisCode },

    #[error("short name {0:#06X} is already registered")]
    DuplicateShortName(u16),

    #[error("object undefined: {object_type:?} {ln}")]
    ObjectUndefined { object_type: Option<ObjectType>, ln: ObisCode },

    #[error("method {0} undefined")]
    MethodUndefined(i8),

    #[error("no block transfer in progress")]
    NoTransferInProgress,

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid XML document: {0}")]
    InvalidXml(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<&Error> for DataAccessResult {
    fn from(err: &Error) -> Self {
        match err {
            Error::ReadWriteDenied { .. } => DataAccessResult::ReadWriteDenied,
            Error::HardwareFault { .. } => DataAccessResult::HardwareFault,
            Error::ObjectUndefined { .. }
            | Error::InvalidAttributeIndex { .. }
            | Error::MethodUndefined(_) => DataAccessResult::ObjectUndefined,
            Error::PlaceholderUnresolved { .. } => DataAccessResult::ObjectUnavailable,
            Error::InvalidSelector(_) | Error::InvalidRange(_) => {
                DataAccessResult::ScopeOfAccessViolated
            }
            Error::NoTransferInProgress => DataAccessResult::NoLongGetInProgress,
            Error::TypeUnmatched
            | Error::DecodeTruncated
            | Error::DecodeLength
            | Error::DecodeUnknownTag(_)
            | Error::DecodeInvalid
            | Error::InvalidLogicalName(_) => DataAccessResult::TypeUnmatched,
            _ => DataAccessResult::OtherReason,
        }
    }
}
