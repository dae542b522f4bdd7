//! COSEM interface classes with a Profile Generic capture engine.
//!
//! The crate models a metering device's object list as seen from the
//! server side:
//!
//! - [`data`] and [`axdr`]: the typed value model and its A-XDR codec.
//! - [`cosem`]: the interface classes (Data, Register, Demand Register,
//!   Clock, Script Table and Profile Generic) behind the [`CosemObject`]
//!   trait.
//! - [`registry`]: the object list, with logical/short name lookup and late
//!   binding of references between objects.
//! - [`engine`]: capture, periodic scheduling, reset propagation, selective
//!   buffer reads and fragmented transfers over a registry.
//! - [`xml`]: loading and saving a registry as XML.
//!
//! [`CosemObject`]: cosem::CosemObject

pub mod axdr;
pub mod cosem;
pub mod data;
pub mod engine;
pub mod error;
pub mod obis_code;
pub mod object_type;
pub mod registry;
pub mod selective_access;
pub mod settings;
pub mod unit;
pub mod xml;

pub use data::{Data, DataType, Date, DateTime, Time};
pub use engine::ProfileEngine;
pub use error::{Error, Result};
pub use obis_code::ObisCode;
pub use object_type::ObjectType;
pub use registry::{Object, ObjectId, ObjectRegistry};
pub use settings::{Role, Settings, Standard};
