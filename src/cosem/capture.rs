//! Capture column descriptors.
//!
//! A column names a `(class, logical name, attribute, data index)` tuple. The
//! referenced object is never owned: [`ObjectRef`] keeps the key plus an
//! [`ObjectId`] cached once the registry has bound it.

use core::hash::{Hash, Hasher};

use crate::axdr;
use crate::data::{Data, DateTime};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::registry::ObjectId;

/// Weak reference to a registered object.
///
/// Equality and hashing only consider the key; the cached id is an
/// acceleration valid for the registry that produced it.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub object_type: ObjectType,
    pub logical_name: ObisCode,
    id: Option<ObjectId>,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, logical_name: ObisCode) -> Self {
        Self { object_type, logical_name, id: None }
    }

    pub fn key(&self) -> (ObjectType, ObisCode) {
        (self.object_type, self.logical_name)
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn bind(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    pub fn is_bound(&self) -> bool {
        self.id.is_some()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Optional restriction carried by version 1+ capture definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Restriction {
    #[default]
    None,
    DateRange { from: DateTime, to: DateTime },
    EntryRange { from: u32, to: u32 },
}

impl Restriction {
    pub fn to_data(&self) -> Data {
        let (kind, value) = match self {
            Self::None => (0, Data::Null),
            Self::DateRange { from, to } => (
                1,
                Data::Structure(vec![Data::OctetString(from.to_bytes()), Data::OctetString(to.to_bytes())]),
            ),
            Self::EntryRange { from, to } => {
                (2, Data::Structure(vec![Data::DoubleLongUnsigned(*from), Data::DoubleLongUnsigned(*to)]))
            }
        };
        Data::Structure(vec![Data::Enum(kind), value])
    }

    pub fn from_data(data: &Data) -> Result<Self> {
        let Data::Structure(fields) = data else {
            return Err(Error::TypeUnmatched);
        };
        match fields.as_slice() {
            [Data::Enum(0), _] => Ok(Self::None),
            [Data::Enum(1), Data::Structure(range)] => match range.as_slice() {
                [from, to] => Ok(Self::DateRange {
                    from: from.as_date_time().ok_or(Error::TypeUnmatched)?,
                    to: to.as_date_time().ok_or(Error::TypeUnmatched)?,
                }),
                _ => Err(Error::TypeUnmatched),
            },
            [Data::Enum(2), Data::Structure(range)] => match range.as_slice() {
                [from, to] => Ok(Self::EntryRange {
                    from: from.as_u32().ok_or(Error::TypeUnmatched)?,
                    to: to.as_u32().ok_or(Error::TypeUnmatched)?,
                }),
                _ => Err(Error::TypeUnmatched),
            },
            _ => Err(Error::TypeUnmatched),
        }
    }
}

/// One column of a profile's row schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureColumn {
    pub target: ObjectRef,
    /// 0 captures every attribute of the target as one structure.
    pub attribute_index: i8,
    /// 0 captures the whole attribute value; `n` selects element `n - 1`.
    pub data_index: u16,
    pub restriction: Restriction,
    pub columns: Vec<CaptureColumn>,
}

impl CaptureColumn {
    pub fn new(object_type: ObjectType, logical_name: ObisCode, attribute_index: i8, data_index: u16) -> Self {
        Self {
            target: ObjectRef::new(object_type, logical_name),
            attribute_index,
            data_index,
            restriction: Restriction::None,
            columns: Vec::new(),
        }
    }

    /// Whether `other` designates the same cell.
    pub fn same_cell(&self, other: &CaptureColumn) -> bool {
        self.target == other.target
            && self.attribute_index == other.attribute_index
            && self.data_index == other.data_index
    }

    /// Definition structure as published by a profile of `version`.
    pub fn to_data(&self, version: u8) -> Data {
        let mut fields = vec![
            Data::LongUnsigned(self.target.object_type.class_id()),
            Data::OctetString(self.target.logical_name.to_bytes().to_vec()),
            Data::Integer(self.attribute_index),
            Data::LongUnsigned(self.data_index),
        ];
        if version >= 1 {
            fields.push(self.restriction.to_data());
        }
        if version >= 2 {
            fields.push(Data::Array(self.columns.iter().map(|c| c.to_data(version)).collect()));
        }
        Data::Structure(fields)
    }

    /// Parses a definition structure. Restriction and nested columns are
    /// optional whatever the version.
    pub fn from_data(data: &Data) -> Result<Self> {
        let Data::Structure(fields) = data else {
            return Err(Error::TypeUnmatched);
        };
        let [class_id, ln, attribute_index, data_index, rest @ ..] = fields.as_slice() else {
            return Err(Error::TypeUnmatched);
        };

        let class_id = u16::try_from(class_id.as_u32().ok_or(Error::TypeUnmatched)?)
            .map_err(|_| Error::TypeUnmatched)?;
        let object_type = ObjectType::try_from(class_id).map_err(|_| Error::TypeUnmatched)?;
        if !object_type.is_capturable() {
            return Err(Error::TypeUnmatched);
        }
        let Data::OctetString(ln) = ln else {
            return Err(Error::TypeUnmatched);
        };
        let logical_name = ObisCode::from_bytes(ln)?;
        let Data::Integer(attribute_index) = *attribute_index else {
            return Err(Error::TypeUnmatched);
        };
        if attribute_index < 0 || attribute_index > object_type.attribute_count(object_type.max_version()) {
            return Err(Error::InvalidAttributeIndex { object_type, version: 0, index: attribute_index });
        }
        let data_index = u16::try_from(data_index.as_u32().ok_or(Error::TypeUnmatched)?)
            .map_err(|_| Error::TypeUnmatched)?;

        let mut column = Self::new(object_type, logical_name, attribute_index, data_index);
        if let Some(restriction) = rest.first() {
            column.restriction = Restriction::from_data(restriction)?;
        }
        match rest.get(1) {
            Some(Data::Array(items)) => {
                column.columns = items.iter().map(Self::from_data).collect::<Result<_>>()?;
            }
            Some(_) => return Err(Error::TypeUnmatched),
            None => {}
        }
        Ok(column)
    }

    pub fn encode(&self, out: &mut Vec<u8>, version: u8) {
        axdr::encode(out, &self.to_data(version), true);
    }

    pub fn decode(input: &[u8]) -> Result<(&[u8], Self)> {
        let (rest, data) = axdr::decode(input, None)?;
        Ok((rest, Self::from_data(&data)?))
    }

    /// References held by this column and its nested columns.
    pub fn references(&self) -> Vec<&ObjectRef> {
        let mut refs = vec![&self.target];
        for column in &self.columns {
            refs.extend(column.references());
        }
        refs
    }

    pub fn references_mut(&mut self) -> Vec<&mut ObjectRef> {
        let mut refs = vec![&mut self.target];
        for column in &mut self.columns {
            refs.extend(column.references_mut());
        }
        refs
    }
}
