//! Selective access to Profile Generic buffers.
//!
//! A GET on attribute 2 may carry an access selector:
//!
//! | Selector | Parameters | Meaning |
//! |---|---|---|
//! | 0 | none | every row, every column |
//! | 1 | `structure { restricting_object, from_value, to_value, array selected_values }` | rows whose restricting cell lies in `[from, to]` |
//! | 2 | `structure { u32 from_entry, u32 to_entry, u16 from_selected_value, u16 to_selected_value }` | rows and columns by 1-based inclusive position |
//!
//! Parsing and row/column selection live here; the engine applies the result
//! to a buffer snapshot.

use core::ops::Range;

use crate::cosem::capture::CaptureColumn;
use crate::data::Data;
use crate::error::{Error, Result};

/// Selector and raw parameters as carried by a GET request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AccessSelector {
    pub selector: u8,
    pub parameters: Data,
}

impl AccessSelector {
    pub const ALL: u8 = 0;
    pub const RANGE: u8 = 1;
    pub const ENTRY: u8 = 2;

    pub fn all() -> Self {
        Self { selector: Self::ALL, parameters: Data::Null }
    }

    pub fn range(descriptor: &RangeDescriptor) -> Self {
        Self { selector: Self::RANGE, parameters: descriptor.to_data() }
    }

    pub fn entry(descriptor: &EntryDescriptor) -> Self {
        Self { selector: Self::ENTRY, parameters: descriptor.to_data() }
    }

    pub fn selection(&self) -> Result<Selection> {
        match self.selector {
            Self::ALL => Ok(Selection::All),
            Self::RANGE => RangeDescriptor::from_data(&self.parameters).map(Selection::Range),
            Self::ENTRY => EntryDescriptor::from_data(&self.parameters).map(Selection::Entry),
            other => Err(Error::InvalidSelector(other)),
        }
    }
}

/// Parsed form of an [`AccessSelector`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    Range(RangeDescriptor),
    Entry(EntryDescriptor),
}

impl Selection {
    /// Applies the selection to `rows` laid out as `columns`.
    pub fn apply(&self, columns: &[CaptureColumn], rows: &[Vec<Data>]) -> Result<Vec<Vec<Data>>> {
        match self {
            Self::All => Ok(rows.to_vec()),
            Self::Range(range) => {
                let key = range.restricting_index(columns)?;
                let projection = range.projection(columns)?;
                Ok(rows
                    .iter()
                    .filter(|row| range.contains(&row[key]))
                    .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
                    .collect())
            }
            Self::Entry(entry) => {
                let row_range = entry.rows(rows.len())?;
                let column_range = entry.columns(columns.len())?;
                Ok(rows[row_range].iter().map(|row| row[column_range.clone()].to_vec()).collect())
            }
        }
    }

    /// Capture columns emitted by the selection, as indices in output order.
    pub fn projection(&self, columns: &[CaptureColumn]) -> Result<Vec<usize>> {
        match self {
            Self::All => Ok((0..columns.len()).collect()),
            Self::Range(range) => range.projection(columns),
            Self::Entry(entry) => Ok(entry.columns(columns.len())?.collect()),
        }
    }
}

/// Selector 1 parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeDescriptor {
    pub restricting_object: CaptureColumn,
    pub from_value: Data,
    pub to_value: Data,
    /// Columns to emit, in order. Empty selects every column.
    pub selected_values: Vec<CaptureColumn>,
}

impl RangeDescriptor {
    pub fn new(restricting_object: CaptureColumn, from_value: Data, to_value: Data) -> Self {
        Self { restricting_object, from_value, to_value, selected_values: Vec::new() }
    }

    pub fn with_selected_values(mut self, selected_values: Vec<CaptureColumn>) -> Self {
        self.selected_values = selected_values;
        self
    }

    pub fn to_data(&self) -> Data {
        Data::Structure(vec![
            self.restricting_object.to_data(0),
            self.from_value.clone(),
            self.to_value.clone(),
            Data::Array(self.selected_values.iter().map(|c| c.to_data(0)).collect()),
        ])
    }

    pub fn from_data(data: &Data) -> Result<Self> {
        let Data::Structure(fields) = data else {
            return Err(Error::TypeUnmatched);
        };
        let [restricting_object, from_value, to_value, Data::Array(selected)] = fields.as_slice() else {
            return Err(Error::TypeUnmatched);
        };
        Ok(Self {
            restricting_object: CaptureColumn::from_data(restricting_object)?,
            from_value: from_value.clone(),
            to_value: to_value.clone(),
            selected_values: selected.iter().map(CaptureColumn::from_data).collect::<Result<_>>()?,
        })
    }

    fn restricting_index(&self, columns: &[CaptureColumn]) -> Result<usize> {
        columns
            .iter()
            .position(|c| c.same_cell(&self.restricting_object))
            .ok_or(Error::InvalidRange("restricting object is not a captured column"))
    }

    fn projection(&self, columns: &[CaptureColumn]) -> Result<Vec<usize>> {
        if self.selected_values.is_empty() {
            return Ok((0..columns.len()).collect());
        }
        self.selected_values
            .iter()
            .map(|wanted| {
                columns
                    .iter()
                    .position(|c| c.same_cell(wanted))
                    .ok_or(Error::InvalidRange("selected value is not a captured column"))
            })
            .collect()
    }

    /// Inclusive on both ends. Cells that cannot be ordered against the
    /// bounds are excluded.
    fn contains(&self, cell: &Data) -> bool {
        matches!(cell.compare(&self.from_value), Some(o) if o.is_ge())
            && matches!(cell.compare(&self.to_value), Some(o) if o.is_le())
    }
}

/// Selector 2 parameters. Positions are 1-based and inclusive; a zero upper
/// bound means "up to the last".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryDescriptor {
    pub from_entry: u32,
    pub to_entry: u32,
    pub from_selected_value: u16,
    pub to_selected_value: u16,
}

impl EntryDescriptor {
    pub fn new(from_entry: u32, to_entry: u32) -> Self {
        Self { from_entry, to_entry, from_selected_value: 1, to_selected_value: 0 }
    }

    pub fn with_columns(mut self, from_selected_value: u16, to_selected_value: u16) -> Self {
        self.from_selected_value = from_selected_value;
        self.to_selected_value = to_selected_value;
        self
    }

    pub fn to_data(&self) -> Data {
        Data::Structure(vec![
            Data::DoubleLongUnsigned(self.from_entry),
            Data::DoubleLongUnsigned(self.to_entry),
            Data::LongUnsigned(self.from_selected_value),
            Data::LongUnsigned(self.to_selected_value),
        ])
    }

    pub fn from_data(data: &Data) -> Result<Self> {
        let Data::Structure(fields) = data else {
            return Err(Error::TypeUnmatched);
        };
        let [from_entry, to_entry, from_value, to_value] = fields.as_slice() else {
            return Err(Error::TypeUnmatched);
        };
        let u16_of = |d: &Data| d.as_u32().and_then(|n| u16::try_from(n).ok()).ok_or(Error::TypeUnmatched);
        Ok(Self {
            from_entry: from_entry.as_u32().ok_or(Error::TypeUnmatched)?,
            to_entry: to_entry.as_u32().ok_or(Error::TypeUnmatched)?,
            from_selected_value: u16_of(from_value)?,
            to_selected_value: u16_of(to_value)?,
        })
    }

    /// Zero-based row range within a buffer of `len` rows.
    pub fn rows(&self, len: usize) -> Result<Range<usize>> {
        inclusive_range(self.from_entry as usize, self.to_entry as usize, len, "from_entry must be at least 1")
    }

    /// Zero-based column range within a row of `len` cells.
    pub fn columns(&self, len: usize) -> Result<Range<usize>> {
        inclusive_range(
            self.from_selected_value as usize,
            self.to_selected_value as usize,
            len,
            "from_selected_value must be at least 1",
        )
    }
}

fn inclusive_range(from: usize, to: usize, len: usize, reason: &'static str) -> Result<Range<usize>> {
    if from == 0 {
        return Err(Error::InvalidRange(reason));
    }
    let last = if to == 0 { len } else { to.min(len) };
    let start = (from - 1).min(len);
    Ok(start..last.max(start))
}
