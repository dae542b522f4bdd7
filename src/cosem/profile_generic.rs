//! ProfileGeneric (Class 7) COSEM Interface Class
//!
//! Bounded time-series buffer of captured rows. Each row holds one cell per
//! capture column; the columns, capture period, sort policy, sort object and
//! capacity are configuration and any write to them clears the buffer.
//!
//! The object owns the buffer and its admission policy. Sampling the
//! referenced objects, periodic scheduling, selective reads and reset
//! propagation need the registry and live in [`crate::engine`].
//!
//! ## Attributes
//!
//! | ID | Name            | Type                  | Access |
//! |----|-----------------|-----------------------|--------|
//! | 1  | logical_name    | OctetString(6)        | R      |
//! | 2  | buffer          | Array of Structure    | R      |
//! | 3  | capture_objects | Array of Structure    | R/W    |
//! | 4  | capture_period  | DoubleLongUnsigned    | R/W    |
//! | 5  | sort_method     | Enum                  | R/W    |
//! | 6  | sort_object     | Structure             | R/W    |
//! | 7  | entries_in_use  | DoubleLongUnsigned    | R      |
//! | 8  | profile_entries | DoubleLongUnsigned    | R/W    |
//!
//! ## Methods
//!
//! 1. `reset(integer)` - clears the buffer
//! 2. `capture(integer)` - takes one row immediately (engine only)

use std::collections::VecDeque;

use derive_try_from_primitive::TryFromPrimitive;

use crate::cosem::capture::{CaptureColumn, ObjectRef};
use crate::cosem::{CosemObject, ObjectBase};
use crate::data::Data;
use crate::error::{self, Error};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::settings::Settings;

/// Buffer admission policy.
///
/// - **FIFO**: rows are appended; a full buffer drops its oldest row.
/// - **LIFO**: rows are prepended; a full buffer drops its newest row.
/// - **Largest/Smallest**: a full buffer drops the row with the smallest /
///   largest sort key.
/// - **NearestToZero/FarthestFromZero**: a full buffer drops the row whose
///   key is farthest from / nearest to zero.
///
/// Key-based policies keep rows in admission order. Ties drop the older row
/// and rows without a comparable key go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum SortMethod {
    #[default]
    Fifo = 1,
    Lifo = 2,
    Largest = 3,
    Smallest = 4,
    NearestToZero = 5,
    FarthestFromZero = 6,
}

impl SortMethod {
    pub fn is_key_based(&self) -> bool {
        !matches!(self, Self::Fifo | Self::Lifo)
    }

    /// Whether `a` should be dropped before `b`.
    fn evicts_before(&self, a: &Data, b: &Data) -> bool {
        match self {
            Self::Fifo | Self::Lifo => false,
            Self::Largest | Self::Smallest => {
                match (a.is_null(), b.is_null()) {
                    (true, _) => !b.is_null(),
                    (false, true) => false,
                    _ => match a.compare(b) {
                        Some(order) if *self == Self::Largest => order.is_lt(),
                        Some(order) => order.is_gt(),
                        None => false,
                    },
                }
            }
            Self::NearestToZero | Self::FarthestFromZero => {
                match (a.as_f64().map(f64::abs), b.as_f64().map(f64::abs)) {
                    (None, other) => other.is_some(),
                    (Some(_), None) => false,
                    (Some(da), Some(db)) if *self == Self::NearestToZero => da > db,
                    (Some(da), Some(db)) => da < db,
                }
            }
        }
    }
}

/// ProfileGeneric COSEM Interface Class (Class ID 7), versions 0 to 2.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileGeneric {
    pub base: ObjectBase,
    buffer: VecDeque<Vec<Data>>,
    capture_objects: Vec<CaptureColumn>,
    capture_period: u32,
    sort_method: SortMethod,
    sort_object: Option<CaptureColumn>,
    profile_entries: u32,
    /// Epoch seconds of the last periodic capture.
    executed_time: Option<i64>,
}

impl ProfileGeneric {
    pub fn new(logical_name: ObisCode, profile_entries: u32) -> Self {
        Self {
            base: ObjectBase::new(logical_name),
            buffer: VecDeque::new(),
            capture_objects: Vec::new(),
            capture_period: 0,
            sort_method: SortMethod::Fifo,
            sort_object: None,
            profile_entries,
            executed_time: None,
        }
    }

    pub fn with_capture_objects(mut self, capture_objects: Vec<CaptureColumn>) -> Self {
        self.set_capture_objects(capture_objects);
        self
    }

    pub fn with_capture_period(mut self, capture_period: u32) -> Self {
        self.set_capture_period(capture_period);
        self
    }

    pub fn with_sort_method(mut self, sort_method: SortMethod) -> Self {
        self.set_sort_method(sort_method);
        self
    }

    pub fn buffer(&self) -> &VecDeque<Vec<Data>> {
        &self.buffer
    }

    pub fn capture_objects(&self) -> &[CaptureColumn] {
        &self.capture_objects
    }

    pub fn capture_period(&self) -> u32 {
        self.capture_period
    }

    pub fn sort_method(&self) -> SortMethod {
        self.sort_method
    }

    pub fn sort_object(&self) -> Option<&CaptureColumn> {
        self.sort_object.as_ref()
    }

    pub fn entries_in_use(&self) -> u32 {
        self.buffer.len() as u32
    }

    pub fn profile_entries(&self) -> u32 {
        self.profile_entries
    }

    pub fn executed_time(&self) -> Option<i64> {
        self.executed_time
    }

    pub(crate) fn set_executed_time(&mut self, epoch_seconds: i64) {
        self.executed_time = Some(epoch_seconds);
    }

    /// Replaces the row schema. A sort object that is no longer a column is
    /// dropped.
    pub fn set_capture_objects(&mut self, capture_objects: Vec<CaptureColumn>) {
        self.capture_objects = capture_objects;
        if let Some(sort_object) = &self.sort_object {
            if self.column_index(sort_object).is_none() {
                self.sort_object = None;
            }
        }
        self.reset();
    }

    pub fn set_capture_period(&mut self, capture_period: u32) {
        self.capture_period = capture_period;
        self.reset();
    }

    pub fn set_sort_method(&mut self, sort_method: SortMethod) {
        self.sort_method = sort_method;
        self.reset();
    }

    /// The sort object must designate one of the capture columns.
    pub fn set_sort_object(&mut self, sort_object: Option<CaptureColumn>) -> error::Result<()> {
        if let Some(column) = &sort_object {
            if self.column_index(column).is_none() {
                return Err(Error::TypeUnmatched);
            }
        }
        self.sort_object = sort_object;
        self.reset();
        Ok(())
    }

    pub fn set_profile_entries(&mut self, profile_entries: u32) {
        self.profile_entries = profile_entries;
        self.reset();
    }

    /// Method 1: clears the buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn column_index(&self, column: &CaptureColumn) -> Option<usize> {
        self.capture_objects.iter().position(|c| c.same_cell(column))
    }

    /// Admits one captured row under the sort policy.
    pub fn push_row(&mut self, row: Vec<Data>) -> error::Result<()> {
        if row.len() != self.capture_objects.len() {
            return Err(Error::TypeUnmatched);
        }
        let capacity = self.profile_entries as usize;
        if capacity == 0 {
            return Ok(());
        }
        match self.sort_method {
            SortMethod::Fifo => {
                self.buffer.push_back(row);
                while self.buffer.len() > capacity {
                    self.buffer.pop_front();
                }
            }
            SortMethod::Lifo => {
                while self.buffer.len() >= capacity {
                    self.buffer.pop_front();
                }
                self.buffer.push_front(row);
            }
            method => {
                self.buffer.push_back(row);
                let key = self.sort_object.as_ref().and_then(|c| self.column_index(c));
                while self.buffer.len() > capacity {
                    let victim = match key {
                        Some(key) => self.eviction_index(method, key),
                        None => 0,
                    };
                    self.buffer.remove(victim);
                }
            }
        }
        Ok(())
    }

    fn eviction_index(&self, method: SortMethod, key: usize) -> usize {
        let mut victim = 0;
        for (index, row) in self.buffer.iter().enumerate().skip(1) {
            if method.evicts_before(&row[key], &self.buffer[victim][key]) {
                victim = index;
            }
        }
        victim
    }

    /// Restores persisted rows. Rows beyond the capacity are dropped from the
    /// front.
    pub fn load_buffer(&mut self, rows: Vec<Vec<Data>>) -> error::Result<()> {
        if rows.iter().any(|row| row.len() != self.capture_objects.len()) {
            return Err(Error::TypeUnmatched);
        }
        self.buffer = rows.into();
        while self.buffer.len() > self.profile_entries as usize {
            self.buffer.pop_front();
        }
        Ok(())
    }

    pub fn capture_objects_data(&self) -> Data {
        Data::Array(self.capture_objects.iter().map(|c| c.to_data(self.base.version)).collect())
    }

    pub fn sort_object_data(&self) -> Data {
        match &self.sort_object {
            Some(column) => CaptureColumn::new(
                column.target.object_type,
                column.target.logical_name,
                column.attribute_index,
                column.data_index,
            )
            .to_data(0),
            None => Data::Structure(vec![
                Data::LongUnsigned(0),
                Data::OctetString(vec![0; 6]),
                Data::Integer(0),
                Data::LongUnsigned(0),
            ]),
        }
    }

    fn sort_object_from_data(value: &Data) -> error::Result<Option<CaptureColumn>> {
        if let Data::Structure(fields) = value {
            if let Some(class_id) = fields.first().and_then(Data::as_u32) {
                if class_id == 0 {
                    return Ok(None);
                }
            }
        }
        CaptureColumn::from_data(value).map(Some)
    }
}

impl CosemObject for ProfileGeneric {
    fn object_type(&self) -> ObjectType {
        ObjectType::ProfileGeneric
    }

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    /// The buffer is returned raw; scaling and selective access are applied
    /// by the engine.
    fn get_attribute(&self, _settings: &Settings, attribute_id: i8) -> error::Result<Data> {
        match attribute_id {
            1 => Ok(self.base.logical_name_data()),
            2 => Ok(Data::Array(self.buffer.iter().map(|row| Data::Structure(row.clone())).collect())),
            3 => Ok(self.capture_objects_data()),
            4 => Ok(Data::DoubleLongUnsigned(self.capture_period)),
            5 => Ok(Data::Enum(self.sort_method as u8)),
            6 => Ok(self.sort_object_data()),
            7 => Ok(Data::DoubleLongUnsigned(self.entries_in_use())),
            8 => Ok(Data::DoubleLongUnsigned(self.profile_entries)),
            _ => Err(self.base.invalid_attribute(ObjectType::ProfileGeneric, attribute_id)),
        }
    }

    fn set_attribute(&mut self, _settings: &Settings, attribute_id: i8, value: Data) -> error::Result<()> {
        match attribute_id {
            1 | 2 | 7 => Err(self.base.denied(attribute_id)),
            3 => {
                let Data::Array(items) = &value else {
                    return Err(Error::TypeUnmatched);
                };
                let columns = items.iter().map(CaptureColumn::from_data).collect::<error::Result<Vec<_>>>()?;
                self.set_capture_objects(columns);
                Ok(())
            }
            4 => {
                self.set_capture_period(value.as_u32().ok_or(Error::TypeUnmatched)?);
                Ok(())
            }
            5 => {
                let Data::Enum(method) = value else {
                    return Err(Error::TypeUnmatched);
                };
                self.set_sort_method(SortMethod::try_from(method).map_err(|_| Error::TypeUnmatched)?);
                Ok(())
            }
            6 => self.set_sort_object(Self::sort_object_from_data(&value)?),
            8 => {
                self.set_profile_entries(value.as_u32().ok_or(Error::TypeUnmatched)?);
                Ok(())
            }
            _ => Err(self.base.invalid_attribute(ObjectType::ProfileGeneric, attribute_id)),
        }
    }

    fn invoke_method(&mut self, _settings: &Settings, method_id: i8, _params: Option<Data>) -> error::Result<Option<Data>> {
        match method_id {
            1 => {
                self.reset();
                Ok(None)
            }
            _ => Err(Error::MethodUndefined(method_id)),
        }
    }

    fn references(&self) -> Vec<&ObjectRef> {
        let mut refs: Vec<&ObjectRef> = self.capture_objects.iter().flat_map(CaptureColumn::references).collect();
        if let Some(sort_object) = &self.sort_object {
            refs.push(&sort_object.target);
        }
        refs
    }

    fn references_mut(&mut self) -> Vec<&mut ObjectRef> {
        let mut refs: Vec<&mut ObjectRef> =
            self.capture_objects.iter_mut().flat_map(CaptureColumn::references_mut).collect();
        if let Some(sort_object) = &mut self.sort_object {
            refs.push(&mut sort_object.target);
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LN: ObisCode = ObisCode::new(1, 0, 99, 1, 0, 255);

    fn value_column() -> CaptureColumn {
        CaptureColumn::new(ObjectType::Register, ObisCode::new(1, 0, 1, 8, 0, 255), 2, 0)
    }

    fn profile(sort_method: SortMethod, entries: u32) -> ProfileGeneric {
        let mut profile = ProfileGeneric::new(LN, entries)
            .with_capture_objects(vec![value_column()])
            .with_sort_method(sort_method);
        if sort_method.is_key_based() {
            profile.set_sort_object(Some(value_column())).unwrap();
        }
        profile
    }

    fn push(profile: &mut ProfileGeneric, values: &[i32]) {
        for v in values {
            profile.push_row(vec![Data::DoubleLong(*v)]).unwrap();
        }
    }

    fn cells(profile: &ProfileGeneric) -> Vec<i32> {
        profile
            .buffer()
            .iter()
            .map(|row| match row[0] {
                Data::DoubleLong(v) => v,
                _ => panic!("unexpected cell"),
            })
            .collect()
    }

    #[test]
    fn test_sort_method_try_from() {
        assert_eq!(SortMethod::try_from(1).unwrap(), SortMethod::Fifo);
        assert_eq!(SortMethod::try_from(6).unwrap(), SortMethod::FarthestFromZero);
        assert!(SortMethod::try_from(0).is_err());
        assert!(SortMethod::try_from(7).is_err());
    }

    #[test]
    fn test_fifo_overflow_drops_oldest() {
        let mut profile = profile(SortMethod::Fifo, 3);
        push(&mut profile, &[10, 20, 30, 40]);
        assert_eq!(cells(&profile), [20, 30, 40]);
        assert_eq!(profile.entries_in_use(), 3);
    }

    #[test]
    fn test_lifo_prepends_and_drops_newest() {
        let mut profile = profile(SortMethod::Lifo, 3);
        push(&mut profile, &[10, 20, 30]);
        assert_eq!(cells(&profile), [30, 20, 10]);
        push(&mut profile, &[40]);
        assert_eq!(cells(&profile), [40, 20, 10]);
    }

    #[test]
    fn test_largest_keeps_largest_in_admission_order() {
        let mut profile = profile(SortMethod::Largest, 3);
        push(&mut profile, &[5, 1, 9, 7]);
        assert_eq!(cells(&profile), [5, 9, 7]);
    }

    #[test]
    fn test_smallest_keeps_smallest() {
        let mut profile = profile(SortMethod::Smallest, 2);
        push(&mut profile, &[5, 1, 9, 0]);
        assert_eq!(cells(&profile), [1, 0]);
    }

    #[test]
    fn test_nearest_and_farthest_from_zero() {
        let mut nearest = profile(SortMethod::NearestToZero, 2);
        push(&mut nearest, &[-8, 3, -1]);
        assert_eq!(cells(&nearest), [3, -1]);

        let mut farthest = profile(SortMethod::FarthestFromZero, 2);
        push(&mut farthest, &[-8, 3, -1]);
        assert_eq!(cells(&farthest), [-8, 3]);
    }

    #[test]
    fn test_ties_evict_older_row() {
        let mut profile = profile(SortMethod::Largest, 2);
        push(&mut profile, &[4, 4, 4]);
        assert_eq!(profile.entries_in_use(), 2);
        let mut profile = profile_with_marker();
        profile.push_row(vec![Data::DoubleLong(4), Data::Unsigned(1)]).unwrap();
        profile.push_row(vec![Data::DoubleLong(4), Data::Unsigned(2)]).unwrap();
        profile.push_row(vec![Data::DoubleLong(4), Data::Unsigned(3)]).unwrap();
        let markers: Vec<Data> = profile.buffer().iter().map(|row| row[1].clone()).collect();
        assert_eq!(markers, [Data::Unsigned(2), Data::Unsigned(3)]);
    }

    fn profile_with_marker() -> ProfileGeneric {
        let marker = CaptureColumn::new(ObjectType::Data, ObisCode::new(0, 0, 96, 1, 0, 255), 2, 0);
        let mut profile = ProfileGeneric::new(LN, 2)
            .with_capture_objects(vec![value_column(), marker])
            .with_sort_method(SortMethod::Largest);
        profile.set_sort_object(Some(value_column())).unwrap();
        profile
    }

    #[test]
    fn test_null_keys_evicted_first() {
        let mut profile = profile(SortMethod::Smallest, 2);
        profile.push_row(vec![Data::DoubleLong(100)]).unwrap();
        profile.push_row(vec![Data::Null]).unwrap();
        profile.push_row(vec![Data::DoubleLong(200)]).unwrap();
        assert_eq!(cells(&profile), [100, 200]);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut profile = profile(SortMethod::Fifo, 0);
        push(&mut profile, &[1]);
        assert_eq!(profile.entries_in_use(), 0);
    }

    #[test]
    fn test_row_arity_checked() {
        let mut profile = profile(SortMethod::Fifo, 3);
        assert!(matches!(profile.push_row(vec![]), Err(Error::TypeUnmatched)));
        assert!(matches!(profile.load_buffer(vec![vec![Data::Null, Data::Null]]), Err(Error::TypeUnmatched)));
    }

    #[test]
    fn test_configuration_writes_reset_buffer() {
        let settings = Settings::server();
        let writes = [
            (3, Data::Array(vec![value_column().to_data(0)])),
            (4, Data::DoubleLongUnsigned(120)),
            (5, Data::Enum(1)),
            (6, value_column().to_data(0)),
            (8, Data::DoubleLongUnsigned(10)),
        ];
        for (index, value) in writes {
            let mut profile = profile(SortMethod::Fifo, 5);
            push(&mut profile, &[1, 2, 3]);
            profile.set_attribute(&settings, index, value).unwrap();
            assert_eq!(profile.entries_in_use(), 0, "attribute {index}");
            assert_eq!(profile.get_attribute(&settings, 2).unwrap(), Data::Array(vec![]));
        }
    }

    #[test]
    fn test_read_only_attributes() {
        let settings = Settings::server();
        let mut profile = profile(SortMethod::Fifo, 5);
        for index in [1, 2, 7] {
            assert!(matches!(
                profile.set_attribute(&settings, index, Data::Null),
                Err(Error::ReadWriteDenied { .. })
            ));
        }
        assert!(profile.set_attribute(&settings, 9, Data::Null).is_err());
        assert!(matches!(profile.set_attribute(&settings, 5, Data::Enum(9)), Err(Error::TypeUnmatched)));
    }

    #[test]
    fn test_sort_object_must_be_a_column() {
        let mut profile = profile(SortMethod::Largest, 5);
        let other = CaptureColumn::new(ObjectType::Data, ObisCode::new(0, 0, 96, 1, 0, 255), 2, 0);
        assert!(matches!(profile.set_sort_object(Some(other)), Err(Error::TypeUnmatched)));
        assert_eq!(profile.sort_object(), Some(&value_column()));
    }

    #[test]
    fn test_sort_object_wire_form() {
        let settings = Settings::server();
        let mut profile = profile(SortMethod::Fifo, 5);
        let Data::Structure(unset) = profile.get_attribute(&settings, 6).unwrap() else { panic!() };
        assert_eq!(unset[0], Data::LongUnsigned(0));

        profile.set_attribute(&settings, 6, value_column().to_data(0)).unwrap();
        assert_eq!(profile.get_attribute(&settings, 6).unwrap(), value_column().to_data(0));

        profile.set_attribute(&settings, 6, Data::Structure(unset)).unwrap();
        assert_eq!(profile.sort_object(), None);
    }

    #[test]
    fn test_capture_objects_follow_version() {
        let settings = Settings::server();
        let mut profile = profile(SortMethod::Fifo, 5);
        profile.base.version = 1;
        let Data::Array(columns) = profile.get_attribute(&settings, 3).unwrap() else { panic!() };
        let Data::Structure(fields) = &columns[0] else { panic!() };
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_reset_method_keeps_configuration() {
        let settings = Settings::server();
        let mut profile = profile(SortMethod::Fifo, 5).with_capture_period(900);
        push(&mut profile, &[1, 2]);
        profile.invoke_method(&settings, 1, Some(Data::Integer(0))).unwrap();
        assert_eq!(profile.entries_in_use(), 0);
        assert_eq!(profile.capture_period(), 900);
        assert_eq!(profile.capture_objects().len(), 1);
        assert!(matches!(profile.invoke_method(&settings, 2, None), Err(Error::MethodUndefined(2))));
    }

    #[test]
    fn test_load_buffer_trims_to_capacity() {
        let mut profile = profile(SortMethod::Fifo, 2);
        profile
            .load_buffer(vec![vec![Data::DoubleLong(1)], vec![Data::DoubleLong(2)], vec![Data::DoubleLong(3)]])
            .unwrap();
        assert_eq!(cells(&profile), [2, 3]);
    }
}
