//! Profile engine.
//!
//! [`ProfileEngine`] owns a meter's [`ObjectRegistry`] and runs everything
//! that needs more than one object at a time:
//!
//! - **capture**: samples the meter clock once, reads every capture column
//!   through the registry and admits the row under the profile's sort policy
//! - **scheduling**: [`ProfileEngine::tick`] captures profiles whose aligned
//!   period boundary was crossed
//! - **selective reads** of profile buffers, split into blocks that fit the
//!   peer's PDU and continued with [`ProfileEngine::get_next`]
//! - **reset propagation** to every profile that captures a reset profile
//! - **script execution** for Script Table objects
//!
//! All entry points take `&mut self`; the engine is driven from a single
//! loop and never shares buffer state across threads.
//!
//! # Example
//!
//! ```
//! use cosem_ic::cosem::capture::CaptureColumn;
//! use cosem_ic::cosem::profile_generic::ProfileGeneric;
//! use cosem_ic::cosem::register::Register;
//! use cosem_ic::engine::ProfileEngine;
//! use cosem_ic::registry::ObjectRegistry;
//! use cosem_ic::unit::{ScalerUnit, Unit};
//! use cosem_ic::{Data, ObisCode, ObjectType, Settings};
//!
//! let energy = ObisCode::new(1, 0, 1, 8, 0, 255);
//! let load_profile = ObisCode::new(1, 0, 99, 1, 0, 255);
//!
//! let mut registry = ObjectRegistry::new();
//! registry.add(Register::new(energy, Data::DoubleLongUnsigned(12345), ScalerUnit::new(-2, Unit::WattHour))).unwrap();
//! registry
//!     .add(ProfileGeneric::new(load_profile, 96).with_capture_objects(vec![CaptureColumn::new(
//!         ObjectType::Register,
//!         energy,
//!         2,
//!         0,
//!     )]))
//!     .unwrap();
//! registry.post_load().unwrap();
//!
//! let mut engine = ProfileEngine::new(registry);
//! engine.invoke(&Settings::server(), ObjectType::ProfileGeneric, &load_profile, 2, None).unwrap();
//!
//! let buffer = engine.get_attribute(&Settings::client(), ObjectType::ProfileGeneric, &load_profile, 2, None).unwrap();
//! assert_eq!(buffer, Data::Array(vec![Data::Structure(vec![Data::Float64(123.45)])]));
//! ```

use std::collections::HashSet;

use log::{debug, trace, warn};

use crate::axdr;
use crate::cosem::capture::CaptureColumn;
use crate::cosem::script_table::{ScriptActionType, ScriptTable};
use crate::data::{Data, DataType, DateTime};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::registry::{Object, ObjectId, ObjectRegistry};
use crate::selective_access::{AccessSelector, Selection};
use crate::settings::Settings;

/// Logical name of the meter clock.
pub const CLOCK_LN: ObisCode = ObisCode::new(0, 0, 1, 0, 0, 255);

/// Attributes of a Profile Generic whose write clears its buffer.
const RESET_ATTRIBUTES: [i8; 5] = [3, 4, 5, 6, 8];

/// Time source used when no set Clock object is registered.
pub trait ClockSource {
    fn now(&self) -> DateTime;
}

/// Wall clock rendered with a fixed deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    /// Same sign convention as the date-time deviation field.
    pub offset_minutes: i16,
}

impl ClockSource for SystemClock {
    fn now(&self) -> DateTime {
        let utc = chrono::Utc::now();
        DateTime::from_epoch_seconds(utc.timestamp(), self.offset_minutes)
            .unwrap_or_else(|| DateTime::from_chrono(&utc))
    }
}

impl<F: Fn() -> DateTime> ClockSource for F {
    fn now(&self) -> DateTime {
        self()
    }
}

/// One block of an encoded attribute value.
///
/// Concatenating the `bytes` of every block of a read yields the tagged
/// encoding of the whole value. For buffer reads the array header only
/// appears in the first block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlock {
    /// 1-based.
    pub block_number: u32,
    pub bytes: Vec<u8>,
    /// 1-based index of the first row in this block, 0 if it carries none.
    pub row_begin_index: u32,
    /// Index of the last row in this block; the next block starts after it.
    pub row_end_index: u32,
    pub complete: bool,
}

/// Suspended buffer read.
#[derive(Debug)]
struct Transfer {
    /// Published rows, pinned when the read started.
    rows: Vec<Data>,
    max_pdu_size: usize,
    next_row: usize,
    block_number: u32,
}

impl Transfer {
    fn next_block(&mut self) -> ReadBlock {
        let mut bytes = Vec::new();
        if self.block_number == 0 {
            bytes.push(DataType::Array.tag());
            axdr::encode_length(self.rows.len(), &mut bytes);
        }
        self.block_number += 1;

        let begin = self.next_row;
        let mut encoded = Vec::new();
        while let Some(row) = self.rows.get(self.next_row) {
            encoded.clear();
            axdr::encode(&mut encoded, row, true);
            // A block always makes progress, even if one row overflows it.
            if self.next_row > begin && bytes.len() + encoded.len() > self.max_pdu_size {
                break;
            }
            bytes.extend_from_slice(&encoded);
            self.next_row += 1;
        }

        let emitted = self.next_row - begin;
        ReadBlock {
            block_number: self.block_number,
            bytes,
            row_begin_index: if emitted > 0 { begin as u32 + 1 } else { 0 },
            row_end_index: self.next_row as u32,
            complete: self.next_row == self.rows.len(),
        }
    }
}

pub struct ProfileEngine {
    registry: ObjectRegistry,
    /// Context of the meter's own reads and writes.
    settings: Settings,
    clock_ln: ObisCode,
    clock_source: Box<dyn ClockSource>,
    transfer: Option<Transfer>,
}

impl core::fmt::Debug for ProfileEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProfileEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("clock_ln", &self.clock_ln)
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

impl ProfileEngine {
    pub fn new(registry: ObjectRegistry) -> Self {
        Self {
            registry,
            settings: Settings::server(),
            clock_ln: CLOCK_LN,
            clock_source: Box::new(SystemClock::default()),
            transfer: None,
        }
    }

    pub fn with_clock_source(mut self, clock_source: impl ClockSource + 'static) -> Self {
        self.clock_source = Box::new(clock_source);
        self
    }

    pub fn with_clock_ln(mut self, clock_ln: ObisCode) -> Self {
        self.clock_ln = clock_ln;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> ObjectRegistry {
        self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Samples the meter clock: the registered clock once it has been set,
    /// the clock source otherwise.
    pub fn now(&self) -> DateTime {
        self.registry
            .find_by_ln(Some(ObjectType::Clock), &self.clock_ln)
            .and_then(|id| self.registry.get(id))
            .and_then(Object::as_clock)
            .filter(|clock| clock.is_set())
            .map(|clock| clock.now())
            .unwrap_or_else(|| self.clock_source.now())
    }

    fn find(&self, object_type: ObjectType, ln: &ObisCode) -> Result<ObjectId> {
        self.registry
            .find_by_ln(Some(object_type), ln)
            .ok_or(Error::ObjectUndefined { object_type: Some(object_type), ln: *ln })
    }

    fn object(&self, id: ObjectId) -> Result<&Object> {
        self.registry.get(id).ok_or(Error::ObjectUndefined { object_type: None, ln: ObisCode::default() })
    }

    fn profile_id(&self, ln: &ObisCode) -> Result<ObjectId> {
        self.find(ObjectType::ProfileGeneric, ln)
    }

    // Capture

    /// Captures one row into the profile at `ln` now, whatever its schedule.
    pub fn capture(&mut self, ln: &ObisCode) -> Result<()> {
        let id = self.profile_id(ln)?;
        let stamp = self.now();
        self.capture_at(id, &stamp)
    }

    fn capture_at(&mut self, id: ObjectId, stamp: &DateTime) -> Result<()> {
        let columns = match self.object(id)?.as_profile() {
            Some(profile) => profile.capture_objects().to_vec(),
            None => return Err(Error::TypeUnmatched),
        };
        let row: Vec<Data> = columns.iter().map(|column| self.capture_cell(column, stamp)).collect();

        let Some(profile) = self.registry.get_mut(id).and_then(Object::as_profile_mut) else {
            return Err(Error::TypeUnmatched);
        };
        profile.push_row(row)?;
        debug!(
            "captured row into {} ({} of {} entries)",
            profile.base.logical_name,
            profile.entries_in_use(),
            profile.profile_entries()
        );
        Ok(())
    }

    fn capture_cell(&self, column: &CaptureColumn, stamp: &DateTime) -> Data {
        if column.target.object_type == ObjectType::Clock && column.attribute_index == 2 && column.data_index == 0 {
            return Data::DateTime(stamp.clone());
        }
        match self.read_column(column) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "capture of {} {} attribute {} failed: {err}",
                    column.target.object_type, column.target.logical_name, column.attribute_index
                );
                Data::Null
            }
        }
    }

    fn read_column(&self, column: &CaptureColumn) -> Result<Data> {
        let (object_type, ln) = column.target.key();
        let id = self.registry.resolve(&column.target).ok_or(Error::ObjectUndefined { object_type: Some(object_type), ln })?;
        let object = self
            .object(id)?
            .as_cosem()
            .ok_or(Error::PlaceholderUnresolved { object_type, ln })?;

        let value = if column.attribute_index == 0 {
            let count = object_type.attribute_count(object.version());
            Data::Structure((1..=count).map(|i| object.get_attribute(&self.settings, i)).collect::<Result<_>>()?)
        } else {
            object
                .get_attribute(&self.settings, column.attribute_index)
                .map_err(|_| Error::HardwareFault { ln, index: column.attribute_index })?
        };

        match (column.data_index, value) {
            (0, value) => Ok(value),
            (n, Data::Structure(items) | Data::Array(items)) => {
                items.into_iter().nth(usize::from(n) - 1).ok_or(Error::InvalidRange("data index out of range"))
            }
            _ => Err(Error::TypeUnmatched),
        }
    }

    // Scheduling

    /// Periodic capture. Every profile with a non-zero period whose aligned
    /// boundary at or before `now` has not been captured yet takes one row
    /// stamped `now`. Returns the profiles that captured.
    pub fn tick(&mut self, now: &DateTime) -> Result<Vec<ObjectId>> {
        let epoch = now.to_epoch_seconds().ok_or(Error::InvalidRange("tick time must be fully specified"))?;
        let due: Vec<(ObjectId, i64)> = self
            .registry
            .iter()
            .filter_map(|(id, object)| {
                let profile = object.as_profile()?;
                let period = i64::from(profile.capture_period());
                if period == 0 {
                    return None;
                }
                let boundary = epoch - epoch.rem_euclid(period);
                trace!("{} boundary {boundary}, last {:?}", profile.base.logical_name, profile.executed_time());
                match profile.executed_time() {
                    Some(executed) if executed >= boundary => None,
                    _ => Some((id, boundary)),
                }
            })
            .collect();

        for &(id, boundary) in &due {
            self.capture_at(id, now)?;
            if let Some(profile) = self.registry.get_mut(id).and_then(Object::as_profile_mut) {
                profile.set_executed_time(boundary);
            }
        }
        Ok(due.into_iter().map(|(id, _)| id).collect())
    }

    /// Earliest epoch second at which a periodic capture falls due. Profiles
    /// that have not been ticked yet are not considered.
    pub fn next_capture_due(&self) -> Option<i64> {
        self.registry
            .iter()
            .filter_map(|(_, object)| object.as_profile())
            .filter(|profile| profile.capture_period() > 0)
            .filter_map(|profile| Some(profile.executed_time()? + i64::from(profile.capture_period())))
            .min()
    }

    // Reset

    /// Clears the profile at `ln` and, depth first, every profile capturing
    /// it.
    pub fn reset(&mut self, ln: &ObisCode) -> Result<()> {
        let id = self.profile_id(ln)?;
        self.reset_from(id, &mut HashSet::new());
        Ok(())
    }

    fn reset_from(&mut self, id: ObjectId, visited: &mut HashSet<ObjectId>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(profile) = self.registry.get_mut(id).and_then(Object::as_profile_mut) {
            profile.reset();
            debug!("reset {}", profile.base.logical_name);
        }
        let dependents: Vec<ObjectId> = self
            .registry
            .iter()
            .filter(|(_, object)| {
                object.as_profile().is_some_and(|profile| {
                    profile.capture_objects().iter().flat_map(CaptureColumn::references).any(|target| {
                        target.object_type == ObjectType::ProfileGeneric && self.registry.resolve(target) == Some(id)
                    })
                })
            })
            .map(|(dependent, _)| dependent)
            .collect();
        for dependent in dependents {
            self.reset_from(dependent, visited);
        }
    }

    // Attribute access

    fn check_read(&self, settings: &Settings, object: &Object, index: i8) -> Result<()> {
        let Some(cosem) = object.as_cosem() else {
            let (object_type, ln) = object.key();
            return Err(Error::PlaceholderUnresolved { object_type, ln });
        };
        if !settings.is_server() && !cosem.base().attribute_access(index).can_read(settings.authenticated) {
            return Err(cosem.base().denied(index));
        }
        Ok(())
    }

    /// Reads an attribute as published to the peer described by `settings`.
    ///
    /// Profile buffers honour `selector`; other attributes refuse one. Client
    /// reads of a buffer see register columns in engineering units, server
    /// reads see raw values.
    pub fn get_attribute(
        &self,
        settings: &Settings,
        object_type: ObjectType,
        ln: &ObisCode,
        index: i8,
        selector: Option<&AccessSelector>,
    ) -> Result<Data> {
        let id = self.find(object_type, ln)?;
        let object = self.object(id)?;
        self.check_read(settings, object, index)?;

        if let (Some(_), 2) = (object.as_profile(), index) {
            let rows = self.select_rows(settings, id, selector)?;
            return Ok(Data::Array(rows));
        }
        if let Some(selector) = selector {
            return Err(Error::InvalidSelector(selector.selector));
        }
        let value = object.as_cosem().ok_or(Error::TypeUnmatched)?.get_attribute(settings, index)?;
        Ok(axdr::publish(settings, value))
    }

    fn select_rows(&self, settings: &Settings, id: ObjectId, selector: Option<&AccessSelector>) -> Result<Vec<Data>> {
        let profile = self.object(id)?.as_profile().ok_or(Error::TypeUnmatched)?;
        let columns = profile.capture_objects();
        let selection = match selector {
            Some(selector) => selector.selection()?,
            None => Selection::All,
        };

        // Rows are selected on raw values; scaling only touches what is emitted.
        let snapshot: Vec<Vec<Data>> = profile.buffer().iter().cloned().collect();
        let selected = selection.apply(columns, &snapshot)?;
        let scalers: Vec<Option<i8>> = if settings.is_server() {
            Vec::new()
        } else {
            selection.projection(columns)?.iter().map(|&index| self.column_scaler(&columns[index])).collect()
        };

        Ok(selected
            .into_iter()
            .map(|row| {
                let cells = row
                    .into_iter()
                    .enumerate()
                    .map(|(position, cell)| match scalers.get(position).copied().flatten() {
                        Some(scaler) => cell.scaled(scaler),
                        None => cell,
                    })
                    .collect();
                axdr::publish(settings, Data::Structure(cells))
            })
            .collect())
    }

    /// Scaler applied to a column in client reads.
    fn column_scaler(&self, column: &CaptureColumn) -> Option<i8> {
        if column.data_index != 0 {
            return None;
        }
        let object = self.registry.get(self.registry.resolve(&column.target)?)?;
        let scaler = match (object, column.attribute_index) {
            (Object::Register(register), 2) => register.scaler_unit.scaler,
            (Object::DemandRegister(demand), 2 | 3) => demand.scaler_unit.scaler,
            _ => return None,
        };
        (scaler != 0).then_some(scaler)
    }

    /// Starts a read. Profile buffers are split into blocks of at most
    /// `settings.max_pdu_size` bytes (a single oversized row still gets its
    /// own block); the rest is fetched with [`ProfileEngine::get_next`]. Any
    /// read still in progress is discarded.
    pub fn read(
        &mut self,
        settings: &Settings,
        object_type: ObjectType,
        ln: &ObisCode,
        index: i8,
        selector: Option<&AccessSelector>,
    ) -> Result<ReadBlock> {
        self.cancel_read();
        let id = self.find(object_type, ln)?;
        let is_buffer = index == 2 && self.object(id)?.as_profile().is_some();
        if !is_buffer {
            let value = self.get_attribute(settings, object_type, ln, index, selector)?;
            let mut bytes = Vec::new();
            axdr::encode(&mut bytes, &value, true);
            return Ok(ReadBlock { block_number: 1, bytes, row_begin_index: 0, row_end_index: 0, complete: true });
        }

        self.check_read(settings, self.object(id)?, index)?;
        let rows = self.select_rows(settings, id, selector)?;
        let mut transfer =
            Transfer { rows, max_pdu_size: usize::from(settings.max_pdu_size), next_row: 0, block_number: 0 };
        let block = transfer.next_block();
        debug!("buffer read of {ln}: block 1 carries rows {}..={}", block.row_begin_index, block.row_end_index);
        if !block.complete {
            self.transfer = Some(transfer);
        }
        Ok(block)
    }

    /// Next block of the read in progress.
    pub fn get_next(&mut self) -> Result<ReadBlock> {
        let transfer = self.transfer.as_mut().ok_or(Error::NoTransferInProgress)?;
        let block = transfer.next_block();
        debug!("block {} carries rows {}..={}", block.block_number, block.row_begin_index, block.row_end_index);
        if block.complete {
            self.transfer = None;
        }
        Ok(block)
    }

    /// Drops the read in progress, if any. Buffers are not affected.
    pub fn cancel_read(&mut self) -> bool {
        self.transfer.take().is_some()
    }

    pub fn transfer_in_progress(&self) -> bool {
        self.transfer.is_some()
    }

    /// Writes an attribute on behalf of the peer described by `settings`.
    ///
    /// Clients are subject to the attribute's access rights. Values are
    /// coerced by the recorded attribute types. Writing a profile's
    /// configuration clears it and every profile capturing it.
    pub fn set_attribute(
        &mut self,
        settings: &Settings,
        object_type: ObjectType,
        ln: &ObisCode,
        index: i8,
        value: Data,
    ) -> Result<()> {
        let id = self.find(object_type, ln)?;
        if let Some(cosem) = self.object(id)?.as_cosem() {
            if !settings.is_server() && !cosem.base().attribute_access(index).can_write(settings.authenticated) {
                warn!("write of {object_type} {ln} attribute {index} denied");
                return Err(cosem.base().denied(index));
            }
        }
        self.write(id, index, value)
    }

    fn write(&mut self, id: ObjectId, index: i8, value: Data) -> Result<()> {
        let settings = self.settings.clone();
        let object = self.registry.get_mut(id).and_then(Object::as_cosem_mut).ok_or(Error::TypeUnmatched)?;
        let value = if object.base().has_type_info(index) { object.base().coerce(index, value)? } else { value };
        let object_type = object.object_type();
        object.set_attribute(&settings, index, value)?;

        if object_type == ObjectType::ProfileGeneric && RESET_ATTRIBUTES.contains(&index) {
            if index == 3 || index == 6 {
                self.registry.link(id);
            }
            self.reset_from(id, &mut HashSet::new());
        }
        Ok(())
    }

    // Methods

    /// Invokes a method on behalf of the peer described by `settings`.
    pub fn invoke(
        &mut self,
        settings: &Settings,
        object_type: ObjectType,
        ln: &ObisCode,
        method: i8,
        params: Option<Data>,
    ) -> Result<Option<Data>> {
        let id = self.find(object_type, ln)?;
        if let Some(cosem) = self.object(id)?.as_cosem() {
            if !settings.is_server() && !cosem.base().method_access(method).can_invoke(settings.authenticated) {
                warn!("invocation of {object_type} {ln} method {method} denied");
                return Err(cosem.base().denied(method));
            }
        }
        self.invoke_object(id, method, params, &mut HashSet::new())
    }

    fn invoke_object(
        &mut self,
        id: ObjectId,
        method: i8,
        params: Option<Data>,
        scripts: &mut HashSet<(ObjectId, u16)>,
    ) -> Result<Option<Data>> {
        let settings = self.settings.clone();
        let now = self.now();
        match (self.object(id)?.object_type(), method) {
            (ObjectType::ProfileGeneric, 1) => {
                self.reset_from(id, &mut HashSet::new());
                Ok(None)
            }
            (ObjectType::ProfileGeneric, 2) => {
                self.capture_at(id, &now)?;
                Ok(None)
            }
            (ObjectType::ScriptTable, 1) => {
                self.execute_script(id, ScriptTable::script_id_param(params.as_ref())?, scripts)?;
                Ok(None)
            }
            (ObjectType::DemandRegister, 1 | 2) => {
                let Some(Object::DemandRegister(demand)) = self.registry.get_mut(id) else {
                    return Err(Error::TypeUnmatched);
                };
                if method == 1 {
                    demand.reset(now);
                } else {
                    demand.next_period(now);
                }
                Ok(None)
            }
            _ => self
                .registry
                .get_mut(id)
                .and_then(Object::as_cosem_mut)
                .ok_or(Error::TypeUnmatched)?
                .invoke_method(&settings, method, params),
        }
    }

    fn execute_script(&mut self, table: ObjectId, script_id: u16, running: &mut HashSet<(ObjectId, u16)>) -> Result<()> {
        if !running.insert((table, script_id)) {
            warn!("script {script_id} is already running, not re-entering");
            return Ok(());
        }
        let actions = self
            .object(table)?
            .as_script_table()
            .and_then(|t| t.script(script_id))
            .map(|script| script.actions.clone())
            .ok_or(Error::InvalidRange("unknown script identifier"))?;
        debug!("executing script {script_id} ({} actions)", actions.len());

        for action in actions {
            let (object_type, ln) = action.target.key();
            let target = self.find(object_type, &ln)?;
            match action.action_type {
                ScriptActionType::WriteAttribute => self.write(target, action.index, action.parameter)?,
                ScriptActionType::ExecuteMethod => {
                    self.invoke_object(target, action.index, Some(action.parameter), running)?;
                }
            }
        }
        running.remove(&(table, script_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosem::AttributeAccess;
    use crate::cosem::clock::Clock;
    use crate::cosem::profile_generic::ProfileGeneric;
    use crate::cosem::register::Register;
    use crate::cosem::script_table::{Script, ScriptAction};
    use crate::data::{Date, Time};
    use crate::unit::{ScalerUnit, Unit};

    const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
    const LOAD: ObisCode = ObisCode::new(1, 0, 99, 1, 0, 255);
    const DAILY: ObisCode = ObisCode::new(1, 0, 98, 1, 0, 255);
    const SCRIPTS: ObisCode = ObisCode::new(0, 0, 10, 0, 0, 255);

    fn stamp(minute: u8, second: u8) -> DateTime {
        DateTime::new(Date::new(2024, 6, 1), Time::new(12, minute, second, 0), Some(0), None)
    }

    fn energy_column() -> CaptureColumn {
        CaptureColumn::new(ObjectType::Register, ENERGY, 2, 0)
    }

    fn engine() -> ProfileEngine {
        let mut registry = ObjectRegistry::new();
        registry.add(Clock::new(CLOCK_LN)).unwrap();
        registry
            .add(Register::new(ENERGY, Data::DoubleLongUnsigned(100), ScalerUnit::new(-1, Unit::WattHour)))
            .unwrap();
        registry
            .add(ProfileGeneric::new(LOAD, 10).with_capture_objects(vec![
                CaptureColumn::new(ObjectType::Clock, CLOCK_LN, 2, 0),
                energy_column(),
            ]))
            .unwrap();
        registry
            .add(ProfileGeneric::new(DAILY, 10).with_capture_objects(vec![CaptureColumn::new(
                ObjectType::ProfileGeneric,
                LOAD,
                7,
                0,
            )]))
            .unwrap();
        registry.post_load().unwrap();
        ProfileEngine::new(registry).with_clock_source(|| stamp(0, 0))
    }

    fn entries(engine: &ProfileEngine, ln: &ObisCode) -> Data {
        engine.get_attribute(&Settings::server(), ObjectType::ProfileGeneric, ln, 7, None).unwrap()
    }

    #[test]
    fn test_capture_samples_clock_and_register() {
        let mut engine = engine();
        engine.capture(&LOAD).unwrap();
        let buffer = engine.get_attribute(&Settings::server(), ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();
        assert_eq!(
            buffer,
            Data::Array(vec![Data::Structure(vec![
                Data::OctetString(stamp(0, 0).to_bytes()),
                Data::DoubleLongUnsigned(100),
            ])])
        );
    }

    #[test]
    fn test_set_clock_overrides_source() {
        let mut engine = engine();
        let settings = Settings::server();
        engine
            .set_attribute(&settings, ObjectType::Clock, &CLOCK_LN, 2, Data::OctetString(stamp(30, 0).to_bytes()))
            .unwrap();
        assert_eq!(engine.now().to_epoch_seconds(), stamp(30, 0).to_epoch_seconds());
    }

    #[test]
    fn test_unresolvable_cell_becomes_null() {
        let mut registry = ObjectRegistry::new();
        registry
            .add(ProfileGeneric::new(LOAD, 5).with_capture_objects(vec![
                energy_column(),
                CaptureColumn::new(ObjectType::Register, ENERGY, 2, 1),
            ]))
            .unwrap();
        let mut engine = ProfileEngine::new(registry).with_clock_source(|| stamp(0, 0));
        engine.capture(&LOAD).unwrap();
        let profile = engine.registry().get(ObjectId::new(0)).and_then(Object::as_profile).unwrap();
        assert_eq!(profile.buffer()[0], vec![Data::Null, Data::Null]);
    }

    #[test]
    fn test_attribute_zero_and_data_index() {
        let mut registry = ObjectRegistry::new();
        registry.add(Register::new(ENERGY, Data::LongUnsigned(7), ScalerUnit::new(0, Unit::Volt))).unwrap();
        registry
            .add(ProfileGeneric::new(LOAD, 5).with_capture_objects(vec![
                CaptureColumn::new(ObjectType::Register, ENERGY, 0, 0),
                CaptureColumn::new(ObjectType::Register, ENERGY, 3, 2),
            ]))
            .unwrap();
        registry.post_load().unwrap();
        let mut engine = ProfileEngine::new(registry).with_clock_source(|| stamp(0, 0));
        engine.capture(&LOAD).unwrap();
        let profile = engine.registry().get(ObjectId::new(1)).and_then(Object::as_profile).unwrap();
        assert_eq!(
            profile.buffer()[0],
            vec![
                Data::Structure(vec![
                    Data::OctetString(ENERGY.to_bytes().to_vec()),
                    Data::LongUnsigned(7),
                    Data::Structure(vec![Data::Integer(0), Data::Enum(35)]),
                ]),
                Data::Enum(35),
            ]
        );
    }

    #[test]
    fn test_tick_aligns_to_period() {
        let mut engine = engine();
        let settings = Settings::server();
        engine
            .set_attribute(&settings, ObjectType::ProfileGeneric, &LOAD, 4, Data::DoubleLongUnsigned(60))
            .unwrap();

        assert_eq!(engine.tick(&stamp(0, 30)).unwrap().len(), 1);
        assert!(engine.tick(&stamp(0, 59)).unwrap().is_empty());
        assert_eq!(engine.next_capture_due(), stamp(1, 0).to_epoch_seconds());
        assert_eq!(engine.tick(&stamp(1, 0)).unwrap().len(), 1);
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(2));

        // Period 0 disables the schedule but not explicit captures.
        engine
            .set_attribute(&settings, ObjectType::ProfileGeneric, &LOAD, 4, Data::DoubleLongUnsigned(0))
            .unwrap();
        assert!(engine.tick(&stamp(5, 0)).unwrap().is_empty());
        engine.invoke(&settings, ObjectType::ProfileGeneric, &LOAD, 2, Some(Data::Integer(0))).unwrap();
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(1));
    }

    #[test]
    fn test_tick_rejects_wildcards() {
        let mut engine = engine();
        assert!(matches!(engine.tick(&DateTime::default()), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_reset_propagates_to_capturing_profiles() {
        let mut engine = engine();
        let settings = Settings::server();
        engine.capture(&LOAD).unwrap();
        engine.capture(&DAILY).unwrap();
        assert_eq!(entries(&engine, &DAILY), Data::DoubleLongUnsigned(1));

        engine.invoke(&settings, ObjectType::ProfileGeneric, &LOAD, 1, Some(Data::Integer(0))).unwrap();
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(0));
        assert_eq!(entries(&engine, &DAILY), Data::DoubleLongUnsigned(0));
    }

    #[test]
    fn test_reset_cycle_terminates() {
        let mut registry = ObjectRegistry::new();
        registry
            .add(ProfileGeneric::new(LOAD, 5).with_capture_objects(vec![CaptureColumn::new(
                ObjectType::ProfileGeneric,
                DAILY,
                7,
                0,
            )]))
            .unwrap();
        registry
            .add(ProfileGeneric::new(DAILY, 5).with_capture_objects(vec![CaptureColumn::new(
                ObjectType::ProfileGeneric,
                LOAD,
                7,
                0,
            )]))
            .unwrap();
        registry.post_load().unwrap();
        let mut engine = ProfileEngine::new(registry).with_clock_source(|| stamp(0, 0));
        engine.capture(&LOAD).unwrap();
        engine.capture(&DAILY).unwrap();
        engine.reset(&DAILY).unwrap();
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(0));
        assert_eq!(entries(&engine, &DAILY), Data::DoubleLongUnsigned(0));
    }

    #[test]
    fn test_client_access_rights() {
        let mut engine = engine();
        let register = engine.find(ObjectType::Register, &ENERGY).unwrap();
        if let Some(Object::Register(r)) = engine.registry_mut().get_mut(register) {
            r.base.set_attribute_access(2, AttributeAccess::READ_ONLY);
            r.base.set_attribute_access(3, AttributeAccess::READ_ONLY | AttributeAccess::AUTHENTICATED_READ);
        }
        let client = Settings::client();
        assert!(matches!(
            engine.set_attribute(&client, ObjectType::Register, &ENERGY, 2, Data::DoubleLongUnsigned(1)),
            Err(Error::ReadWriteDenied { index: 2, .. })
        ));
        assert!(engine.get_attribute(&client, ObjectType::Register, &ENERGY, 3, None).is_err());
        assert!(engine.get_attribute(&client.with_authenticated(true), ObjectType::Register, &ENERGY, 3, None).is_ok());
        // The meter itself is not subject to access rights.
        engine
            .set_attribute(&Settings::server(), ObjectType::Register, &ENERGY, 2, Data::DoubleLongUnsigned(1))
            .unwrap();
    }

    #[test]
    fn test_selector_only_on_buffer() {
        let engine = engine();
        let selector = AccessSelector::all();
        assert!(matches!(
            engine.get_attribute(&Settings::server(), ObjectType::Register, &ENERGY, 2, Some(&selector)),
            Err(Error::InvalidSelector(0))
        ));
        assert!(matches!(
            engine.get_attribute(&Settings::server(), ObjectType::Register, &LOAD, 2, None),
            Err(Error::ObjectUndefined { .. })
        ));
    }

    #[test]
    fn test_fragmented_read() {
        let mut engine = engine();
        for _ in 0..5 {
            engine.capture(&LOAD).unwrap();
        }
        let full = engine.get_attribute(&Settings::server(), ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();

        // Each row is 2 + 14 + 5 bytes, so 48 bytes hold the header and two rows.
        let settings = Settings::server().with_max_pdu_size(48);
        let first = engine.read(&settings, ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();
        assert_eq!((first.row_begin_index, first.row_end_index, first.complete), (1, 2, false));
        assert_eq!(&first.bytes[..2], &[0x01, 0x05]);

        // Captures after the first block do not leak into the transfer.
        engine.capture(&LOAD).unwrap();

        let second = engine.get_next().unwrap();
        assert_eq!((second.block_number, second.row_begin_index, second.row_end_index), (2, 3, 4));
        let third = engine.get_next().unwrap();
        assert_eq!((third.row_begin_index, third.row_end_index, third.complete), (5, 5, true));
        assert!(matches!(engine.get_next(), Err(Error::NoTransferInProgress)));

        let bytes = [first.bytes, second.bytes, third.bytes].concat();
        assert_eq!(axdr::from_bytes(&bytes).unwrap(), full);
    }

    #[test]
    fn test_cancel_read() {
        let mut engine = engine();
        for _ in 0..3 {
            engine.capture(&LOAD).unwrap();
        }
        let settings = Settings::server().with_max_pdu_size(30);
        let first = engine.read(&settings, ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();
        assert!(!first.complete);
        assert!(engine.cancel_read());
        assert!(!engine.cancel_read());
        assert!(matches!(engine.get_next(), Err(Error::NoTransferInProgress)));
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(3));
    }

    #[test]
    fn test_empty_buffer_read() {
        let mut engine = engine();
        let block = engine.read(&Settings::server(), ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();
        assert_eq!(block.bytes, [0x01, 0x00]);
        assert!(block.complete);
        assert_eq!(block.row_begin_index, 0);
    }

    #[test]
    fn test_script_write_resets_profile() {
        let mut engine = engine();
        let mut table = ScriptTable::new(SCRIPTS);
        table.scripts.push(Script::new(
            1,
            vec![
                ScriptAction::write(ObjectType::ProfileGeneric, LOAD, 4, Data::DoubleLongUnsigned(900)),
                ScriptAction::execute(ObjectType::ProfileGeneric, DAILY, 2, Data::Integer(0)),
            ],
        ));
        let id = engine.registry_mut().add(table).unwrap();
        engine.registry_mut().link(id);

        engine.capture(&LOAD).unwrap();
        let settings = Settings::server();
        engine.invoke(&settings, ObjectType::ScriptTable, &SCRIPTS, 1, Some(Data::LongUnsigned(1))).unwrap();

        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(0));
        assert_eq!(
            engine.get_attribute(&settings, ObjectType::ProfileGeneric, &LOAD, 4, None).unwrap(),
            Data::DoubleLongUnsigned(900)
        );
        assert_eq!(entries(&engine, &DAILY), Data::DoubleLongUnsigned(1));
        assert!(matches!(
            engine.invoke(&settings, ObjectType::ScriptTable, &SCRIPTS, 1, Some(Data::LongUnsigned(2))),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_self_invoking_script_terminates() {
        let mut engine = engine();
        let mut table = ScriptTable::new(SCRIPTS);
        table.scripts.push(Script::new(
            1,
            vec![
                ScriptAction::execute(ObjectType::ProfileGeneric, LOAD, 2, Data::Integer(0)),
                ScriptAction::execute(ObjectType::ScriptTable, SCRIPTS, 1, Data::LongUnsigned(1)),
            ],
        ));
        engine.registry_mut().add(table).unwrap();
        engine
            .invoke(&Settings::server(), ObjectType::ScriptTable, &SCRIPTS, 1, Some(Data::LongUnsigned(1)))
            .unwrap();
        assert_eq!(entries(&engine, &LOAD), Data::DoubleLongUnsigned(1));
    }
}
