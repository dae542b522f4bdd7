use cosem_ic::cosem::capture::CaptureColumn;
use cosem_ic::cosem::clock::Clock;
use cosem_ic::cosem::profile_generic::{ProfileGeneric, SortMethod};
use cosem_ic::cosem::register::Register;
use cosem_ic::cosem::script_table::{Script, ScriptAction, ScriptTable};
use cosem_ic::data::ClockStatus;
use cosem_ic::engine::{CLOCK_LN, ProfileEngine};
use cosem_ic::registry::{Object, ObjectRegistry};
use cosem_ic::unit::{ScalerUnit, Unit};
use cosem_ic::xml::{self, SaveOptions};
use cosem_ic::{Data, Date, DateTime, Error, ObisCode, ObjectType, Settings, Time};

const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
const LOAD: ObisCode = ObisCode::new(1, 0, 99, 1, 0, 255);
const SCRIPTS: ObisCode = ObisCode::new(0, 0, 10, 0, 1, 255);

const FORWARD_REFERENCE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Objects>
  <GXDLMSProfileGeneric>
    <LN>1.0.99.1.0.255</LN>
    <CaptureObjects>
      <Item>
        <ObjectType>3</ObjectType>
        <LN>1.0.1.8.0.255</LN>
        <Attribute>2</Attribute>
        <Data>0</Data>
      </Item>
    </CaptureObjects>
    <CapturePeriod>900</CapturePeriod>
    <SortMethod>1</SortMethod>
    <ProfileEntries>96</ProfileEntries>
  </GXDLMSProfileGeneric>
  <GXDLMSRegister>
    <LN>1.0.1.8.0.255</LN>
    <Value type="DoubleLongUnsigned">4711</Value>
    <ScalerUnit type="Structure">02020F00161E</ScalerUnit>
  </GXDLMSRegister>
</Objects>"#;

fn t(minute: u8) -> DateTime {
    DateTime::new(Date::new(2024, 3, 1), Time::new(10, minute, 0, 0), Some(60), Some(ClockStatus::new(0)))
}

fn profile(registry: &ObjectRegistry) -> &ProfileGeneric {
    let id = registry.find_by_ln(Some(ObjectType::ProfileGeneric), &LOAD).unwrap();
    registry.get(id).and_then(Object::as_profile).unwrap()
}

#[test]
fn test_forward_reference_is_bound() {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = xml::load_str(FORWARD_REFERENCE).unwrap();
    let register = registry.find_by_ln(Some(ObjectType::Register), &ENERGY).unwrap();

    let column = &profile(&registry).capture_objects()[0];
    assert_eq!(column.target.id(), Some(register));
    assert_eq!(registry.resolve(&column.target), Some(register));
    assert_eq!(profile(&registry).capture_period(), 900);
    assert_eq!(profile(&registry).profile_entries(), 96);

    let mut engine = ProfileEngine::new(registry);
    engine.capture(&LOAD).unwrap();
    let buffer = engine.get_attribute(&Settings::server(), ObjectType::ProfileGeneric, &LOAD, 2, None).unwrap();
    assert_eq!(buffer, Data::Array(vec![Data::Structure(vec![Data::DoubleLongUnsigned(4711)])]));
}

#[test]
fn test_dangling_reference_fails_load() {
    let xml = FORWARD_REFERENCE.replace("<LN>1.0.1.8.0.255</LN>\n    <Value", "<LN>1.0.2.8.0.255</LN>\n    <Value");
    assert!(matches!(xml::load_str(&xml), Err(Error::PlaceholderUnresolved { .. })));
}

#[test]
fn test_round_trip() {
    let mut registry = ObjectRegistry::new();
    let mut clock = Clock::new(CLOCK_LN);
    clock.time = t(0);
    clock.time_zone = 60;
    registry.add(clock).unwrap();

    let mut register = Register::new(ENERGY, Data::DoubleLongUnsigned(1000), ScalerUnit::new(-1, Unit::WattHour));
    register.base.short_name = Some(0x2000);
    register.base.description = "Active energy import".into();
    registry.add(register).unwrap();

    let energy = CaptureColumn::new(ObjectType::Register, ENERGY, 2, 0);
    let mut load = ProfileGeneric::new(LOAD, 4)
        .with_capture_objects(vec![CaptureColumn::new(ObjectType::Clock, CLOCK_LN, 2, 0), energy.clone()])
        .with_capture_period(900)
        .with_sort_method(SortMethod::Largest);
    load.set_sort_object(Some(energy.clone())).unwrap();
    load.load_buffer(vec![
        vec![Data::DateTime(t(0)), Data::DoubleLongUnsigned(1000)],
        vec![Data::DateTime(t(15)), Data::DoubleLongUnsigned(1010)],
    ])
    .unwrap();
    registry.add(load).unwrap();

    let mut scripts = ScriptTable::new(SCRIPTS);
    scripts.scripts.push(Script::new(
        1,
        vec![
            ScriptAction::write(ObjectType::Register, ENERGY, 2, Data::DoubleLongUnsigned(0)),
            ScriptAction::execute(ObjectType::ProfileGeneric, LOAD, 2, Data::Integer(0)),
        ],
    ));
    registry.add(scripts).unwrap();
    registry.post_load().unwrap();

    let saved = xml::save_string(&registry, &SaveOptions::default()).unwrap();
    let loaded = xml::load_str(&saved).unwrap();

    let names: Vec<_> = loaded.iter().map(|(_, object)| object.key()).collect();
    let expected: Vec<_> = registry.iter().map(|(_, object)| object.key()).collect();
    assert_eq!(names, expected);

    let register = loaded.get(loaded.find_by_sn(0x2000).unwrap()).and_then(Object::as_register).unwrap();
    assert_eq!(register.value, Data::DoubleLongUnsigned(1000));
    assert_eq!(register.scaler_unit, ScalerUnit::new(-1, Unit::WattHour));
    assert_eq!(register.base.description, "Active energy import");

    let clock = loaded
        .get(loaded.find_by_ln(Some(ObjectType::Clock), &CLOCK_LN).unwrap())
        .and_then(Object::as_clock)
        .unwrap();
    assert_eq!(clock.time, t(0));
    assert_eq!(clock.time_zone, 60);

    let original = profile(&registry);
    let restored = profile(&loaded);
    assert_eq!(restored.buffer(), original.buffer());
    assert_eq!(restored.capture_objects(), original.capture_objects());
    assert_eq!(restored.sort_method(), SortMethod::Largest);
    assert_eq!(restored.sort_object(), Some(&energy));
    assert_eq!(restored.capture_period(), 900);
    assert_eq!(restored.profile_entries(), 4);

    let table = loaded
        .get(loaded.find_by_ln(Some(ObjectType::ScriptTable), &SCRIPTS).unwrap())
        .and_then(Object::as_script_table)
        .unwrap();
    let original_table = registry
        .get(registry.find_by_ln(Some(ObjectType::ScriptTable), &SCRIPTS).unwrap())
        .and_then(Object::as_script_table)
        .unwrap();
    assert_eq!(table.scripts, original_table.scripts);
}

#[test]
fn test_save_without_buffers() {
    let mut registry = ObjectRegistry::new();
    registry.add(Register::new(ENERGY, Data::DoubleLongUnsigned(7), ScalerUnit::default())).unwrap();
    let mut load = ProfileGeneric::new(LOAD, 4)
        .with_capture_objects(vec![CaptureColumn::new(ObjectType::Register, ENERGY, 2, 0)]);
    load.load_buffer(vec![vec![Data::DoubleLongUnsigned(7)]]).unwrap();
    registry.add(load).unwrap();
    registry.post_load().unwrap();

    let options = SaveOptions { indent: 0, include_buffers: false };
    let saved = xml::save_string(&registry, &options).unwrap();
    assert!(!saved.contains("<Buffer>"));
    assert!(saved.contains("<EntriesInUse>0</EntriesInUse>"));

    let loaded = xml::load_str(&saved).unwrap();
    assert_eq!(profile(&loaded).entries_in_use(), 0);
    assert_eq!(profile(&loaded).capture_objects().len(), 1);
}

#[test]
fn test_load_from_reader() {
    let registry = xml::load(FORWARD_REFERENCE.as_bytes()).unwrap();
    assert_eq!(registry.len(), 2);
}
