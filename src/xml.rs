//! XML persistence of an object registry.
//!
//! ```xml
//! <Objects>
//!   <GXDLMSRegister>
//!     <LN>1.0.1.8.0.255</LN>
//!     <Access>133</Access>
//!     <MethodAccess>1</MethodAccess>
//!     <Value type="DoubleLongUnsigned">12345</Value>
//!     <ScalerUnit type="Structure">02020FFE161E</ScalerUnit>
//!   </GXDLMSRegister>
//! </Objects>
//! ```
//!
//! Element names match case-insensitively. Typed values carry a `type`
//! attribute (and optionally `uiType`) and use the text form understood by
//! [`cosem::coerce`]: numbers in decimal, strings as text, octet-strings and
//! date/time payloads in hex, arrays and structures as hex of their tagged
//! A-XDR encoding.
//!
//! Loading is two-pass: objects are registered as they appear, references to
//! objects further down the document become placeholders, and
//! [`ObjectRegistry::post_load`] binds them once the whole document was read.

use std::io::{Read, Write};
use std::str::FromStr;

use log::{info, warn};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::cosem::capture::CaptureColumn;
use crate::cosem::clock::Clock;
use crate::cosem::data::DataObject;
use crate::cosem::demand_register::DemandRegister;
use crate::cosem::profile_generic::{ProfileGeneric, SortMethod};
use crate::cosem::register::Register;
use crate::cosem::script_table::{Script, ScriptAction, ScriptActionType, ScriptTable};
use crate::cosem::{self, CosemObject, ObjectBase};
use crate::data::{Data, DataType};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::object_type::ObjectType;
use crate::registry::{Object, ObjectRegistry};
use crate::settings::Settings;
use crate::unit::ScalerUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Spaces per nesting level, 0 writes everything on one line.
    pub indent: usize,
    /// Whether profile buffers are written.
    pub include_buffers: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { indent: 2, include_buffers: true }
    }
}

/// Generic typed elements of each class, by attribute index.
fn attribute_elements(object_type: ObjectType) -> &'static [(&'static str, i8)] {
    match object_type {
        ObjectType::Data => &[("Value", 2)],
        ObjectType::Register => &[("Value", 2), ("ScalerUnit", 3)],
        ObjectType::DemandRegister => &[
            ("CurrentAverageValue", 2),
            ("LastAverageValue", 3),
            ("ScalerUnit", 4),
            ("Status", 5),
            ("CaptureTime", 6),
            ("StartTimeCurrent", 7),
            ("Period", 8),
            ("NumberOfPeriods", 9),
        ],
        ObjectType::Clock => &[
            ("Time", 2),
            ("TimeZone", 3),
            ("Status", 4),
            ("Begin", 5),
            ("End", 6),
            ("Deviation", 7),
            ("Enabled", 8),
            ("ClockBase", 9),
        ],
        ObjectType::ProfileGeneric | ObjectType::ScriptTable => &[],
    }
}

// Reading

/// Parsed element tree.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Element { name: String::from_utf8_lossy(start.name().as_ref()).into_owned(), ..Default::default() };
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let value = attribute.unescape_value().map_err(quick_xml::Error::from)?;
            element
                .attributes
                .push((String::from_utf8_lossy(attribute.key.as_ref()).into_owned(), value.into_owned()));
        }
        Ok(element)
    }

    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(name))
    }

    fn required(&self, name: &str) -> Result<&Element> {
        self.child(name).ok_or_else(|| Error::InvalidXml(format!("<{}> lacks <{name}>", self.name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    fn parse<T: FromStr>(&self) -> Result<T> {
        self.text
            .trim()
            .parse()
            .map_err(|_| Error::InvalidXml(format!("<{}>: cannot parse {:?}", self.name, self.text)))
    }

    fn child_value<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.child(name).map(Element::parse).transpose()
    }

    fn required_value<T: FromStr>(&self, name: &str) -> Result<T> {
        self.required(name)?.parse()
    }
}

fn parse_tree(xml: &str) -> Result<Element> {
    // Text is kept verbatim so string cells keep their spaces. Structural
    // readers trim for themselves.
    let mut reader = Reader::from_str(xml);

    let mut stack = vec![Element::default()];
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                let element = stack.pop().filter(|_| !stack.is_empty());
                match (element, stack.last_mut()) {
                    (Some(element), Some(parent)) => parent.children.push(element),
                    _ => return Err(Error::InvalidXml("unbalanced end tag".into())),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(document), true) => {
            document.children.into_iter().next().ok_or_else(|| Error::InvalidXml("empty document".into()))
        }
        _ => Err(Error::InvalidXml("unclosed element".into())),
    }
}

fn type_name(data_type: DataType) -> String {
    format!("{data_type:?}")
}

fn parse_type_name(name: &str) -> Result<DataType> {
    if let Ok(tag) = name.trim().parse::<u8>() {
        return DataType::try_from(tag).map_err(|tag| Error::InvalidXml(format!("unknown data type {tag}")));
    }
    (0u8..=0x1b)
        .filter_map(|tag| DataType::try_from(tag).ok())
        .find(|t| type_name(*t).eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| Error::InvalidXml(format!("unknown data type {name:?}")))
}

/// Typed value of `element`, with its UI type if one is given.
fn read_cell(element: &Element) -> Result<(Data, Option<DataType>)> {
    let ui_type = element.attribute("uiType").map(parse_type_name).transpose()?;
    let value = match element.attribute("type") {
        Some(name) => {
            let data_type = parse_type_name(name)?;
            cosem::coerce(Data::Utf8String(element.text.clone()), Some(data_type), None).map_err(|_| {
                Error::InvalidXml(format!("<{}>: {:?} is not a valid {data_type:?}", element.name, element.text))
            })?
        }
        None if element.text.trim().is_empty() => Data::Null,
        None => return Err(Error::InvalidXml(format!("<{}> lacks a type", element.name))),
    };
    Ok((value, ui_type))
}

fn read_base(base: &mut ObjectBase, element: &Element) -> Result<()> {
    base.short_name = element.child_value("SN")?;
    base.version = element.child_value("Version")?.unwrap_or(0);
    if let Some(description) = element.child("Description") {
        base.description = description.text.clone();
    }
    if let Some(access) = element.child("Access") {
        base.set_access_string(access.text.trim())?;
    }
    if let Some(access) = element.child("Access3") {
        base.set_access3_string(access.text.trim())?;
    }
    if let Some(access) = element.child("MethodAccess") {
        base.set_method_access_string(access.text.trim())?;
    }
    if let Some(access) = element.child("MethodAccess3") {
        base.set_method_access3_string(access.text.trim())?;
    }
    Ok(())
}

fn read_attributes(object: &mut dyn CosemObject, element: &Element) -> Result<()> {
    let settings = Settings::server();
    let (object_type, ln) = (object.object_type(), *object.logical_name());
    for &(name, index) in attribute_elements(object_type) {
        let Some(child) = element.child(name) else {
            continue;
        };
        let (value, ui_type) = read_cell(child)?;
        if let Some(ui_type) = ui_type {
            object.base_mut().set_ui_type(index, ui_type);
        }
        object
            .set_attribute(&settings, index, value)
            .map_err(|err| Error::InvalidXml(format!("{object_type} {ln} <{name}>: {err}")))?;
    }
    Ok(())
}

fn read_column(element: &Element) -> Result<CaptureColumn> {
    let logical_name: ObisCode = element.required_value("LN")?;
    CaptureColumn::from_data(&Data::Structure(vec![
        Data::LongUnsigned(element.required_value("ObjectType")?),
        Data::OctetString(logical_name.to_bytes().to_vec()),
        Data::Integer(element.child_value("Attribute")?.unwrap_or(2)),
        Data::LongUnsigned(element.child_value("Data")?.unwrap_or(0)),
    ]))
}

fn read_profile(profile: &mut ProfileGeneric, element: &Element) -> Result<()> {
    let ln = profile.base.logical_name;
    profile.set_profile_entries(element.child_value("ProfileEntries")?.unwrap_or(0));
    if let Some(items) = element.child("CaptureObjects") {
        profile.set_capture_objects(items.children_named("Item").map(read_column).collect::<Result<_>>()?);
    }
    profile.set_capture_period(element.child_value("CapturePeriod")?.unwrap_or(0));
    if let Some(method) = element.child_value::<u8>("SortMethod")? {
        let method = SortMethod::try_from(method)
            .map_err(|_| Error::InvalidXml(format!("{ln}: unknown sort method {method}")))?;
        profile.set_sort_method(method);
    }
    if let Some(sort_object) = element.child("SortObject") {
        if sort_object.child_value::<u16>("ObjectType")?.unwrap_or(0) != 0 {
            profile
                .set_sort_object(Some(read_column(sort_object)?))
                .map_err(|_| Error::InvalidXml(format!("{ln}: sort object is not a capture column")))?;
        }
    }
    if let Some(buffer) = element.child("Buffer") {
        let rows = buffer
            .children_named("Row")
            .map(|row| row.children_named("Cell").map(|cell| read_cell(cell).map(|(v, _)| v)).collect())
            .collect::<Result<Vec<Vec<Data>>>>()?;
        profile
            .load_buffer(rows)
            .map_err(|_| Error::InvalidXml(format!("{ln}: buffer rows do not match the capture objects")))?;
    }
    if let Some(entries) = element.child_value::<u32>("EntriesInUse")? {
        if entries != profile.entries_in_use() {
            warn!("{ln}: EntriesInUse {entries} disagrees with {} buffered rows", profile.entries_in_use());
        }
    }
    Ok(())
}

fn read_scripts(table: &mut ScriptTable, element: &Element) -> Result<()> {
    let Some(scripts) = element.child("Scripts") else {
        return Ok(());
    };
    for script in scripts.children_named("Script") {
        let mut actions = Vec::new();
        if let Some(list) = script.child("Actions") {
            for action in list.children_named("Action") {
                let action_type: u8 = action.required_value("Type")?;
                let action_type = ScriptActionType::try_from(action_type)
                    .map_err(|_| Error::InvalidXml(format!("unknown script action {action_type}")))?;
                let class_id: u16 = action.required_value("ObjectType")?;
                let object_type = ObjectType::try_from(class_id)
                    .map_err(|_| Error::InvalidXml(format!("unknown object type {class_id}")))?;
                let logical_name = action.required_value("LN")?;
                let index = action.required_value("Index")?;
                let parameter = match action.child("Parameter") {
                    Some(parameter) => read_cell(parameter)?.0,
                    None => Data::Null,
                };
                actions.push(match action_type {
                    ScriptActionType::WriteAttribute => ScriptAction::write(object_type, logical_name, index, parameter),
                    ScriptActionType::ExecuteMethod => ScriptAction::execute(object_type, logical_name, index, parameter),
                });
            }
        }
        table.scripts.push(Script::new(script.required_value("Index")?, actions));
    }
    Ok(())
}

fn read_object(object_type: ObjectType, element: &Element) -> Result<Object> {
    let ln: ObisCode = element.required_value("LN")?;
    let mut object: Object = match object_type {
        ObjectType::Data => DataObject::new(ln, Data::Null).into(),
        ObjectType::Register => Register::new(ln, Data::DoubleLongUnsigned(0), ScalerUnit::default()).into(),
        ObjectType::DemandRegister => DemandRegister::new(ln, ScalerUnit::default(), 0).into(),
        ObjectType::ProfileGeneric => ProfileGeneric::new(ln, 0).into(),
        ObjectType::Clock => Clock::new(ln).into(),
        ObjectType::ScriptTable => ScriptTable::new(ln).into(),
    };
    if let Some(cosem) = object.as_cosem_mut() {
        read_base(cosem.base_mut(), element)?;
        read_attributes(cosem, element)?;
    }
    match &mut object {
        Object::ProfileGeneric(profile) => read_profile(profile, element)?,
        Object::ScriptTable(table) => read_scripts(table, element)?,
        _ => {}
    }
    Ok(object)
}

/// Builds a registry from an XML document.
///
/// Elements of unknown classes are skipped. Fails if a reference is left
/// unresolved once the whole document was read.
pub fn load_str(xml: &str) -> Result<ObjectRegistry> {
    let root = parse_tree(xml)?;
    if !root.is("Objects") {
        return Err(Error::InvalidXml(format!("expected <Objects>, found <{}>", root.name)));
    }

    let mut registry = ObjectRegistry::new();
    for element in &root.children {
        let Some(object_type) = ObjectType::from_xml_name(&element.name) else {
            warn!("skipping unsupported element <{}>", element.name);
            continue;
        };
        let id = registry.add(read_object(object_type, element)?)?;
        registry.link(id);
    }
    registry.post_load()?;
    info!("loaded {} objects", registry.len());
    Ok(registry)
}

pub fn load<R: Read>(mut reader: R) -> Result<ObjectRegistry> {
    let mut xml = String::new();
    reader.read_to_string(&mut xml).map_err(quick_xml::Error::from)?;
    load_str(&xml)
}

// Writing

struct XmlOut<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlOut<W> {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(quick_xml::Error::from)?;
        Ok(())
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, name: &str, text: impl ToString) -> Result<()> {
        self.start(name)?;
        let text = text.to_string();
        if !text.is_empty() {
            self.event(Event::Text(BytesText::new(&text)))?;
        }
        self.end(name)
    }

    fn cell(&mut self, name: &str, value: &Data, ui_type: Option<DataType>) -> Result<()> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("type", type_name(value.data_type()).as_str()));
        if let Some(ui_type) = ui_type {
            start.push_attribute(("uiType", type_name(ui_type).as_str()));
        }
        self.event(Event::Start(start))?;
        let text = cell_text(value);
        if !text.is_empty() {
            self.event(Event::Text(BytesText::new(&text)))?;
        }
        self.end(name)
    }
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Null => String::new(),
        Data::Bool(b) => b.to_string(),
        Data::Integer(n) => n.to_string(),
        Data::Unsigned(n) | Data::Enum(n) => n.to_string(),
        Data::Long(n) => n.to_string(),
        Data::LongUnsigned(n) => n.to_string(),
        Data::DoubleLong(n) => n.to_string(),
        Data::DoubleLongUnsigned(n) => n.to_string(),
        Data::Long64(n) => n.to_string(),
        Data::Long64Unsigned(n) => n.to_string(),
        Data::Float32(n) => n.to_string(),
        Data::Float64(n) => n.to_string(),
        Data::BitString(bits) => bits.to_string(),
        Data::VisibleString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Data::Utf8String(text) => text.clone(),
        Data::OctetString(bytes) => hex::encode_upper(bytes),
        Data::DateTime(_) | Data::Date(_) | Data::Time(_) => {
            let mut out = Vec::new();
            value.encode_value(&mut out);
            hex::encode_upper(out)
        }
        Data::Array(_) | Data::Structure(_) => hex::encode_upper(value.to_bytes()),
    }
}

fn write_base<W: Write>(out: &mut XmlOut<W>, object: &dyn CosemObject) -> Result<()> {
    let base = object.base();
    let object_type = object.object_type();
    if let Some(sn) = base.short_name {
        out.text("SN", sn)?;
    }
    out.text("LN", base.logical_name)?;
    if base.version != 0 {
        out.text("Version", base.version)?;
    }
    if !base.description.is_empty() {
        out.text("Description", &base.description)?;
    }
    out.text("Access", base.access_string(object_type.attribute_count(base.version)))?;
    if object_type.method_count() > 0 {
        out.text("MethodAccess", base.method_access_string(object_type.method_count()))?;
    }
    let settings = Settings::server();
    for &(name, index) in attribute_elements(object_type) {
        out.cell(name, &object.get_attribute(&settings, index)?, base.ui_type(index))?;
    }
    Ok(())
}

fn write_column<W: Write>(out: &mut XmlOut<W>, column: &CaptureColumn) -> Result<()> {
    out.text("ObjectType", column.target.object_type.class_id())?;
    out.text("LN", column.target.logical_name)?;
    out.text("Attribute", column.attribute_index)?;
    out.text("Data", column.data_index)
}

fn write_profile<W: Write>(out: &mut XmlOut<W>, profile: &ProfileGeneric, options: &SaveOptions) -> Result<()> {
    if options.include_buffers {
        out.start("Buffer")?;
        for row in profile.buffer() {
            out.start("Row")?;
            for cell in row {
                out.cell("Cell", cell, None)?;
            }
            out.end("Row")?;
        }
        out.end("Buffer")?;
    }
    out.start("CaptureObjects")?;
    for column in profile.capture_objects() {
        out.start("Item")?;
        write_column(out, column)?;
        out.end("Item")?;
    }
    out.end("CaptureObjects")?;
    out.text("CapturePeriod", profile.capture_period())?;
    out.text("SortMethod", profile.sort_method() as u8)?;
    if let Some(sort_object) = profile.sort_object() {
        out.start("SortObject")?;
        write_column(out, sort_object)?;
        out.end("SortObject")?;
    }
    let entries_in_use = if options.include_buffers { profile.entries_in_use() } else { 0 };
    out.text("EntriesInUse", entries_in_use)?;
    out.text("ProfileEntries", profile.profile_entries())
}

fn write_scripts<W: Write>(out: &mut XmlOut<W>, table: &ScriptTable) -> Result<()> {
    out.start("Scripts")?;
    for script in &table.scripts {
        out.start("Script")?;
        out.text("Index", script.id)?;
        out.start("Actions")?;
        for action in &script.actions {
            out.start("Action")?;
            out.text("Type", action.action_type as u8)?;
            out.text("ObjectType", action.target.object_type.class_id())?;
            out.text("LN", action.target.logical_name)?;
            out.text("Index", action.index)?;
            out.cell("Parameter", &action.parameter, None)?;
            out.end("Action")?;
        }
        out.end("Actions")?;
        out.end("Script")?;
    }
    out.end("Scripts")
}

/// Writes `registry` in insertion order. Placeholders are not written.
pub fn save<W: Write>(registry: &ObjectRegistry, writer: W, options: &SaveOptions) -> Result<()> {
    let writer = match options.indent {
        0 => Writer::new(writer),
        indent => Writer::new_with_indent(writer, b' ', indent),
    };
    let mut out = XmlOut { writer };
    out.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    out.start("Objects")?;
    let mut count = 0;
    for (_, object) in registry.iter() {
        let Some(cosem) = object.as_cosem() else {
            continue;
        };
        let name = object.object_type().xml_name();
        out.start(name)?;
        write_base(&mut out, cosem)?;
        match object {
            Object::ProfileGeneric(profile) => write_profile(&mut out, profile, options)?,
            Object::ScriptTable(table) => write_scripts(&mut out, table)?,
            _ => {}
        }
        out.end(name)?;
        count += 1;
    }
    out.end("Objects")?;
    info!("saved {count} objects");
    Ok(())
}

pub fn save_string(registry: &ObjectRegistry, options: &SaveOptions) -> Result<String> {
    let mut bytes = Vec::new();
    save(registry, &mut bytes, options)?;
    String::from_utf8(bytes).map_err(|err| Error::InvalidXml(err.to_string()))
}
