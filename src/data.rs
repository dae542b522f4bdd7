use core::cmp::Ordering;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use core::str::FromStr;

use chrono::{Datelike, NaiveDate, Offset, TimeZone, Timelike, Utc};
use nom::{
    IResult, Parser,
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, i8, u8},
};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::axdr::{encode_length, parse_length, take_counted};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum DataType {
  Null               =  0,
  Array              =  1,
  Structure          =  2,
  Bool               =  3,
  BitString          =  4,
  DoubleLong         =  5,
  DoubleLongUnsigned =  6,
  OctetString        =  9,
  VisibleString      = 10,
  Utf8String         = 12,
  BinaryCodedDecimal = 13,
  Integer            = 15,
  Long               = 16,
  Unsigned           = 17,
  LongUnsigned       = 18,
  CompactArray       = 19,
  Long64             = 20,
  Long64Unsigned     = 21,
  Enum               = 22,
  Float32            = 23,
  Float64            = 24,
  DateTime           = 25,
  Date               = 26,
  Time               = 27,
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(dt: u8) -> Result<Self, Self::Error> {
        Ok(match dt {
            0x00 => Self::Null,
            0x01 => Self::Array,
            0x02 => Self::Structure,
            0x03 => Self::Bool,
            0x04 => Self::BitString,
            0x05 => Self::DoubleLong,
            0x06 => Self::DoubleLongUnsigned,
            0x09 => Self::OctetString,
            0x0a => Self::VisibleString,
            0x0c => Self::Utf8String,
            0x0d => Self::BinaryCodedDecimal,
            0x0f => Self::Integer,
            0x10 => Self::Long,
            0x11 => Self::Unsigned,
            0x12 => Self::LongUnsigned,
            0x13 => Self::CompactArray,
            0x14 => Self::Long64,
            0x15 => Self::Long64Unsigned,
            0x16 => Self::Enum,
            0x17 => Self::Float32,
            0x18 => Self::Float64,
            0x19 => Self::DateTime,
            0x1a => Self::Date,
            0x1b => Self::Time,
            dt => return Err(dt),
        })
    }
}

impl DataType {
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Types this codec can carry. Binary coded decimals and compact arrays
    /// are recognised but refused.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::BinaryCodedDecimal | Self::CompactArray)
    }

    /// Payload width for fixed-size types.
    pub fn fixed_size(&self) -> Option<usize> {
        Some(match self {
            Self::Null => 0,
            Self::Bool | Self::Integer | Self::Unsigned | Self::Enum => 1,
            Self::Long | Self::LongUnsigned => 2,
            Self::DoubleLong | Self::DoubleLongUnsigned | Self::Float32 => 4,
            Self::Long64 | Self::Long64Unsigned | Self::Float64 => 8,
            Self::DateTime => 12,
            Self::Date => 5,
            Self::Time => 4,
            _ => return None,
        })
    }
}

/// Records which date/time components carry the "not specified" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DateTimeSkips(u16);

#[rustfmt::skip]
impl DateTimeSkips {
    pub const NONE:        Self = Self(0);
    pub const YEAR:        Self = Self(0x0001);
    pub const MONTH:       Self = Self(0x0002);
    pub const DAY:         Self = Self(0x0004);
    pub const DAY_OF_WEEK: Self = Self(0x0008);
    pub const HOUR:        Self = Self(0x0010);
    pub const MINUTE:      Self = Self(0x0020);
    pub const SECOND:      Self = Self(0x0040);
    pub const HUNDREDTHS:  Self = Self(0x0080);
    pub const DEVIATION:   Self = Self(0x0100);
    pub const STATUS:      Self = Self(0x0200);
}

impl DateTimeSkips {
    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn set_if(&mut self, flag: Self, condition: bool) {
        if condition {
            self.0 |= flag.0;
        }
    }
}

impl BitOr for DateTimeSkips {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DateTimeSkips {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Date {
    pub(crate) year: u16,
    pub(crate) month: u8,
    pub(crate) day_of_month: u8,
    pub(crate) day_of_week: u8,
}

impl Date {
    pub const YEAR_NOT_SPECIFIED: u16 = 0xFFFF;
    pub const NOT_SPECIFIED: u8 = 0xFF;

    /// A calendar date; day-of-week is derived when the date is valid.
    pub fn new(year: u16, month: u8, day_of_month: u8) -> Self {
        let day_of_week = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day_of_month))
            .map(|d| d.weekday().number_from_monday() as u8)
            .unwrap_or(Self::NOT_SPECIFIED);
        Self { year, month, day_of_month, day_of_week }
    }

    /// Raw constructor; sentinels are passed through as-is.
    pub fn from_parts(year: u16, month: u8, day_of_month: u8, day_of_week: u8) -> Self {
        Self { year, month, day_of_month, day_of_week }
    }

    pub fn year(&self) -> Option<u16> {
        Some(self.year).filter(|&y| y != Self::YEAR_NOT_SPECIFIED)
    }

    pub fn month(&self) -> Option<u8> {
        Some(self.month).filter(|&m| m != Self::NOT_SPECIFIED)
    }

    pub fn day_of_month(&self) -> Option<u8> {
        Some(self.day_of_month).filter(|&d| d != Self::NOT_SPECIFIED)
    }

    pub fn day_of_week(&self) -> Option<u8> {
        Some(self.day_of_week).filter(|&d| d != Self::NOT_SPECIFIED)
    }

    pub fn skips(&self) -> DateTimeSkips {
        let mut skips = DateTimeSkips::NONE;
        skips.set_if(DateTimeSkips::YEAR, self.year().is_none());
        skips.set_if(DateTimeSkips::MONTH, self.month().is_none());
        skips.set_if(DateTimeSkips::DAY, self.day_of_month().is_none());
        skips.set_if(DateTimeSkips::DAY_OF_WEEK, self.day_of_week().is_none());
        skips
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, year) = be_u16(input)?;
        let (input, month) = u8(input)?;
        let (input, day_of_month) = u8(input)?;
        let (input, day_of_week) = u8(input)?;

        Ok((input, Self { year, month, day_of_month, day_of_week }))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.year.to_be_bytes());
        out.extend_from_slice(&[self.month, self.day_of_month, self.day_of_week]);
    }

    fn chronological_key(&self) -> (u16, u8, u8) {
        (self.year().unwrap_or(0), self.month().unwrap_or(0), self.day_of_month().unwrap_or(0))
    }
}

impl Default for Date {
    fn default() -> Self {
        Self::from_parts(Self::YEAR_NOT_SPECIFIED, Self::NOT_SPECIFIED, Self::NOT_SPECIFIED, Self::NOT_SPECIFIED)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day_of_month)
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct Time {
    pub(crate) hour: Option<u8>,
    pub(crate) minute: Option<u8>,
    pub(crate) second: Option<u8>,
    pub(crate) hundredth: Option<u8>,
}

impl Time {
    pub fn new(hour: u8, minute: u8, second: u8, hundredth: u8) -> Self {
        Self { hour: Some(hour), minute: Some(minute), second: Some(second), hundredth: Some(hundredth) }
    }

    /// `None` components are encoded as the 0xFF wildcard.
    pub fn from_parts(hour: Option<u8>, minute: Option<u8>, second: Option<u8>, hundredth: Option<u8>) -> Self {
        Self { hour, minute, second, hundredth }
    }

    pub fn hour(&self) -> Option<u8> {
        self.hour
    }

    pub fn minute(&self) -> Option<u8> {
        self.minute
    }

    pub fn second(&self) -> Option<u8> {
        self.second
    }

    pub fn hundredth(&self) -> Option<u8> {
        self.hundredth
    }

    pub fn skips(&self) -> DateTimeSkips {
        let mut skips = DateTimeSkips::NONE;
        skips.set_if(DateTimeSkips::HOUR, self.hour.is_none());
        skips.set_if(DateTimeSkips::MINUTE, self.minute.is_none());
        skips.set_if(DateTimeSkips::SECOND, self.second.is_none());
        skips.set_if(DateTimeSkips::HUNDREDTHS, self.hundredth.is_none());
        skips
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let start = input;
        let (input, (hour, minute, second, hundredth)) = (u8, u8, u8, u8).parse(input)?;

        let component = |value: u8, max: u8| match value {
            0xff => Ok(None),
            v if v <= max => Ok(Some(v)),
            _ => Err(nom::Err::Error(NomError::new(start, ErrorKind::Verify))),
        };

        let hour = component(hour, 23)?;
        let minute = component(minute, 59)?;
        let second = component(second, 59)?;
        let hundredth = component(hundredth, 99)?;

        Ok((input, Self { hour, minute, second, hundredth }))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let raw = |v: Option<u8>| v.unwrap_or(0xff);
        out.extend_from_slice(&[raw(self.hour), raw(self.minute), raw(self.second), raw(self.hundredth)]);
    }

    fn chronological_key(&self) -> (u8, u8, u8, u8) {
        (
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.hundredth.unwrap_or(0),
        )
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.hundredth.unwrap_or(0),
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ClockStatus(pub(crate) u8);

impl ClockStatus {
    #[rustfmt::skip]
    const INVALID_VALUE_BIT:   u8 = 0b00000001;
    #[rustfmt::skip]
    const DOUBTFUL_VALUE_BIT:  u8 = 0b00000010;
    #[rustfmt::skip]
    const DIFFERENT_BASE_BIT:  u8 = 0b00000100;
    #[rustfmt::skip]
    const INVALID_STATUS_BIT:  u8 = 0b00001000;
    #[rustfmt::skip]
    const DAYLIGHT_SAVING_BIT: u8 = 0b10000000;

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn invalid_value(&self) -> bool {
        (self.0 & Self::INVALID_VALUE_BIT) != 0
    }

    pub fn doubtful_value(&self) -> bool {
        (self.0 & Self::DOUBTFUL_VALUE_BIT) != 0
    }

    pub fn different_base(&self) -> bool {
        (self.0 & Self::DIFFERENT_BASE_BIT) != 0
    }

    pub fn invalid_status(&self) -> bool {
        (self.0 & Self::INVALID_STATUS_BIT) != 0
    }

    pub fn daylight_saving(&self) -> bool {
        (self.0 & Self::DAYLIGHT_SAVING_BIT) != 0
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct DateTime {
    pub(crate) date: Date,
    pub(crate) time: Time,
    /// Minutes from local time to UTC; `None` encodes as 0x8000.
    pub(crate) offset_minutes: Option<i16>,
    pub(crate) clock_status: Option<ClockStatus>,
}

impl DateTime {
    pub const DEVIATION_NOT_SPECIFIED: i16 = i16::MIN;

    pub fn new(date: Date, time: Time, offset_minutes: Option<i16>, clock_status: Option<ClockStatus>) -> Self {
        Self { date, time, offset_minutes, clock_status }
    }

    /// Fully specified stamp for a chrono instant, keeping its local offset.
    pub fn from_chrono<Tz: TimeZone>(instant: &chrono::DateTime<Tz>) -> Self {
        let local = instant.naive_local();
        let offset_seconds = instant.offset().fix().local_minus_utc();
        let date = Date::new(local.year() as u16, local.month() as u8, local.day() as u8);
        let hundredth = (local.nanosecond() / 10_000_000).min(99) as u8;
        let time = Time::new(local.hour() as u8, local.minute() as u8, local.second() as u8, hundredth);
        Self::new(date, time, Some((-offset_seconds / 60) as i16), Some(ClockStatus(0)))
    }

    /// Stamp for a Unix timestamp, rendered in the zone described by
    /// `offset_minutes` (minutes from local time to UTC).
    pub fn from_epoch_seconds(seconds: i64, offset_minutes: i16) -> Option<Self> {
        let offset = chrono::FixedOffset::west_opt(i32::from(offset_minutes) * 60)?;
        let utc = chrono::DateTime::from_timestamp(seconds, 0)?;
        Some(Self::from_chrono(&utc.with_timezone(&offset)))
    }

    /// Seconds since the Unix epoch, when the stamp is specific enough to
    /// denote a single instant. An unspecified deviation is read as UTC.
    pub fn to_epoch_seconds(&self) -> Option<i64> {
        let date = NaiveDate::from_ymd_opt(
            i32::from(self.date.year()?),
            u32::from(self.date.month()?),
            u32::from(self.date.day_of_month()?),
        )?;
        let naive = date.and_hms_opt(
            u32::from(self.time.hour?),
            u32::from(self.time.minute?),
            u32::from(self.time.second.unwrap_or(0)),
        )?;
        let local_as_utc = Utc.from_utc_datetime(&naive).timestamp();
        Some(local_as_utc + i64::from(self.offset_minutes.unwrap_or(0)) * 60)
    }

    pub fn date(&self) -> &Date {
        &self.date
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn offset_minutes(&self) -> Option<i16> {
        self.offset_minutes
    }

    pub fn clock_status(&self) -> Option<ClockStatus> {
        self.clock_status
    }

    pub fn skips(&self) -> DateTimeSkips {
        let mut skips = self.date.skips() | self.time.skips();
        skips.set_if(DateTimeSkips::DEVIATION, self.offset_minutes.is_none());
        skips.set_if(DateTimeSkips::STATUS, self.clock_status.is_none());
        skips
    }

    /// Chronological ordering; wildcard components compare as zero.
    pub fn cmp_chronological(&self, other: &Self) -> Ordering {
        match (self.to_epoch_seconds(), other.to_epoch_seconds()) {
            (Some(a), Some(b)) => a
                .cmp(&b)
                .then_with(|| self.time.hundredth.unwrap_or(0).cmp(&other.time.hundredth.unwrap_or(0))),
            _ => (self.date.chronological_key(), self.time.chronological_key())
                .cmp(&(other.date.chronological_key(), other.time.chronological_key())),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, date) = Date::parse(input)?;
        let (input, time) = Time::parse(input)?;
        let (input, offset_minutes) = be_i16(input)?;
        let offset_minutes = Some(offset_minutes).filter(|&b| b != Self::DEVIATION_NOT_SPECIFIED);
        let (input, clock_status) = u8(input)?;
        let clock_status = Some(clock_status).filter(|&b| b != 0xff).map(ClockStatus);

        Ok((input, Self { date, time, offset_minutes, clock_status }))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.date.encode(out);
        self.time.encode(out);
        out.extend_from_slice(&self.offset_minutes.unwrap_or(Self::DEVIATION_NOT_SPECIFIED).to_be_bytes());
        out.push(self.clock_status.map(|s| s.0).unwrap_or(0xff));
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        self.encode(&mut out);
        out
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;

        if let Some(offset_minutes) = self.offset_minutes {
            if offset_minutes >= 0 {
                '-'.fmt(f)?;
            } else {
                '+'.fmt(f)?;
            };
            let offset_minutes = offset_minutes.abs();
            write!(f, "{:02}:{:02}", offset_minutes / 60, offset_minutes % 60)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// An ordered run of bits. Unused trailing bits of the last byte are zero.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BitString {
    bytes: Vec<u8>,
    len: usize,
}

impl BitString {
    pub fn new(mut bytes: Vec<u8>, len: usize) -> Self {
        bytes.resize(len.div_ceil(8), 0);
        let unused = bytes.len() * 8 - len;
        if let Some(last) = bytes.last_mut() {
            *last &= 0xffu8 << unused;
        }
        Self { bytes, len }
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
        Self { bytes, len: bits.len() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, len) = parse_length(input)?;
        let (input, bytes) = take_counted(input, len.div_ceil(8))?;
        Ok((input, Self::new(bytes.to_vec(), len)))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_length(self.len, out);
        out.extend_from_slice(&self.bytes);
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (0..self.len).try_for_each(|i| f.write_str(if self.get(i) == Some(true) { "1" } else { "0" }))
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString(\"{}\")", self)
    }
}

impl FromStr for BitString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(Error::TypeUnmatched),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_bits(&bits))
    }
}

#[cfg(feature = "serde")]
impl Serialize for BitString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Null,
    Array(Vec<Data>),
    Structure(Vec<Data>),
    Bool(bool),
    BitString(BitString),
    OctetString(Vec<u8>),
    VisibleString(Vec<u8>),
    Utf8String(String),
    Integer(i8),
    Unsigned(u8),
    Long(i16),
    LongUnsigned(u16),
    DoubleLong(i32),
    DoubleLongUnsigned(u32),
    Long64(i64),
    Long64Unsigned(u64),
    Float32(f32),
    Float64(f64),
    DateTime(DateTime),
    Date(Date),
    Time(Time),
    Enum(u8),
}

impl Data {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Array(_) => DataType::Array,
            Self::Structure(_) => DataType::Structure,
            Self::Bool(_) => DataType::Bool,
            Self::BitString(_) => DataType::BitString,
            Self::OctetString(_) => DataType::OctetString,
            Self::VisibleString(_) => DataType::VisibleString,
            Self::Utf8String(_) => DataType::Utf8String,
            Self::Integer(_) => DataType::Integer,
            Self::Unsigned(_) => DataType::Unsigned,
            Self::Long(_) => DataType::Long,
            Self::LongUnsigned(_) => DataType::LongUnsigned,
            Self::DoubleLong(_) => DataType::DoubleLong,
            Self::DoubleLongUnsigned(_) => DataType::DoubleLongUnsigned,
            Self::Long64(_) => DataType::Long64,
            Self::Long64Unsigned(_) => DataType::Long64Unsigned,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::DateTime(_) => DataType::DateTime,
            Self::Date(_) => DataType::Date,
            Self::Time(_) => DataType::Time,
            Self::Enum(_) => DataType::Enum,
        }
    }

    /// Parses one tagged value.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, data_type) = u8(input)?;
        match DataType::try_from(data_type) {
            Ok(data_type) if data_type.is_supported() => Self::parse_value(rest, data_type),
            _ => Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag))),
        }
    }

    /// Parses the payload of a value whose type is already known.
    pub fn parse_value(input: &[u8], data_type: DataType) -> IResult<&[u8], Self> {
        Ok(match data_type {
            DataType::Null => (input, Data::Null),
            DataType::Array => {
                let (input, items) = parse_items(input)?;
                (input, Data::Array(items))
            }
            DataType::Structure => {
                let (input, items) = parse_items(input)?;
                (input, Data::Structure(items))
            }
            DataType::Bool => {
                let (input, b) = u8(input)?;
                (input, Data::Bool(b != 0))
            }
            DataType::BitString => {
                let (input, bits) = BitString::parse(input)?;
                (input, Data::BitString(bits))
            }
            DataType::OctetString => {
                let (input, bytes) = parse_counted_bytes(input)?;
                (input, Data::OctetString(bytes.to_vec()))
            }
            DataType::VisibleString => {
                let (input, bytes) = parse_counted_bytes(input)?;
                (input, Data::VisibleString(bytes.to_vec()))
            }
            DataType::Utf8String => {
                let (rest, bytes) = parse_counted_bytes(input)?;
                let s = core::str::from_utf8(bytes)
                    .map_err(|_| nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))?;
                (rest, Data::Utf8String(s.to_string()))
            }
            DataType::DateTime => {
                let (input, date_time) = DateTime::parse(input)?;
                (input, Data::DateTime(date_time))
            }
            DataType::Date => {
                let (input, date) = Date::parse(input)?;
                (input, Data::Date(date))
            }
            DataType::Time => {
                let (input, time) = Time::parse(input)?;
                (input, Data::Time(time))
            }
            DataType::Float32 => {
                let (input, n) = be_f32(input)?;
                (input, Data::Float32(n))
            }
            DataType::Float64 => {
                let (input, n) = be_f64(input)?;
                (input, Data::Float64(n))
            }
            DataType::Integer => {
                let (input, n) = i8(input)?;
                (input, Data::Integer(n))
            }
            DataType::Unsigned => {
                let (input, n) = u8(input)?;
                (input, Data::Unsigned(n))
            }
            DataType::Long => {
                let (input, n) = be_i16(input)?;
                (input, Data::Long(n))
            }
            DataType::DoubleLong => {
                let (input, n) = be_i32(input)?;
                (input, Data::DoubleLong(n))
            }
            DataType::Long64 => {
                let (input, n) = be_i64(input)?;
                (input, Data::Long64(n))
            }
            DataType::Enum => {
                let (input, n) = u8(input)?;
                (input, Data::Enum(n))
            }
            DataType::LongUnsigned => {
                let (input, n) = be_u16(input)?;
                (input, Data::LongUnsigned(n))
            }
            DataType::DoubleLongUnsigned => {
                let (input, n) = be_u32(input)?;
                (input, Data::DoubleLongUnsigned(n))
            }
            DataType::Long64Unsigned => {
                let (input, n) = be_u64(input)?;
                (input, Data::Long64Unsigned(n))
            }
            DataType::BinaryCodedDecimal | DataType::CompactArray => {
                return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
            }
        })
    }

    /// Appends the type tag followed by the payload.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.data_type().tag());
        self.encode_value(out);
    }

    /// Appends only the payload; the receiver is expected to know the type.
    pub fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => {}
            Self::Array(items) | Self::Structure(items) => {
                encode_length(items.len(), out);
                items.iter().for_each(|item| item.encode(out));
            }
            Self::Bool(b) => out.push(u8::from(*b)),
            Self::BitString(bits) => bits.encode(out),
            Self::OctetString(bytes) | Self::VisibleString(bytes) => {
                encode_length(bytes.len(), out);
                out.extend_from_slice(bytes);
            }
            Self::Utf8String(s) => {
                encode_length(s.len(), out);
                out.extend_from_slice(s.as_bytes());
            }
            Self::Integer(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::Unsigned(n) | Self::Enum(n) => out.push(*n),
            Self::Long(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::LongUnsigned(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::DoubleLong(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::DoubleLongUnsigned(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::Long64(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::Long64Unsigned(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::Float32(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::Float64(n) => out.extend_from_slice(&n.to_be_bytes()),
            Self::DateTime(dt) => dt.encode(out),
            Self::Date(d) => d.encode(out),
            Self::Time(t) => t.encode(out),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer and floating point variants; enums and booleans are not numbers.
    pub fn is_numeric(&self) -> bool {
        self.as_i128().is_some() || matches!(self, Self::Float32(_) | Self::Float64(_))
    }

    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::Integer(n) => n.into(),
            Self::Unsigned(n) => n.into(),
            Self::Long(n) => n.into(),
            Self::LongUnsigned(n) => n.into(),
            Self::DoubleLong(n) => n.into(),
            Self::DoubleLongUnsigned(n) => n.into(),
            Self::Long64(n) => n.into(),
            Self::Long64Unsigned(n) => n.into(),
            _ => return None,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(n) => Some(f64::from(n)),
            Self::Float64(n) => Some(n),
            _ => self.as_i128().map(|n| n as f64),
        }
    }

    /// Unsigned view of integer-like values, used by attribute setters.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::Enum(n) => Some(n.into()),
            _ => self.as_i128().and_then(|n| u32::try_from(n).ok()),
        }
    }

    /// Date-time view; twelve-byte octet-strings are decoded on the fly.
    pub fn as_date_time(&self) -> Option<DateTime> {
        match self {
            Self::DateTime(dt) => Some(dt.clone()),
            Self::OctetString(bytes) if bytes.len() == 12 => {
                DateTime::parse(bytes).ok().map(|(_, dt)| dt)
            }
            _ => None,
        }
    }

    /// Engineering value `raw * 10^scaler` for numeric values; others are
    /// returned untouched.
    pub fn scaled(&self, scaler: i8) -> Data {
        match self.as_f64() {
            Some(_) if scaler == 0 => self.clone(),
            Some(raw) if scaler < 0 => Data::Float64(raw / 10f64.powi(-i32::from(scaler))),
            Some(raw) => Data::Float64(raw * 10f64.powi(i32::from(scaler))),
            None => self.clone(),
        }
    }

    /// Typed comparison used by range reads and sort policies. Values of
    /// unrelated types are unordered.
    pub fn compare(&self, other: &Data) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.as_date_time(), other.as_date_time()) {
            return Some(a.cmp_chronological(&b));
        }
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Enum(a), Self::Enum(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.chronological_key().cmp(&b.chronological_key())),
            (Self::Time(a), Self::Time(b)) => Some(a.chronological_key().cmp(&b.chronological_key())),
            (Self::OctetString(a), Self::OctetString(b))
            | (Self::VisibleString(a), Self::VisibleString(b)) => Some(a.cmp(b)),
            (Self::Utf8String(a), Self::Utf8String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn parse_counted_bytes(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = parse_length(input)?;
    take_counted(input, len)
}

fn parse_items(input: &[u8]) -> IResult<&[u8], Vec<Data>> {
    let (mut input, count) = parse_length(input)?;
    // Every element occupies at least its tag byte.
    if count > input.len() {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let (rest, item) = Data::parse(input)?;
        items.push(item);
        input = rest;
    }
    Ok((input, items))
}

impl From<DateTime> for Data {
    fn from(value: DateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Date> for Data {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<Time> for Data {
    fn from(value: Time) -> Self {
        Self::Time(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_try_from_valid() {
        assert_eq!(DataType::try_from(0x00).unwrap(), DataType::Null);
        assert_eq!(DataType::try_from(0x01).unwrap(), DataType::Array);
        assert_eq!(DataType::try_from(0x04).unwrap(), DataType::BitString);
        assert_eq!(DataType::try_from(0x0a).unwrap(), DataType::VisibleString);
        assert_eq!(DataType::try_from(0x16).unwrap(), DataType::Enum);
        assert_eq!(DataType::try_from(0x19).unwrap(), DataType::DateTime);
        assert_eq!(DataType::try_from(0x1b).unwrap(), DataType::Time);
    }

    #[test]
    fn test_data_type_try_from_invalid() {
        for tag in [0x07u8, 0x08, 0x0b, 0x0e, 0x1c, 0xff] {
            assert_eq!(DataType::try_from(tag), Err(tag));
        }
    }

    #[test]
    fn test_date_parse() {
        let input = [0x07, 0xE9, 0x01, 0x0F, 0x03, 0xFF];
        let (remaining, date) = Date::parse(&input).unwrap();

        assert_eq!(remaining, &[0xFF]);
        assert_eq!(date, Date::new(2025, 1, 15));
        assert_eq!(date.day_of_week(), Some(3));
        assert!(date.skips().is_empty());
    }

    #[test]
    fn test_date_parse_wildcard() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let (remaining, date) = Date::parse(&input).unwrap();

        assert_eq!(remaining, &[]);
        assert_eq!(date.year(), None);
        let skips = date.skips();
        assert!(skips.contains(DateTimeSkips::YEAR | DateTimeSkips::MONTH));
        assert!(skips.contains(DateTimeSkips::DAY | DateTimeSkips::DAY_OF_WEEK));
        assert_eq!(date, Date::default());
    }

    #[test]
    fn test_date_new_derives_day_of_week() {
        // 2021-12-25 was a Saturday
        assert_eq!(Date::new(2021, 12, 25).day_of_week(), Some(6));
        assert_eq!(Date::new(2021, 2, 30).day_of_week(), None);
    }

    #[test]
    fn test_time_parse_wildcard() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF];
        let (remaining, time) = Time::parse(&input).unwrap();

        assert_eq!(remaining, &[]);
        assert_eq!(time, Time::default());
        assert_eq!(time.skips().bits(), 0x00F0);
    }

    #[test]
    fn test_time_parse_out_of_range() {
        assert!(Time::parse(&[0x18, 0x00, 0x00, 0x00]).is_err());
        assert!(Time::parse(&[0x0C, 0x3C, 0x00, 0x00]).is_err());
        assert!(Time::parse(&[0x0C, 0x1E, 0x3C, 0x00]).is_err());
        assert!(Time::parse(&[0x0C, 0x1E, 0x00, 0x64]).is_err());
    }

    #[test]
    fn test_time_display() {
        let time = Time::new(12, 30, 45, 50);
        assert_eq!(time.to_string(), "12:30:45.50");
    }

    #[test]
    fn test_date_time_encode_matches_wire() {
        let dt = DateTime::new(Date::new(2025, 1, 15), Time::new(12, 30, 0, 0), None, None);
        assert_eq!(
            dt.to_bytes(),
            [0x07, 0xE9, 0x01, 0x0F, 0x03, 0x0C, 0x1E, 0x00, 0x00, 0x80, 0x00, 0xFF]
        );
        assert!(dt.skips().contains(DateTimeSkips::DEVIATION | DateTimeSkips::STATUS));
    }

    #[test]
    fn test_date_time_wildcards_survive_round_trip() {
        let dt = DateTime::new(
            Date::from_parts(Date::YEAR_NOT_SPECIFIED, 6, 1, Date::NOT_SPECIFIED),
            Time::from_parts(Some(8), Some(0), None, Some(0)),
            Some(-120),
            Some(ClockStatus::new(0)),
        );
        let data = Data::DateTime(dt.clone());
        let bytes = data.to_bytes();
        let (rest, parsed) = Data::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, data);

        let Data::DateTime(parsed) = parsed else { panic!("expected a date-time") };
        let skips = parsed.skips();
        assert!(skips.contains(DateTimeSkips::YEAR));
        assert!(skips.contains(DateTimeSkips::SECOND));
        assert!(!skips.contains(DateTimeSkips::MONTH));
        assert_eq!(parsed.offset_minutes(), Some(-120));
    }

    #[test]
    fn test_date_time_epoch_round_trip() {
        // 2024-03-01 10:15:00 UTC
        let dt = DateTime::from_epoch_seconds(1_709_288_100, -60).unwrap();
        assert_eq!(dt.time().hour(), Some(11));
        assert_eq!(dt.offset_minutes(), Some(-60));
        assert_eq!(dt.to_epoch_seconds(), Some(1_709_288_100));
    }

    #[test]
    fn test_date_time_chronological_order() {
        let early = DateTime::new(Date::new(2024, 1, 1), Time::new(0, 0, 0, 0), Some(0), None);
        let late = DateTime::new(Date::new(2024, 1, 1), Time::new(0, 15, 0, 0), Some(0), None);
        assert_eq!(early.cmp_chronological(&late), Ordering::Less);
        assert_eq!(late.cmp_chronological(&early), Ordering::Greater);

        let wild = DateTime::new(Date::default(), Time::new(0, 15, 0, 0), None, None);
        assert_eq!(wild.cmp_chronological(&early), Ordering::Less);
    }

    #[test]
    fn test_clock_status_flags() {
        let status = ClockStatus(0b10000011);
        assert!(status.invalid_value());
        assert!(status.doubtful_value());
        assert!(!status.different_base());
        assert!(!status.invalid_status());
        assert!(status.daylight_saving());
    }

    #[test]
    fn test_bit_string() {
        let bits: BitString = "1010000011".parse().unwrap();
        assert_eq!(bits.len(), 10);
        assert_eq!(bits.as_bytes(), &[0xA0, 0xC0]);
        assert_eq!(bits.get(8), Some(true));
        assert_eq!(bits.get(10), None);
        assert_eq!(bits.to_string(), "1010000011");

        let data = Data::BitString(bits);
        assert_eq!(data.to_bytes(), [0x04, 0x0A, 0xA0, 0xC0]);
    }

    #[test]
    fn test_bit_string_masks_trailing_bits() {
        let (_, data) = Data::parse(&[0x04, 0x03, 0xFF]).unwrap();
        assert_eq!(data, Data::BitString(BitString::new(vec![0xE0], 3)));
    }

    #[test]
    fn test_data_parse_null() {
        let (remaining, data) = Data::parse(&[0x00, 0xFF]).unwrap();
        assert_eq!(remaining, &[0xFF]);
        assert_eq!(data, Data::Null);
    }

    #[test]
    fn test_data_parse_integers() {
        assert_eq!(Data::parse(&[0x0f, 0xD6]).unwrap().1, Data::Integer(-42));
        assert_eq!(Data::parse(&[0x11, 0x2A]).unwrap().1, Data::Unsigned(42));
        assert_eq!(Data::parse(&[0x10, 0xFF, 0x00]).unwrap().1, Data::Long(-256));
        assert_eq!(Data::parse(&[0x12, 0x01, 0x00]).unwrap().1, Data::LongUnsigned(256));
        assert_eq!(Data::parse(&[0x05, 0x00, 0x00, 0x01, 0x00]).unwrap().1, Data::DoubleLong(256));
        assert_eq!(
            Data::parse(&[0x06, 0x00, 0x00, 0x30, 0x39]).unwrap().1,
            Data::DoubleLongUnsigned(12345)
        );
        assert_eq!(
            Data::parse(&[0x14, 0, 0, 0, 0, 0, 0, 0x01, 0x00]).unwrap().1,
            Data::Long64(256)
        );
        assert_eq!(Data::parse(&[0x16, 0x05]).unwrap().1, Data::Enum(5));
        assert_eq!(Data::parse(&[0x03, 0x01]).unwrap().1, Data::Bool(true));
    }

    #[test]
    fn test_data_parse_floats() {
        assert_eq!(Data::parse(&[0x17, 0x42, 0x28, 0x00, 0x00]).unwrap().1, Data::Float32(42.0));
        assert_eq!(
            Data::parse(&[0x18, 0x40, 0x45, 0, 0, 0, 0, 0, 0]).unwrap().1,
            Data::Float64(42.0)
        );
    }

    #[test]
    fn test_data_parse_strings() {
        let (remaining, data) = Data::parse(&[0x09, 0x04, 0xAA, 0xBB, 0xCC, 0xDD, 0xFF]).unwrap();
        assert_eq!(remaining, &[0xFF]);
        assert_eq!(data, Data::OctetString(vec![0xAA, 0xBB, 0xCC, 0xDD]));

        let (_, data) = Data::parse(&[0x0a, 0x02, b'o', b'k']).unwrap();
        assert_eq!(data, Data::VisibleString(b"ok".to_vec()));

        let (_, data) = Data::parse(&[0x0c, 0x02, 0xC3, 0xA9]).unwrap();
        assert_eq!(data, Data::Utf8String("é".to_string()));
    }

    #[test]
    fn test_data_parse_long_form_length() {
        let mut input = vec![0x09, 0x81, 0x80];
        input.extend(core::iter::repeat_n(0x11, 0x80));
        let (remaining, data) = Data::parse(&input).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(data, Data::OctetString(vec![0x11; 0x80]));
        assert_eq!(data.to_bytes(), input);
    }

    #[test]
    fn test_data_parse_nested() {
        let input = [0x01, 0x02, 0x02, 0x01, 0x0f, 0x01, 0x02, 0x00];
        let (remaining, data) = Data::parse(&input).unwrap();

        assert!(remaining.is_empty());
        assert_eq!(
            data,
            Data::Array(vec![Data::Structure(vec![Data::Integer(1)]), Data::Structure(vec![])])
        );
        assert_eq!(data.to_bytes(), input);
    }

    #[test]
    fn test_data_parse_unknown_tag() {
        assert!(matches!(
            Data::parse(&[0x07]),
            Err(nom::Err::Failure(NomError { code: ErrorKind::Tag, .. }))
        ));
        assert!(Data::parse(&[0x0d, 0x01]).is_err());
    }

    #[test]
    fn test_data_encode_scalars() {
        assert_eq!(Data::Long(-2).to_bytes(), [0x10, 0xFF, 0xFE]);
        assert_eq!(Data::DoubleLongUnsigned(60).to_bytes(), [0x06, 0, 0, 0, 60]);
        assert_eq!(Data::Enum(30).to_bytes(), [0x16, 30]);
        assert_eq!(Data::Bool(false).to_bytes(), [0x03, 0x00]);

        let mut out = Vec::new();
        Data::LongUnsigned(0x0102).encode_value(&mut out);
        assert_eq!(out, [0x01, 0x02]);
    }

    #[test]
    fn test_scaled() {
        assert_eq!(Data::DoubleLongUnsigned(12345).scaled(-2), Data::Float64(123.45));
        assert_eq!(Data::Long(7).scaled(3), Data::Float64(7000.0));
        assert_eq!(Data::Long(7).scaled(0), Data::Long(7));
        assert_eq!(Data::Enum(7).scaled(-1), Data::Enum(7));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Data::Unsigned(3).compare(&Data::Long64(-1)), Some(Ordering::Greater));
        assert_eq!(Data::Float32(1.5).compare(&Data::Integer(2)), Some(Ordering::Less));
        assert_eq!(Data::OctetString(vec![1]).compare(&Data::Integer(1)), None);

        let a = DateTime::new(Date::new(2024, 1, 1), Time::new(0, 0, 0, 0), Some(0), None);
        let b = DateTime::new(Date::new(2024, 1, 2), Time::new(0, 0, 0, 0), Some(0), None);
        assert_eq!(Data::OctetString(a.to_bytes()).compare(&Data::DateTime(b)), Some(Ordering::Less));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_date_time_serialize() {
        fn assert_serialize<T: Serialize>(_: &T) {}
        assert_serialize(&DateTime::default());
        assert_serialize(&Data::Null);
    }
}
