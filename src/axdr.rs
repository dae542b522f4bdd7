//! A-XDR codec entry points.
//!
//! The per-type parsers live next to the types in [`crate::data`]; this module
//! owns the length prefix, the optional tag, the mapping of nom failures onto
//! [`Error`] and the standard-dependent representation of temporal values.

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::u8,
};

use crate::data::{Data, DataType};
use crate::error::{Error, Result};
use crate::settings::Settings;

/// Appends an A-XDR length: a single byte up to 0x7F, otherwise `0x80 | k`
/// followed by `k` big-endian bytes.
pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len <= 0x7F {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Size in bytes of the length prefix for `len`.
pub fn length_size(len: usize) -> usize {
    let mut out = Vec::with_capacity(9);
    encode_length(len, &mut out);
    out.len()
}

pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, usize::from(first)));
    }
    let width = usize::from(first & 0x7F);
    if width == 0 || width > 4 {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    if input.len() < width {
        return Err(nom::Err::Incomplete(nom::Needed::new(width - input.len())));
    }
    let (bytes, input) = input.split_at(width);
    Ok((input, bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))))
}

/// Takes `count` bytes announced by a length prefix. Running short is a
/// length error rather than truncation.
pub(crate) fn take_counted(input: &[u8], count: usize) -> IResult<&[u8], &[u8]> {
    if input.len() < count {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    let (taken, rest) = input.split_at(count);
    Ok((rest, taken))
}

pub(crate) fn decode_error(err: nom::Err<NomError<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::DecodeTruncated,
        nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
            ErrorKind::Tag => Error::DecodeUnknownTag(e.input.first().copied().unwrap_or_default()),
            ErrorKind::LengthValue => Error::DecodeLength,
            _ => Error::DecodeInvalid,
        },
    }
}

/// Encodes `value`. When `tagged` is false and the value has a fixed width
/// the type tag is left out; variable-length values always carry their tag.
pub fn encode(out: &mut Vec<u8>, value: &Data, tagged: bool) {
    if tagged || value.data_type().fixed_size().is_none() {
        value.encode(out);
    } else {
        value.encode_value(out);
    }
}

/// Decodes one value. With a `hint` the tag is not read and the payload is
/// parsed as the hinted type, whatever its width. Elements nested in a hinted
/// array or structure still carry their own tags.
pub fn decode(input: &[u8], hint: Option<DataType>) -> Result<(&[u8], Data)> {
    match hint {
        Some(data_type) if !data_type.is_supported() => Err(Error::DecodeUnknownTag(data_type.tag())),
        Some(data_type) => Data::parse_value(input, data_type).map_err(decode_error),
        None => Data::parse(input).map_err(decode_error),
    }
}

/// Decodes a single tagged value that must span the whole input.
pub fn from_bytes(input: &[u8]) -> Result<Data> {
    let (rest, data) = decode(input, None)?;
    if !rest.is_empty() {
        return Err(Error::DecodeInvalid);
    }
    Ok(data)
}

/// Representation a meter publishes for `value` under the active standard.
///
/// Temporal values travel as octet-strings except under Saudi Arabia, which
/// keeps the native date/time tags.
pub fn publish(settings: &Settings, value: Data) -> Data {
    if settings.standard.native_temporal_tags() {
        return value;
    }
    match value {
        Data::DateTime(dt) => Data::OctetString(dt.to_bytes()),
        Data::Date(date) => {
            let mut out = Vec::with_capacity(5);
            date.encode(&mut out);
            Data::OctetString(out)
        }
        Data::Time(time) => {
            let mut out = Vec::with_capacity(4);
            time.encode(&mut out);
            Data::OctetString(out)
        }
        Data::Structure(items) => Data::Structure(items.into_iter().map(|v| publish(settings, v)).collect()),
        Data::Array(items) => Data::Array(items.into_iter().map(|v| publish(settings, v)).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClockStatus, Date, DateTime, DateTimeSkips, Time};
    use crate::settings::Standard;

    #[test]
    fn test_encode_length_short_and_long_form() {
        let mut out = Vec::new();
        encode_length(0x7F, &mut out);
        assert_eq!(out, [0x7F]);

        out.clear();
        encode_length(0x80, &mut out);
        assert_eq!(out, [0x81, 0x80]);

        out.clear();
        encode_length(0x1234, &mut out);
        assert_eq!(out, [0x82, 0x12, 0x34]);
        assert_eq!(length_size(0x1234), 3);
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(&[0x05, 0xAA]).unwrap(), (&[0xAA][..], 5));
        assert_eq!(parse_length(&[0x82, 0x01, 0x00]).unwrap(), (&[][..], 256));
        assert!(matches!(parse_length(&[0x82, 0x01]), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode(&[0x06, 0x00, 0x01], None), Err(Error::DecodeTruncated)));
        assert!(matches!(decode(&[], None), Err(Error::DecodeTruncated)));
        assert!(matches!(decode(&[0x19, 0x07, 0xE9], None), Err(Error::DecodeTruncated)));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(matches!(decode(&[0x07, 0x00], None), Err(Error::DecodeUnknownTag(0x07))));
        // nested unknown tag is reported with its own value
        assert!(matches!(decode(&[0x02, 0x01, 0x1c], None), Err(Error::DecodeUnknownTag(0x1c))));
        assert!(matches!(decode(&[0x00], Some(DataType::CompactArray)), Err(Error::DecodeUnknownTag(0x13))));
    }

    #[test]
    fn test_decode_length_exceeds_input() {
        assert!(matches!(decode(&[0x09, 0x04, 0xAA, 0xBB], None), Err(Error::DecodeLength)));
        assert!(matches!(decode(&[0x01, 0x05, 0x00], None), Err(Error::DecodeLength)));
    }

    #[test]
    fn test_untagged_scalar() {
        let mut out = Vec::new();
        encode(&mut out, &Data::LongUnsigned(900), false);
        assert_eq!(out, [0x03, 0x84]);
        let (rest, value) = decode(&out, Some(DataType::LongUnsigned)).unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, Data::LongUnsigned(900));

        // strings keep their tag even when untagged output is requested
        out.clear();
        encode(&mut out, &Data::OctetString(vec![1]), false);
        assert_eq!(out, [0x09, 0x01, 0x01]);
    }

    #[test]
    fn test_hint_skips_tag_for_variable_length_types() {
        let (rest, value) = decode(&[0x02, 0xAA, 0xBB, 0xCC], Some(DataType::OctetString)).unwrap();
        assert_eq!(value, Data::OctetString(vec![0xAA, 0xBB]));
        assert_eq!(rest, [0xCC]);

        let (rest, value) = decode(&[0x01, 0x11, 0x05], Some(DataType::Structure)).unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, Data::Structure(vec![Data::Unsigned(5)]));

        assert!(matches!(decode(&[0x05, 0x01], Some(DataType::Array)), Err(Error::DecodeLength)));
    }

    #[test]
    fn test_round_trip_heterogeneous_row() {
        let row = Data::Structure(vec![
            Data::DateTime(DateTime::new(Date::new(2024, 5, 6), Time::new(7, 8, 9, 10), Some(-60), Some(ClockStatus::new(0x80)))),
            Data::DoubleLongUnsigned(12345),
            Data::Integer(-3),
            Data::Enum(35),
            Data::Array(vec![Data::Null, Data::Bool(true)]),
        ]);
        assert_eq!(from_bytes(&row.to_bytes()).unwrap(), row);
    }

    #[test]
    fn test_date_time_wildcard_round_trip() {
        let dt = DateTime::new(
            Date::from_parts(0xFFFF, 3, 14, Date::NOT_SPECIFIED),
            Time::from_parts(Some(15), Some(9), None, Some(0)),
            Some(-120),
            None,
        );
        let decoded = from_bytes(&Data::DateTime(dt).to_bytes()).unwrap();
        let Data::DateTime(decoded) = decoded else { panic!("expected date-time") };
        assert!(decoded.skips().contains(DateTimeSkips::YEAR | DateTimeSkips::SECOND));
        assert_eq!(decoded.offset_minutes(), Some(-120));
    }

    #[test]
    fn test_from_bytes_rejects_trailing_input() {
        assert!(matches!(from_bytes(&[0x11, 0x01, 0x00]), Err(Error::DecodeInvalid)));
    }

    #[test]
    fn test_publish_temporal_values() {
        let dt = DateTime::new(Date::new(2024, 1, 1), Time::new(0, 0, 0, 0), Some(0), None);
        let row = Data::Structure(vec![Data::DateTime(dt.clone()), Data::Unsigned(1)]);

        let dlms = publish(&Settings::server(), row.clone());
        assert_eq!(dlms, Data::Structure(vec![Data::OctetString(dt.to_bytes()), Data::Unsigned(1)]));

        let saudi = publish(&Settings::server().with_standard(Standard::SaudiArabia), row.clone());
        assert_eq!(saudi, row);
    }
}
