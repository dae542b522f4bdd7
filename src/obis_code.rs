use core::fmt::{self, Debug, Display};
use core::str::FromStr;

use nom::{IResult, Parser, number::streaming::u8};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::error::Error;

/// A COSEM logical name (six-octet OBIS code).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (a, b, c, d, e, f)) = (u8, u8, u8, u8, u8, u8).parse(input)?;
        Ok((input, Self::new(a, b, c, d, e, f)))
    }

    /// Builds a logical name from the payload of an octet-string; exactly six
    /// bytes are required.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes {
            [a, b, c, d, e, f] => Ok(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => Err(Error::InvalidLogicalName(hex::encode(bytes))),
        }
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// Appends the six raw octets (no tag, no length).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    pub fn is_zero(&self) -> bool {
        self.to_bytes() == [0; 6]
    }
}

impl FromStr for ObisCode {
    type Err = Error;

    /// Accepts `A.B.C.D.E.F` as well as the OBIS display form `A-B:C.D.E*F`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidLogicalName(s.to_string());

        let parts: Vec<&str> = s.trim().split(['.', '-', ':', '*']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        // The display form must use its separators in the canonical places.
        let trimmed = s.trim();
        if trimmed.contains(['-', ':', '*']) {
            let separators: Vec<char> =
                trimmed.chars().filter(|c| matches!(c, '.' | '-' | ':' | '*')).collect();
            if separators != ['-', ':', '.', '.', '*'] {
                return Err(invalid());
            }
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            *octet = part.trim().parse::<u8>().map_err(|_| invalid())?;
        }
        Self::from_bytes(&octets)
    }
}

impl Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}.{}.{}.{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
