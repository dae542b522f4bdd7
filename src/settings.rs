//! Encoder/handler context threaded through every GET, SET and ACTION.

#[cfg(feature = "serde")]
use serde::Serialize;

/// National profile that tweaks a handful of tag choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Standard {
    #[default]
    Dlms,
    SaudiArabia,
    India,
    Italy,
}

impl Standard {
    /// Whether date/time values keep their native tags on the wire.
    ///
    /// Everyone except Saudi Arabia publishes temporal attributes as
    /// octet-strings.
    pub fn native_temporal_tags(&self) -> bool {
        matches!(self, Self::SaudiArabia)
    }
}

/// Which side of the association is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Role {
    /// A client utility; register columns are published in engineering units.
    Client,
    /// The meter's own server loop; raw values are published.
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Settings {
    pub standard: Standard,
    pub role: Role,
    /// Largest response the peer accepts in one block. Buffer reads larger
    /// than this are split into fragments.
    pub max_pdu_size: u16,
    /// Whether the association passed high-level authentication. Attributes
    /// flagged with authenticated access are only served when set.
    pub authenticated: bool,
}

impl Settings {
    pub const DEFAULT_MAX_PDU_SIZE: u16 = 0xFFFF;

    pub fn server() -> Self {
        Self {
            standard: Standard::Dlms,
            role: Role::Server,
            max_pdu_size: Self::DEFAULT_MAX_PDU_SIZE,
            authenticated: true,
        }
    }

    pub fn client() -> Self {
        Self { role: Role::Client, authenticated: false, ..Self::server() }
    }

    pub fn with_standard(mut self, standard: Standard) -> Self {
        self.standard = standard;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_max_pdu_size(mut self, max_pdu_size: u16) -> Self {
        self.max_pdu_size = max_pdu_size;
        self
    }

    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::server()
    }
}
