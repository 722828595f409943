use anyhow::{Context as _, anyhow};
use std::{fmt, str};

/// A switch port number.
///
/// Port numbers at or above [`PortId::MAX_REGULAR`] + 1 are reserved by
/// the protocol and are called _special_ ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(u32);

impl PortId {
    /// the last port number usable for a physical port.
    pub const MAX_REGULAR: Self = Self(0xffff_ff00 - 1);

    pub const IN_PORT: Self = Self(0xffff_fff8);
    pub const TABLE: Self = Self(0xffff_fff9);
    pub const NORMAL: Self = Self(0xffff_fffa);
    pub const FLOOD: Self = Self(0xffff_fffb);
    pub const ALL: Self = Self(0xffff_fffc);
    pub const CONTROLLER: Self = Self(0xffff_fffd);
    pub const LOCAL: Self = Self(0xffff_fffe);
    pub const ANY: Self = Self(0xffff_ffff);

    pub const fn new(port: u32) -> Self {
        Self(port)
    }

    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// check if the port is one of the reserved ports
    ///
    /// ```
    /// # use flowmon_core::node::PortId;
    /// assert!(PortId::CONTROLLER.is_special());
    /// assert!(!PortId::new(3).is_special());
    /// ```
    #[inline]
    pub const fn is_special(self) -> bool {
        self.0 > Self::MAX_REGULAR.0
    }

    fn reserved_name(self) -> Option<&'static str> {
        match self {
            Self::IN_PORT => Some("IN_PORT"),
            Self::TABLE => Some("TABLE"),
            Self::NORMAL => Some("NORMAL"),
            Self::FLOOD => Some("FLOOD"),
            Self::ALL => Some("ALL"),
            Self::CONTROLLER => Some("CONTROLLER"),
            Self::LOCAL => Some("LOCAL"),
            Self::ANY => Some("ANY"),
            _ => None,
        }
    }
}

impl From<u32> for PortId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reserved_name() {
            Some(name) => f.write_str(name),
            None => self.0.fmt(f),
        }
    }
}

impl str::FromStr for PortId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let reserved = [
            Self::IN_PORT,
            Self::TABLE,
            Self::NORMAL,
            Self::FLOOD,
            Self::ALL,
            Self::CONTROLLER,
            Self::LOCAL,
            Self::ANY,
        ];
        if let Some(port) = reserved
            .into_iter()
            .find(|port| port.reserved_name() == Some(s))
        {
            return Ok(port);
        }

        if let Some(hex) = s.strip_prefix("0x") {
            u32::from_str_radix(hex, 16)
                .map(Self)
                .with_context(|| format!("invalid hexadecimal port `{s}'"))
        } else {
            s.parse().map(Self).map_err(|error| anyhow!("{error}"))
        }
    }
}
