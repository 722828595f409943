use anyhow::{Context as _, anyhow};
use std::{fmt, str};

/// The datapath identifier of a switch.
///
/// Displayed as `0x` followed by 16 hexadecimal digits. Parsed from either
/// a decimal number or a `0x` prefixed hexadecimal number.
///
/// ```
/// # use flowmon_core::node::NodeId;
/// let id: NodeId = "0x2a".parse().unwrap();
/// assert_eq!(id, NodeId::new(42));
/// assert_eq!(id.to_string(), "0x000000000000002a");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub const ZERO: Self = NodeId::new(0);
    pub const ONE: Self = NodeId::new(1);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl str::FromStr for NodeId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
                .map(Self)
                .with_context(|| format!("invalid hexadecimal datapath id `{s}'"))
        } else {
            s.parse().map(Self).map_err(|error| anyhow!("{error}"))
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
impl fmt::LowerHex for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl fmt::UpperHex for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_lower_hex() {
        assert_eq!(format!("{:x}", NodeId(42)), "2a")
    }
    #[test]
    fn print_upper_hex() {
        assert_eq!(format!("{:X}", NodeId(42)), "2A")
    }
    #[test]
    fn print() {
        assert_eq!(format!("{}", NodeId(42)), "0x000000000000002a");
        assert_eq!(format!("{}", NodeId(u64::MAX)), "0xffffffffffffffff");
    }
    #[test]
    fn parse() {
        assert_eq!("42".parse::<NodeId>().unwrap(), NodeId(42));
        assert_eq!("0x2A".parse::<NodeId>().unwrap(), NodeId(42));
        assert_eq!(
            "0x000000000000002a".parse::<NodeId>().unwrap(),
            NodeId(42)
        );
    }
    #[test]
    fn parse_errors() {
        assert!("".parse::<NodeId>().is_err());
        assert!("0xzz".parse::<NodeId>().is_err());
        assert!("-1".parse::<NodeId>().is_err());
    }
}
