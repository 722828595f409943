/*!
Packet match predicates.

A [`Match`] is a set of per-field constraints. Every constraint is a value
and a mask restricted to the bit width of the field; a field that does not
appear in the match is fully wildcarded. A [`Flow`] wraps a [`Match`] and
names the traffic that is being sampled.

Flows can be written in a compact textual form:

```
# use flowmon_core::flow::{Flow, MatchField};
let flow: Flow = "eth_type=0x800,ip_proto=6,ipv4_dst=0x0a000000/0xff000000"
    .parse()
    .unwrap();
assert!(flow.as_match().get(MatchField::IpProto).is_some());

let all: Flow = "*".parse().unwrap();
assert!(all.matches_all_of(&flow));
```
*/

use logos::{Lexer, Logos};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

/// The fields a [`Match`] can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchField {
    InPort,
    Metadata,
    EthType,
    EthSrc,
    EthDst,
    VlanVid,
    IpProto,
    Ipv4Src,
    Ipv4Dst,
    TcpSrc,
    TcpDst,
    UdpSrc,
    UdpDst,
    /// the first nicira extension register
    Reg0,
}

impl MatchField {
    pub const ALL: [Self; 14] = [
        Self::InPort,
        Self::Metadata,
        Self::EthType,
        Self::EthSrc,
        Self::EthDst,
        Self::VlanVid,
        Self::IpProto,
        Self::Ipv4Src,
        Self::Ipv4Dst,
        Self::TcpSrc,
        Self::TcpDst,
        Self::UdpSrc,
        Self::UdpDst,
        Self::Reg0,
    ];

    /// number of significant bits of the field
    pub const fn width(self) -> u32 {
        match self {
            Self::InPort => 32,
            Self::Metadata => 64,
            Self::EthType => 16,
            Self::EthSrc | Self::EthDst => 48,
            Self::VlanVid => 13,
            Self::IpProto => 8,
            Self::Ipv4Src | Self::Ipv4Dst => 32,
            Self::TcpSrc | Self::TcpDst | Self::UdpSrc | Self::UdpDst => 16,
            Self::Reg0 => 32,
        }
    }

    /// the mask with every significant bit of the field set
    pub const fn full_mask(self) -> u64 {
        match self.width() {
            64 => u64::MAX,
            w => (1 << w) - 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::InPort => "in_port",
            Self::Metadata => "metadata",
            Self::EthType => "eth_type",
            Self::EthSrc => "eth_src",
            Self::EthDst => "eth_dst",
            Self::VlanVid => "vlan_vid",
            Self::IpProto => "ip_proto",
            Self::Ipv4Src => "ipv4_src",
            Self::Ipv4Dst => "ipv4_dst",
            Self::TcpSrc => "tcp_src",
            Self::TcpDst => "tcp_dst",
            Self::UdpSrc => "udp_src",
            Self::UdpDst => "udp_dst",
            Self::Reg0 => "reg0",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    fn prints_decimal(self) -> bool {
        matches!(
            self,
            Self::InPort
                | Self::IpProto
                | Self::TcpSrc
                | Self::TcpDst
                | Self::UdpSrc
                | Self::UdpDst
        )
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value with a mask. Only the bits set in the mask are constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Masked {
    value: u64,
    mask: u64,
}

impl Masked {
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    fn is_exact(&self, field: MatchField) -> bool {
        self.mask == field.full_mask()
    }
}

/// A set of field constraints.
///
/// Two matches are equal when they constrain the same fields with the same
/// masked values.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Match {
    fields: BTreeMap<MatchField, Masked>,
}

impl Match {
    /// the match that matches every packet
    pub fn all() -> Self {
        Self::default()
    }

    /// add (or replace) an exact constraint on the field.
    ///
    /// The value is truncated to the width of the field.
    #[must_use = "function returns the modified match"]
    pub fn with(self, field: MatchField, value: u64) -> Self {
        self.with_masked(field, value, field.full_mask())
    }

    /// add (or replace) a masked constraint on the field.
    ///
    /// A mask of `0` removes the constraint.
    #[must_use = "function returns the modified match"]
    pub fn with_masked(mut self, field: MatchField, value: u64, mask: u64) -> Self {
        self.set_masked(field, value, mask);
        self
    }

    #[must_use = "function returns the modified match"]
    pub fn without(mut self, field: MatchField) -> Self {
        self.fields.remove(&field);
        self
    }

    pub fn set_masked(&mut self, field: MatchField, value: u64, mask: u64) {
        let mask = mask & field.full_mask();
        if mask == 0 {
            self.fields.remove(&field);
        } else {
            self.fields.insert(
                field,
                Masked {
                    value: value & mask,
                    mask,
                },
            );
        }
    }

    pub fn remove(&mut self, field: MatchField) -> Option<Masked> {
        self.fields.remove(&field)
    }

    pub fn get(&self, field: MatchField) -> Option<Masked> {
        self.fields.get(&field).copied()
    }

    /// the value of the field if it is constrained on all of its bits
    pub fn exact(&self, field: MatchField) -> Option<u64> {
        self.get(field)
            .filter(|masked| masked.is_exact(field))
            .map(|masked| masked.value)
    }

    pub fn is_wildcarded(&self, field: MatchField) -> bool {
        !self.fields.contains_key(&field)
    }

    pub fn is_all(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MatchField, Masked)> + '_ {
        self.fields.iter().map(|(field, masked)| (*field, *masked))
    }

    /// check that every packet matched by `other` is also matched by `self`.
    ///
    /// ```
    /// # use flowmon_core::flow::{Match, MatchField};
    /// let ip = Match::all().with(MatchField::EthType, 0x800);
    /// let tcp = ip.clone().with(MatchField::IpProto, 6);
    ///
    /// assert!(ip.matches_all_of(&tcp));
    /// assert!(!tcp.matches_all_of(&ip));
    /// ```
    pub fn matches_all_of(&self, other: &Self) -> bool {
        self.fields.iter().all(|(field, mine)| {
            other.fields.get(field).is_some_and(|theirs| {
                theirs.mask & mine.mask == mine.mask
                    && theirs.value & mine.mask == mine.value & mine.mask
            })
        })
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return f.write_str("*");
        }

        for (i, (field, masked)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if field.prints_decimal() {
                write!(f, "{field}={}", masked.value)?;
            } else {
                write!(f, "{field}={:#x}", masked.value)?;
            }
            if !masked.is_exact(*field) {
                write!(f, "/{:#x}", masked.mask)?;
            }
        }
        Ok(())
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("*")]
    Any,
    #[token("=")]
    Equal,
    #[token("/")]
    Slash,
    #[token(",")]
    Comma,

    #[regex("[a-z][a-z0-9_]*")]
    Ident,
    #[regex("0x[0-9a-fA-F]+")]
    Hex,
    #[regex("[0-9]+")]
    Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowParseError {
    #[error("empty flow")]
    Empty,
    #[error("unexpected input `{input}'")]
    Lexer { input: String },
    #[error("unknown match field `{name}'")]
    UnknownField { name: String },
    #[error("expecting a match field name")]
    ExpectedField,
    #[error("expecting `=' after the match field `{field}'")]
    ExpectedEqual { field: MatchField },
    #[error("expecting a value for the match field `{field}'")]
    ExpectedValue { field: MatchField },
    #[error("value of the match field `{field}' does not fit in {} bits", .field.width())]
    ValueTooWide { field: MatchField },
    #[error("match field `{field}' is specified more than once")]
    DuplicateField { field: MatchField },
    #[error("expecting `,' between match fields")]
    ExpectedComma,
}

fn parse_number(lex: &Lexer<'_, Token>, token: Token, field: MatchField) -> Result<u64, FlowParseError> {
    let parsed = match token {
        Token::Hex => u64::from_str_radix(&lex.slice()[2..], 16),
        Token::Decimal => lex.slice().parse(),
        _ => return Err(FlowParseError::ExpectedValue { field }),
    };
    let value = parsed.map_err(|_| FlowParseError::ValueTooWide { field })?;
    if value & !field.full_mask() != 0 {
        return Err(FlowParseError::ValueTooWide { field });
    }
    Ok(value)
}

impl FromStr for Match {
    type Err = FlowParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lexer_error = || FlowParseError::Lexer {
            input: s.to_owned(),
        };
        let mut lex = Lexer::<'_, Token>::new(s);
        let mut result = Match::all();

        match lex.next() {
            None => return Err(FlowParseError::Empty),
            Some(Err(())) => return Err(lexer_error()),
            Some(Ok(Token::Any)) => {
                return match lex.next() {
                    None => Ok(result),
                    Some(_) => Err(FlowParseError::ExpectedComma),
                };
            }
            Some(Ok(Token::Ident)) => (),
            Some(Ok(_)) => return Err(FlowParseError::ExpectedField),
        }

        loop {
            let name = lex.slice();
            let field = MatchField::from_name(name).ok_or_else(|| FlowParseError::UnknownField {
                name: name.to_owned(),
            })?;

            let Some(Ok(Token::Equal)) = lex.next() else {
                return Err(FlowParseError::ExpectedEqual { field });
            };
            let token = lex
                .next()
                .ok_or(FlowParseError::ExpectedValue { field })?
                .map_err(|()| lexer_error())?;
            let value = parse_number(&lex, token, field)?;

            let mut next = lex.next();
            let mask = if let Some(Ok(Token::Slash)) = next {
                let token = lex
                    .next()
                    .ok_or(FlowParseError::ExpectedValue { field })?
                    .map_err(|()| lexer_error())?;
                let mask = parse_number(&lex, token, field)?;
                next = lex.next();
                mask
            } else {
                field.full_mask()
            };

            if !result.is_wildcarded(field) {
                return Err(FlowParseError::DuplicateField { field });
            }
            result.set_masked(field, value, mask);

            match next {
                None => return Ok(result),
                Some(Err(())) => return Err(lexer_error()),
                Some(Ok(Token::Comma)) => (),
                Some(Ok(_)) => return Err(FlowParseError::ExpectedComma),
            }

            match lex.next() {
                Some(Ok(Token::Ident)) => (),
                Some(Err(())) => return Err(lexer_error()),
                _ => return Err(FlowParseError::ExpectedField),
            }
        }
    }
}

/// The traffic selected for sampling.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flow(Match);

impl Flow {
    pub fn new(matching: Match) -> Self {
        Self(matching)
    }

    /// the flow of every packet
    pub fn all() -> Self {
        Self(Match::all())
    }

    #[inline]
    pub fn as_match(&self) -> &Match {
        &self.0
    }

    #[inline]
    pub fn into_match(self) -> Match {
        self.0
    }

    pub fn matches_all_of(&self, other: &Self) -> bool {
        self.0.matches_all_of(&other.0)
    }

    /// either flow matches every packet of the other
    pub fn are_inclusive(a: &Self, b: &Self) -> bool {
        a.matches_all_of(b) || b.matches_all_of(a)
    }
}

impl From<Match> for Flow {
    fn from(value: Match) -> Self {
        Self(value)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flow[{}]", self.0)
    }
}

impl FromStr for Flow {
    type Err = FlowParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logos_lexer() {
        let mut lex = Token::lexer("in_port=0x1/0xf,*");

        assert_eq!(lex.next(), Some(Ok(Token::Ident)));
        assert_eq!(lex.slice(), "in_port");
        assert_eq!(lex.next(), Some(Ok(Token::Equal)));
        assert_eq!(lex.next(), Some(Ok(Token::Hex)));
        assert_eq!(lex.next(), Some(Ok(Token::Slash)));
        assert_eq!(lex.next(), Some(Ok(Token::Hex)));
        assert_eq!(lex.next(), Some(Ok(Token::Comma)));
        assert_eq!(lex.next(), Some(Ok(Token::Any)));
        assert_eq!(lex.next(), None);
    }

    #[test]
    fn parse() {
        let flow: Flow = "eth_type=0x800, ip_proto=17,udp_dst=53".parse().unwrap();
        let expected = Match::all()
            .with(MatchField::EthType, 0x800)
            .with(MatchField::IpProto, 17)
            .with(MatchField::UdpDst, 53);
        assert_eq!(flow.as_match(), &expected);
    }

    #[test]
    fn parse_masked() {
        let matching: Match = "ipv4_src=0x0a0000ff/0xff000000".parse().unwrap();
        let masked = matching.get(MatchField::Ipv4Src).unwrap();
        assert_eq!(masked.value(), 0x0a00_0000);
        assert_eq!(masked.mask(), 0xff00_0000);
        assert_eq!(matching.exact(MatchField::Ipv4Src), None);
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<Match>(), Err(FlowParseError::Empty));
        assert!(matches!(
            "ip_src=1".parse::<Match>(),
            Err(FlowParseError::UnknownField { .. })
        ));
        assert_eq!(
            "ip_proto".parse::<Match>(),
            Err(FlowParseError::ExpectedEqual {
                field: MatchField::IpProto
            })
        );
        assert_eq!(
            "ip_proto=".parse::<Match>(),
            Err(FlowParseError::ExpectedValue {
                field: MatchField::IpProto
            })
        );
        assert_eq!(
            "ip_proto=256".parse::<Match>(),
            Err(FlowParseError::ValueTooWide {
                field: MatchField::IpProto
            })
        );
        assert_eq!(
            "tcp_dst=1,tcp_dst=2".parse::<Match>(),
            Err(FlowParseError::DuplicateField {
                field: MatchField::TcpDst
            })
        );
        assert_eq!(
            "tcp_dst=1 tcp_src=2".parse::<Match>(),
            Err(FlowParseError::ExpectedComma)
        );
        assert_eq!("* ,".parse::<Match>(), Err(FlowParseError::ExpectedComma));
        assert_eq!("tcp_dst=1,".parse::<Match>(), Err(FlowParseError::ExpectedField));
    }

    #[test]
    fn display_parses_back() {
        let matching = Match::all()
            .with(MatchField::InPort, 3)
            .with(MatchField::EthType, 0x86dd)
            .with_masked(MatchField::Metadata, 0xff, 0xf0);
        let printed = matching.to_string();
        assert_eq!(printed, "in_port=3,metadata=0xf0/0xf0,eth_type=0x86dd");
        assert_eq!(printed.parse::<Match>().unwrap(), matching);
        assert_eq!(Match::all().to_string(), "*");
    }

    #[test]
    fn values_are_truncated_to_field_width() {
        let matching = Match::all().with(MatchField::VlanVid, 0xffff);
        assert_eq!(matching.exact(MatchField::VlanVid), Some(0x1fff));
    }

    #[test]
    fn zero_mask_wildcards() {
        let matching = Match::all().with_masked(MatchField::Reg0, 5, 0);
        assert!(matching.is_wildcarded(MatchField::Reg0));
    }

    #[test]
    fn matches_all_of() {
        let all = Match::all();
        let net = Match::all().with_masked(MatchField::Ipv4Dst, 0x0a00_0000, 0xff00_0000);
        let host = Match::all().with(MatchField::Ipv4Dst, 0x0a01_0203);
        let other_host = Match::all().with(MatchField::Ipv4Dst, 0x0b01_0203);

        assert!(all.matches_all_of(&net));
        assert!(net.matches_all_of(&host));
        assert!(!host.matches_all_of(&net));
        assert!(!net.matches_all_of(&other_host));
        assert!(!net.matches_all_of(&all));
        assert!(host.matches_all_of(&host));
    }

    #[test]
    fn inclusive_flows() {
        let tcp: Flow = "eth_type=0x800,ip_proto=6".parse().unwrap();
        let http: Flow = "eth_type=0x800,ip_proto=6,tcp_dst=80".parse().unwrap();
        let udp: Flow = "eth_type=0x800,ip_proto=17".parse().unwrap();

        assert!(Flow::are_inclusive(&tcp, &http));
        assert!(Flow::are_inclusive(&http, &tcp));
        assert!(!Flow::are_inclusive(&tcp, &udp));
        assert!(Flow::are_inclusive(&Flow::all(), &udp));
    }
}
