//! Flow table layout and cookies of the sampling entries.
//!
//! The sampling pipeline wraps the application tables:
//!
//! ```text
//! 0          destination sampling
//! 1 ..= n-253 application tables
//! n-252      tag register
//! n-251      source sampling
//! ```
//!
//! Application entries that output to a regular port are redirected to the
//! tag register table, which tags the packets of the links being sampled
//! before the source sampling table outputs them.

use super::{FlowMod, TableId};
use crate::node::NodeId;
use thiserror::Error;

const DEST_SAMPLING_TABLE: u8 = 0;
const FIRST_APP_TABLE: u8 = DEST_SAMPLING_TABLE + 1;
const SRC_SAMPLING_TABLE_OFFSET: u8 = 251;
const TAG_REGISTER_TABLE_OFFSET: u8 = SRC_SAMPLING_TABLE_OFFSET + 1;
const LAST_APP_TABLE_OFFSET: u8 = TAG_REGISTER_TABLE_OFFSET + 1;

/// Fewest flow tables a switch needs so that the sampling tables do not
/// overlap the application tables.
pub const MIN_REQUIRED_TABLES: u8 = LAST_APP_TABLE_OFFSET + FIRST_APP_TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("switch {node} has {tables} flow tables, at least {MIN_REQUIRED_TABLES} are required")]
pub struct NotEnoughTables {
    pub node: NodeId,
    pub tables: u8,
}

/// The role of every flow table of a switch.
///
/// ```
/// # use flowmon_core::{node::NodeId, protocol::{TableId, TableLayout}};
/// let layout = TableLayout::new(NodeId::ONE, 254).unwrap();
/// assert_eq!(layout.dest_sampling(), TableId::new(0));
/// assert_eq!(layout.first_app(), TableId::new(1));
/// assert_eq!(layout.last_app(), TableId::new(1));
/// assert_eq!(layout.tag_register(), TableId::new(2));
/// assert_eq!(layout.src_sampling(), TableId::new(3));
///
/// assert!(TableLayout::new(NodeId::ONE, 3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    num_tables: u8,
}

impl TableLayout {
    pub fn new(node: NodeId, num_tables: u8) -> Result<Self, NotEnoughTables> {
        if num_tables < MIN_REQUIRED_TABLES {
            return Err(NotEnoughTables {
                node,
                tables: num_tables,
            });
        }
        Ok(Self { num_tables })
    }

    pub fn num_tables(&self) -> u8 {
        self.num_tables
    }

    pub fn dest_sampling(&self) -> TableId {
        TableId::new(DEST_SAMPLING_TABLE)
    }

    pub fn first_app(&self) -> TableId {
        TableId::new(FIRST_APP_TABLE)
    }

    pub fn last_app(&self) -> TableId {
        TableId::new(self.num_tables - LAST_APP_TABLE_OFFSET)
    }

    pub fn tag_register(&self) -> TableId {
        TableId::new(self.num_tables - TAG_REGISTER_TABLE_OFFSET)
    }

    pub fn src_sampling(&self) -> TableId {
        TableId::new(self.num_tables - SRC_SAMPLING_TABLE_OFFSET)
    }

    /// number of tables left to the applications
    pub fn app_tables(&self) -> u8 {
        self.last_app().into_u8() - FIRST_APP_TABLE + 1
    }
}

const SAMPLING_APP_ID: u64 = 300;
const APP_ID_SHIFT: u32 = 52;
const DEFAULT_COOKIE_ID: u64 = 0x4f3a_24e7;
const EPHEMERAL_COOKIE_ID: u64 = DEFAULT_COOKIE_ID + 1;

const fn app_cookie(app: u64, id: u64) -> u64 {
    (app << APP_ID_SHIFT) | id
}

/// Cookie and cookie mask that identify the entries installed by the
/// sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingCookie {
    /// entries that live as long as the switch, port or link they serve
    Default,
    /// entries installed for a single sampling round
    Ephemeral,
}

impl SamplingCookie {
    pub const fn cookie(self) -> u64 {
        match self {
            Self::Default => app_cookie(SAMPLING_APP_ID, DEFAULT_COOKIE_ID),
            Self::Ephemeral => app_cookie(SAMPLING_APP_ID, EPHEMERAL_COOKIE_ID),
        }
    }

    pub const fn mask(self) -> u64 {
        match self {
            Self::Default => 0,
            Self::Ephemeral => u64::MAX,
        }
    }

    /// the kind of sampling entry `flow_mod` targets, if any
    pub fn of(flow_mod: &FlowMod) -> Option<Self> {
        [Self::Default, Self::Ephemeral]
            .into_iter()
            .find(|kind| flow_mod.cookie == kind.cookie() && flow_mod.cookie_mask == kind.mask())
    }

    /// whether `cookie` is one of the sampling cookies, regardless of the
    /// mask
    pub fn is_reserved(cookie: u64) -> bool {
        cookie == Self::Default.cookie() || cookie == Self::Ephemeral.cookie()
    }

    #[must_use]
    pub fn apply(self, flow_mod: FlowMod) -> FlowMod {
        flow_mod.with_cookie(self.cookie(), self.mask())
    }
}
