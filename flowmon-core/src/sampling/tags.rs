use crate::defaults::{FIRST_SAMPLING_VLAN_TAG, LAST_SAMPLING_VLAN_TAG};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// A VLAN id used to mark the packets of a sampling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VlanTag(u16);

impl VlanTag {
    pub const FIRST: Self = Self(FIRST_SAMPLING_VLAN_TAG);
    pub const LAST: Self = Self(LAST_SAMPLING_VLAN_TAG);

    /// bit set in a `vlan_vid` match value when a VLAN header is present
    pub const PRESENT: u16 = 0x1000;

    /// `None` if `vid` does not fit in 12 bits
    pub const fn new(vid: u16) -> Option<Self> {
        if vid <= 0x0fff { Some(Self(vid)) } else { None }
    }

    #[inline]
    pub const fn vid(self) -> u16 {
        self.0
    }

    /// the `vlan_vid` match value of packets carrying this tag
    #[inline]
    pub const fn match_value(self) -> u64 {
        (Self::PRESENT | self.0) as u64
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vlan:{}", self.0)
    }
}

/// The ordered set of tags the sampling rounds rotate through.
///
/// ```
/// # use flowmon_core::sampling::{TagPool, VlanTag};
/// let pool = TagPool::sampling();
/// assert_eq!(pool.len(), 8);
/// assert_eq!(pool.first(), VlanTag::FIRST);
/// assert_eq!(pool.get(9), pool.get(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPool {
    tags: Arc<[VlanTag]>,
}

impl TagPool {
    /// the VLAN ids reserved for sampling
    pub fn sampling() -> Self {
        let tags = (FIRST_SAMPLING_VLAN_TAG..=LAST_SAMPLING_VLAN_TAG)
            .map(VlanTag)
            .collect();
        Self { tags }
    }

    /// `None` if `tags` is empty
    pub fn new(tags: Vec<VlanTag>) -> Option<Self> {
        (!tags.is_empty()).then(|| Self { tags: tags.into() })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// a pool always holds at least one tag
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> VlanTag {
        self.tags[0]
    }

    /// the tag at `index`, wrapping around the pool
    pub fn get(&self, index: usize) -> VlanTag {
        self.tags[index % self.tags.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = VlanTag> + '_ {
        self.tags.iter().copied()
    }
}

impl Default for TagPool {
    fn default() -> Self {
        Self::sampling()
    }
}

const ORDERING: Ordering = Ordering::SeqCst;

/// Cycles through a [`TagPool`], one tag per call.
///
/// Consecutive tags are always distinct when the pool has more than one
/// tag.
#[derive(Debug)]
pub struct TagCursor {
    pool: TagPool,
    index: AtomicUsize,
}

impl TagCursor {
    /// a cursor starting at `offset` in the pool
    pub fn new(pool: TagPool, offset: usize) -> Self {
        let offset = offset % pool.len();
        Self {
            pool,
            index: AtomicUsize::new(offset),
        }
    }

    pub fn pool(&self) -> &TagPool {
        &self.pool
    }

    pub fn next_tag(&self) -> VlanTag {
        let len = self.pool.len();
        let previous = self
            .index
            .fetch_update(ORDERING, ORDERING, |index| Some((index + 1) % len))
            .unwrap_or_else(|index| index);
        self.pool.get(previous)
    }
}
