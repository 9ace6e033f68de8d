//! Registration of independent modules inside the shared config blob.

use core::marker::PhantomData;
use core::ops::Range;

/// Result of validating a module's bytes after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Every field is in range.
    Valid,
    /// Some fields were out of range and have been repaired in place.
    Migrated,
    /// The data is unusable; the module falls back to its defaults.
    Invalid,
}

/// A fixed-size slice of the persisted configuration.
///
/// Each module owns a disjoint byte range in the blob and knows nothing
/// about the layout of any other module.
pub trait ConfigModule: Sized {
    /// Encoded size in bytes. Must never change for a given flash layout.
    const SIZE: usize;

    /// Factory value.
    fn defaults() -> Self;

    /// Serialize into exactly `SIZE` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Deserialize `SIZE` bytes and judge whether they are usable.
    ///
    /// For [`Verdict::Migrated`] the returned value is the repaired one; for
    /// [`Verdict::Invalid`] it is ignored.
    fn decode(buf: &[u8]) -> (Self, Verdict);
}

/// Typed handle to a module's byte range, returned by
/// [`ConfigStore::allocate`](super::ConfigStore::allocate).
pub struct Slot<M> {
    offset: usize,
    _module: PhantomData<fn() -> M>,
}

impl<M: ConfigModule> Slot<M> {
    pub(super) const fn new(offset: usize) -> Self {
        Self {
            offset,
            _module: PhantomData,
        }
    }

    /// Byte range inside the payload.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + M::SIZE
    }
}

impl<M> Clone for Slot<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Slot<M> {}

impl<M> core::fmt::Debug for Slot<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot").field("offset", &self.offset).finish()
    }
}

/// Type-erased post-load hook for one registered module.
pub(super) struct Region {
    pub offset: usize,
    pub size: usize,
    pub validate: fn(&mut [u8]) -> Verdict,
}

impl Region {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Decode, then write back the repaired value or the defaults.
pub(super) fn validate_region<M: ConfigModule>(bytes: &mut [u8]) -> Verdict {
    let (value, verdict) = M::decode(bytes);
    match verdict {
        Verdict::Valid => {}
        Verdict::Migrated => value.encode(bytes),
        Verdict::Invalid => M::defaults().encode(bytes),
    }
    verdict
}
