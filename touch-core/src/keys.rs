//! Logical keys and the per-cycle touch frame.

/// Number of user-facing touch zones.
pub const KEY_COUNT: usize = 34;

/// Zone letters and the id of the first key in each zone.
const ZONES: [(u8, u8, u8); 5] = [
    // (letter, first id, key count)
    (b'A', 0, 8),
    (b'B', 8, 8),
    (b'C', 16, 2),
    (b'D', 18, 8),
    (b'E', 26, 8),
];

/// One user-facing touch zone, independent of physical wiring.
///
/// Valid ids are `0..KEY_COUNT`; [`LogicalKey::NONE`] marks an unconnected
/// channel.
///
/// # Example
///
/// ```
/// use touch_core::LogicalKey;
///
/// let key = LogicalKey::from_name("b3").unwrap();
/// assert_eq!(key.id(), 10);
/// assert_eq!(key.name(), *b"B3");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalKey(u8);

impl LogicalKey {
    /// "Not connected" sentinel.
    pub const NONE: Self = Self(0xFF);

    /// Create a key from its id, if in range.
    #[must_use]
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < KEY_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Decode a persisted byte, mapping anything out of range to [`LogicalKey::NONE`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match Self::new(raw) {
            Some(key) => key,
            None => Self::NONE,
        }
    }

    /// Raw id (`0xFF` for [`LogicalKey::NONE`]).
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Index into per-key tables. `None` for the sentinel.
    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        if self.is_connected() {
            Some(self.0 as usize)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        (self.0 as usize) < KEY_COUNT
    }

    /// Iterate every defined key in id order.
    pub fn all() -> impl Iterator<Item = LogicalKey> {
        (0..KEY_COUNT as u8).map(LogicalKey)
    }

    /// Two-character zone name, e.g. `A1`, `C2`, or `XX` when unconnected.
    #[must_use]
    pub fn name(self) -> [u8; 2] {
        for &(letter, first, count) in &ZONES {
            if self.0 >= first && self.0 < first + count {
                return [letter, b'1' + (self.0 - first)];
            }
        }
        *b"XX"
    }

    /// Parse a two-character zone name, case-insensitive.
    ///
    /// `XX` parses to [`LogicalKey::NONE`]. Returns `None` for anything that
    /// does not name a key.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let letter = bytes[0].to_ascii_uppercase();
        if letter == b'X' && bytes[1].to_ascii_uppercase() == b'X' {
            return Some(Self::NONE);
        }
        let index = bytes[1].checked_sub(b'1')?;
        ZONES
            .iter()
            .find(|(l, _, _)| *l == letter)
            .filter(|(_, _, count)| index < *count)
            .map(|(_, first, _)| Self(first + index))
    }
}

/// Aggregated touch state over all logical keys for one sampling cycle.
///
/// Bit `n` is set when key `n` is touched.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchFrame(pub u64);

impl TouchFrame {
    /// No keys touched.
    pub const EMPTY: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn touched(self, key: LogicalKey) -> bool {
        match key.index() {
            Some(i) => self.0 & (1 << i) != 0,
            None => false,
        }
    }

    /// Mark a key as touched. The sentinel is ignored.
    #[inline]
    pub fn set(&mut self, key: LogicalKey) {
        if let Some(i) = key.index() {
            self.0 |= 1 << i;
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Keys touched in `self` but not in `previous`.
    #[inline]
    #[must_use]
    pub const fn rising_since(self, previous: TouchFrame) -> TouchFrame {
        Self(self.0 & !previous.0)
    }

    /// Iterate the touched keys in id order.
    pub fn keys(self) -> impl Iterator<Item = LogicalKey> {
        LogicalKey::all().filter(move |k| self.touched(*k))
    }
}
