use std::fmt;

/// A possibly invalid unsigned index.
///
/// The maximum `usize` integer represents an invalid index. Used wherever a lookup may
/// legitimately come up empty, for instance a surface point with no opposing facet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index(usize);

impl Index {
    /// Invalid index instance.
    pub const INVALID: Index = Index(std::usize::MAX);

    /// Create a valid index from a usize type.
    #[inline]
    pub fn new(i: usize) -> Index {
        debug_assert!(i != std::usize::MAX);
        Index(i)
    }

    /// Convert this `Index` into `Option<usize>`, which is a larger struct.
    #[inline]
    pub fn into_option(self) -> Option<usize> {
        self.into()
    }

    /// Return true if stored index is valid and false otherwise.
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Signed representation where the invalid index maps to `-1`.
    #[inline]
    pub fn to_signed(self) -> i64 {
        self.into_option().map(|i| i as i64).unwrap_or(-1)
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<usize> for Index {
    #[inline]
    fn from(i: usize) -> Self {
        Index::new(i)
    }
}

impl From<Index> for Option<usize> {
    #[inline]
    fn from(val: Index) -> Self {
        if val.is_valid() {
            Some(val.0)
        } else {
            None
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.into_option() {
            Some(i) => write!(f, "{}", i),
            None => write!(f, "invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_index_conversions() {
        assert_eq!(Index::default(), Index::INVALID);
        assert_eq!(Index::INVALID.into_option(), None);
        assert_eq!(Index::INVALID.to_signed(), -1);
        assert_eq!(Index::new(3).to_signed(), 3);
        assert_eq!(format!("{}", Index::new(7)), "7");
    }
}
