//! Bit set naming which kinds of data changed

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Combination of images, object models and poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataSet(u8);

impl DataSet {
    pub const IMAGES: DataSet = DataSet(0b001);
    pub const OBJECT_MODELS: DataSet = DataSet(0b010);
    pub const POSES: DataSet = DataSet(0b100);
    pub const ALL: DataSet = DataSet(0b111);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: DataSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DataSet) {
        self.0 |= other.0;
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Names of the contained sets, in a fixed order
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::IMAGES) {
            names.push("images");
        }
        if self.contains(Self::OBJECT_MODELS) {
            names.push("object_models");
        }
        if self.contains(Self::POSES) {
            names.push("poses");
        }
        names
    }
}

impl BitOr for DataSet {
    type Output = DataSet;

    fn bitor(self, rhs: DataSet) -> DataSet {
        DataSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for DataSet {
    fn bitor_assign(&mut self, rhs: DataSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

impl Serialize for DataSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_and_contains() {
        let set = DataSet::IMAGES | DataSet::POSES;
        assert!(set.contains(DataSet::IMAGES));
        assert!(set.contains(DataSet::POSES));
        assert!(!set.contains(DataSet::OBJECT_MODELS));
        assert!(!set.contains(DataSet::ALL));
        assert!(DataSet::ALL.contains(set));
    }

    #[test]
    fn test_empty() {
        let mut set = DataSet::empty();
        assert!(set.is_empty());
        set |= DataSet::OBJECT_MODELS;
        assert!(!set.is_empty());
        assert_eq!(set.to_string(), "object_models");
        assert_eq!(DataSet::empty().to_string(), "none");
    }

    #[test]
    fn test_serialize_as_names() {
        let json = serde_json::to_string(&DataSet::ALL).unwrap();
        assert_eq!(json, r#"["images","object_models","poses"]"#);
    }
}
