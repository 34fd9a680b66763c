/// [start, end)
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AddressRange {
    pub start: usize,
    pub end: usize,
}

impl AddressRange {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Determine whether the target address is in the current range.
    #[inline]
    pub fn contains(&self, target: usize) -> bool {
        self.start <= target && target < self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest range covering both.
    pub fn union(&self, other: &AddressRange) -> AddressRange {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        AddressRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_range() {
        let ar = AddressRange::new(1, 3);
        assert!(ar.contains(1));
        assert!(ar.contains(2));
        assert!(!ar.contains(0));
        assert!(!ar.contains(3));
        assert_eq!(ar.len(), 2);
    }

    #[test]
    fn test_address_range_union() {
        let empty = AddressRange::default();
        let a = AddressRange::new(0x1000, 0x2000);
        let b = AddressRange::new(0x3000, 0x3800);
        assert_eq!(empty.union(&a), a);
        assert_eq!(a.union(&empty), a);
        assert_eq!(a.union(&b), AddressRange::new(0x1000, 0x3800));
        assert!(!a.union(&b).is_empty());
    }
}
