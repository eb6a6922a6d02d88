//! Record identifier type.

use std::fmt;

use crate::common::PageId;

/// Identifies a record by the page it lives on and its slot within that
/// page. The usual value type stored in an index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: i32,
    pub slot_num: u32,
}

impl Rid {
    /// Create a new record identifier.
    #[inline]
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self {
            page_id: page_id.0,
            slot_num,
        }
    }

    /// The page this record lives on.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_id, self.slot_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_accessors() {
        let rid = Rid::new(PageId::new(7), 3);
        assert_eq!(rid.page_id(), PageId::new(7));
        assert_eq!(rid.slot_num, 3);
        assert_eq!(format!("{}", rid), "Rid(7, 3)");
    }
}
