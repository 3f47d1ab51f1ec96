use crate::errors::DomainError;
use crate::value_objects::{ListingId, UserId};

/// 容量受限的市场发布快照。
///
/// 发布本身由外部系统维护，协调核心只读写参与人数与可见性。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: String,
    pub capacity: u32,
    pub participants: u32,
    pub visible: bool,
}

impl Listing {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    pub fn is_full(&self) -> bool {
        self.participants >= self.capacity
    }

    pub fn accepts_requests(&self) -> bool {
        self.visible && !self.is_full()
    }

    /// 参与人数加一；达到容量时隐藏发布。
    pub fn admit_participant(&mut self) -> Result<(), DomainError> {
        if self.is_full() {
            return Err(DomainError::ListingFull);
        }
        self.participants += 1;
        if self.is_full() {
            self.visible = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(capacity: u32) -> Listing {
        Listing {
            id: ListingId::generate(),
            owner_id: UserId::generate(),
            title: "weekend hike".into(),
            capacity,
            participants: 0,
            visible: true,
        }
    }

    #[test]
    fn hidden_exactly_when_capacity_reached() {
        let mut listing = listing(2);
        listing.admit_participant().unwrap();
        assert!(listing.visible);
        listing.admit_participant().unwrap();
        assert!(!listing.visible);
        assert_eq!(listing.admit_participant(), Err(DomainError::ListingFull));
        assert_eq!(listing.participants, 2);
    }
}
