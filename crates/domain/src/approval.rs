use crate::errors::DomainError;
use crate::value_objects::{ListingId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown approval status {other}"),
            )),
        }
    }
}

/// 加入/购买申请。PENDING 是唯一的非终态。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApprovalRequest {
    pub listing_id: ListingId,
    pub requester_id: UserId,
    pub status: ApprovalStatus,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<Timestamp>,
    pub requested_at: Timestamp,
}

impl ApprovalRequest {
    pub fn pending(listing_id: ListingId, requester_id: UserId, now: Timestamp) -> Self {
        Self {
            listing_id,
            requester_id,
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            requested_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn approve(&mut self, decided_by: UserId, at: Timestamp) -> Result<(), DomainError> {
        self.decide(ApprovalStatus::Approved, decided_by, at)
    }

    pub fn reject(&mut self, decided_by: UserId, at: Timestamp) -> Result<(), DomainError> {
        self.decide(ApprovalStatus::Rejected, decided_by, at)
    }

    fn decide(
        &mut self,
        status: ApprovalStatus,
        decided_by: UserId,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::AlreadyDecided);
        }
        self.status = status;
        self.decided_by = Some(decided_by);
        self.decided_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn decisions_are_terminal() {
        let owner = UserId::generate();
        let mut request = ApprovalRequest::pending(ListingId::generate(), UserId::generate(), Utc::now());
        request.approve(owner, Utc::now()).unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.decided_by, Some(owner));

        assert_eq!(request.reject(owner, Utc::now()), Err(DomainError::AlreadyDecided));
        assert_eq!(request.approve(owner, Utc::now()), Err(DomainError::AlreadyDecided));
        assert_eq!(request.status, ApprovalStatus::Approved);
    }

    #[test]
    fn status_text_round_trips() {
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(ApprovalStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ApprovalStatus::parse("MAYBE").is_err());
    }
}
