//! Incident state machine.
//!
//! An incident is opened by a panic signal and reaches exactly one terminal
//! state: `acknowledged` (a guardian took responsibility) or `canceled` (the
//! traveler stood down). Terminal states are monotonic; once an incident
//! leaves `open` its status never changes again.

use serde::{Deserialize, Serialize};

use super::foundation::{DomainError, ErrorCode, IncidentId, Timestamp, UserId};

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Canceled,
}

/// The channel through which an acknowledgment arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckChannel {
    ChatButton,
    Dtmf,
}

/// A panic incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub traveler_id: UserId,
    pub status: IncidentStatus,
    pub created_at: Timestamp,
    pub acknowledged_at: Option<Timestamp>,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_via: Option<AckChannel>,
    pub canceled_at: Option<Timestamp>,
}

impl Incident {
    /// Opens a new incident for a traveler.
    pub fn open(traveler_id: UserId, now: Timestamp) -> Self {
        Self {
            id: IncidentId::new(),
            traveler_id,
            status: IncidentStatus::Open,
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            acknowledged_via: None,
            canceled_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Transitions `open -> acknowledged`.
    ///
    /// # Errors
    ///
    /// Returns `IncidentTerminal` if the incident already left `open`.
    pub fn acknowledge(
        &mut self,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(DomainError::new(
                ErrorCode::IncidentTerminal,
                format!("Incident {} is already {:?}", self.id, self.status),
            ));
        }

        self.status = IncidentStatus::Acknowledged;
        self.acknowledged_at = Some(now);
        self.acknowledged_by = Some(by);
        self.acknowledged_via = Some(via);
        Ok(())
    }

    /// Transitions `open -> canceled`. Only the traveler (or an admin acting
    /// on their behalf) may cancel; the caller enforces that rule.
    ///
    /// # Errors
    ///
    /// Returns `IncidentTerminal` if the incident already left `open`.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(DomainError::new(
                ErrorCode::IncidentTerminal,
                format!("Incident {} is already {:?}", self.id, self.status),
            ));
        }

        self.status = IncidentStatus::Canceled;
        self.canceled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_incident() -> Incident {
        Incident::open(UserId::new(), Timestamp::from_unix_secs(1_000))
    }

    #[test]
    fn open_incident_starts_open() {
        let incident = open_incident();
        assert_eq!(incident.status, IncidentStatus::Open);
        assert!(incident.is_open());
        assert!(incident.acknowledged_at.is_none());
    }

    #[test]
    fn acknowledge_records_who_when_and_how() {
        let mut incident = open_incident();
        let guardian = UserId::new();
        let at = Timestamp::from_unix_secs(1_090);

        incident.acknowledge(guardian, AckChannel::Dtmf, at).unwrap();

        assert_eq!(incident.status, IncidentStatus::Acknowledged);
        assert_eq!(incident.acknowledged_by, Some(guardian));
        assert_eq!(incident.acknowledged_via, Some(AckChannel::Dtmf));
        assert_eq!(incident.acknowledged_at, Some(at));
    }

    #[test]
    fn acknowledge_is_rejected_after_terminal() {
        let mut incident = open_incident();
        let first = UserId::new();
        incident
            .acknowledge(first, AckChannel::ChatButton, Timestamp::now())
            .unwrap();

        let err = incident
            .acknowledge(UserId::new(), AckChannel::Dtmf, Timestamp::now())
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::IncidentTerminal);
        // The first decision stands.
        assert_eq!(incident.acknowledged_by, Some(first));
        assert_eq!(incident.acknowledged_via, Some(AckChannel::ChatButton));
    }

    #[test]
    fn cancel_after_acknowledge_is_rejected() {
        let mut incident = open_incident();
        incident
            .acknowledge(UserId::new(), AckChannel::ChatButton, Timestamp::now())
            .unwrap();

        let err = incident.cancel(Timestamp::now()).unwrap_err();

        assert_eq!(err.code, ErrorCode::IncidentTerminal);
        assert_eq!(incident.status, IncidentStatus::Acknowledged);
    }

    #[test]
    fn cancel_sets_canceled_at() {
        let mut incident = open_incident();
        let at = Timestamp::from_unix_secs(1_200);

        incident.cancel(at).unwrap();

        assert_eq!(incident.status, IncidentStatus::Canceled);
        assert_eq!(incident.canceled_at, Some(at));
    }
}
