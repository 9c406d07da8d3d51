//! Alert and call-attempt state machines.
//!
//! An alert records the intent to contact one guardian via one channel for
//! one incident; there is exactly one per (incident, audience, channel).
//! Voice alerts own a sequence of call attempts. At most one attempt per
//! alert may be unsettled (no `ended_at`) at any time.

use serde::{Deserialize, Serialize};

use super::foundation::{AlertId, CallAttemptId, DomainError, ErrorCode, IncidentId, Timestamp, UserId};

/// Contact channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    Chat,
    Voice,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Chat => "chat",
            AlertChannel::Voice => "voice",
        }
    }
}

/// Alert delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    /// No further attempts will be made on this alert.
    Halted,
}

/// Intent to contact one guardian via one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub incident_id: IncidentId,
    pub audience_id: UserId,
    pub channel: AlertChannel,
    pub status: AlertStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

impl Alert {
    pub fn new(
        incident_id: IncidentId,
        audience_id: UserId,
        channel: AlertChannel,
        now: Timestamp,
    ) -> Self {
        Self {
            id: AlertId::new(),
            incident_id,
            audience_id,
            channel,
            status: AlertStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.status == AlertStatus::Halted
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn mark_sent(&mut self) {
        self.status = AlertStatus::Sent;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = AlertStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Stops the cascade for this alert. Retains the last error, if any.
    pub fn halt(&mut self) {
        self.status = AlertStatus::Halted;
    }
}

/// Result of a voice call attempt.
///
/// `Pending` and `Ringing` are live states; `AnsweredHuman` is live until
/// the call ends (the guardian may still press a key). All other values
/// are settled outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Pending,
    Ringing,
    AnsweredHuman,
    AnsweredMachine,
    NoAnswer,
    Busy,
    Failed,
    Acknowledged,
}

/// The provider-reported reason a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HangupReason {
    Completed,
    Timeout,
    Busy,
    Rejected,
    Failed,
    Unknown,
}

/// One voice call placement under an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: CallAttemptId,
    pub alert_id: AlertId,
    pub provider_call_id: Option<String>,
    /// 1-based within its alert.
    pub attempt_no: u32,
    pub result: CallResult,
    pub dtmf_received: Option<char>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub error_code: Option<String>,
}

impl CallAttempt {
    pub fn new(alert_id: AlertId, attempt_no: u32, now: Timestamp) -> Self {
        Self {
            id: CallAttemptId::new(),
            alert_id,
            provider_call_id: None,
            attempt_no,
            result: CallResult::Pending,
            dtmf_received: None,
            started_at: now,
            ended_at: None,
            error_code: None,
        }
    }

    /// Whether the attempt reached a final outcome.
    pub fn is_settled(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Ring time consumed by this attempt, in whole seconds.
    pub fn ring_secs(&self) -> u32 {
        match self.ended_at {
            Some(ended) => ended.secs_since(&self.started_at),
            None => 0,
        }
    }

    pub fn note_placed(&mut self, provider_call_id: impl Into<String>) {
        self.provider_call_id = Some(provider_call_id.into());
    }

    pub fn note_ringing(&mut self) {
        if self.result == CallResult::Pending {
            self.result = CallResult::Ringing;
        }
    }

    pub fn note_answered(&mut self) {
        if !self.is_settled() {
            self.result = CallResult::AnsweredHuman;
        }
    }

    pub fn note_machine(&mut self) {
        if !self.is_settled() {
            self.result = CallResult::AnsweredMachine;
        }
    }

    /// Records a gathered DTMF digit. Digit `1` is the acknowledgment key
    /// and settles the attempt immediately.
    ///
    /// Returns `true` when the digit acknowledged the incident.
    pub fn note_digit(&mut self, digit: char, now: Timestamp) -> bool {
        if self.is_settled() {
            return false;
        }
        self.dtmf_received = Some(digit);
        if digit == '1' {
            self.result = CallResult::Acknowledged;
            self.ended_at = Some(now);
            return true;
        }
        false
    }

    /// Settles the attempt with the outcome implied by the hangup reason
    /// and the state the call was in when it ended.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the attempt is already settled.
    pub fn settle_on_hangup(
        &mut self,
        reason: HangupReason,
        now: Timestamp,
    ) -> Result<CallResult, DomainError> {
        if self.is_settled() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Attempt {} already settled as {:?}", self.id, self.result),
            ));
        }

        let outcome = match (self.result, reason) {
            // An answered call that ended without the ack digit.
            (CallResult::AnsweredHuman, _) => CallResult::AnsweredHuman,
            (CallResult::AnsweredMachine, _) => CallResult::AnsweredMachine,
            (_, HangupReason::Busy) => CallResult::Busy,
            (_, HangupReason::Timeout) => CallResult::NoAnswer,
            (_, HangupReason::Rejected) => CallResult::Busy,
            (_, HangupReason::Completed) => CallResult::NoAnswer,
            (_, HangupReason::Failed) | (_, HangupReason::Unknown) => CallResult::Failed,
        };

        self.result = outcome;
        self.ended_at = Some(now);
        Ok(outcome)
    }

    /// Settles the attempt as failed before the provider ever took it
    /// (placement rejected, number not allowed).
    pub fn settle_failed(&mut self, error_code: impl Into<String>, now: Timestamp) {
        self.result = CallResult::Failed;
        self.error_code = Some(error_code.into());
        self.ended_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> CallAttempt {
        CallAttempt::new(AlertId::new(), 1, Timestamp::from_unix_secs(0))
    }

    #[test]
    fn digit_one_acknowledges_and_settles() {
        let mut a = attempt();
        a.note_answered();

        let acked = a.note_digit('1', Timestamp::from_unix_secs(12));

        assert!(acked);
        assert_eq!(a.result, CallResult::Acknowledged);
        assert!(a.is_settled());
        assert_eq!(a.ring_secs(), 12);
    }

    #[test]
    fn other_digits_are_recorded_but_do_not_settle() {
        let mut a = attempt();
        a.note_answered();

        let acked = a.note_digit('3', Timestamp::from_unix_secs(10));

        assert!(!acked);
        assert_eq!(a.dtmf_received, Some('3'));
        assert!(!a.is_settled());
    }

    #[test]
    fn hangup_while_ringing_is_no_answer() {
        let mut a = attempt();
        a.note_ringing();

        let outcome = a
            .settle_on_hangup(HangupReason::Timeout, Timestamp::from_unix_secs(25))
            .unwrap();

        assert_eq!(outcome, CallResult::NoAnswer);
        assert_eq!(a.ring_secs(), 25);
    }

    #[test]
    fn hangup_after_answer_without_digit_is_answered_human() {
        let mut a = attempt();
        a.note_answered();

        let outcome = a
            .settle_on_hangup(HangupReason::Completed, Timestamp::from_unix_secs(30))
            .unwrap();

        assert_eq!(outcome, CallResult::AnsweredHuman);
    }

    #[test]
    fn busy_hangup_maps_to_busy() {
        let mut a = attempt();
        let outcome = a
            .settle_on_hangup(HangupReason::Busy, Timestamp::from_unix_secs(3))
            .unwrap();
        assert_eq!(outcome, CallResult::Busy);
    }

    #[test]
    fn machine_detection_survives_hangup() {
        let mut a = attempt();
        a.note_machine();

        let outcome = a
            .settle_on_hangup(HangupReason::Completed, Timestamp::from_unix_secs(20))
            .unwrap();

        assert_eq!(outcome, CallResult::AnsweredMachine);
    }

    #[test]
    fn double_settle_is_rejected() {
        let mut a = attempt();
        a.settle_on_hangup(HangupReason::Timeout, Timestamp::from_unix_secs(25))
            .unwrap();

        let err = a
            .settle_on_hangup(HangupReason::Busy, Timestamp::from_unix_secs(30))
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(a.result, CallResult::NoAnswer);
    }

    #[test]
    fn digit_after_settle_is_ignored() {
        let mut a = attempt();
        a.settle_on_hangup(HangupReason::Timeout, Timestamp::from_unix_secs(25))
            .unwrap();

        assert!(!a.note_digit('1', Timestamp::from_unix_secs(26)));
        assert_eq!(a.result, CallResult::NoAnswer);
    }

    #[test]
    fn alert_halt_keeps_last_error() {
        let mut alert = Alert::new(
            IncidentId::new(),
            UserId::new(),
            AlertChannel::Voice,
            Timestamp::now(),
        );
        alert.mark_failed("busy");
        alert.halt();

        assert!(alert.is_halted());
        assert_eq!(alert.last_error.as_deref(), Some("busy"));
    }
}
