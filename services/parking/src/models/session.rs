//! Parking session (park-to-exit record) and its lifecycle transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::billing;
use crate::error::{ParkingError, ParkingResult};

/// Settlement status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(ParkingError::Internal(format!(
                "Unknown payment status in storage: {}",
                other
            ))),
        }
    }
}

/// Where a session is in its park-to-exit lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Vehicle parked, slot occupied
    Open,
    /// Checked out, fee computed, not yet paid
    AwaitingPayment,
    /// Paid
    Settled,
}

/// Invoice snapshot written at checkout and completed at settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub message: String,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Billable hours
    pub duration_hours: i64,
    pub amount: i64,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<DateTime<Utc>>,
}

/// One park-to-exit cycle for one vehicle. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub amount: Option<i64>,
    pub payment_status: PaymentStatus,
    pub payment_details: Option<PaymentDetails>,
    /// Ordering key for "most recent" lookups
    pub created_at: DateTime<Utc>,
}

impl ParkingSession {
    /// Start a session at `entry_time`
    pub fn open(vehicle_id: Uuid, slot_id: Uuid, entry_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            slot_id,
            entry_time,
            exit_time: None,
            amount: None,
            payment_status: PaymentStatus::Pending,
            payment_details: None,
            created_at: entry_time,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn state(&self) -> SessionState {
        match (self.exit_time, self.payment_status) {
            (None, _) => SessionState::Open,
            (Some(_), PaymentStatus::Success) => SessionState::Settled,
            (Some(_), _) => SessionState::AwaitingPayment,
        }
    }

    /// OPEN -> AWAITING_PAYMENT.
    ///
    /// Computes the fee once; a second close is rejected rather than
    /// recomputed so the stored amount never drifts.
    pub fn close(
        &mut self,
        license_plate: &str,
        exit_time: DateTime<Utc>,
        rate_per_hour: i64,
    ) -> ParkingResult<()> {
        if !self.is_open() {
            return Err(ParkingError::AlreadyClosed(self.id));
        }

        let fee = billing::compute_fee(self.entry_time, exit_time, rate_per_hour)?;

        self.exit_time = Some(exit_time);
        self.amount = Some(fee.amount);
        self.payment_status = PaymentStatus::Pending;
        self.payment_details = Some(PaymentDetails {
            message: "Please complete payment to exit.".to_string(),
            license_plate: license_plate.to_uppercase(),
            entry_time: self.entry_time,
            exit_time,
            duration_hours: fee.billable_hours,
            amount: fee.amount,
            payment_status: PaymentStatus::Pending,
            paid_on: None,
        });

        Ok(())
    }

    /// AWAITING_PAYMENT -> SETTLED.
    ///
    /// Returns `false` without touching the record when it is already
    /// settled, so the first settlement timestamp is kept.
    pub fn settle(&mut self, paid_on: DateTime<Utc>) -> ParkingResult<bool> {
        match self.state() {
            SessionState::Settled => Ok(false),
            SessionState::Open => Err(ParkingError::Conflict(format!(
                "Parking session {} is still open; check out before paying",
                self.id
            ))),
            SessionState::AwaitingPayment => {
                let details = self.payment_details.as_mut().ok_or_else(|| {
                    ParkingError::Internal(format!(
                        "Closed parking session {} has no payment details",
                        self.id
                    ))
                })?;

                details.payment_status = PaymentStatus::Success;
                details.paid_on = Some(paid_on);
                details.message = "Payment Completed".to_string();
                self.payment_status = PaymentStatus::Success;

                Ok(true)
            }
        }
    }
}

/// Lookup used by the checkout and payment flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelector {
    Id(Uuid),
    Vehicle(Uuid),
    /// Plate is matched after upper-casing; owner narrows to one user's vehicles
    Plate {
        license_plate: String,
        owner_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_open_session_starts_pending_and_open() {
        let session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        assert!(session.is_open());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.created_at, session.entry_time);
        assert!(session.amount.is_none());
    }

    #[test]
    fn test_close_writes_invoice_snapshot() {
        let mut session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        let exit = entry() + Duration::minutes(150);

        session.close("ka01ab1234", exit, 20).unwrap();

        assert_eq!(session.state(), SessionState::AwaitingPayment);
        assert_eq!(session.amount, Some(40));
        let details = session.payment_details.as_ref().unwrap();
        assert_eq!(details.license_plate, "KA01AB1234");
        assert_eq!(details.duration_hours, 2);
        assert_eq!(details.exit_time, exit);
        assert_eq!(details.payment_status, PaymentStatus::Pending);
        assert!(details.paid_on.is_none());
    }

    #[test]
    fn test_second_close_is_rejected_without_recomputing() {
        let mut session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        session.close("KA01", entry() + Duration::hours(1), 20).unwrap();

        let err = session
            .close("KA01", entry() + Duration::hours(5), 20)
            .unwrap_err();

        assert!(matches!(err, ParkingError::AlreadyClosed(id) if id == session.id));
        assert_eq!(session.amount, Some(20));
    }

    #[test]
    fn test_settle_is_idempotent() {
        let mut session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        session.close("KA01", entry() + Duration::hours(1), 20).unwrap();

        let first_paid = entry() + Duration::hours(2);
        assert!(session.settle(first_paid).unwrap());
        let snapshot = session.payment_details.clone();

        assert!(!session.settle(entry() + Duration::hours(3)).unwrap());
        assert_eq!(session.payment_details, snapshot);
        assert_eq!(
            session.payment_details.as_ref().unwrap().paid_on,
            Some(first_paid)
        );
        assert_eq!(session.state(), SessionState::Settled);
    }

    #[test]
    fn test_settle_rejects_open_session() {
        let mut session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        assert!(matches!(
            session.settle(entry()),
            Err(ParkingError::Conflict(_))
        ));
        assert_eq!(session.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_failed_payment_can_still_settle() {
        let mut session = ParkingSession::open(Uuid::new_v4(), Uuid::new_v4(), entry());
        session.close("KA01", entry() + Duration::hours(1), 20).unwrap();
        session.payment_status = PaymentStatus::Failed;

        assert_eq!(session.state(), SessionState::AwaitingPayment);
        assert!(session.settle(entry() + Duration::hours(2)).unwrap());
        assert_eq!(session.payment_status, PaymentStatus::Success);
    }
}
