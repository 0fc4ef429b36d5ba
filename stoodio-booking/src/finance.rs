use serde::Serialize;
use stoodio_core::ledger::{booking_key, checkout_key, ledger_sum};
use stoodio_core::payment::CheckoutSession;
use stoodio_core::{
    Booking, BookingError, BookingResult, LedgerPosting, Transaction, TransactionCategory,
    UserAccount,
};
use uuid::Uuid;

/// A participant as named on ledger entries
#[derive(Debug, Clone)]
pub struct Party {
    pub id: Uuid,
    pub name: String,
}

impl From<&UserAccount> for Party {
    fn from(user: &UserAccount) -> Self {
        Self { id: user.id, name: user.name.clone() }
    }
}

/// Who gets charged and who gets paid when a booking settles
#[derive(Debug, Clone)]
pub struct SettlementParties {
    pub payer: Party,
    pub payee: Option<Party>,
    pub stoodio: Option<Party>,
}

/// Builds the ledger postings booking transitions carry.
///
/// Every posting gets a deterministic idempotency key, so handing the same
/// postings to the store twice moves money once.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    platform_fee_rate: f64,
}

impl WalletLedger {
    pub fn new(platform_fee_rate: f64) -> Self {
        Self { platform_fee_rate: platform_fee_rate.clamp(0.0, 1.0) }
    }

    pub fn platform_fee(&self, gross_cents: i64) -> i64 {
        ((gross_cents as f64) * self.platform_fee_rate).round() as i64
    }

    /// Debit of the booking's fixed total cost from the paying party
    pub fn charge(&self, booking: &Booking, payer: &Party, related: Option<&Party>) -> Option<LedgerPosting> {
        if booking.total_cost_cents == 0 {
            return None;
        }

        Some(LedgerPosting {
            user_id: payer.id,
            booking_id: Some(booking.id),
            amount_cents: -booking.total_cost_cents,
            category: TransactionCategory::SessionCharge,
            description: format!("Session on {} ({:.1}h)", booking.slot.date, booking.slot.duration_hours),
            related_user_name: related.map(|p| p.name.clone()),
            idempotency_key: booking_key(booking.id, TransactionCategory::SessionCharge, payer.id),
        })
    }

    /// Postings for a completed booking: the charge (skipped by the store if
    /// it was already taken at confirmation), the gross payout to each earner
    /// and the platform fee withheld from it.
    pub fn settlement(&self, booking: &Booking, parties: &SettlementParties) -> Vec<LedgerPosting> {
        let mut postings = Vec::new();
        let counterpart = parties.payee.as_ref().or(parties.stoodio.as_ref());

        if let Some(charge) = self.charge(booking, &parties.payer, counterpart) {
            postings.push(charge);
        }

        if let Some(payee) = &parties.payee {
            postings.extend(self.earnings(booking, payee, &parties.payer, booking.payout_cents, "Session payout"));
        }

        if let Some(stoodio) = &parties.stoodio {
            if stoodio.id != parties.payer.id {
                postings.extend(self.earnings(booking, stoodio, &parties.payer, booking.room_cost_cents, "Room booking"));
            }
        }

        postings
    }

    fn earnings(
        &self,
        booking: &Booking,
        earner: &Party,
        payer: &Party,
        gross_cents: i64,
        label: &str,
    ) -> Vec<LedgerPosting> {
        if gross_cents <= 0 {
            return Vec::new();
        }

        let mut postings = vec![LedgerPosting {
            user_id: earner.id,
            booking_id: Some(booking.id),
            amount_cents: gross_cents,
            category: TransactionCategory::SessionPayout,
            description: format!("{} for session on {}", label, booking.slot.date),
            related_user_name: Some(payer.name.clone()),
            idempotency_key: booking_key(booking.id, TransactionCategory::SessionPayout, earner.id),
        }];

        let fee = self.platform_fee(gross_cents);
        if fee > 0 {
            postings.push(LedgerPosting {
                user_id: earner.id,
                booking_id: Some(booking.id),
                amount_cents: -fee,
                category: TransactionCategory::PlatformFee,
                description: format!("Platform fee ({:.0}%)", self.platform_fee_rate * 100.0),
                related_user_name: None,
                idempotency_key: booking_key(booking.id, TransactionCategory::PlatformFee, earner.id),
            });
        }

        postings
    }

    /// Compensating entry for an applied charge. The original stays as it is.
    pub fn reversal(&self, original: &Transaction) -> LedgerPosting {
        let booking_id = original.booking_id.unwrap_or_default();
        LedgerPosting {
            user_id: original.user_id,
            booking_id: original.booking_id,
            amount_cents: -original.amount_cents,
            category: TransactionCategory::Reversal,
            description: format!("Reversal: {}", original.description),
            related_user_name: original.related_user_name.clone(),
            idempotency_key: booking_key(booking_id, TransactionCategory::Reversal, original.user_id),
        }
    }

    pub fn tip(&self, session: &CheckoutSession, booking_id: Uuid, recipient_id: Uuid, tipper: &Party) -> LedgerPosting {
        LedgerPosting {
            user_id: recipient_id,
            booking_id: Some(booking_id),
            amount_cents: session.amount_cents,
            category: TransactionCategory::Tip,
            description: format!("Tip from {}", tipper.name),
            related_user_name: Some(tipper.name.clone()),
            idempotency_key: checkout_key(&session.id),
        }
    }

    pub fn top_up(&self, session: &CheckoutSession) -> LedgerPosting {
        LedgerPosting {
            user_id: session.user_id,
            booking_id: None,
            amount_cents: session.amount_cents,
            category: TransactionCategory::TopUp,
            description: "Wallet top-up".to_string(),
            related_user_name: None,
            idempotency_key: checkout_key(&session.id),
        }
    }
}

/// Cached balance against the ledger it is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub ledger_sum_cents: i64,
}

impl Reconciliation {
    pub fn of(user: &UserAccount, transactions: &[Transaction]) -> Self {
        Self {
            user_id: user.id,
            balance_cents: user.wallet_balance_cents,
            ledger_sum_cents: ledger_sum(transactions),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.balance_cents == self.ledger_sum_cents
    }

    pub fn verify(&self) -> BookingResult<()> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(BookingError::LedgerDrift {
            user_id: self.user_id,
            balance_cents: self.balance_cents,
            ledger_sum_cents: self.ledger_sum_cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use stoodio_core::booking::{NewBooking, SessionSlot};
    use stoodio_core::{Assignment, BookingStatus, RequestType, Role};

    fn party(name: &str) -> Party {
        Party { id: Uuid::new_v4(), name: name.to_string() }
    }

    fn booking(rate: i64, hours: f64, room_rate: i64, payee: &Party) -> Booking {
        Booking::create(
            NewBooking {
                status: BookingStatus::Confirmed,
                posted_by: Role::Artist,
                request_type: RequestType::SpecificEngineer,
                booked_by_id: Uuid::new_v4(),
                artist: None,
                stoodio: None,
                assignment: Assignment::Assigned { user_id: payee.id, role: Role::Engineer },
                label_id: None,
                room_name: None,
                coordinates: None,
                slot: SessionSlot {
                    date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
                    start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    duration_hours: hours,
                },
                engineer_pay_rate_cents: rate,
                room_rate_cents: room_rate,
                pull_up_fee_cents: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_settlement_pays_gross_and_withholds_fee() {
        let ledger = WalletLedger::new(0.10);
        let payer = party("Artist");
        let engineer = party("Engineer");
        let booking = booking(5000, 3.0, 0, &engineer);

        let postings = ledger.settlement(
            &booking,
            &SettlementParties { payer: payer.clone(), payee: Some(engineer.clone()), stoodio: None },
        );

        let amounts: Vec<(Uuid, i64, TransactionCategory)> =
            postings.iter().map(|p| (p.user_id, p.amount_cents, p.category)).collect();
        assert_eq!(
            amounts,
            vec![
                (payer.id, -15000, TransactionCategory::SessionCharge),
                (engineer.id, 15000, TransactionCategory::SessionPayout),
                (engineer.id, -1500, TransactionCategory::PlatformFee),
            ]
        );
    }

    #[test]
    fn test_room_income_goes_to_stoodio() {
        let ledger = WalletLedger::new(0.0);
        let payer = party("Artist");
        let engineer = party("Engineer");
        let stoodio = party("Stoodio");
        let booking = booking(5000, 2.0, 3000, &engineer);

        let postings = ledger.settlement(
            &booking,
            &SettlementParties { payer: payer.clone(), payee: Some(engineer), stoodio: Some(stoodio.clone()) },
        );

        let total: i64 = postings.iter().map(|p| p.amount_cents).sum();
        assert_eq!(total, 0);
        assert!(postings.iter().any(|p| p.user_id == stoodio.id && p.amount_cents == 6000));
        assert_eq!(postings.len(), 3);
    }

    #[test]
    fn test_reversal_mirrors_charge() {
        let ledger = WalletLedger::new(0.1);
        let payer = party("Artist");
        let engineer = party("Engineer");
        let booking = booking(5000, 1.0, 0, &engineer);

        let charge = ledger.charge(&booking, &payer, Some(&engineer)).unwrap().into_transaction(Utc::now());
        let reversal = ledger.reversal(&charge);

        assert_eq!(reversal.amount_cents, 5000);
        assert_eq!(reversal.category, TransactionCategory::Reversal);
        assert_ne!(reversal.idempotency_key, charge.idempotency_key);
    }

    #[test]
    fn test_reconciliation_detects_drift() {
        let mut user = UserAccount::new("Artist", Role::Artist);
        let posting = LedgerPosting {
            user_id: user.id,
            booking_id: None,
            amount_cents: 2500,
            category: TransactionCategory::TopUp,
            description: "Wallet top-up".to_string(),
            related_user_name: None,
            idempotency_key: checkout_key("cs_1"),
        };
        let transactions = vec![posting.into_transaction(Utc::now())];

        user.wallet_balance_cents = 2500;
        assert!(Reconciliation::of(&user, &transactions).verify().is_ok());

        user.wallet_balance_cents = 3000;
        assert!(matches!(
            Reconciliation::of(&user, &transactions).verify(),
            Err(BookingError::LedgerDrift { ledger_sum_cents: 2500, .. })
        ));
    }
}
