use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{Clock, PaymentGateway, RecordStoreRef};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Payment gateway backed by the record store's payment table.
///
/// New payments are `Pending` and due `ttl` after creation. Confirmation
/// arrives through `update_status`, which refuses anything but a pending,
/// not yet overdue payment.
pub struct LedgerPaymentGateway {
    store: RecordStoreRef,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LedgerPaymentGateway {
    pub fn new(store: RecordStoreRef, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }
}

#[async_trait]
impl PaymentGateway for LedgerPaymentGateway {
    async fn create(&self, amount: Amount) -> Result<Payment> {
        let now = self.clock.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            amount,
            status: PaymentStatus::Pending,
            due_date: now + self.ttl,
            created_at: now,
        };
        self.store.insert_payment(payment.clone()).await?;
        Ok(payment)
    }

    async fn find_by_id(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .find_payment(id)
            .await?
            .ok_or_else(|| OrderError::not_found("payment", id))
    }

    async fn update_status(&self, id: PaymentId, status: PaymentStatus) -> Result<Payment> {
        if status == PaymentStatus::Pending {
            return Err(OrderError::Conflict(format!(
                "payment {id} cannot be moved back to Pending"
            )));
        }
        let current = self.find_by_id(id).await?;
        let now = self.clock.now();
        let changed = self.store.transition_payment(id, status, now).await?;
        if changed == 0 {
            let why = if current.status != PaymentStatus::Pending {
                format!("already {:?}", current.status)
            } else {
                "past its due date".to_string()
            };
            return Err(OrderError::Conflict(format!("payment {id} is {why}")));
        }
        Ok(Payment { status, ..current })
    }

    async fn sweep_expired(&self) -> Result<u64> {
        self.store.expire_pending_payments(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryRecordStore;
    use rust_decimal_macros::dec;

    fn ledger() -> (LedgerPaymentGateway, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let gateway = LedgerPaymentGateway::new(
            Arc::new(InMemoryRecordStore::new()),
            clock.clone(),
            Duration::minutes(10),
        );
        (gateway, clock)
    }

    #[tokio::test]
    async fn test_create_opens_pending_payment_with_ttl() {
        let (gateway, clock) = ledger();
        let payment = gateway.create(Amount::new(dec!(140)).unwrap()).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.due_date, clock.now() + Duration::minutes(10));
        assert_eq!(gateway.find_by_id(payment.id).await.unwrap(), payment);
    }

    #[tokio::test]
    async fn test_settlement_only_while_pending_and_not_overdue() {
        let (gateway, clock) = ledger();
        let paid = gateway.create(Amount::new(dec!(50)).unwrap()).await.unwrap();
        let updated = gateway.update_status(paid.id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(updated.status, PaymentStatus::Paid);
        assert!(matches!(
            gateway.update_status(paid.id, PaymentStatus::Cancel).await,
            Err(OrderError::Conflict(_))
        ));

        let late = gateway.create(Amount::new(dec!(50)).unwrap()).await.unwrap();
        clock.advance(Duration::minutes(11));
        assert!(matches!(
            gateway.update_status(late.id, PaymentStatus::Paid).await,
            Err(OrderError::Conflict(_))
        ));
        assert_eq!(gateway.sweep_expired().await.unwrap(), 1);
        assert_eq!(
            gateway.find_by_id(late.id).await.unwrap().status,
            PaymentStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_unknown_payment_and_pending_target() {
        let (gateway, _) = ledger();
        assert!(matches!(
            gateway.find_by_id(Uuid::new_v4()).await,
            Err(OrderError::NotFound { entity: "payment", .. })
        ));
        let payment = gateway.create(Amount::new(dec!(50)).unwrap()).await.unwrap();
        assert!(gateway.update_status(payment.id, PaymentStatus::Pending).await.is_err());
    }
}
