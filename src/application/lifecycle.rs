use super::aggregator::OrderAggregator;
use super::allocator::MachineAllocator;
use super::pricing::PricingCalculator;
use super::validator::{BasketSummary, OrderValidator};
use crate::domain::machine::Machine;
use crate::domain::order::{
    Audit, FullOrder, NewOrder, OrderDetail, OrderHeader, OrderHeaderId, OrderStatus, OrderView,
    Review, ReviewSubmission, StatusUpdate, Tombstone, Trigger, ViewKind,
};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{BranchDirectory, Clock, HeaderFilter, PaymentGateway, RecordStoreRef};
use crate::domain::user::{Actor, Role};
use crate::error::{OrderError, Result, ValidationError};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Orchestrates order creation, manual basket updates, reviews and
/// cancellation on top of the record store and the collaborator ports.
pub struct OrderLifecycleManager {
    store: RecordStoreRef,
    payments: Arc<dyn PaymentGateway>,
    branches: Arc<dyn BranchDirectory>,
    clock: Arc<dyn Clock>,
    validator: Arc<OrderValidator>,
    pricing: PricingCalculator,
    allocator: MachineAllocator,
    aggregator: OrderAggregator,
}

/// The collaborator handles an [`OrderLifecycleManager`] is assembled from.
pub struct LifecycleParts {
    pub store: RecordStoreRef,
    pub payments: Arc<dyn PaymentGateway>,
    pub branches: Arc<dyn BranchDirectory>,
    pub clock: Arc<dyn Clock>,
    pub validator: Arc<OrderValidator>,
    pub pricing: PricingCalculator,
    pub allocator: MachineAllocator,
    pub aggregator: OrderAggregator,
}

impl OrderLifecycleManager {
    pub fn new(parts: LifecycleParts) -> Self {
        Self {
            store: parts.store,
            payments: parts.payments,
            branches: parts.branches,
            clock: parts.clock,
            validator: parts.validator,
            pricing: parts.pricing,
            allocator: parts.allocator,
            aggregator: parts.aggregator,
        }
    }

    /// Validates, prices and persists a new order owned by `actor`.
    ///
    /// Nothing is written when validation fails. If persistence fails after
    /// the payment opened, the payment is cancelled and any written header
    /// is tombstoned before the error is returned.
    pub async fn create_order(&self, order: NewOrder, actor: &Actor) -> Result<FullOrder> {
        let summary = self.validator.validate(&order)?;

        let machine = if order.onsite {
            let serial = order.baskets[0].machine_serial.as_deref().unwrap_or_default();
            Some(self.allocator.reserve(serial, &order.branch_id).await?)
        } else {
            None
        };
        let summary = match &machine {
            Some(m) => match m.tier() {
                Some(tier) => BasketSummary::for_machine(m.machine_type.service_type(), tier),
                None => return Err(ValidationError::UnsupportedWeight(m.weight).into()),
            },
            None => summary,
        };
        let amount = self.pricing.quote(&summary, order.onsite)?;

        let payment = self
            .payments
            .create(amount)
            .await
            .map_err(|e| OrderError::dependency("payment gateway", e))?;

        let now = self.clock.now();
        let header = OrderHeader {
            id: Uuid::new_v4(),
            user_id: actor.user_id.clone(),
            branch_id: order.branch_id.clone(),
            note: order.note.clone(),
            payment_id: payment.id,
            onsite: order.onsite,
            delivery: order.delivery_location(),
            review: None,
            audit: Audit::new(&actor.user_id, now),
        };
        let header_id = header.id;

        if let Err(e) = self.store.insert_header(header.clone()).await {
            self.compensate(&payment, None, &actor.user_id).await;
            return Err(e);
        }

        let baskets = self.build_baskets(&order, header_id, machine.as_ref(), &actor.user_id);
        let inserted = match &machine {
            Some(m) => self.store.insert_details_if_machine_free(baskets, &m.serial).await,
            None => self.store.insert_details(baskets).await,
        };
        if let Err(e) = inserted {
            self.compensate(&payment, Some(header_id), &actor.user_id).await;
            return Err(e);
        }

        info!(
            order_id = %header_id,
            payment_id = %payment.id,
            amount = %payment.amount,
            onsite = order.onsite,
            "Order created"
        );
        self.aggregator.assemble(header).await
    }

    fn build_baskets(
        &self,
        order: &NewOrder,
        header_id: OrderHeaderId,
        machine: Option<&Machine>,
        actor: &str,
    ) -> Vec<OrderDetail> {
        if let Some(machine) = machine {
            return vec![self.allocator.allocate(header_id, machine, actor)];
        }
        let now = self.clock.now();
        order
            .baskets
            .iter()
            .zip(0u16..)
            .filter_map(|(basket, line_no)| {
                basket.service_type.map(|service_type| OrderDetail {
                    id: Uuid::new_v4(),
                    header_id,
                    line_no,
                    machine_serial: None,
                    weight: basket.weight,
                    service_type,
                    status: OrderStatus::Waiting,
                    finished_at: None,
                    audit: Audit::new(actor, now),
                })
            })
            .collect()
    }

    async fn compensate(&self, payment: &Payment, header_id: Option<OrderHeaderId>, actor: &str) {
        warn!(payment_id = %payment.id, "Order persistence failed, cancelling payment");
        if let Err(e) = self.payments.update_status(payment.id, PaymentStatus::Cancel).await {
            error!(payment_id = %payment.id, error = %e, "Failed to cancel orphaned payment");
        }
        if let Some(id) = header_id {
            let tombstone = Tombstone {
                deleted_by: actor.to_string(),
                deleted_at: self.clock.now(),
            };
            if let Err(e) = self.store.tombstone_header(id, tombstone).await {
                error!(order_id = %id, error = %e, "Failed to tombstone orphaned order header");
            }
        }
    }

    pub async fn get_order(&self, id: OrderHeaderId, view: ViewKind) -> Result<OrderView> {
        let header = self.aggregator.header(id).await?;
        match view {
            ViewKind::Header => Ok(OrderView::Header(header)),
            ViewKind::Detail => Ok(OrderView::Details(self.store.list_details(Some(id)).await?)),
            ViewKind::Full => Ok(OrderView::Full(Box::new(self.aggregator.assemble(header).await?))),
        }
    }

    pub async fn list_all(&self, actor: &Actor) -> Result<Vec<FullOrder>> {
        if !actor.role.is_staff() {
            return Err(OrderError::Forbidden(format!(
                "{} cannot list every order",
                actor.user_id
            )));
        }
        self.aggregator.assemble_many(&HeaderFilter::default()).await
    }

    /// Orders of one branch, visible to its owner and to super admins.
    pub async fn list_by_branch(
        &self,
        branch_id: &str,
        actor: &Actor,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Vec<FullOrder>> {
        let owner = self
            .branches
            .owner_of(branch_id)
            .await
            .map_err(|e| OrderError::dependency("branch directory", e))?
            .ok_or_else(|| OrderError::not_found("branch", branch_id))?;
        if actor.role != Role::SuperAdmin && owner != actor.user_id {
            return Err(OrderError::Forbidden(format!(
                "{} does not manage branch {branch_id}",
                actor.user_id
            )));
        }
        let filter = HeaderFilter::branch(branch_id).with_payment_status(payment_status);
        self.aggregator.assemble_many(&filter).await
    }

    /// Orders of one user. With a `status`, only orders holding a basket in
    /// that status are kept.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<FullOrder>> {
        let mut orders = self.aggregator.assemble_many(&HeaderFilter::user(user_id)).await?;
        if let Some(status) = status {
            orders.retain(|o| o.baskets.iter().any(|b| b.status == status));
        }
        Ok(orders)
    }

    /// Applies a manual status change to one basket.
    ///
    /// Moving into `Processing` binds the basket to a free machine of the
    /// order's branch. Races with the reconciliation sweep resolve as last
    /// write wins.
    pub async fn update_status(&self, update: StatusUpdate, actor: &Actor) -> Result<FullOrder> {
        let mut basket = self
            .store
            .find_detail(update.basket_id)
            .await?
            .ok_or_else(|| OrderError::not_found("basket", update.basket_id))?;

        if !basket.status.can_transition_to(update.status, Trigger::Manual) {
            return Err(OrderError::Conflict(format!(
                "basket {} cannot move from {} to {}",
                basket.id, basket.status, update.status
            )));
        }

        let header_id = basket.header_id;
        let changed = if update.status == OrderStatus::Processing {
            let header = self.aggregator.header(header_id).await?;
            let serial = self
                .allocator
                .assign(
                    &mut basket,
                    &header.branch_id,
                    update.machine_serial.as_deref(),
                    update.finished_at,
                )
                .await?;
            basket.audit.touch(&actor.user_id, self.clock.now());
            self.store.update_detail_if_machine_free(basket, &serial).await?
        } else {
            basket.status = update.status;
            basket.audit.touch(&actor.user_id, self.clock.now());
            self.store.update_detail(basket).await?
        };
        if changed == 0 {
            return Err(OrderError::not_found("basket", update.basket_id));
        }
        self.aggregator.full_order(header_id).await
    }

    /// Records the owner's review once the order has finished.
    pub async fn update_review(&self, review: ReviewSubmission, actor: &Actor) -> Result<FullOrder> {
        if !(1..=5).contains(&review.star_rating) {
            return Err(ValidationError::StarRating(review.star_rating).into());
        }
        let header = self.aggregator.header(review.header_id).await?;
        if header.user_id != actor.user_id {
            return Err(OrderError::Forbidden(format!(
                "{} cannot review order {}",
                actor.user_id, header.id
            )));
        }
        if header.review.is_some() {
            return Err(OrderError::Conflict(format!(
                "order {} has already been reviewed",
                header.id
            )));
        }
        let baskets = self.store.list_details(Some(header.id)).await?;
        if !is_finished(&baskets) {
            return Err(OrderError::Conflict(format!(
                "order {} has not been completed",
                header.id
            )));
        }

        let entry = Review {
            star_rating: review.star_rating,
            comment: review.comment,
        };
        let now = self.clock.now();
        if self
            .store
            .update_review(header.id, entry, &actor.user_id, now)
            .await?
            == 0
        {
            return Err(OrderError::not_found("order", header.id));
        }
        self.aggregator.full_order(header.id).await
    }

    /// Cancels an order: header and baskets are tombstoned together and
    /// open baskets become `Canceled`.
    pub async fn soft_delete(&self, id: OrderHeaderId, actor: &Actor) -> Result<FullOrder> {
        let header = self.aggregator.header(id).await?;
        if header.user_id != actor.user_id && !actor.role.is_staff() {
            return Err(OrderError::Forbidden(format!(
                "{} cannot cancel order {id}",
                actor.user_id
            )));
        }
        // Read the view before the rows disappear from active reads.
        let mut view = self.aggregator.assemble(header).await?;

        let tombstone = Tombstone {
            deleted_by: actor.user_id.clone(),
            deleted_at: self.clock.now(),
        };
        if self.store.tombstone_header(id, tombstone.clone()).await? == 0 {
            return Err(OrderError::not_found("order", id));
        }
        let cancelled = self.store.tombstone_details(id, tombstone.clone()).await?;

        view.header.audit.tombstone = Some(tombstone.clone());
        for basket in &mut view.baskets {
            if basket.status.can_transition_to(OrderStatus::Canceled, Trigger::Cancellation) {
                basket.status = OrderStatus::Canceled;
            }
            basket.audit.tombstone = Some(tombstone.clone());
        }
        info!(order_id = %id, baskets = cancelled, deleted_by = %actor.user_id, "Order cancelled");
        Ok(view)
    }

    /// Settles an order's payment; stands in for the external confirmation event.
    pub async fn settle_payment(&self, payment_id: Uuid, status: PaymentStatus) -> Result<Payment> {
        self.payments.update_status(payment_id, status).await
    }
}

/// Every machine basket is terminal and at least one was completed.
fn is_finished(baskets: &[OrderDetail]) -> bool {
    let mut machine_baskets = baskets.iter().filter(|b| b.service_type.uses_machine());
    machine_baskets.clone().all(|b| b.status.is_terminal())
        && machine_baskets.any(|b| b.status == OrderStatus::Completed)
}
