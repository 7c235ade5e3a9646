use super::aggregator::OrderAggregator;
use super::allocator::MachineAllocator;
use super::lifecycle::{LifecycleParts, OrderLifecycleManager};
use super::pricing::PricingCalculator;
use super::scheduler::{ReconciliationScheduler, SchedulerHandle, SweepReport};
use super::validator::OrderValidator;
use crate::config::EngineConfig;
use crate::domain::ports::{
    BranchDirectory, Clock, MachineCatalog, PaymentGateway, RecordStoreRef, UserDirectory,
};
use crate::error::Result;
use std::sync::Arc;

/// The external services an engine is wired to.
pub struct Collaborators {
    pub store: RecordStoreRef,
    pub payments: Arc<dyn PaymentGateway>,
    pub machines: Arc<dyn MachineCatalog>,
    pub users: Arc<dyn UserDirectory>,
    pub branches: Arc<dyn BranchDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// The main entry point of the order engine.
///
/// `LaundryEngine` owns the request-scoped [`OrderLifecycleManager`] and the
/// background [`ReconciliationScheduler`]. Both share the same record store,
/// which is the only state they have in common.
pub struct LaundryEngine {
    orders: OrderLifecycleManager,
    scheduler: Arc<ReconciliationScheduler>,
}

impl LaundryEngine {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Self {
        let Collaborators {
            store,
            payments,
            machines,
            users,
            branches,
            clock,
        } = collaborators;

        let scheduler = Arc::new(ReconciliationScheduler::new(
            store.clone(),
            clock.clone(),
            config.sweep_interval,
        ));
        let orders = OrderLifecycleManager::new(LifecycleParts {
            store: store.clone(),
            payments,
            branches,
            clock: clock.clone(),
            validator: Arc::new(OrderValidator::new()),
            pricing: PricingCalculator::new(config.prices.clone()),
            allocator: MachineAllocator::new(machines, clock, config.processing_duration),
            aggregator: OrderAggregator::new(store, users, config.fetch_concurrency),
        });

        Self { orders, scheduler }
    }

    pub fn orders(&self) -> &OrderLifecycleManager {
        &self.orders
    }

    pub async fn run_sweep_once(&self) -> Result<SweepReport> {
        self.scheduler.run_sweep_once().await
    }

    /// Starts the periodic sweep. Stop it through the returned handle.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        self.scheduler.clone().start()
    }
}
