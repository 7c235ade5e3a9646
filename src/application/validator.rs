use crate::domain::order::{NewOrder, ServiceType, WeightTier};
use crate::error::ValidationError;

/// Heaviest load a single order may carry, in kg.
pub const MAX_ORDER_WEIGHT_KG: u32 = 21;

/// Per-service totals of one washing or drying request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceTally {
    pub count: usize,
    pub total_kg: u32,
    /// The weight tier shared by every basket of this service.
    pub tier: Option<WeightTier>,
}

impl ServiceTally {
    fn add(&mut self, kg: u16) {
        self.count += 1;
        self.total_kg += u32::from(kg);
    }

    pub fn single(tier: WeightTier) -> Self {
        Self {
            count: 1,
            total_kg: u32::from(tier.kg()),
            tier: Some(tier),
        }
    }
}

/// Basket composition of an accepted order, as consumed by pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasketSummary {
    pub washing: ServiceTally,
    pub drying: ServiceTally,
    pub pickup: usize,
    pub delivery: usize,
    pub agents: usize,
}

impl BasketSummary {
    pub fn agents_present(&self) -> bool {
        self.agents > 0
    }

    /// Summary of an onsite order once its machine is known.
    pub fn for_machine(service: ServiceType, tier: WeightTier) -> Self {
        let mut summary = Self::default();
        match service {
            ServiceType::Washing => summary.washing = ServiceTally::single(tier),
            _ => summary.drying = ServiceTally::single(tier),
        }
        summary
    }
}

/// Stateless rule checker for order proposals.
///
/// Constructed once at startup and shared by handle with whatever needs it.
/// Rules run in a fixed order and the first broken one is reported.
#[derive(Debug, Default, Clone)]
pub struct OrderValidator {
    _private: (),
}

impl OrderValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, order: &NewOrder) -> Result<BasketSummary, ValidationError> {
        if order.onsite {
            Self::check_onsite_shape(order)?;
        } else {
            Self::check_online_shape(order)?;
        }

        let (summary, mixed) = Self::summarize(order);

        if summary.washing.count > 0 && summary.drying.count > 1 {
            return Err(ValidationError::DryingLimitExceeded);
        }
        if summary.washing.count == 0 && summary.agents_present() {
            return Err(ValidationError::AgentsWithoutWashing);
        }
        if let Some(service) = mixed {
            return Err(ValidationError::MixedWeightTiers(service));
        }

        // Onsite orders carry no weight until their machine is resolved.
        if !order.onsite {
            let meaningful = if summary.washing.count > 0 {
                summary.washing.total_kg
            } else {
                summary.drying.total_kg
            };
            if meaningful == 0 {
                return Err(ValidationError::EmptyOrder);
            }
            if meaningful > MAX_ORDER_WEIGHT_KG {
                return Err(ValidationError::WeightExceeded(meaningful));
            }
        }

        let pickup = summary.pickup > 0;
        let delivery = summary.delivery > 0;
        if pickup != delivery {
            return Err(ValidationError::PickupDeliveryMismatch);
        }
        if order.onsite && pickup {
            return Err(ValidationError::OnsitePolicy);
        }
        if !order.onsite && (summary.pickup != 1 || summary.delivery != 1) {
            return Err(ValidationError::PickupDeliveryRequired);
        }

        Ok(summary)
    }

    fn check_onsite_shape(order: &NewOrder) -> Result<(), ValidationError> {
        if order.has_any_delivery_field() {
            return Err(ValidationError::OnsitePolicy);
        }
        match order.baskets.as_slice() {
            [basket]
                if basket.service_type.is_none()
                    && basket.weight == 0
                    && basket.machine_serial.as_deref().is_some_and(|s| !s.is_empty()) =>
            {
                Ok(())
            }
            _ => Err(ValidationError::OnsitePolicy),
        }
    }

    fn check_online_shape(order: &NewOrder) -> Result<(), ValidationError> {
        if order.delivery_location().is_none() || order.baskets.is_empty() {
            return Err(ValidationError::OnlinePolicy);
        }
        for basket in &order.baskets {
            let Some(service) = basket.service_type else {
                return Err(ValidationError::OnlinePolicy);
            };
            if basket.weight == 0 || basket.machine_serial.is_some() {
                return Err(ValidationError::OnlinePolicy);
            }
            if service.uses_machine() && WeightTier::from_kg(basket.weight).is_none() {
                return Err(ValidationError::UnsupportedWeight(basket.weight));
            }
        }
        Ok(())
    }

    /// Tallies baskets per service, also reporting the first service whose
    /// baskets disagree on weight tier.
    fn summarize(order: &NewOrder) -> (BasketSummary, Option<ServiceType>) {
        let mut summary = BasketSummary::default();
        let mut mixed = None;
        for basket in &order.baskets {
            let Some(service) = basket.service_type else {
                continue;
            };
            let tally = match service {
                ServiceType::Washing => &mut summary.washing,
                ServiceType::Drying => &mut summary.drying,
                ServiceType::Pickup => {
                    summary.pickup += 1;
                    continue;
                }
                ServiceType::Delivery => {
                    summary.delivery += 1;
                    continue;
                }
                ServiceType::Agents => {
                    summary.agents += 1;
                    continue;
                }
            };
            let tier = WeightTier::from_kg(basket.weight);
            if tally.count > 0 && tally.tier != tier {
                mixed.get_or_insert(service);
            }
            tally.tier = tier;
            tally.add(basket.weight);
        }
        (summary, mixed)
    }
}
