use super::validator::{BasketSummary, ServiceTally};
use crate::domain::money::{Amount, Price};
use crate::domain::order::WeightTier;
use crate::error::Result;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Unit prices used to quote orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceList {
    pub seven_kg: Price,
    pub fourteen_kg: Price,
    pub twenty_one_kg: Price,
    pub delivery: Price,
    pub pickup: Price,
    pub agents: Price,
}

impl Default for PriceList {
    fn default() -> Self {
        Self {
            seven_kg: Price::new(dec!(50)),
            fourteen_kg: Price::new(dec!(100)),
            twenty_one_kg: Price::new(dec!(150)),
            delivery: Price::new(dec!(20)),
            pickup: Price::new(dec!(20)),
            agents: Price::new(dec!(20)),
        }
    }
}

impl PriceList {
    pub fn unit_price(&self, tier: WeightTier) -> Price {
        match tier {
            WeightTier::Seven => self.seven_kg,
            WeightTier::Fourteen => self.fourteen_kg,
            WeightTier::TwentyOne => self.twenty_one_kg,
        }
    }
}

/// Maps a validated basket composition to the amount charged.
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    prices: PriceList,
}

impl PricingCalculator {
    pub fn new(prices: PriceList) -> Self {
        Self { prices }
    }

    pub fn quote(&self, summary: &BasketSummary, onsite: bool) -> Result<Amount> {
        let mut total = self.service_price(&summary.washing) + self.service_price(&summary.drying);
        if !onsite {
            total += self.prices.delivery + self.prices.pickup;
        }
        if summary.agents_present() {
            total += self.prices.agents;
        }
        Amount::try_from(total)
    }

    fn service_price(&self, tally: &ServiceTally) -> Price {
        tally
            .tier
            .map_or(Price::ZERO, |tier| self.prices.unit_price(tier) * tally.count)
    }
}
