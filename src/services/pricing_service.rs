// services/pricing_service.rs
use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::reservation::VehicleClass;

/// A single price multiplier. Rules are data, not code: the engine walks the
/// configured list in declaration order and multiplies in every rule whose
/// condition holds, so a given config always reproduces the same total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplierRule {
    pub name: String,
    pub factor: Decimal,
    #[serde(flatten)]
    pub condition: MultiplierCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultiplierCondition {
    /// Pickup hour inside [start_hour, end_hour), wrapping midnight.
    NightHours { start_hour: u32, end_hour: u32 },
    /// Pickup on Saturday or Sunday.
    Weekend,
    /// Pickup date inside a month/day window, wrapping the year end.
    Season {
        start_month: u32,
        start_day: u32,
        end_month: u32,
        end_day: u32,
    },
    /// Trips at or above a distance threshold.
    MinDistance { km: Decimal },
    /// Booked at least `days` days before pickup.
    BookedAhead { days: i64 },
}

impl MultiplierCondition {
    fn matches(&self, pickup_at: DateTime<Utc>, booked_at: DateTime<Utc>, distance_km: Decimal) -> bool {
        match self {
            MultiplierCondition::NightHours { start_hour, end_hour } => {
                let hour = pickup_at.hour();
                if start_hour <= end_hour {
                    hour >= *start_hour && hour < *end_hour
                } else {
                    hour >= *start_hour || hour < *end_hour
                }
            }
            MultiplierCondition::Weekend => {
                matches!(pickup_at.weekday(), Weekday::Sat | Weekday::Sun)
            }
            MultiplierCondition::Season {
                start_month,
                start_day,
                end_month,
                end_day,
            } => {
                let md = pickup_at.month() * 100 + pickup_at.day();
                let start = start_month * 100 + start_day;
                let end = end_month * 100 + end_day;
                if start <= end {
                    md >= start && md <= end
                } else {
                    md >= start || md <= end
                }
            }
            MultiplierCondition::MinDistance { km } => distance_km >= *km,
            MultiplierCondition::BookedAhead { days } => {
                (pickup_at - booked_at).num_days() >= *days
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub rates_per_km: HashMap<VehicleClass, Decimal>,
    pub service_catalog: HashMap<String, Decimal>,
    pub multipliers: Vec<MultiplierRule>,
}

impl PricingConfig {
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("cannot read pricing config {}: {}", path, e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Configuration(format!("invalid pricing config {}: {}", path, e))
        })
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        let rates_per_km = HashMap::from([
            (VehicleClass::Standard, dec!(4.50)),
            (VehicleClass::Executive, dec!(6.80)),
            (VehicleClass::Van, dec!(7.50)),
            (VehicleClass::Minibus, dec!(9.00)),
        ]);

        let service_catalog = HashMap::from([
            ("child_seat".to_string(), dec!(5.00)),
            ("booster_seat".to_string(), dec!(4.00)),
            ("extra_stop".to_string(), dec!(15.00)),
            ("meet_and_greet".to_string(), dec!(12.00)),
            ("ski_equipment".to_string(), dec!(10.00)),
        ]);

        // Applied in this order: surcharges first, discounts last.
        let multipliers = vec![
            MultiplierRule {
                name: "night_surcharge".to_string(),
                factor: dec!(1.15),
                condition: MultiplierCondition::NightHours {
                    start_hour: 22,
                    end_hour: 6,
                },
            },
            MultiplierRule {
                name: "weekend_surcharge".to_string(),
                factor: dec!(1.10),
                condition: MultiplierCondition::Weekend,
            },
            MultiplierRule {
                name: "summer_season".to_string(),
                factor: dec!(1.08),
                condition: MultiplierCondition::Season {
                    start_month: 7,
                    start_day: 1,
                    end_month: 8,
                    end_day: 31,
                },
            },
            MultiplierRule {
                name: "long_distance_discount".to_string(),
                factor: dec!(0.95),
                condition: MultiplierCondition::MinDistance { km: dec!(150) },
            },
            MultiplierRule {
                name: "early_booking_discount".to_string(),
                factor: dec!(0.95),
                condition: MultiplierCondition::BookedAhead { days: 14 },
            },
        ];

        PricingConfig {
            rates_per_km,
            service_catalog,
            multipliers,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub distance_km: Decimal,
    pub vehicle_class: VehicleClass,
    pub services: Vec<String>,
    pub pickup_at: DateTime<Utc>,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedMultiplier {
    pub name: String,
    pub factor: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceBreakdown {
    pub base: Decimal,
    pub services_total: Decimal,
    pub multipliers: Vec<AppliedMultiplier>,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct PricingService {
    config: PricingConfig,
}

impl PricingService {
    pub fn new(config: PricingConfig) -> Self {
        PricingService { config }
    }

    /// Pure: same quote, same config, same total. The result is rounded
    /// half-up to the currency minimum unit as the final step.
    pub fn price(&self, quote: &Quote) -> Result<PriceBreakdown> {
        if quote.distance_km <= Decimal::ZERO {
            return Err(AppError::pricing("distance must be positive"));
        }

        let rate = self
            .config
            .rates_per_km
            .get(&quote.vehicle_class)
            .copied()
            .ok_or_else(|| {
                AppError::pricing(format!("no rate for vehicle class {}", quote.vehicle_class))
            })?;

        let base = quote.distance_km * rate;

        let mut services_total = Decimal::ZERO;
        for code in &quote.services {
            let price = self.config.service_catalog.get(code).copied().ok_or_else(|| {
                AppError::pricing(format!("unknown additional service: {}", code))
            })?;
            services_total += price;
        }

        let mut running = base + services_total;
        let mut applied = Vec::new();
        for rule in &self.config.multipliers {
            if rule
                .condition
                .matches(quote.pickup_at, quote.booked_at, quote.distance_km)
            {
                running *= rule.factor;
                applied.push(AppliedMultiplier {
                    name: rule.name.clone(),
                    factor: rule.factor,
                });
            }
        }

        let total = running.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        Ok(PriceBreakdown {
            base,
            services_total,
            multipliers: applied,
            total,
        })
    }
}
