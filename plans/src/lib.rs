use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::{
    env_config::{Config, PlanPricing, PlanQuotas},
    error::{AppError, Res},
};

/// The fixed set of plan identifiers. `free` is the implicit tier for users
/// who never checked out; it has no price reference and cannot be purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Basic,
    Plus,
    Pro,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Free => "free",
            PlanId::Basic => "basic",
            PlanId::Plus => "plus",
            PlanId::Pro => "pro",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(PlanId::Free),
            "basic" => Ok(PlanId::Basic),
            "plus" => Ok(PlanId::Plus),
            "pro" => Ok(PlanId::Pro),
            other => Err(AppError::InvalidPlan(other.to_string())),
        }
    }
}

/// Capability tags attached to a plan, surfaced on the plans listing so the
/// frontend can render feature lists without hardcoding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AllPapers,
    PdfDownloads,
    BasicSupport,
    PrioritySupport,
    PremiumSupport,
    Analytics,
    CustomUploads,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: PlanId,
    /// Stripe price reference; `None` for the free tier.
    pub price_id: Option<String>,
    pub monthly_quota: i64,
    pub features: Vec<Feature>,
}

/// Static plan table, built once at startup from configuration. Lookups are
/// pure and deterministic; quotas and prices are configuration, not computed.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(pricing: &PlanPricing, quotas: &PlanQuotas) -> Res<Self> {
        use Feature::*;

        let plans = vec![
            Plan {
                id: PlanId::Free,
                price_id: None,
                monthly_quota: quotas.free,
                features: vec![AllPapers],
            },
            Plan {
                id: PlanId::Basic,
                price_id: Some(pricing.basic_price_id.clone()),
                monthly_quota: quotas.basic,
                features: vec![AllPapers, PdfDownloads, BasicSupport],
            },
            Plan {
                id: PlanId::Plus,
                price_id: Some(pricing.plus_price_id.clone()),
                monthly_quota: quotas.plus,
                features: vec![AllPapers, PdfDownloads, PrioritySupport, Analytics],
            },
            Plan {
                id: PlanId::Pro,
                price_id: Some(pricing.pro_price_id.clone()),
                monthly_quota: quotas.pro,
                features: vec![
                    AllPapers,
                    PdfDownloads,
                    PremiumSupport,
                    Analytics,
                    CustomUploads,
                ],
            },
        ];

        for plan in &plans {
            if plan.monthly_quota <= 0 {
                return Err(AppError::Configuration(format!(
                    "plan {} has a non-positive monthly quota",
                    plan.id
                )));
            }
            if plan.id != PlanId::Free
                && plan.price_id.as_deref().unwrap_or("").trim().is_empty()
            {
                return Err(AppError::Configuration(format!(
                    "plan {} has no price reference configured",
                    plan.id
                )));
            }
        }

        Ok(PlanCatalog { plans })
    }

    pub fn from_config(config: &Config) -> Res<Self> {
        Self::new(&config.plan_pricing, &config.plan_quotas)
    }

    pub fn lookup(&self, id: PlanId) -> &Plan {
        // the constructor guarantees one entry per variant
        self.plans
            .iter()
            .find(|plan| plan.id == id)
            .unwrap_or(&self.plans[0])
    }

    /// Resolves a raw plan string. Fails with `InvalidPlan` for anything
    /// outside the enumerated set.
    pub fn lookup_str(&self, raw: &str) -> Res<&Plan> {
        Ok(self.lookup(PlanId::from_str(raw)?))
    }

    /// A plan that can go through checkout: must carry a price reference,
    /// which excludes `free`.
    pub fn purchasable(&self, id: PlanId) -> Res<&Plan> {
        let plan = self.lookup(id);
        if plan.price_id.is_none() {
            return Err(AppError::InvalidPlan(format!(
                "plan {} cannot be purchased",
                id
            )));
        }
        Ok(plan)
    }

    /// Reverse lookup used when subscription update events only carry the
    /// Stripe price id.
    pub fn plan_for_price(&self, price_id: &str) -> Option<PlanId> {
        self.plans
            .iter()
            .find(|plan| plan.price_id.as_deref() == Some(price_id))
            .map(|plan| plan.id)
    }

    pub fn quota(&self, id: PlanId) -> i64 {
        self.lookup(id).monthly_quota
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        let pricing = PlanPricing {
            basic_price_id: "price_basic".to_string(),
            plus_price_id: "price_plus".to_string(),
            pro_price_id: "price_pro".to_string(),
        };
        let quotas = PlanQuotas {
            free: 3,
            basic: 50,
            plus: 200,
            pro: 1000,
        };
        PlanCatalog::new(&pricing, &quotas).unwrap()
    }

    #[test]
    fn every_enumerated_plan_resolves_with_positive_quota() {
        let catalog = catalog();
        for raw in ["basic", "plus", "pro"] {
            let plan = catalog.lookup_str(raw).unwrap();
            assert!(plan.monthly_quota > 0, "plan {} has no quota", raw);
            assert!(plan.price_id.is_some());
        }
    }

    #[test]
    fn unknown_plan_strings_fail_with_invalid_plan() {
        let catalog = catalog();
        for raw in ["premium", "", "ba sic", "pro "] {
            match catalog.lookup_str(raw) {
                Err(AppError::InvalidPlan(_)) => {}
                other => panic!("expected InvalidPlan for {:?}, got {:?}", raw, other.err()),
            }
        }
    }

    #[test]
    fn free_plan_is_not_purchasable() {
        let catalog = catalog();
        assert!(matches!(
            catalog.purchasable(PlanId::Free),
            Err(AppError::InvalidPlan(_))
        ));
        assert!(catalog.purchasable(PlanId::Basic).is_ok());
    }

    #[test]
    fn price_ids_map_back_to_plans() {
        let catalog = catalog();
        assert_eq!(catalog.plan_for_price("price_plus"), Some(PlanId::Plus));
        assert_eq!(catalog.plan_for_price("price_unknown"), None);
    }

    #[test]
    fn zero_quota_configuration_is_rejected() {
        let pricing = PlanPricing {
            basic_price_id: "price_basic".to_string(),
            plus_price_id: "price_plus".to_string(),
            pro_price_id: "price_pro".to_string(),
        };
        let quotas = PlanQuotas {
            free: 3,
            basic: 0,
            plus: 200,
            pro: 1000,
        };
        assert!(matches!(
            PlanCatalog::new(&pricing, &quotas),
            Err(AppError::Configuration(_))
        ));
    }
}
