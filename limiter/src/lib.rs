pub mod gate;

pub mod middleware {
    pub mod usage;
}

pub use gate::{Decision, DenyReason, check_and_increment};

use middleware::usage::UsageGate;

/// Middleware enforcing the usage gate on every request of the wrapped
/// scope. Expects `DynStore`, `PlanCatalog` and `Config` in the app data.
pub fn usage_middleware() -> UsageGate {
    UsageGate::new()
}
