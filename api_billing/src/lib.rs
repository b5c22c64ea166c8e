use actix_web::web::{self};

pub mod routes {
    pub mod admin;
    pub mod checkout;
    pub mod sub;
    pub mod webhook;
}

pub mod services {
    pub mod checkout;
    pub mod webhook;
}

mod dtos {
    pub(crate) mod billing;
}

/// Public billing surface: plan listing.
pub fn mount_billing() -> actix_web::Scope {
    web::scope("/billing").service(routes::sub::get_plans)
}

/// Billing surface for authenticated users.
pub fn mount_secured_billing() -> actix_web::Scope {
    web::scope("/billing")
        .service(routes::checkout::post_checkout)
        .service(routes::sub::get_current)
}

/// Token-guarded admin operations. Only mounted when an admin token is
/// configured.
pub fn mount_admin() -> actix_web::Scope {
    web::scope("/admin")
        .service(routes::admin::get_subscription)
        .service(routes::admin::post_reset_usage)
}
