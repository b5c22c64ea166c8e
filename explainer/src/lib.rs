use actix_web::{Responder, post, web};
use serde::{Deserialize, Serialize};

use common::{error::Res, http::Success, jwt::Claims};

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    /// Past-paper file name, e.g. `9702_m24_qp_22.pdf`.
    pub paper: String,
    /// Question token, e.g. `3(b)(ii)`.
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub paper: String,
    pub question: String,
    pub explanation: String,
}

/// The quota-consuming action. The route is mounted behind the usage gate,
/// so a request that reaches this handler has already consumed one unit.
/// The AI explanation pipeline itself lives in a separate backend; this
/// service owns the gating contract only.
#[post("/explain")]
async fn post_explain(claims: Claims, req: web::Json<ExplainRequest>) -> Res<impl Responder> {
    log::info!(
        "Explaining {} question {} for {}",
        req.paper,
        req.question,
        claims.sub
    );

    Success::ok(ExplainResponse {
        paper: req.paper.clone(),
        question: req.question.clone(),
        explanation: format!(
            "Explanation for question {} of {} has been queued",
            req.question, req.paper
        ),
    })
}

pub fn mount_explainer() -> actix_web::Scope {
    web::scope("/explainer").service(post_explain)
}
