use axum::{routing::get, Router};

use crate::handlers::admin;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/activity", get(admin::activity_feed))
        .route("/settlements", get(admin::list_settlements))
}
