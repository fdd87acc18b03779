use axum::{Router, routing::post};

pub mod podcasts;
pub mod system;

/// Router for the `/api` surface.
pub fn router() -> Router {
    Router::new().route("/podcasts", post(podcasts::submit_podcast))
}
