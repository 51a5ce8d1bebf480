//! REST surface of Cosnap. Every route except `/health` and serving uploaded
//! images requires a bearer token from the identity provider.

pub mod bookings;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod reviews;
pub mod slots;
pub mod state;
pub mod uploads;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

pub async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/slots", post(slots::create_slots))
        .route("/photographers/{id}/slots", get(slots::list_slots))
        .route("/slots/{id}", get(slots::get_slot).delete(slots::delete_slot))
        .route("/slots/{id}/book", post(slots::book_slot))
        .route("/slots/{id}/cancel", post(slots::cancel_slot_booking))
        .route("/booking-requests", post(bookings::create_request).get(bookings::list_requests))
        .route("/booking-requests/{id}/accept", post(bookings::accept_request))
        .route("/booking-requests/{id}/reject", post(bookings::reject_request))
        .route("/booking-requests/{id}/cancel", post(bookings::cancel_request))
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversations::get_messages).post(conversations::send_message),
        )
        .route("/conversations/{id}/read", post(conversations::mark_read))
        .route("/unread", get(conversations::unread_total))
        .route("/reviews", post(reviews::add_review))
        .route("/reviews/{id}", delete(reviews::delete_review))
        .route("/reviews/{id}/reactions", post(reviews::react))
        .route("/targets/{type}/{id}/reviews", get(reviews::list_reviews))
        .route("/targets/{type}/{id}/rating", get(reviews::rating_summary))
        .route(
            "/uploads",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(uploads::UPLOAD_BODY_LIMIT)),
        )
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/health", get(health))
        // Content-addressed names, usable as a plain image src
        .route("/uploads/{name}", get(uploads::serve_image))
        .merge(protected)
        .with_state(state)
}
