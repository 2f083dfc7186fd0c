use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app::Authorities;
use crate::auth::TokenKeys;
use crate::config::create_cors_layer;
use crate::handlers::{booking, event, health_check, ticket, RpcState};

fn rpc_state<S>(keys: &Arc<TokenKeys>, service: &Arc<S>) -> RpcState<S> {
    RpcState {
        keys: keys.clone(),
        service: service.clone(),
    }
}

/// One authority serves its RPC at `/rpc`; several in one process are
/// mounted under `/event`, `/ticket` and `/booking`.
pub fn create_routes(authorities: &Authorities, allowed_origins: &[String]) -> Router {
    let keys = &authorities.keys;
    let mut mounted: Vec<(&str, Router)> = Vec::new();

    if let Some(events) = &authorities.events {
        let router = Router::new()
            .route("/rpc", post(event::rpc))
            .with_state(rpc_state(keys, events));
        mounted.push(("/event", router));
    }
    if let Some(tickets) = &authorities.tickets {
        let router = Router::new()
            .route("/rpc", post(ticket::rpc))
            .with_state(rpc_state(keys, tickets));
        mounted.push(("/ticket", router));
    }
    if let Some(bookings) = &authorities.bookings {
        let router = Router::new()
            .route("/rpc", post(booking::rpc))
            .with_state(rpc_state(keys, bookings));
        mounted.push(("/booking", router));
    }

    let mut app = Router::new().route("/health", get(health_check));
    if mounted.len() == 1 {
        for (_, router) in mounted {
            app = app.merge(router);
        }
    } else {
        for (prefix, router) in mounted {
            app = app.nest(prefix, router);
        }
    }

    app.layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(allowed_origins))
}
