//! statusboard-api — HTTP surfaces for statusboard.
//!
//! Two routers over the same command surface:
//!
//! - [`build_router`]: the admin API, so operators can manage status boards
//!   without a chat client. Every route under `/api/v1` requires
//!   `Authorization: Bearer <token>`.
//! - [`interactions_router`]: the endpoint Discord posts `/status` slash
//!   commands to, authenticated by the request's Ed25519 signature.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/trackers` | List every tracker |
//! | POST | `/api/v1/trackers/{dest}` | Create a tracker (`?interval=N`) |
//! | DELETE | `/api/v1/trackers/{dest}` | Delete a tracker |
//! | PUT | `/api/v1/trackers/{dest}/interval` | Change one tracker's interval |
//! | PUT | `/api/v1/settings/default-interval` | Change the default interval |
//! | POST | `/api/v1/refresh` | Force a refresh, return counts |
//! | POST | `/api/v1/sync` | Force a refresh, return the full report |
//! | GET | `/api/v1/debug` | Counters and last statuses |
//! | GET | `/healthz` | Liveness (no auth) |
//! | POST | `/interactions` | Discord slash commands (signed) |

pub mod auth;
pub mod handlers;
pub mod interactions;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};

use statusboard_engine::{CommandResponder, CommandSurface};

pub use interactions::{InteractionState, KeyError, SignatureVerifier};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub commands: CommandSurface,
    pub admin_token: Arc<str>,
}

/// Build the admin router.
pub fn build_router(commands: CommandSurface, admin_token: &str) -> Router {
    let state = ApiState {
        commands,
        admin_token: Arc::from(admin_token),
    };

    let api_routes = Router::new()
        .route("/trackers", get(handlers::list_trackers))
        .route(
            "/trackers/{dest}",
            post(handlers::create_tracker).delete(handlers::delete_tracker),
        )
        .route("/trackers/{dest}/interval", put(handlers::set_interval))
        .route(
            "/settings/default-interval",
            put(handlers::set_default_interval),
        )
        .route("/refresh", post(handlers::refresh))
        .route("/sync", post(handlers::sync))
        .route("/debug", get(handlers::debug))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}

/// Build the slash-command router. Deferred replies are completed through
/// `responder`.
pub fn interactions_router(
    commands: CommandSurface,
    verifier: SignatureVerifier,
    responder: Arc<dyn CommandResponder>,
) -> Router {
    let state = InteractionState {
        commands,
        verifier: Arc::new(verifier),
        responder,
    };
    Router::new()
        .route("/interactions", post(interactions::handle))
        .with_state(state)
}
