pub mod v1;

use crate::server::Server;
use std::sync::Arc;
use warp::Filter;

const CORS_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "OPTIONS"];
const CORS_HEADERS: [&str; 2] = ["content-type", "authorization"];

/// The whole HTTP surface: `/health` plus `/api/v1/auth/*`, with rejections
/// turned into JSON envelopes. Only the frontend origin may call it
/// cross-origin, with credentials.
pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let cors = warp::cors()
        .allow_origin(server.allowed_origin.as_str())
        .allow_credentials(true)
        .allow_methods(CORS_METHODS)
        .allow_headers(CORS_HEADERS);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(v1::health);

    let auth_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path("auth"))
        .and(v1::routes(server));

    // Recover inside the CORS wrapper so error envelopes carry CORS headers,
    // then once more for the wrapper's own rejections.
    health
        .or(auth_v1)
        .recover(v1::recover_error)
        .with(cors)
        .recover(v1::recover_error)
        .with(warp::trace::request())
}
