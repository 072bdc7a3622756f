#![allow(dead_code)]

use authgate::api;
use authgate::infra_memory::InMemoryIdentityProvider;
use authgate::server::Server;
use cookie::Cookie;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use warp::Filter;
use warp::http::Response;
use warp::hyper::body::Bytes;

pub const EMAIL: &str = "test@example.com";
pub const PASSWORD: &str = "ValidPass123";

pub fn app(
    identity: Arc<InMemoryIdentityProvider>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone + 'static {
    app_with(identity, false)
}

pub fn app_with(
    identity: Arc<InMemoryIdentityProvider>,
    secure_cookies: bool,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone + 'static {
    let frontend_url = Url::parse("http://localhost:3000").unwrap();
    let server = Server::new(
        identity,
        &frontend_url,
        secure_cookies,
        Duration::from_secs(5),
    )
    .unwrap();
    api::routes(Arc::new(server))
}

pub fn body_json(res: &Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(res.body()).unwrap()
}

pub fn set_cookies(res: &Response<Bytes>) -> Vec<Cookie<'static>> {
    res.headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
        .collect()
}

pub fn set_cookie<'a>(cookies: &'a [Cookie<'static>], name: &str) -> Option<&'a Cookie<'static>> {
    cookies.iter().find(|c| c.name() == name)
}
