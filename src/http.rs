use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::led::Led;

/// `/` reports the LED state, `/led/on` and `/led/off` switch it and redirect back.
pub fn router(led: Arc<dyn Led>) -> Router {
    Router::new()
        .route("/", get(show_state))
        .route("/led/on", get(led_on))
        .route("/led/off", get(led_off))
        .with_state(led)
}

pub async fn serve<F>(listener: TcpListener, led: Arc<dyn Led>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("LED server listening on http://{}", addr);
    }

    axum::serve(listener, router(led))
        .with_graceful_shutdown(shutdown)
        .await
        .context("LED server error")
}

async fn show_state(State(led): State<Arc<dyn Led>>) -> String {
    format!("LED STATE: {}", if led.is_on() { "ON" } else { "OFF" })
}

async fn led_on(State(led): State<Arc<dyn Led>>) -> Response {
    switch(led.as_ref(), true)
}

async fn led_off(State(led): State<Arc<dyn Led>>) -> Response {
    switch(led.as_ref(), false)
}

fn switch(led: &dyn Led, on: bool) -> Response {
    match led.set(on) {
        Ok(()) => (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response(),
        Err(e) => {
            error!("LED switch failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("LED error: {:#}", e)).into_response()
        }
    }
}
