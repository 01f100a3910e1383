use std::{net::SocketAddr, process, sync::Arc};

use backrest::{
    cache::{CacheConfig, CacheCoordinator},
    config,
    error::AppError,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        origin::OriginClient,
        shutdown, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let cache = CacheCoordinator::from_config(&CacheConfig::from(&settings.cache)).await;
    let origin = match settings.origin.base_url.as_ref() {
        Some(base) => {
            let client = OriginClient::new(base, settings.origin.timeout).map_err(|err| {
                AppError::unexpected(format!("failed to build origin client: {err}"))
            })?;
            info!(origin = %client.base(), "forwarding uncached requests to origin");
            Some(Arc::new(client))
        }
        None => {
            warn!("no origin configured, only cached responses can be served");
            None
        }
    };

    let state = HttpState {
        cache: cache.clone(),
        origin,
    };
    let result = serve_http(&settings, state).await;

    cache.shutdown().await;
    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let cache = state.cache.clone();
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown::graceful(
        settings.server.graceful_shutdown,
        cache,
    ))
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
