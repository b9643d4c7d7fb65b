use std::process;
use std::sync::Arc;

use rivista::{
    application::{
        error::AppError,
        feed::FeedAssembler,
        render::{RenderPolicy, RenderService},
        signing::SigningService,
    },
    config,
    infra::{
        cache::{ContentCache, ReconcileConfig, Reconciler},
        error::InfraError,
        http::{self, HttpState},
        platform::{PlatformClient, gateway::GatewayClient},
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Reconcile(_) => run_reconcile(settings).await,
    }
}

struct ApplicationContext {
    http_state: HttpState,
    cache: Arc<ContentCache>,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let platform: Arc<dyn PlatformClient> = Arc::new(GatewayClient::new(
        settings.platform.gateway_url.clone(),
        settings.platform.token.clone(),
    ));

    let signing = Arc::new(SigningService::new(
        settings.signing.key_file.clone(),
        settings.signing.enforce,
    ));

    let cache = Arc::new(
        ContentCache::new(settings.cache.directory.clone(), platform.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let policy = RenderPolicy::from_settings(&settings.platform.domain, &settings.render);
    let renderer = Arc::new(RenderService::new(signing.clone(), policy));
    let feed = Arc::new(FeedAssembler::new(platform.clone(), renderer.clone()));

    Ok(ApplicationContext {
        http_state: HttpState {
            renderer,
            feed,
            cache: cache.clone(),
            signing,
            platform,
            feed_default_items: settings.feeds.default_items,
        },
        cache,
    })
}

fn reconcile_config(settings: &config::Settings) -> ReconcileConfig {
    ReconcileConfig {
        interval: settings.cache.reconcile_interval,
        retention: settings.cache.retention,
        refetch_delay: settings.cache.refetch_delay,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let cancel = CancellationToken::new();
    let reconciler_handle =
        Reconciler::new(app.cache.clone(), reconcile_config(&settings)).spawn(cancel.clone());

    let router = http::build_router(app.http_state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let shutdown = cancel.clone();
    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    // Let the reconciler observe the stop signal and drain.
    cancel.cancel();
    let _ = reconciler_handle.await;

    result
}

async fn run_reconcile(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;
    let reconciler = Reconciler::new(app.cache, reconcile_config(&settings));

    let report = reconciler
        .run_cycle(&CancellationToken::new())
        .await
        .map_err(AppError::from)?;
    info!(
        reclaimed = report.reclaimed,
        kept_for_retry = report.kept_for_retry,
        refetched = report.refetched,
        refetch_failures = report.refetch_failures,
        "reconcile cycle finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
