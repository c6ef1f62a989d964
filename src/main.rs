use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use margin::{
    application::{
        analytics::AnalyticsService,
        dashboard::DashboardGate,
        error::AppError,
        ingest::IngestService,
        posts::PostService,
        repos::{EventStores, PostsRepo},
    },
    config::{self, StoreBackend},
    infra::{
        content::MarkdownDirectory,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, HttpState, IngestRateLimiter, RouterState},
        memory::MemoryEventStore,
        telemetry,
    },
};
use tokio::{signal, sync::oneshot, try_join};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ClearAnalytics(args) => run_clear_analytics(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let stores = init_event_stores(&settings.store).await?;

    let content = MarkdownDirectory::new(settings.content.posts_directory.clone());
    info!(
        target = "margin::startup",
        posts_directory = %content.root().display(),
        "serving posts"
    );
    let posts: Arc<dyn PostsRepo> = Arc::new(content);

    let dedup_window = time::Duration::try_from(settings.ingest.view_dedup_window)
        .map_err(|err| AppError::validation(format!("view dedup window: {err}")))?;

    let dashboard = DashboardGate::new(settings.dashboard.password.as_deref());
    if dashboard.is_open() {
        warn!(
            target = "margin::startup",
            "dashboard.password is not set; analytics endpoints are open to anyone"
        );
    }

    let rate_limiter = IngestRateLimiter::new(
        Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
        settings.rate_limit.max_requests.get(),
    );

    let api_state = ApiState {
        analytics: Arc::new(AnalyticsService::new(
            posts.clone(),
            stores.views.clone(),
            stores.feedback.clone(),
            stores.readings.clone(),
        )),
        ingest: Arc::new(IngestService::new(
            stores.views.clone(),
            stores.feedback.clone(),
            stores.readings.clone(),
            dedup_window,
        )),
        posts: Arc::new(PostService::new(posts)),
        dashboard: Arc::new(dashboard),
        rate_limiter: Arc::new(rate_limiter),
    };
    let state = RouterState {
        http: HttpState {
            store: stores.health.clone(),
        },
        api: api_state,
    };

    serve_http(&settings, state).await
}

async fn run_clear_analytics(
    settings: config::Settings,
    args: config::ClearAnalyticsArgs,
) -> Result<(), AppError> {
    if !args.yes {
        return Err(AppError::validation(
            "clear-analytics deletes every stored event; re-run with --yes to confirm",
        ));
    }

    let stores = init_event_stores(&settings.store).await?;

    let (views, feedback, readings) = try_join!(
        stores.views.delete_all_views(),
        stores.feedback.delete_all_feedback(),
        stores.readings.delete_all_readings(),
    )?;

    info!(
        target = "margin::maintenance",
        views, feedback, readings, "analytics data cleared"
    );
    Ok(())
}

async fn init_event_stores(store: &config::StoreSettings) -> Result<EventStores, AppError> {
    match store.backend {
        StoreBackend::Memory => {
            info!(target = "margin::startup", "using in-memory event store");
            Ok(EventStores::from_backend(Arc::new(MemoryEventStore::new())))
        }
        StoreBackend::Postgres => {
            let database_url = store
                .url
                .as_ref()
                .ok_or_else(|| InfraError::configuration("database url is not configured"))
                .map_err(AppError::from)?;

            let pool = PostgresRepositories::connect(database_url, store.max_connections.get())
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

            Ok(EventStores::from_backend(Arc::new(
                PostgresRepositories::new(pool),
            )))
        }
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "margin::startup", addr = %settings.server.addr, "listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = stop_rx.await;
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => {
            return flatten_server_result(joined);
        }
        _ = shutdown_signal() => {
            info!(target = "margin::shutdown", "shutdown signal received; draining connections");
            let _ = stop_tx.send(());
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!(
                target = "margin::shutdown",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "margin::shutdown", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "margin::shutdown", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
