//! Application struct that encapsulates server assembly and serving logic.

use crate::cli::RunArgs;
use alertbridge_core::config::Config;
use alertbridge_core::lifecycle::signal::SignalHandler;
use alertbridge_core::lifecycle::{self, Lifecycle};
use alertbridge_core::metrics::Metrics;
use alertbridge_core::request_log::{PayloadLogStore, RequestLogStore};
use alertbridge_core::store::RuleStore;
use alertbridge_relay::Forwarder;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Application {
    config: Arc<Config>,
    rule_store: Arc<RuleStore>,
    app_router: axum::Router,
    lifecycle: Box<dyn Lifecycle>,
    shutdown_timeout: u64,
    watch_interval: Duration,
    #[cfg(unix)]
    _pid_file: Option<alertbridge_core::lifecycle::pid_file::PidFile>,
}

impl Application {
    /// Build the application from CLI args: load config, open the rule
    /// store, build the router, and (on unix) acquire the PID file.
    pub fn build(args: &RunArgs) -> anyhow::Result<Self> {
        let mut config = Config::load(&args.config).unwrap_or_else(|e| {
            tracing::warn!("failed to load config from '{}': {e}, using defaults", args.config);
            Config::default()
        });

        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(ref pid_file) = args.pid_file {
            config.daemon.pid_file = pid_file.clone();
        }
        if let Some(timeout) = args.shutdown_timeout {
            config.daemon.shutdown_timeout = timeout;
        }

        let shutdown_timeout = config.daemon.shutdown_timeout;
        let watch_interval = Duration::from_secs(config.config_watch_interval_secs);

        #[cfg(unix)]
        let _pid_file = if args.daemon {
            Some(alertbridge_core::lifecycle::pid_file::PidFile::acquire(
                &config.daemon.pid_file,
            )?)
        } else {
            None
        };

        let rule_store = Arc::new(RuleStore::new(
            config.rules_path.clone(),
            config.configmap_name.clone(),
        ));
        // Force the lazy load now so startup failures surface immediately.
        rule_store.get_rules();

        let metrics = Arc::new(Metrics::new());
        let request_logs = Arc::new(RequestLogStore::new(config.request_log_capacity));
        let payload_logs = Arc::new(PayloadLogStore::new(config.request_log_capacity));
        let forwarder = Arc::new(Forwarder::new());
        let config = Arc::new(config);

        let state = alertbridge_server::AppState {
            config: config.clone(),
            rule_store: rule_store.clone(),
            forwarder,
            metrics,
            request_logs,
            payload_logs,
            start_time: Instant::now(),
        };
        let app_router = alertbridge_server::build_router(state);

        let lc = lifecycle::detect_lifecycle();

        Ok(Self {
            config,
            rule_store,
            app_router,
            lifecycle: lc,
            shutdown_timeout,
            watch_interval,
            #[cfg(unix)]
            _pid_file,
        })
    }

    /// Start serving HTTP/HTTPS, handle signals, and drain gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let Self {
            config,
            rule_store,
            app_router,
            lifecycle,
            shutdown_timeout,
            watch_interval,
            #[cfg(unix)]
            _pid_file,
        } = self;

        // Background mtime-polling auto-reload of the rule document (§4.5).
        let _auto_reload = alertbridge_core::store::spawn_auto_reload(rule_store.clone(), watch_interval);

        let (signal_handler, shutdown_rx) = SignalHandler::new();

        let reload_store = rule_store.clone();
        let reload_lifecycle: Arc<dyn Lifecycle> = Arc::from(lifecycle::detect_lifecycle());
        let reload_fn = move || {
            reload_lifecycle.on_reloading();
            match reload_store.reload_rules() {
                Ok(rules) => {
                    tracing::info!("SIGHUP reload: {} routes loaded", rules.routes.len());
                    reload_lifecycle.on_reloaded();
                }
                Err(e) => {
                    tracing::error!("SIGHUP rule reload failed: {e}");
                }
            }
        };

        tokio::spawn(signal_handler.run(reload_fn));

        let addr = format!("{}:{}", config.host, config.port);

        if config.tls.enable {
            serve_tls(&addr, &config, app_router, shutdown_rx, &*lifecycle, shutdown_timeout).await?;
        } else {
            serve_http(&addr, app_router, shutdown_rx, &*lifecycle, shutdown_timeout).await?;
        }

        tracing::info!("server shut down.");
        Ok(())
    }
}

async fn serve_http(
    addr: &str,
    app_router: axum::Router,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    lifecycle: &dyn Lifecycle,
    shutdown_timeout: u64,
) -> anyhow::Result<()> {
    tracing::info!("starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    lifecycle.on_ready();

    let shutdown = async move {
        let _ = shutdown_rx.wait_for(|v| *v).await;
    };

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown)
        .await?;

    lifecycle.on_stopping();
    tokio::time::sleep(Duration::from_secs(shutdown_timeout.min(1))).await;
    Ok(())
}

async fn serve_tls(
    addr: &str,
    cfg: &Config,
    app_router: axum::Router,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    lifecycle: &dyn Lifecycle,
    shutdown_timeout: u64,
) -> anyhow::Result<()> {
    let cert_path = cfg.tls.cert.as_ref().expect("TLS cert required");
    let key_path = cfg.tls.key.as_ref().expect("TLS key required");

    use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};

    let certs: Vec<CertificateDer<'static>> =
        CertificateDer::pem_file_iter(cert_path)?.collect::<Result<Vec<_>, _>>()?;
    let key = PrivateKeyDer::from_pem_file(key_path)?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    let tls_acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));

    tracing::info!("starting HTTPS server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    lifecycle.on_ready();

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                let acceptor = tls_acceptor.clone();
                let router = app_router.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let io = hyper_util::rt::TokioIo::new(tls_stream);
                            let service = hyper::service::service_fn(
                                move |req: hyper::Request<hyper::body::Incoming>| {
                                    let router = router.clone();
                                    async move {
                                        let (parts, body) = req.into_parts();
                                        let body = axum::body::Body::new(body);
                                        let req = axum::http::Request::from_parts(parts, body);
                                        Ok::<_, std::convert::Infallible>(
                                            tower::ServiceExt::oneshot(router, req)
                                                .await
                                                .expect("infallible"),
                                        )
                                    }
                                },
                            );
                            if let Err(e) = hyper_util::server::conn::auto::Builder::new(
                                hyper_util::rt::TokioExecutor::new(),
                            )
                            .serve_connection(io, service)
                            .await
                            {
                                tracing::error!("TLS connection error from {peer_addr}: {e}");
                            }
                        }
                        Err(e) => tracing::error!("TLS accept error from {peer_addr}: {e}"),
                    }
                });
            }
            _ = shutdown_rx.wait_for(|v| *v) => {
                tracing::info!("stopping TLS listener, waiting for connections to drain...");
                break;
            }
        }
    }

    lifecycle.on_stopping();
    tokio::time::sleep(Duration::from_secs(shutdown_timeout.min(5))).await;
    Ok(())
}
