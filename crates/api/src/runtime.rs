//! Background flows, the import worker and the HTTP server as one process.
//!
//! Shutdown order: stop accepting HTTP and cancel the launchers, drain the
//! launchers, let in-flight requests finish within the grace window, finish
//! queued imports, drain the send pool, close the store.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use warmsend_infra::flows::{
    DispatchConfig, DispatchFlow, QueueConfig, QueueFlow, RecipientImport, ValidateFlow,
    import_recipient,
};
use warmsend_infra::transport::{MailTransport, SendPool};
use warmsend_infra::validation::EmailValidator;
use warmsend_infra::workers::{
    ChannelConfig, ChannelWorker, FlowHandle, FlowLauncher, LaunchConfig, LaunchStats, Shutdown,
};

use crate::app::services::{self, ServiceError, StoreBackend};
use crate::app::{self, AppState};
use crate::config::AppConfig;

pub struct Runtime {
    config: AppConfig,
    store: StoreBackend,
    shutdown: Shutdown,
    flows: Vec<FlowHandle>,
    pool: SendPool,
    imports: mpsc::Sender<RecipientImport>,
    import_worker: JoinHandle<LaunchStats>,
}

impl Runtime {
    /// Build the configured backends and start the background work.
    pub async fn start(config: AppConfig) -> Result<Self, ServiceError> {
        let store = services::connect_store(&config).await?;
        let transport = services::build_transport(&config)?;
        let validator = services::build_validator(&config)?;
        Ok(Self::with_parts(config, store, transport, validator))
    }

    pub fn with_parts(
        config: AppConfig,
        store: StoreBackend,
        transport: Arc<dyn MailTransport>,
        validator: Arc<dyn EmailValidator>,
    ) -> Self {
        let shared = store.shared();
        let shutdown = Shutdown::new();
        let pool = SendPool::new(transport, config.send_pool, config.send_timeout);

        let queue = Arc::new(QueueFlow::new(
            Arc::clone(&shared),
            QueueConfig::default().with_rotation(config.rotation),
        ));
        let dispatch = Arc::new(DispatchFlow::new(
            Arc::clone(&shared),
            pool.clone(),
            DispatchConfig {
                public_url: config.public_url.clone(),
                ..DispatchConfig::default()
            },
        ));
        let validate = Arc::new(ValidateFlow::new(Arc::clone(&shared), validator));

        let flows = vec![
            FlowLauncher::spawn(
                LaunchConfig::new("queue", config.queue_interval, config.run_timeout),
                &shutdown,
                move |ctx| {
                    let queue = Arc::clone(&queue);
                    async move { queue.run(&ctx).await }
                },
            ),
            FlowLauncher::spawn(
                LaunchConfig::new("dispatch", config.dispatch_interval, config.run_timeout),
                &shutdown,
                move |ctx| {
                    let dispatch = Arc::clone(&dispatch);
                    async move { dispatch.run(&ctx).await }
                },
            ),
            FlowLauncher::spawn(
                LaunchConfig::new("validate", config.validate_interval, config.run_timeout),
                &shutdown,
                move |ctx| {
                    let validate = Arc::clone(&validate);
                    async move { validate.run(&ctx).await }
                },
            ),
        ];

        let (imports, rx) = mpsc::channel(config.import_buffer);
        let import_store = Arc::clone(&shared);
        let import_worker = ChannelWorker::spawn(
            ChannelConfig::new("import").with_item_timeout(config.run_timeout),
            rx,
            move |item: RecipientImport, _ctx| {
                let store = Arc::clone(&import_store);
                async move { import_recipient(store.as_ref(), &item).await.map(|_| ()) }
            },
        );

        Self {
            config,
            store,
            shutdown,
            flows,
            pool,
            imports,
            import_worker,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.store.shared(),
            self.imports.clone(),
            self.config.admin_token.clone(),
        )
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve HTTP on `listener` until `signal` resolves, then shut down.
    pub async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), ServiceError> {
        let router = app::build_app(self.app_state());
        let addr = listener.local_addr()?;
        let token = self.shutdown.token();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        info!(%addr, "listening");

        let early_exit = tokio::select! {
            _ = signal => {
                info!("shutdown signal received");
                None
            }
            res = &mut server => Some(res),
        };

        let Runtime {
            config,
            store,
            shutdown,
            flows,
            pool,
            imports,
            import_worker,
        } = self;

        shutdown.trigger();
        for flow in flows {
            let name = flow.name().to_string();
            let stats = flow.join().await;
            info!(flow = %name, runs = stats.runs, failures = stats.failures, "flow drained");
        }

        let served = match early_exit {
            Some(res) => res,
            None => match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(
                        grace_secs = config.shutdown_grace.as_secs(),
                        "grace window elapsed, aborting in-flight requests"
                    );
                    server.abort();
                    match server.await {
                        Err(err) if err.is_cancelled() => Ok(Ok(())),
                        other => other,
                    }
                }
            },
        };

        drop(imports);
        match import_worker.await {
            Ok(stats) => info!(imported = stats.runs, failures = stats.failures, "import worker drained"),
            Err(err) => error!(error = %err, "import worker ended abnormally"),
        }

        pool.drain().await;
        store.close().await;
        info!("shutdown complete");

        match served {
            Ok(result) => result.map_err(ServiceError::from),
            Err(err) => {
                error!(error = %err, "http server task failed");
                Ok(())
            }
        }
    }
}
