//! The listener configurator.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::server::NamedService;
use tonic::service::Routes;

use crate::{ServerOptions, ServiceHandler, StartError};

#[cfg(feature = "health")]
use tonic_health::{ServingStatus, server::HealthReporter};

#[cfg(feature = "health")]
const HEALTH_SERVICE: &str = "grpc.health.v1.Health";

#[cfg(feature = "reflection")]
const REFLECTION_SERVICES: [&str; 2] = [
    "grpc.reflection.v1.ServerReflection",
    "grpc.reflection.v1alpha.ServerReflection",
];

/// Lifecycle of a [`Server`].
#[derive(Debug)]
enum State {
    Unstarted,
    Running(Running),
    Failed,
}

#[derive(Debug)]
struct Running {
    local_addr: SocketAddr,
    stopped: watch::Receiver<bool>,
}

/// A gRPC server assembled from registered services.
///
/// Services are added with [`add_service`](Self::add_service), then
/// [`start`](Self::start) binds the address and serves them on a spawned
/// task together with the health and reflection services (when enabled).
///
/// # Example
///
/// ```rust,ignore
/// use grpc_adapter::{Server, ServerOptions};
///
/// let mut server = Server::new(ServerOptions::new("0.0.0.0:50051"));
/// server.add_service(EchoServer::new(EchoService));
/// server.add_encoded_file_descriptor_set(echo::FILE_DESCRIPTOR_SET);
/// server.start().await?;
///
/// let shutdown = server.shutdown_handle();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.shutdown();
/// });
/// server.wait().await;
/// ```
#[derive(Debug)]
pub struct Server {
    options: ServerOptions,
    routes: Routes,
    services: Vec<&'static str>,
    conflicts: Vec<&'static str>,
    #[cfg(feature = "reflection")]
    descriptor_sets: Vec<prost_types::FileDescriptorSet>,
    #[cfg(feature = "reflection")]
    encoded_descriptor_sets: Vec<&'static [u8]>,
    #[cfg(feature = "health")]
    health: Option<HealthReporter>,
    shutdown: Arc<watch::Sender<bool>>,
    state: State,
}

impl Server {
    /// Create an unstarted server. No socket is opened.
    pub fn new(options: ServerOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            routes: Routes::default(),
            services: Vec::new(),
            conflicts: Vec::new(),
            #[cfg(feature = "reflection")]
            descriptor_sets: Vec::new(),
            #[cfg(feature = "reflection")]
            encoded_descriptor_sets: Vec::new(),
            #[cfg(feature = "health")]
            health: None,
            shutdown: Arc::new(shutdown),
            state: State::Unstarted,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Register a service.
    ///
    /// The configured message limits are applied first. Registering after
    /// [`start`](Self::start) logs a warning and has no effect. A second
    /// service with the same name is not routed and makes `start` fail.
    pub fn add_service<S>(&mut self, service: S) -> &mut Self
    where
        S: ServiceHandler
            + tower::Service<
                http::Request<tonic::body::Body>,
                Response = http::Response<tonic::body::Body>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        if !matches!(self.state, State::Unstarted) {
            tracing::warn!(service = S::NAME, "server already started, ignoring service");
            return self;
        }
        if self.services.contains(&S::NAME) {
            tracing::warn!(service = S::NAME, "service registered more than once");
            self.conflicts.push(S::NAME);
            return self;
        }

        let service = self.options.message_limits().apply(service);
        self.routes = std::mem::take(&mut self.routes).add_service(service);
        self.services.push(S::NAME);
        tracing::debug!(service = S::NAME, "registered service");
        self
    }

    /// Serve `set` through reflection.
    #[cfg(feature = "reflection")]
    pub fn add_file_descriptor_set(&mut self, set: prost_types::FileDescriptorSet) -> &mut Self {
        self.descriptor_sets.push(set);
        self
    }

    /// Serve an encoded `FileDescriptorSet` through reflection.
    #[cfg(feature = "reflection")]
    pub fn add_encoded_file_descriptor_set(&mut self, set: &'static [u8]) -> &mut Self {
        self.encoded_descriptor_sets.push(set);
        self
    }

    /// Names of the registered services, in registration order.
    pub fn services(&self) -> &[&'static str] {
        &self.services
    }

    /// Bind the address and start serving.
    ///
    /// Returns once the socket is bound; requests are served on a spawned
    /// task. A server can be started at most once, and a failed start cannot
    /// be retried.
    pub async fn start(&mut self) -> Result<(), StartError> {
        if !matches!(self.state, State::Unstarted) {
            return Err(StartError::AlreadyStarted);
        }

        match self.launch().await {
            Ok(running) => {
                tracing::info!(
                    address = %running.local_addr,
                    services = ?self.services,
                    "server listening"
                );
                self.state = State::Running(running);
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, "server failed to start");
                self.state = State::Failed;
                Err(error)
            }
        }
    }

    async fn launch(&mut self) -> Result<Running, StartError> {
        if let Some(service) = self.conflicts.first() {
            return Err(StartError::Registration {
                service: service.to_string(),
            });
        }

        let routes = std::mem::take(&mut self.routes);
        #[cfg(feature = "health")]
        let (routes, health) = self.add_health(routes).await;
        #[cfg(not(feature = "health"))]
        let routes = self.add_health(routes);
        let routes = self.add_reflection(routes)?;
        let mut transport = self.transport()?;

        let address = self.options.effective_address().to_string();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartError::Bind { address, source })?;

        #[cfg(feature = "health")]
        {
            self.health = health;
        }

        // A shutdown requested before start must not stop this run.
        self.shutdown.send_replace(false);
        let signal = self.shutdown_signal();

        let router = transport.add_routes(routes);
        let (stopped_tx, stopped) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(error) = router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
                .await
            {
                tracing::error!(%error, "server terminated with error");
            }
            stopped_tx.send_replace(true);
            tracing::debug!(address = %local_addr, "server stopped");
        });

        Ok(Running {
            local_addr,
            stopped,
        })
    }

    /// Whether `start` adds its own health service.
    #[cfg(feature = "health")]
    fn builtin_health(&self) -> bool {
        self.options.enable_health && !self.services.contains(&HEALTH_SERVICE)
    }

    #[cfg(feature = "health")]
    async fn add_health(&self, routes: Routes) -> (Routes, Option<HealthReporter>) {
        if !self.builtin_health() {
            if self.options.enable_health {
                tracing::warn!("health service registered by caller, not adding built-in one");
            }
            return (routes, None);
        }

        let (mut reporter, service) = tonic_health::server::health_reporter();
        reporter
            .set_service_status("", ServingStatus::Serving)
            .await;
        for name in &self.services {
            reporter
                .set_service_status(*name, ServingStatus::Serving)
                .await;
        }
        (routes.add_service(service), Some(reporter))
    }

    #[cfg(not(feature = "health"))]
    fn add_health(&self, routes: Routes) -> Routes {
        if self.options.enable_health {
            tracing::warn!("health requested but the `health` feature is disabled");
        }
        routes
    }

    #[cfg(feature = "reflection")]
    fn add_reflection(&self, routes: Routes) -> Result<Routes, StartError> {
        if !self.options.enable_reflection {
            return Ok(routes);
        }
        if REFLECTION_SERVICES
            .iter()
            .any(|name| self.services.contains(name))
        {
            tracing::warn!("reflection service registered by caller, not adding built-in one");
            return Ok(routes);
        }

        let v1 = self.reflection_builder().build_v1()?;
        let v1alpha = self.reflection_builder().build_v1alpha()?;
        Ok(routes.add_service(v1).add_service(v1alpha))
    }

    #[cfg(feature = "reflection")]
    fn reflection_builder(&self) -> tonic_reflection::server::Builder<'_> {
        let mut builder = tonic_reflection::server::Builder::configure();
        #[cfg(feature = "health")]
        if self.builtin_health() {
            builder =
                builder.register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET);
        }
        for set in self.encoded_descriptor_sets.iter().copied() {
            builder = builder.register_encoded_file_descriptor_set(set);
        }
        for set in &self.descriptor_sets {
            builder = builder.register_file_descriptor_set(set.clone());
        }
        builder
    }

    #[cfg(not(feature = "reflection"))]
    fn add_reflection(&self, routes: Routes) -> Result<Routes, StartError> {
        if self.options.enable_reflection {
            tracing::warn!("reflection requested but the `reflection` feature is disabled");
        }
        Ok(routes)
    }

    #[cfg(feature = "tls")]
    fn transport(&self) -> Result<tonic::transport::Server, StartError> {
        let transport = tonic::transport::Server::builder();
        match &self.options.credentials {
            Some(tls) => transport
                .tls_config(tls.clone())
                .map_err(StartError::Credentials),
            None => Ok(transport),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn transport(&self) -> Result<tonic::transport::Server, StartError> {
        Ok(tonic::transport::Server::builder())
    }

    /// Resolves when shutdown is requested or every shutdown handle is gone.
    fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut requested = self.shutdown.subscribe();
        #[cfg(feature = "health")]
        let health = self.health.clone();
        #[cfg(feature = "health")]
        let services = self.services.clone();

        async move {
            let _ = requested.wait_for(|stop| *stop).await;
            tracing::debug!("shutting down server");

            #[cfg(feature = "health")]
            if let Some(mut reporter) = health {
                reporter
                    .set_service_status("", ServingStatus::NotServing)
                    .await;
                for name in services {
                    reporter
                        .set_service_status(name, ServingStatus::NotServing)
                        .await;
                }
            }
        }
    }

    /// The bound address, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            State::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Handle to the health reporter of a running server.
    #[cfg(feature = "health")]
    pub fn health_reporter(&self) -> Option<HealthReporter> {
        self.health.clone()
    }

    /// Wait until the serving task has finished.
    ///
    /// Returns immediately if the server was never started successfully.
    pub async fn wait(&self) {
        let State::Running(running) = &self.state else {
            return;
        };
        let mut stopped = running.stopped.clone();
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// Ask the server to stop. Does not wait; pair with [`wait`](Self::wait).
    ///
    /// Health statuses switch to `NOT_SERVING`, then in-flight calls drain.
    /// No effect unless the server is running.
    pub fn shutdown(&self) {
        if matches!(self.state, State::Running(_)) {
            self.shutdown.send_replace(true);
        }
    }

    /// A cloneable handle that stops this server from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Whether `start` succeeded.
    ///
    /// Stays `true` after shutdown and after [`wait`](Self::wait) returns.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }
}

/// Stops a [`Server`] without access to it.
///
/// The server also stops once it and every handle have been dropped.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the server to stop. Before the server starts this has no effect.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
