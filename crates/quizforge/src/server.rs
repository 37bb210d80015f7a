//! `QuizServer` builder and server loop.
//!
//! This is the entry point for running a Quizforge server. It ties
//! together all the layers: transport → protocol → session → room → store.

use std::future::Future;
use std::sync::Arc;

use quizforge_protocol::{Codec, JsonCodec};
use quizforge_room::{QuestionSource, RoomManager, StaticQuestions};
use quizforge_session::{ConnectionRegistry, RegistryConfig};
use quizforge_store::{MemoryStore, Store};
use quizforge_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::QuizError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Everything
/// inside is already safe to share, so there is no outer lock.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: ConnectionRegistry<WebSocketConnection>,
    pub(crate) questions: Arc<dyn QuestionSource>,
    pub(crate) codec: C,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn rooms(&self) -> &RoomManager {
        self.registry.rooms()
    }
}

/// Builder for configuring and starting a Quizforge server.
///
/// # Example
///
/// ```rust,ignore
/// use quizforge::prelude::*;
///
/// let server = QuizServer::builder()
///     .bind("0.0.0.0:3001")
///     .store(Arc::new(JsonFileStore::open("data")?))
///     .questions(JsonFileQuestions::new("questions.json"))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct QuizServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
    store: Option<Arc<dyn Store>>,
    questions: Option<Arc<dyn QuestionSource>>,
}

impl QuizServerBuilder {
    /// Creates a new builder with default settings: localhost, in-memory
    /// store, no questions.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            registry_config: RegistryConfig::default(),
            store: None,
            questions: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets grace, ping, idle, and snapshot timers.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Sets where rooms are persisted.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets where `loadQuestions` gets its questions.
    pub fn questions(mut self, source: impl QuestionSource) -> Self {
        self.questions = Some(Arc::new(source));
        self
    }

    /// Binds the listener, restores persisted rooms, and returns a server
    /// ready to [`run`](QuizServer::run).
    ///
    /// A configured question source is loaded once up front so a broken
    /// bank fails at startup rather than on the first `loadQuestions`.
    ///
    /// # Errors
    /// Bind failures, store read failures during recovery, or an
    /// unreadable question source.
    pub async fn build(self) -> Result<QuizServer<JsonCodec>, QuizError> {
        let questions = match self.questions {
            Some(source) => {
                let probe = Arc::clone(&source);
                let count = tokio::task::spawn_blocking(move || probe.load())
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))??
                    .len();
                tracing::info!(count, "question bank checked");
                source
            }
            None => Arc::new(StaticQuestions::new(Vec::new())),
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let rooms = RoomManager::new(store);
        let restored = rooms.recover().await?;
        if restored > 0 {
            tracing::info!(rooms = restored, "restored rooms from previous run");
        }

        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: ConnectionRegistry::new(rooms, self.registry_config),
            questions,
            codec: JsonCodec,
        });

        Ok(QuizServer { transport, state })
    }
}

impl Default for QuizServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Quizforge server, bound and ready.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct QuizServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl QuizServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> QuizServerBuilder {
        QuizServerBuilder::new()
    }
}

impl<C> QuizServer<C>
where
    C: Codec + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn rooms(&self) -> &RoomManager {
        self.state.rooms()
    }

    /// Closes every room (members get `roomClosed`) and waits for the
    /// store to catch up. Returns how many rooms were open.
    pub async fn shutdown_rooms(&self) -> usize {
        let closed = self.state.rooms().close_all().await;
        if let Err(e) = self.state.rooms().flush().await {
            tracing::warn!(error = %e, "store flush failed during shutdown");
        }
        tracing::info!(rooms = closed, "all rooms closed");
        closed
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), QuizError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop and the maintenance loop until `shutdown`
    /// resolves, then closes every room.
    ///
    /// Each accepted connection gets its own handler task; a failing
    /// connection never stops the loop.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), QuizError> {
        tracing::info!("Quizforge server running");
        let maintenance = tokio::spawn(self.state.registry.clone().run_maintenance());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        maintenance.abort();
        self.shutdown_rooms().await;
        Ok(())
    }
}
