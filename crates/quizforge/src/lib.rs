//! # Quizforge
//!
//! Real-time multiplayer trivia rooms over WebSocket.
//!
//! One quiz master opens a room and drives a sequence of questions; guests
//! join with a room code, move their marker into an answer zone, and
//! report points. The server keeps rosters, scores, and the question
//! cursor per room, fans state out to every connected member, and lets
//! dropped players reconnect within a grace window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizforge::prelude::*;
//!
//! # async fn start() -> Result<(), QuizError> {
//! let server = QuizServer::builder()
//!     .bind("0.0.0.0:3001")
//!     .questions(JsonFileQuestions::new("questions.json"))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::QuizError;
pub use server::{QuizServer, QuizServerBuilder};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{QuizError, QuizServer, QuizServerBuilder};
    pub use quizforge_protocol::{
        ClientMessage, GamePhase, PlayerId, Question, RoomId, RoomSettings, ServerMessage,
    };
    pub use quizforge_room::{JsonFileQuestions, QuestionSource, RoomManager, StaticQuestions};
    pub use quizforge_session::RegistryConfig;
    pub use quizforge_store::{JsonFileStore, MemoryStore, Store};
}
