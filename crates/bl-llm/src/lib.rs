// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat, embedding, and dimensionality-reduction collaborators injected
//! into the pipeline core, plus deterministic in-memory mocks of each for
//! tests.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod mock;
pub mod response_format;
pub mod traits;

pub use mock::{FlakyChatClient, MockChatClient, MockEmbeddingClient, MockReducer2D};
pub use response_format::{JsonSchemaSpec, ResponseFormat};
pub use traits::{ChatClient, ChatResponse, EmbeddingClient, Reducer2D};
