//! Streaming transcript reconciliation for the notebook chat stream.
//!
//! One chat response interleaves four channels: the echoed user message, its
//! live translation, the assistant reply, and the reply's translation. The
//! engine turns that byte stream back into an ordered, id-keyed transcript.
//!
//! - [`FrameDecoder`] splits raw chunks into typed [`Frame`]s.
//! - [`reduce`] routes each frame by [`Phase`] into the [`Transcript`].
//! - [`TranscriptStore`] keeps one locked transcript per conversation.
//! - [`SessionController`] runs at most one live stream per conversation and
//!   supports mid-stream cancellation.

pub mod frame;
pub mod router;
pub mod session;
pub mod store;
pub mod transcript;

pub use frame::{parse_line, Frame, FrameDecoder, MalformedLine};
pub use router::{
    reduce, Accumulator, Channel, DropReason, Phase, Reduction, RouterState, TranscriptChange,
};
pub use session::{
    conversation_title, ChatOptions, SendError, SessionController, SessionEvent, SessionHandle,
    SessionId, SessionObserver, SessionOutcome,
};
pub use store::{SharedTranscript, TranscriptStore};
pub use transcript::Transcript;
