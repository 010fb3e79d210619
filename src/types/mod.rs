//! Shared data types.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StreamingEvent`] | One event of a generative response stream |

pub mod events;

pub use events::StreamingEvent;
