#![doc = include_str!("../README.md")]

pub mod error;
pub mod frame;
pub mod listener;

// --- 주요 타입 re-export ---

pub use error::IngestError;
pub use frame::{encode_frame, FrameReader, MAX_FRAME_SIZE};
pub use listener::{EventListener, ListenerConfig};
