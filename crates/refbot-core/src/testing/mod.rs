//! Scripted collaborators for deterministic tests.

mod call_log;
mod recording_pool;
mod scripted_bot;

pub use call_log::CallLog;
pub use recording_pool::RecordingPool;
pub use scripted_bot::{PollStep, RecordingSink, ScriptedBot};
