mod channel;
pub mod protocol;

pub use channel::{RemoteChannel, RemoteEvent};
pub use protocol::{ToolCall, ToolResult};
