pub mod deepseek;
pub mod traits;

pub use deepseek::{DeepSeekTransport, OfflineTransport};
pub use traits::{CallResult, ChatMessage, ChatRequest, ChatTransport, Choice, TransportReply};
