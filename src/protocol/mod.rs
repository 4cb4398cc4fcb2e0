pub mod deserializer;
pub mod message;
pub mod serializer;

pub use deserializer::{Deserialize, DeserializeError};
pub use message::{Message, RawMessage};
pub use serializer::{Serialize, SerializeError};

// a batch is expected to stay in the order of a few KiB,
// anything past this is treated as a broken frame
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;
