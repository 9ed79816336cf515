pub mod envelope;
pub mod messages;
pub mod topics;

pub use envelope::Envelope;
pub use messages::{Message, MessageType};
pub use topics::Topics;

/// Publisher id of the validation authority.
pub const GOVERNOR_ID: &str = "governor";
/// Publisher id of the ledger authority.
pub const BANKER_ID: &str = "banker";
/// Publisher id of the tick clock and spawn authority.
pub const WORLD_ID: &str = "world";
