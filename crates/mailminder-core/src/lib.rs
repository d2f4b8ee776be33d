mod message;
mod model;

pub use message::{Envelope, ExtensionMessage, MessageError, MessageKind};
pub use model::*;
