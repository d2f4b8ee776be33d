mod error;
mod gmail;
mod people;

pub use error::EmailError;
pub use gmail::{GmailClient, MessageSource};
pub use people::{PeopleClient, ProfileSource};
