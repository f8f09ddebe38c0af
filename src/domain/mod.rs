mod message;
mod recipient;
mod recipient_email;
mod recipient_name;

pub use message::{Message, NAME_PLACEHOLDER};
pub use recipient::{Recipient, ValidRecipient};
pub use recipient_email::RecipientEmail;
pub use recipient_name::RecipientName;
