use serde::{Deserialize, Serialize};

use super::{RecipientEmail, RecipientName};

/// A recipient as handed over by a resolver, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidRecipient {
    pub email: RecipientEmail,
    pub name: RecipientName,
}

impl TryFrom<&Recipient> for ValidRecipient {
    type Error = String;

    fn try_from(value: &Recipient) -> Result<Self, Self::Error> {
        let email = RecipientEmail::parse(value.email.clone())?;
        let name = RecipientName::new(&value.name);
        Ok(Self { email, name })
    }
}
