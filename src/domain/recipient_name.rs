/// A display name substituted into the message body. Any string is accepted;
/// it is trimmed and control characters become spaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecipientName(String);

impl RecipientName {
    pub fn new(s: &str) -> RecipientName {
        let name: String = s
            .trim()
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        Self(name)
    }
}

impl AsRef<str> for RecipientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
