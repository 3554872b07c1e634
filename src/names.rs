use std::borrow::Borrow;

/// The name of a service, as understood by the init system.
///
/// Names end up as command-line arguments and inside runit's `<token>: <name>:`
/// status records, so they are restricted to characters that cannot be
/// mistaken for options or separators.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String")]
pub struct ServiceName(String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.starts_with('-') {
            return Err(NameError::LeadingDash {
                name: s.to_owned(),
            });
        }
        if let Some(character) = s.chars().find(|c| !is_allowed(*c)) {
            return Err(NameError::InvalidCharacter {
                name: s.to_owned(),
                character,
            });
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for ServiceName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("service names cannot be empty")]
    Empty,
    #[error("service name {name:?} cannot start with '-'")]
    LeadingDash { name: String },
    #[error("service name {name:?} contains an invalid character: {character:?}")]
    InvalidCharacter { name: String, character: char },
}
