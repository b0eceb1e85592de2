//! Validated text types shared across the CDS sandbox crates.
//!
//! Values of these types are checked once, at construction or deserialisation, so downstream
//! code can place them in URLs and search parameters without re-validating.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input is not a valid FHIR logical id
    #[error("invalid FHIR id '{0}': expected 1-64 characters from [A-Za-z0-9-.]")]
    InvalidFhirId(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Arguments
    /// * `input` - Text to validate; leading and trailing whitespace is removed
    ///
    /// # Returns
    /// * `Ok(NonEmptyText)` - The trimmed text
    ///
    /// # Errors
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical id of a FHIR `Patient` resource.
///
/// FHIR restricts logical ids to 1-64 characters drawn from `A-Z a-z 0-9 - .`. Enforcing this
/// up front means the id can be placed in a request path or search parameter without escaping.
///
/// Serialises as a plain JSON string; deserialisation applies the same validation as
/// [`PatientId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientId(NonEmptyText);

impl PatientId {
    /// Validates and wraps a patient id.
    ///
    /// # Arguments
    /// * `input` - Candidate id; surrounding whitespace is trimmed before validation
    ///
    /// # Returns
    /// * `Ok(PatientId)` - The validated id
    ///
    /// # Errors
    /// Returns:
    /// - `TextError::Empty` if the trimmed input is empty,
    /// - `TextError::InvalidFhirId` if it is longer than 64 characters or contains anything
    ///   outside `[A-Za-z0-9-.]`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        let valid = text.as_str().len() <= 64
            && text
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
        if !valid {
            return Err(TextError::InvalidFhirId(text.into_inner()));
        }
        Ok(Self(text))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PatientId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl serde::Serialize for PatientId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for PatientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientId::new(&s).map_err(serde::de::Error::custom)
    }
}
