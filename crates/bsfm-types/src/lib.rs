//! Validated text primitives shared across the blob store crates.
//!
//! Request attributes such as owner keys, content types and filenames arrive as free text
//! and are stored verbatim in metadata, header files and semaphore files. Wrapping them in
//! [`NonEmptyText`] at the boundary means the storage core never has to re-check for blank
//! values or run-away lengths.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The trimmed input exceeded the permitted number of characters
    #[error("Text exceeds {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// The input contained a line break, which would corrupt line-oriented files
    #[error("Text cannot contain line breaks")]
    LineBreak,
}

/// A single-line string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction. Line breaks
/// are rejected because every value of this type may end up as one line of a header file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty, or
    /// [`TextError::LineBreak`] if it spans more than one line.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.contains(['\n', '\r']) {
            return Err(TextError::LineBreak);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a new `NonEmptyText` that is at most `max` characters long.
    ///
    /// # Errors
    ///
    /// Same as [`NonEmptyText::new`], plus [`TextError::TooLong`] when the trimmed input
    /// has more than `max` characters.
    pub fn with_max_len(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        let actual = text.0.chars().count();
        if actual > max {
            return Err(TextError::TooLong { max, actual });
        }
        Ok(text)
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
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        let text = NonEmptyText::new("  ACME  ").unwrap();
        assert_eq!(text.as_str(), "ACME");
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
        assert_eq!(NonEmptyText::new(""), Err(TextError::Empty));
    }

    #[test]
    fn rejects_embedded_line_breaks() {
        assert_eq!(NonEmptyText::new("report\n.pdf"), Err(TextError::LineBreak));
        assert_eq!(NonEmptyText::new("a\rb"), Err(TextError::LineBreak));
    }

    #[test]
    fn max_len_counts_characters_not_bytes() {
        assert!(NonEmptyText::with_max_len("éééé", 4).is_ok());
        assert_eq!(
            NonEmptyText::with_max_len("ACME-CORP", 4),
            Err(TextError::TooLong { max: 4, actual: 9 })
        );
    }

    #[test]
    fn deserialize_validates_content() {
        let ok: NonEmptyText = serde_json::from_str("\"DOCS\"").unwrap();
        assert_eq!(ok.as_str(), "DOCS");

        let err = serde_json::from_str::<NonEmptyText>("\"  \"");
        assert!(err.is_err());
    }
}
