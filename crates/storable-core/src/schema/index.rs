//! Index descriptors.

/// The kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Plain (non-unique) index.
    Plain,
    /// Unique index.
    Unique,
    /// Full-text index.
    Fulltext,
    /// Primary key.
    Primary,
}

/// Describes one index of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Logical index name.
    pub name: String,
    /// Index kind.
    pub kind: IndexKind,
    /// Indexed properties, in order.
    pub properties: Vec<String>,
}

impl IndexDescriptor {
    /// Creates an index.
    pub fn new<I, S>(name: impl Into<String>, kind: IndexKind, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind,
            properties: properties.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a plain index.
    pub fn plain<I, S>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, IndexKind::Plain, properties)
    }

    /// Creates a unique index.
    pub fn unique<I, S>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, IndexKind::Unique, properties)
    }

    /// Creates a full-text index.
    pub fn fulltext<I, S>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, IndexKind::Fulltext, properties)
    }

    /// Returns the structural signature: sorted properties joined by `,`.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut properties: Vec<&str> = self.properties.iter().map(String::as_str).collect();
        properties.sort_unstable();
        properties.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_declaration_order() {
        let a = IndexDescriptor::plain("ab", ["b", "a"]);
        let b = IndexDescriptor::unique("other", ["a", "b"]);
        assert_eq!(a.signature(), "a,b");
        assert_eq!(a.signature(), b.signature());
    }
}
