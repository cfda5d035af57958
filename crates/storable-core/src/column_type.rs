//! Parsing of engine column type text.

/// A column type as spelled by the engine, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    /// Base type, uppercased.
    pub base: String,
    /// First size argument.
    pub length: Option<u32>,
    /// Second size argument.
    pub decimals: Option<u32>,
    /// Whether the `UNSIGNED` modifier is present.
    pub unsigned: bool,
}

impl ColumnType {
    /// Parses text such as `bigint(18) unsigned`, `DECIMAL(10,2)` or `TEXT`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let upper = text.to_ascii_uppercase();
        let (head, args, tail) = match (upper.find('('), upper.find(')')) {
            (Some(open), Some(close)) if close > open => (
                &upper[..open],
                Some(&upper[open + 1..close]),
                &upper[close + 1..],
            ),
            _ => (upper.as_str(), None, ""),
        };

        let mut base_words = Vec::new();
        let mut unsigned = false;
        for word in head.split_whitespace().chain(tail.split_whitespace()) {
            match word {
                "UNSIGNED" => unsigned = true,
                "ZEROFILL" | "SIGNED" => {}
                other => base_words.push(other),
            }
        }

        let mut length = None;
        let mut decimals = None;
        if let Some(args) = args {
            let mut parts = args.split(',').map(|part| part.trim().parse::<u32>().ok());
            length = parts.next().flatten();
            decimals = parts.next().flatten();
        }

        Self {
            base: base_words.join(" "),
            length,
            decimals,
            unsigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_length_and_unsigned() {
        let ty = ColumnType::parse("bigint(18) unsigned");
        assert_eq!(ty.base, "BIGINT");
        assert_eq!(ty.length, Some(18));
        assert_eq!(ty.decimals, None);
        assert!(ty.unsigned);
    }

    #[test]
    fn parses_decimals() {
        let ty = ColumnType::parse("DECIMAL(10, 2)");
        assert_eq!(ty.base, "DECIMAL");
        assert_eq!(ty.length, Some(10));
        assert_eq!(ty.decimals, Some(2));
        assert!(!ty.unsigned);
    }

    #[test]
    fn parses_bare_types() {
        let ty = ColumnType::parse("longtext");
        assert_eq!(ty.base, "LONGTEXT");
        assert_eq!(ty.length, None);

        let ty = ColumnType::parse("VARCHAR(191)");
        assert_eq!(ty.base, "VARCHAR");
        assert_eq!(ty.length, Some(191));
    }
}
