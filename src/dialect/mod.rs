//! Flavour of the dump being converted

/// Quoting, escaping and null conventions of the input dump
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialect {
    /// Identifier (table/column name) quote
    pub id_quote: char,
    /// Column value quote
    pub value_quote: char,
    /// Escape character: the next character is taken literally
    pub escape: char,
    /// Unquoted value mapped to an empty field
    pub null_value: String,
}

impl Default for Dialect {
    fn default() -> Dialect {
        Dialect {
            id_quote: '`',
            value_quote: '\'',
            escape: '\\',
            null_value: String::from("NULL"),
        }
    }
}

/// Returns `true` if the char does not require quotes.
pub fn is_primitive(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

#[cfg(test)]
mod test {
    use super::{is_primitive, Dialect};

    #[test]
    fn defaults() {
        let dialect = Dialect::default();
        assert_eq!('`', dialect.id_quote);
        assert_eq!('\'', dialect.value_quote);
        assert_eq!('\\', dialect.escape);
        assert_eq!("NULL", dialect.null_value);
    }

    #[test]
    fn primitive_chars() {
        for c in ['a', 'Z', '0', '_', '-', '.', 'é', '字'] {
            assert!(is_primitive(c), "{c:?}");
        }
        for c in [' ', '\'', '`', ',', '(', ')', ';', '+', '\\'] {
            assert!(!is_primitive(c), "{c:?}");
        }
    }
}
