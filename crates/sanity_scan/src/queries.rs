//! Query extraction from captured output.
//!
//! The server's parser wrapper logs every statement it receives as `<prefix> <query>`. When a test fails, the last
//! of those lines is the best hint of what was running.

/// All queries logged under `prefix`, in order of appearance.
///
/// A matching line contributes the text after its first space, trimmed. Lines with nothing after the prefix are
/// skipped.
pub fn extract_queries(text: &str, prefix: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.starts_with(prefix))
        .filter_map(|line| line.split_once(' '))
        .map(|(_, query)| query.trim().to_string())
        .collect()
}

/// The most recent query logged under `prefix`.
pub fn last_query(text: &str, prefix: &str) -> Option<String> {
    text.lines()
        .rev()
        .filter(|line| line.starts_with(prefix))
        .find_map(|line| line.split_once(' '))
        .map(|(_, query)| query.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "ParserWrapper::ParserWrapper:";

    #[test]
    fn test_extracts_in_order() {
        let text = "\
I1 started
ParserWrapper::ParserWrapper: SELECT 1;
noise ParserWrapper::ParserWrapper: ignored
ParserWrapper::ParserWrapper:   SELECT count(*) FROM t;
";
        assert_eq!(
            extract_queries(text, PREFIX),
            vec!["SELECT 1;", "SELECT count(*) FROM t;"]
        );
        assert_eq!(last_query(text, PREFIX).as_deref(), Some("SELECT count(*) FROM t;"));
    }

    #[test]
    fn test_prefix_without_query_is_skipped() {
        let text = "ParserWrapper::ParserWrapper: SELECT 2;\nParserWrapper::ParserWrapper:\n";
        assert_eq!(extract_queries(text, PREFIX), vec!["SELECT 2;"]);
        assert_eq!(last_query(text, PREFIX).as_deref(), Some("SELECT 2;"));
    }

    #[test]
    fn test_no_queries() {
        assert!(extract_queries("RETURN STATUS: 1\n", PREFIX).is_empty());
        assert_eq!(last_query("", PREFIX), None);
    }
}
