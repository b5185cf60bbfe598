use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<reasoning>[\s\S]*?</reasoning>").unwrap());

static SQL_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```[ \t]*(?:sql|postgresql|postgres|psql)?[ \t]*\r?\n?(.*?)```").unwrap());

static OPEN_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[ \t]*(?:sql|postgresql|postgres|psql)?[ \t]*\r?\n?").unwrap());

/// Words a line must start with to be considered the beginning of a
/// statement rather than model commentary.
const STATEMENT_LEADERS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE",
    "TRUNCATE", "GRANT", "REVOKE", "COPY", "CALL", "DO", "EXPLAIN", "VALUES", "TABLE", "SET",
    "BEGIN", "COMMIT", "ROLLBACK", "VACUUM", "ANALYZE", "REINDEX", "LOCK", "SHOW",
];

/// Strips reasoning blocks models emit before their answer.
pub fn clean_llm_response(response: &str) -> String {
    let cleaned = THINK_TAG_PATTERN.replace_all(response, "");
    let cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Pulls the SQL text out of a raw model answer.
///
/// Prefers the first fenced block. Otherwise drops leading prose lines up to
/// the first line that opens a statement. Text that never opens a statement
/// is returned trimmed so the validator can reject it.
pub fn extract_sql(response: &str) -> String {
    let cleaned = clean_llm_response(response);

    let body = match SQL_FENCE_PATTERN.captures(&cleaned) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        // An unterminated fence still marks where the SQL starts.
        None => match cleaned.find("```") {
            Some(pos) => OPEN_FENCE_PATTERN.replace(&cleaned[pos..], "").to_string(),
            None => cleaned.clone(),
        },
    };

    skip_leading_prose(body.trim()).trim().to_string()
}

fn skip_leading_prose(text: &str) -> &str {
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if opens_statement(line) {
            return &text[offset..];
        }
        offset += line.len();
    }
    text
}

fn opens_statement(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('(') {
        return true;
    }
    let first_word: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if first_word.is_empty() {
        return false;
    }
    let upper = first_word.to_ascii_uppercase();
    STATEMENT_LEADERS.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>joining employees to departments</think>SELECT 1";
        assert_eq!(clean_llm_response(input), "SELECT 1");
    }

    #[test]
    fn test_clean_self_closing_think() {
        assert_eq!(clean_llm_response("<think />SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_extract_plain_sql_is_unchanged() {
        let sql = "SELECT name FROM employees WHERE salary > 50000";
        assert_eq!(extract_sql(sql), sql);
    }

    #[test]
    fn test_extract_fenced_sql() {
        let input = "Here is the query:\n```sql\nSELECT COUNT(*) FROM employees;\n```\nIt counts rows.";
        assert_eq!(extract_sql(input), "SELECT COUNT(*) FROM employees;");
    }

    #[test]
    fn test_extract_bare_fence() {
        let input = "```\nSELECT 1\n```";
        assert_eq!(extract_sql(input), "SELECT 1");
    }

    #[test]
    fn test_extract_unterminated_fence() {
        let input = "Sure!\n```sql\nSELECT name FROM employees";
        assert_eq!(extract_sql(input), "SELECT name FROM employees");
    }

    #[test]
    fn test_extract_skips_leading_prose() {
        let input = "The following query answers the question.\n\nSELECT name\nFROM employees";
        assert_eq!(extract_sql(input), "SELECT name\nFROM employees");
    }

    #[test]
    fn test_extract_keeps_dangerous_statement_for_validation() {
        let input = "Okay.\nDROP TABLE employees;";
        assert_eq!(extract_sql(input), "DROP TABLE employees;");
    }

    #[test]
    fn test_extract_prose_only_returns_text() {
        assert_eq!(extract_sql("  I cannot answer that.  "), "I cannot answer that.");
    }

    #[test]
    fn test_extract_after_reasoning() {
        let input = "<think>need a join</think>\n```sql\nWITH t AS (SELECT 1) SELECT * FROM t\n```";
        assert_eq!(extract_sql(input), "WITH t AS (SELECT 1) SELECT * FROM t");
    }
}
