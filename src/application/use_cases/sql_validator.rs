//! SQL gate for generated text.
//!
//! Nothing reaches the executor without passing through here. Rules run in
//! a fixed order and the first failing rule decides the rejection kind:
//!
//! 1. extract the statement text from the model answer
//! 2. the statement must be a `SELECT`, or a `WITH` ending in a `SELECT`
//! 3. exactly one top-level statement
//! 4. every referenced table must be allowlisted (CTE names are exempt)
//! 5. no denylisted keyword anywhere outside literals and comments, and no
//!    other statement verb where a statement can begin
//!
//! Deny by default: an empty allowlist rejects every table reference.

mod lexer;

pub use lexer::split_statements;

use crate::domain::error::{SqlValidationError, ValidationErrorKind};
use crate::infrastructure::response::extract_sql;
use lexer::{matching_paren, split_tokens, tokenize, Token, TokenKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Denied anywhere outside literals and comments, nested bodies included.
pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
];

/// Statement verbs denied only where a statement can begin, so columns
/// named `comment` or `lock` stay readable.
const DENIED_STATEMENT_VERBS: &[&str] = &[
    "MERGE", "COPY", "CALL", "EXECUTE", "DO", "VACUUM", "REINDEX", "CLUSTER", "LOCK",
    "COMMENT", "SECURITY", "REFRESH", "LISTEN", "NOTIFY", "PREPARE", "DEALLOCATE", "DISCARD",
    "IMPORT",
];

/// Functions whose argument grammar uses `FROM` as a separator.
const FROM_ARGUMENT_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "SUBSTR", "TRIM", "OVERLAY", "POSITION"];

/// Words that close a FROM list at the current nesting level.
const FROM_LIST_END: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT",
    "WINDOW", "FETCH", "FOR", "RETURNING", "SELECT", "VALUES",
];

/// Noise words that may sit between a FROM/JOIN/INTO and the relation name.
const RELATION_PREFIXES: &[&str] = &["ONLY", "LATERAL", "TEMP", "TEMPORARY", "UNLOGGED", "TABLE"];

/// A statement that passed every rule. Only the validator builds these, so
/// holding one proves the text was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedSql {
    sql: String,
    tables: Vec<String>,
}

impl ValidatedSql {
    /// The single statement, without a trailing separator.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Normalized names of the base tables the statement reads.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

#[derive(Debug, Clone)]
pub struct SqlValidator {
    allowed_tables: HashSet<String>,
}

impl SqlValidator {
    pub fn new<I, S>(allowed_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_tables: allowed_tables
                .into_iter()
                .map(|t| normalize_identifier(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn allowed_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.allowed_tables.iter().cloned().collect();
        tables.sort();
        tables
    }

    pub fn validate(&self, raw: &str) -> Result<ValidatedSql, SqlValidationError> {
        // Rule 1
        let text = extract_sql(raw);
        let tokens = tokenize(&text);
        let statements = split_tokens(&tokens);

        let Some(first) = statements.first() else {
            return Err(SqlValidationError::new(
                ValidationErrorKind::DisallowedStatement,
                "No SQL statement found in the response",
            ));
        };

        // Rule 2
        check_statement_kind(first)?;

        // Rule 3
        if statements.len() > 1 {
            return Err(SqlValidationError::new(
                ValidationErrorKind::MultipleStatements,
                format!(
                    "Expected a single statement, found {} separated by ';'",
                    statements.len()
                ),
            ));
        }

        // Rule 4
        let ctes = cte_names(first);
        let referenced: BTreeSet<String> = table_references(first)
            .into_iter()
            .filter(|name| !ctes.contains(name))
            .collect();
        let unknown: Vec<&String> = referenced
            .iter()
            .filter(|name| !self.is_allowed(name))
            .collect();
        if let Some(table) = unknown.first() {
            return Err(SqlValidationError::new(
                ValidationErrorKind::UnknownTable,
                format!(
                    "Table '{}' is not in the allowlist. Allowed tables: {:?}",
                    table,
                    self.allowed_tables()
                ),
            ));
        }

        // Rule 5
        if let Some(keyword) = find_denied_keyword(first) {
            return Err(forbidden(&keyword));
        }

        let start = first[0].start;
        let end = first[first.len() - 1].end;
        Ok(ValidatedSql {
            sql: text[start..end].to_string(),
            tables: referenced.into_iter().collect(),
        })
    }

    /// `public.x` resolves to `x`; other schemas must be listed explicitly.
    fn is_allowed(&self, name: &str) -> bool {
        if self.allowed_tables.contains(name) {
            return true;
        }
        match name.split_once('.') {
            Some(("public", bare)) => self.allowed_tables.contains(bare),
            _ => false,
        }
    }
}

/// Rules 1, 2, 3 and 5 without the allowlist. Used to vet curated examples,
/// which may reference tables the live allowlist does not cover yet.
pub fn check_read_only(raw: &str) -> Result<String, SqlValidationError> {
    let text = extract_sql(raw);
    let tokens = tokenize(&text);
    let statements = split_tokens(&tokens);
    let Some(first) = statements.first() else {
        return Err(SqlValidationError::new(
            ValidationErrorKind::DisallowedStatement,
            "No SQL statement found",
        ));
    };
    check_statement_kind(first)?;
    if statements.len() > 1 {
        return Err(SqlValidationError::new(
            ValidationErrorKind::MultipleStatements,
            format!(
                "Expected a single statement, found {} separated by ';'",
                statements.len()
            ),
        ));
    }
    if let Some(keyword) = find_denied_keyword(first) {
        return Err(forbidden(&keyword));
    }
    let start = first[0].start;
    let end = first[first.len() - 1].end;
    Ok(text[start..end].to_string())
}

fn find_denied_keyword(tokens: &[Token]) -> Option<String> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TokenKind::Word)
        .find_map(|(i, t)| {
            let word = t.upper();
            if DENIED_KEYWORDS.contains(&word.as_str()) {
                return Some(word);
            }
            if DENIED_STATEMENT_VERBS.contains(&word.as_str()) && at_statement_start(tokens, i) {
                return Some(word);
            }
            // FOR SHARE, FOR KEY SHARE, FOR NO KEY UPDATE
            if word == "FOR" {
                if let Some(next) = tokens
                    .get(i + 1)
                    .filter(|n| n.is_word("SHARE") || n.is_word("KEY") || n.is_word("NO"))
                {
                    return Some(format!("FOR {}", next.upper()));
                }
            }
            None
        })
}

/// True for the first word of the statement or of a parenthesised body
/// opened right after `AS` / `MATERIALIZED`.
fn at_statement_start(tokens: &[Token], i: usize) -> bool {
    let mut j = i;
    while j > 0 && tokens[j - 1].is_symbol('(') {
        j -= 1;
    }
    if j == 0 {
        return true;
    }
    j < i && (tokens[j - 1].is_word("AS") || tokens[j - 1].is_word("MATERIALIZED"))
}

fn forbidden(keyword: &str) -> SqlValidationError {
    SqlValidationError::new(
        ValidationErrorKind::ForbiddenKeyword,
        format!("Keyword '{}' is not allowed in a read-only query", keyword),
    )
}

/// Table names a statement reads from, without CTE filtering or allowlist
/// checks. Used to tell which schema entries an example depends on.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let tokens = tokenize(sql);
    let mut names = BTreeSet::new();
    for statement in split_tokens(&tokens) {
        let ctes = cte_names(statement);
        names.extend(
            table_references(statement)
                .into_iter()
                .filter(|name| !ctes.contains(name)),
        );
    }
    names.into_iter().collect()
}

/// Key for a configured table name. Bare parts fold to lower case the way
/// PostgreSQL folds them; quoted parts keep their exact spelling.
fn normalize_identifier(name: &str) -> String {
    name.trim()
        .split('.')
        .map(|part| {
            let part = part.trim();
            let quoted = part.len() >= 2
                && ((part.starts_with('"') && part.ends_with('"'))
                    || (part.starts_with('`') && part.ends_with('`')));
            if quoted {
                part[1..part.len() - 1].to_string()
            } else {
                part.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Same key for an identifier token.
fn identifier_key(token: &Token) -> String {
    match token.kind {
        TokenKind::QuotedIdent => token.text.clone(),
        _ => token.text.to_lowercase(),
    }
}

/// Reads `name[.name...]` starting at `start`. Returns the key and the index
/// after the last part.
fn read_qualified_name(tokens: &[Token], start: usize) -> (String, usize) {
    let mut parts = vec![identifier_key(&tokens[start])];
    let mut j = start + 1;
    while tokens.get(j).map(|t| t.is_symbol('.')).unwrap_or(false)
        && tokens.get(j + 1).map(|t| t.is_identifier()).unwrap_or(false)
    {
        parts.push(identifier_key(&tokens[j + 1]));
        j += 2;
    }
    (parts.join("."), j)
}

fn first_keyword(tokens: &[Token], from: usize) -> Option<(usize, &Token)> {
    tokens
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, t)| !t.is_symbol('('))
}

fn check_statement_kind(tokens: &[Token]) -> Result<(), SqlValidationError> {
    let Some((idx, leading)) = first_keyword(tokens, 0) else {
        return Err(disallowed("(empty)"));
    };

    if leading.is_word("SELECT") {
        return Ok(());
    }

    if leading.is_word("WITH") {
        let (_, end) = parse_with_clause(tokens, idx);
        return match end.and_then(|after| first_keyword(tokens, after)) {
            Some((_, t)) if t.is_word("SELECT") => Ok(()),
            Some((_, t)) => Err(SqlValidationError::new(
                ValidationErrorKind::DisallowedStatement,
                format!("WITH must end in a SELECT, found '{}'", t.text.to_uppercase()),
            )),
            None => Err(SqlValidationError::new(
                ValidationErrorKind::DisallowedStatement,
                "WITH clause does not end in a SELECT",
            )),
        };
    }

    Err(disallowed(&leading.text))
}

fn disallowed(found: &str) -> SqlValidationError {
    SqlValidationError::new(
        ValidationErrorKind::DisallowedStatement,
        format!(
            "Only SELECT or WITH ... SELECT statements are allowed, found '{}'",
            found.to_uppercase()
        ),
    )
}

/// Parses `WITH [RECURSIVE] name [(cols)] AS [[NOT] MATERIALIZED] (...) [, ...]`
/// starting at the `WITH` token. Returns the CTE names and the index right
/// after the list, or `None` when the list is malformed.
fn parse_with_clause(tokens: &[Token], with_idx: usize) -> (Vec<String>, Option<usize>) {
    let mut names = Vec::new();
    let mut j = with_idx + 1;
    if tokens.get(j).map(|t| t.is_word("RECURSIVE")).unwrap_or(false) {
        j += 1;
    }

    loop {
        let Some(name) = tokens.get(j).filter(|t| t.is_identifier()) else {
            return (names, None);
        };
        j += 1;

        if tokens.get(j).map(|t| t.is_symbol('(')).unwrap_or(false) {
            j = matching_paren(tokens, j) + 1;
        }
        if !tokens.get(j).map(|t| t.is_word("AS")).unwrap_or(false) {
            return (names, None);
        }
        j += 1;
        if tokens.get(j).map(|t| t.is_word("NOT")).unwrap_or(false) {
            j += 1;
        }
        if tokens.get(j).map(|t| t.is_word("MATERIALIZED")).unwrap_or(false) {
            j += 1;
        }
        if !tokens.get(j).map(|t| t.is_symbol('(')).unwrap_or(false) {
            return (names, None);
        }

        names.push(identifier_key(name));
        j = matching_paren(tokens, j) + 1;

        if tokens.get(j).map(|t| t.is_symbol(',')).unwrap_or(false) {
            j += 1;
            continue;
        }
        return (names, Some(j));
    }
}

/// CTE names declared anywhere in the statement, nested scopes included.
fn cte_names(tokens: &[Token]) -> HashSet<String> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_word("WITH"))
        .flat_map(|(idx, _)| parse_with_clause(tokens, idx).0)
        .collect()
}

/// Scan state for one parenthesis level.
#[derive(Debug, Clone, Copy, Default)]
struct Level {
    /// `FROM` here is an argument separator, as in `EXTRACT(YEAR FROM d)`.
    argument_list: bool,
    /// Inside a FROM list: a comma or JOIN starts another relation.
    from_list: bool,
}

/// Base relations named by FROM lists (commas, JOINs and parenthesised joins
/// included), `INTO` targets and DML targets. Table functions, derived
/// tables and aliases are not recorded.
fn table_references(tokens: &[Token]) -> Vec<String> {
    let mut refs = Vec::new();
    let mut levels = vec![Level::default()];
    // The next identifier names a relation.
    let mut expect_relation = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        if token.is_symbol('(') {
            if expect_relation && !opens_subquery(tokens, i) {
                // (a CROSS JOIN b): the inner names are relations too.
                levels.push(Level {
                    argument_list: false,
                    from_list: true,
                });
            } else {
                let argument_list = i > 0
                    && FROM_ARGUMENT_FUNCTIONS
                        .iter()
                        .any(|f| tokens[i - 1].is_word(f));
                levels.push(Level {
                    argument_list,
                    from_list: false,
                });
                expect_relation = false;
            }
            i += 1;
            continue;
        }
        if token.is_symbol(')') {
            if levels.len() > 1 {
                levels.pop();
            }
            expect_relation = false;
            i += 1;
            continue;
        }

        if expect_relation {
            if RELATION_PREFIXES.iter().any(|w| token.is_word(w)) {
                i += 1;
                continue;
            }
            expect_relation = false;
            if token.is_identifier() {
                let (name, next) = read_qualified_name(tokens, i);
                // A name followed by `(` is a table function.
                if !tokens.get(next).map(|t| t.is_symbol('(')).unwrap_or(false) {
                    refs.push(name);
                }
                i = next;
                continue;
            }
        }

        let Some(level) = levels.last_mut() else {
            break;
        };
        if token.is_word("FROM") {
            // IS [NOT] DISTINCT FROM
            let distinct = i > 0 && tokens[i - 1].is_word("DISTINCT");
            if !level.argument_list && !distinct {
                level.from_list = true;
                expect_relation = true;
            }
        } else if token.is_word("JOIN") {
            level.from_list = true;
            expect_relation = true;
        } else if token.is_word("INTO") {
            expect_relation = true;
        } else if token.is_symbol(',') {
            expect_relation = level.from_list;
        } else if token.kind == TokenKind::Word
            && FROM_LIST_END.contains(&token.upper().as_str())
        {
            level.from_list = false;
        }
        i += 1;
    }

    refs
}

/// Whether the parenthesis at `open` starts a query rather than a join.
fn opens_subquery(tokens: &[Token], open: usize) -> bool {
    match first_keyword(tokens, open) {
        Some((_, t)) => {
            t.is_word("SELECT") || t.is_word("WITH") || t.is_word("VALUES") || t.is_word("TABLE")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(["employees", "departments", "sales", "projects"])
    }

    fn kind_of(sql: &str) -> ValidationErrorKind {
        validator().validate(sql).unwrap_err().kind
    }

    #[test]
    fn test_accepts_simple_select() {
        let validated = validator()
            .validate("SELECT name, salary FROM employees WHERE salary > 50000")
            .unwrap();
        assert_eq!(
            validated.sql(),
            "SELECT name, salary FROM employees WHERE salary > 50000"
        );
        assert_eq!(validated.tables(), &["employees".to_string()]);
    }

    #[test]
    fn test_strips_trailing_semicolon_and_comment() {
        let validated = validator()
            .validate("SELECT COUNT(*) FROM employees; -- total")
            .unwrap();
        assert_eq!(validated.sql(), "SELECT COUNT(*) FROM employees");
    }

    #[test]
    fn test_accepts_fenced_answer() {
        let raw = "Here you go:\n```sql\nSELECT d.name FROM departments d\n```";
        assert_eq!(
            validator().validate(raw).unwrap().sql(),
            "SELECT d.name FROM departments d"
        );
    }

    #[test]
    fn test_rejects_non_select_statements() {
        assert_eq!(kind_of("DROP TABLE employees"), ValidationErrorKind::DisallowedStatement);
        assert_eq!(
            kind_of("UPDATE employees SET salary = 0"),
            ValidationErrorKind::DisallowedStatement
        );
        assert_eq!(kind_of("I don't know."), ValidationErrorKind::DisallowedStatement);
        assert_eq!(kind_of(""), ValidationErrorKind::DisallowedStatement);
    }

    #[test]
    fn test_with_must_end_in_select() {
        let sql = "WITH doomed AS (SELECT id FROM employees) DELETE FROM employees WHERE id IN (SELECT id FROM doomed)";
        assert_eq!(kind_of(sql), ValidationErrorKind::DisallowedStatement);
    }

    #[test]
    fn test_accepts_cte_and_exempts_its_name() {
        let sql = "WITH RECURSIVE top_paid (id, total) AS MATERIALIZED (SELECT id, salary FROM employees), depts AS (SELECT * FROM departments) SELECT * FROM top_paid JOIN depts ON true";
        let validated = validator().validate(sql).unwrap();
        assert_eq!(
            validated.tables(),
            &["departments".to_string(), "employees".to_string()]
        );
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert_eq!(
            kind_of("SELECT * FROM employees; DELETE FROM employees"),
            ValidationErrorKind::MultipleStatements
        );
        assert_eq!(
            kind_of("SELECT 1; SELECT 2"),
            ValidationErrorKind::MultipleStatements
        );
    }

    #[test]
    fn test_semicolon_inside_literal_is_not_a_separator() {
        assert!(validator()
            .validate("SELECT name FROM employees WHERE name = 'a; DROP TABLE x'")
            .is_ok());
    }

    #[test]
    fn test_rejects_unknown_table() {
        let err = validator()
            .validate("SELECT * FROM salaries_secret")
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownTable);
        assert!(err.message.contains("salaries_secret"));
    }

    #[test]
    fn test_unknown_table_in_join_and_comma_list() {
        assert_eq!(
            kind_of("SELECT * FROM employees e JOIN pg_shadow p ON true"),
            ValidationErrorKind::UnknownTable
        );
        assert_eq!(
            kind_of("SELECT * FROM employees e, users u"),
            ValidationErrorKind::UnknownTable
        );
    }

    #[test]
    fn test_unknown_table_in_subquery() {
        assert_eq!(
            kind_of("SELECT * FROM employees WHERE id IN (SELECT id FROM admins)"),
            ValidationErrorKind::UnknownTable
        );
    }

    #[test]
    fn test_unquoted_names_fold_and_quoted_names_keep_case() {
        assert!(validator().validate("SELECT * FROM EMPLOYEES").is_ok());
        assert!(validator().validate(r#"SELECT * FROM "employees""#).is_ok());
        assert!(validator().validate("SELECT * FROM public.employees").is_ok());
        assert!(validator().validate(r#"SELECT * FROM "public"."employees""#).is_ok());
        // "Employees" is a different relation from employees in PostgreSQL.
        assert_eq!(
            kind_of(r#"SELECT * FROM "Employees""#),
            ValidationErrorKind::UnknownTable
        );
        assert_eq!(
            kind_of("SELECT * FROM hr.employees"),
            ValidationErrorKind::UnknownTable
        );
    }

    #[test]
    fn test_quoted_allowlist_entries_keep_case() {
        let v = SqlValidator::new([r#""Orders""#, "Customers"]);
        assert!(v.validate(r#"SELECT * FROM "Orders""#).is_ok());
        assert!(v.validate("SELECT * FROM customers").is_ok());
        assert_eq!(
            v.validate("SELECT * FROM orders").unwrap_err().kind,
            ValidationErrorKind::UnknownTable
        );
        assert_eq!(v.allowed_tables(), vec!["Orders".to_string(), "customers".to_string()]);
    }

    #[test]
    fn test_cte_name_exemption_follows_quoting() {
        assert!(validator()
            .validate(r#"WITH "Top" AS (SELECT * FROM employees) SELECT * FROM "Top""#)
            .is_ok());
        assert_eq!(
            kind_of(r#"WITH "Top" AS (SELECT * FROM employees) SELECT * FROM top"#),
            ValidationErrorKind::UnknownTable
        );
    }

    #[test]
    fn test_unknown_table_inside_parenthesised_join() {
        let v = SqlValidator::new(["employees", "departments"]);
        let err = v
            .validate("SELECT * FROM (pg_authid CROSS JOIN employees)")
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownTable);
        assert!(err.message.contains("pg_authid"));
        assert_eq!(
            v.validate("SELECT * FROM ((employees e JOIN departments d ON true) JOIN pg_authid a ON true)")
                .unwrap_err()
                .kind,
            ValidationErrorKind::UnknownTable
        );
        assert!(v
            .validate("SELECT * FROM (employees e JOIN departments d ON e.dept_id = d.id)")
            .is_ok());
    }

    #[test]
    fn test_unknown_table_after_join_condition_in_comma_list() {
        let v = SqlValidator::new(["employees", "departments"]);
        let err = v
            .validate("SELECT * FROM employees e JOIN departments d ON true, pg_authid a")
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownTable);
        assert!(err.message.contains("pg_authid"));
    }

    #[test]
    fn test_unknown_table_after_tablesample_in_comma_list() {
        let v = SqlValidator::new(["employees", "departments"]);
        let err = v
            .validate("SELECT * FROM employees TABLESAMPLE BERNOULLI (10), pg_authid")
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownTable);
        assert!(err.message.contains("pg_authid"));
    }

    #[test]
    fn test_join_using_list_and_derived_table_aliases_are_not_tables() {
        let v = SqlValidator::new(["employees", "departments"]);
        let validated = v
            .validate("SELECT * FROM employees e JOIN departments d USING (dept_id, region) , LATERAL (SELECT 1) AS x(one) WHERE e.id IN (1, 2)")
            .unwrap();
        assert_eq!(
            validated.tables(),
            &["departments".to_string(), "employees".to_string()]
        );
    }

    #[test]
    fn test_from_inside_function_arguments_is_ignored() {
        let sql = "SELECT EXTRACT(YEAR FROM hire_date), SUBSTRING(name FROM 1 FOR 3), TRIM(BOTH ' ' FROM name) FROM employees WHERE manager_id IS DISTINCT FROM 3";
        assert!(validator().validate(sql).is_ok());
    }

    #[test]
    fn test_table_functions_and_derived_tables() {
        assert!(validator()
            .validate("SELECT g FROM generate_series(1, 3) AS g")
            .is_ok());
        assert!(validator()
            .validate("SELECT t.n FROM (SELECT COUNT(*) AS n FROM sales) t, projects p")
            .is_ok());
    }

    #[test]
    fn test_forbidden_keyword_in_subquery() {
        let sql = "WITH gone AS (DELETE FROM employees RETURNING *) SELECT * FROM gone";
        assert_eq!(kind_of(sql), ValidationErrorKind::ForbiddenKeyword);
    }

    #[test]
    fn test_row_locking_is_forbidden() {
        assert_eq!(
            kind_of("SELECT * FROM employees FOR UPDATE"),
            ValidationErrorKind::ForbiddenKeyword
        );
        assert_eq!(
            kind_of("SELECT * FROM employees FOR SHARE"),
            ValidationErrorKind::ForbiddenKeyword
        );
        assert_eq!(
            kind_of("SELECT * FROM employees FOR NO KEY UPDATE"),
            ValidationErrorKind::ForbiddenKeyword
        );
    }

    #[test]
    fn test_statement_verbs_as_column_names_are_allowed() {
        for sql in [
            "SELECT comment FROM employees",
            "SELECT e.lock, e.security, e.refresh FROM employees e",
            "SELECT COUNT(comment) FROM employees WHERE comment IS NOT NULL",
        ] {
            assert!(validator().validate(sql).is_ok(), "{}", sql);
        }
    }

    #[test]
    fn test_statement_verb_as_cte_body_is_forbidden() {
        assert_eq!(
            kind_of("WITH m AS (MERGE INTO employees USING departments ON true WHEN MATCHED THEN DO NOTHING) SELECT 1"),
            ValidationErrorKind::ForbiddenKeyword
        );
        assert_eq!(
            kind_of("COPY employees TO STDOUT"),
            ValidationErrorKind::DisallowedStatement
        );
    }

    #[test]
    fn test_keywords_in_literals_and_comments_are_ignored() {
        let sql = "SELECT name /* delete later */ FROM employees WHERE note = 'DROP everything'";
        assert!(validator().validate(sql).is_ok());
    }

    #[test]
    fn test_empty_allowlist_rejects_every_table() {
        let empty = SqlValidator::new(Vec::<String>::new());
        assert_eq!(
            empty.validate("SELECT * FROM employees").unwrap_err().kind,
            ValidationErrorKind::UnknownTable
        );
        assert!(empty.validate("SELECT 1").is_ok());
    }

    #[test]
    fn test_select_into_target_must_be_allowlisted() {
        assert_eq!(
            kind_of("SELECT * INTO backup_copy FROM employees"),
            ValidationErrorKind::UnknownTable
        );
    }

    #[test]
    fn test_parenthesised_select() {
        assert!(validator()
            .validate("(SELECT name FROM employees) UNION (SELECT name FROM departments)")
            .is_ok());
    }

    #[test]
    fn test_check_read_only_ignores_allowlist() {
        assert_eq!(
            check_read_only("SELECT * FROM anything_at_all;").unwrap(),
            "SELECT * FROM anything_at_all"
        );
        assert_eq!(
            check_read_only("DELETE FROM employees").unwrap_err().kind,
            ValidationErrorKind::DisallowedStatement
        );
        assert_eq!(
            check_read_only("SELECT 1; SELECT 2").unwrap_err().kind,
            ValidationErrorKind::MultipleStatements
        );
    }

    #[test]
    fn test_validation_is_deterministic() {
        let v = validator();
        for sql in [
            "SELECT * FROM employees",
            "DROP TABLE employees;",
            "SELECT * FROM employees WHERE id = (SELECT 1); DELETE FROM employees;",
            "SELECT * FROM nope",
        ] {
            assert_eq!(v.validate(sql), v.validate(sql));
        }
    }

    #[test]
    fn test_referenced_tables_helper() {
        assert_eq!(
            referenced_tables(
                "WITH x AS (SELECT * FROM sales) SELECT * FROM x JOIN employees e ON e.id = x.employee_id"
            ),
            vec!["employees".to_string(), "sales".to_string()]
        );
    }
}
