//! Minimal PostgreSQL-flavoured tokenizer.
//!
//! Only what the validator needs: words, quoted identifiers, literals,
//! symbols and statement separators. Comments are dropped. Literal contents
//! never surface as words, so keywords inside strings are invisible to the
//! keyword checks.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// `"..."` or `` `...` `` identifier, stored without the quotes.
    QuotedIdent,
    /// `'...'`, `E'...'` or `$tag$...$tag$` literal.
    StringLit,
    Number,
    /// `$1`-style bind parameter.
    Param,
    Semicolon,
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte range in the source text.
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let byte_at = |idx: usize| chars.get(idx).map(|(b, _)| *b).unwrap_or(sql.len());

    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let (start, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, ch)| *ch);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // -- line comment
        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        // /* block comment */, nestable in PostgreSQL
        if c == '/' && next == Some('*') {
            let mut depth = 1;
            i += 2;
            while i < chars.len() && depth > 0 {
                let cur = chars[i].1;
                let after = chars.get(i + 1).map(|(_, ch)| *ch);
                if cur == '/' && after == Some('*') {
                    depth += 1;
                    i += 2;
                } else if cur == '*' && after == Some('/') {
                    depth -= 1;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            continue;
        }

        if c == '\'' {
            let (text, next_i) = read_quoted(&chars, i, '\'', false);
            tokens.push(Token {
                kind: TokenKind::StringLit,
                text,
                start,
                end: byte_at(next_i),
            });
            i = next_i;
            continue;
        }

        if c == '"' || c == '`' {
            let (text, next_i) = read_quoted(&chars, i, c, false);
            tokens.push(Token {
                kind: TokenKind::QuotedIdent,
                text,
                start,
                end: byte_at(next_i),
            });
            i = next_i;
            continue;
        }

        if c == '$' {
            if next.map(|n| n.is_ascii_digit()).unwrap_or(false) {
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Param,
                    text: slice(&chars, i, j),
                    start,
                    end: byte_at(j),
                });
                i = j;
                continue;
            }
            if let Some((text, next_i)) = read_dollar_quoted(&chars, i) {
                tokens.push(Token {
                    kind: TokenKind::StringLit,
                    text,
                    start,
                    end: byte_at(next_i),
                });
                i = next_i;
                continue;
            }
        }

        if is_ident_start(c) {
            let mut j = i + 1;
            while j < chars.len() && is_ident_continue(chars[j].1) {
                j += 1;
            }
            let word = slice(&chars, i, j);

            // E'...' escape strings honour backslashes.
            if word.eq_ignore_ascii_case("e") && chars.get(j).map(|(_, ch)| *ch) == Some('\'') {
                let (text, next_i) = read_quoted(&chars, j, '\'', true);
                tokens.push(Token {
                    kind: TokenKind::StringLit,
                    text,
                    start,
                    end: byte_at(next_i),
                });
                i = next_i;
                continue;
            }

            tokens.push(Token {
                kind: TokenKind::Word,
                text: word,
                start,
                end: byte_at(j),
            });
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].1.is_ascii_alphanumeric() || chars[j].1 == '.') {
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: slice(&chars, i, j),
                start,
                end: byte_at(j),
            });
            i = j;
            continue;
        }

        let kind = if c == ';' {
            TokenKind::Semicolon
        } else {
            TokenKind::Symbol(c)
        };
        tokens.push(Token {
            kind,
            text: c.to_string(),
            start,
            end: byte_at(i + 1),
        });
        i += 1;
    }

    tokens
}

fn slice(chars: &[(usize, char)], from: usize, to: usize) -> String {
    chars[from..to].iter().map(|(_, c)| *c).collect()
}

/// Reads a quoted run starting at `open` (the opening quote). Doubled quotes
/// are escapes. An unterminated literal swallows the rest of the input.
fn read_quoted(
    chars: &[(usize, char)],
    open: usize,
    quote: char,
    backslash_escapes: bool,
) -> (String, usize) {
    let mut out = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if backslash_escapes && c == '\\' {
            if let Some((_, escaped)) = chars.get(i + 1) {
                out.push(*escaped);
            }
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1).map(|(_, ch)| *ch) == Some(quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return (out, i + 1);
        }
        out.push(c);
        i += 1;
    }
    (out, chars.len())
}

/// `$tag$ ... $tag$` with an optional tag. Returns `None` when the opening
/// delimiter is not well formed.
fn read_dollar_quoted(chars: &[(usize, char)], open: usize) -> Option<(String, usize)> {
    let mut j = open + 1;
    while j < chars.len() && chars[j].1 != '$' {
        let c = chars[j].1;
        let valid = if j == open + 1 {
            is_ident_start(c)
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !valid {
            return None;
        }
        j += 1;
    }
    if j >= chars.len() {
        return None;
    }
    let delimiter: Vec<char> = chars[open..=j].iter().map(|(_, c)| *c).collect();
    let body_start = j + 1;

    let mut k = body_start;
    while k < chars.len() {
        if chars[k].1 == '$'
            && k + delimiter.len() <= chars.len()
            && chars[k..k + delimiter.len()]
                .iter()
                .map(|(_, c)| *c)
                .eq(delimiter.iter().copied())
        {
            return Some((slice(chars, body_start, k), k + delimiter.len()));
        }
        k += 1;
    }
    Some((slice(chars, body_start, chars.len()), chars.len()))
}

/// Splits a token stream at top-level `;` separators, dropping empty
/// statements.
pub fn split_tokens(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(|t| t.kind == TokenKind::Semicolon)
        .filter(|group| !group.is_empty())
        .collect()
}

/// Splits a script into statement texts, ignoring separators inside
/// literals and comments.
pub fn split_statements(sql: &str) -> Vec<String> {
    let tokens = tokenize(sql);
    split_tokens(&tokens)
        .into_iter()
        .map(|group| {
            let start = group[0].start;
            let end = group[group.len() - 1].end;
            sql[start..end].to_string()
        })
        .collect()
}

/// Index of the `)` matching the `(` at `open`, or the last index when
/// the input is unbalanced.
pub fn matching_paren(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0i32;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth -= 1;
            if depth == 0 {
                return idx;
            }
        }
    }
    tokens.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_inside_strings_are_literals() {
        let tokens = tokenize("SELECT 'DROP TABLE x; --' AS note");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, "DROP TABLE x; --");
    }

    #[test]
    fn test_doubled_quote_escape() {
        let tokens = tokenize("SELECT 'it''s'");
        assert_eq!(tokens[1].text, "it's");
    }

    #[test]
    fn test_escape_string_backslash() {
        let tokens = tokenize(r"SELECT E'a\'; DELETE' FROM t");
        assert_eq!(tokens[1].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, "a'; DELETE");
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Semicolon));
    }

    #[test]
    fn test_dollar_quoted_body() {
        let tokens = tokenize("SELECT $fn$ DELETE; $fn$, $1");
        assert_eq!(tokens[1].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, " DELETE; ");
        assert_eq!(tokens[3].kind, TokenKind::Param);
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(
            kinds("SELECT /* a /* nested */ b */ 1 -- trailing ; comment\n"),
            vec![TokenKind::Word, TokenKind::Number]
        );
    }

    #[test]
    fn test_quoted_identifier() {
        let tokens = tokenize(r#"SELECT "Order""Id" FROM "Orders""#);
        assert_eq!(tokens[1].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens[1].text, "Order\"Id");
        assert_eq!(tokens[3].text, "Orders");
    }

    #[test]
    fn test_split_statements_ignores_literal_separators() {
        let parts = split_statements("SELECT ';' ; SELECT 2;\n-- done\n");
        assert_eq!(parts, vec!["SELECT ';'".to_string(), "SELECT 2".to_string()]);
    }

    #[test]
    fn test_unicode_words() {
        let tokens = tokenize("SELECT 직원 FROM employees");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "직원");
    }
}
