//! Output column names of a SELECT template.
//!
//! Only the outermost select list is inspected. Each item must be a plain or
//! qualified column reference, or carry an alias (`expr as name` or
//! `expr name`); anything else leaves the order undetermined. Names are kept
//! as written, so `b.id as bookId` yields `bookId`.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Literal,
    Open,
    Close,
    Comma,
    Dot,
    Star,
    Semicolon,
    Other,
}

/// Stand-in for everything inside a parenthesised group.
static NESTED: Token = Token::Literal;

/// Words that end an expression but never name a column.
const NOT_ALIASES: &[&str] = &[
    "and", "or", "not", "is", "null", "true", "false", "end", "then", "else", "when", "case",
    "distinct", "all", "select",
];

/// Column names produced by the outermost SELECT of `sql`, in order, or
/// `None` when any item has no derivable name.
///
/// # Example
///
/// ```rust
/// use copyexport::sql::select_columns;
///
/// assert_eq!(
///     select_columns("select b.id as bookId, title, count(*) total from b group by 1, 2"),
///     Some(vec!["bookId".to_string(), "title".to_string(), "total".to_string()])
/// );
/// assert_eq!(select_columns("select * from b"), None);
/// ```
pub fn select_columns(sql: &str) -> Option<Vec<String>> {
    let tokens = tokenize(sql);
    let start = tokens
        .iter()
        .position(|(depth, t)| *depth == 0 && is_word(t, "select"))?;

    let mut items: Vec<Vec<&Token>> = vec![Vec::new()];
    let mut rest = tokens[start + 1..].iter().peekable();

    while let Some((depth, token)) = rest.peek() {
        if *depth == 0 && (is_word(token, "distinct") || is_word(token, "all")) {
            rest.next();
            if let Some((0, t)) = rest.peek() {
                if is_word(t, "on") {
                    rest.next();
                    skip_group(&mut rest);
                }
            }
        } else {
            break;
        }
    }

    for (depth, token) in rest {
        if *depth == 0 {
            match token {
                t if is_word(t, "from") => break,
                Token::Semicolon => break,
                Token::Comma => {
                    items.push(Vec::new());
                    continue;
                }
                _ => {}
            }
            if let Some(item) = items.last_mut() {
                item.push(token);
            }
        } else if let Some(item) = items.last_mut() {
            if !matches!(item.last(), Some(Token::Literal)) {
                item.push(&NESTED);
            }
        }
    }

    items.iter().map(|item| item_name(item)).collect()
}

fn item_name(item: &[&Token]) -> Option<String> {
    let last = *item.last()?;
    let name = match last {
        Token::Word(w) if !is_reserved(w) => w.clone(),
        Token::Quoted(q) => q.clone(),
        _ => return None,
    };
    if item.len() == 1 {
        return Some(name);
    }

    match item[item.len() - 2] {
        Token::Word(w) if w.eq_ignore_ascii_case("as") => Some(name),
        Token::Dot if is_qualified_reference(item) => Some(name),
        Token::Close | Token::Literal | Token::Quoted(_) => Some(name),
        Token::Word(w) if !is_reserved(w) => Some(name),
        _ => None,
    }
}

/// `a.b` or `a.b.c`, optionally quoted.
fn is_qualified_reference(item: &[&Token]) -> bool {
    item.iter().enumerate().all(|(i, t)| match t {
        Token::Dot => i % 2 == 1,
        Token::Word(_) | Token::Quoted(_) => i % 2 == 0,
        _ => false,
    })
}

fn skip_group<'a, I>(tokens: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = &'a (usize, Token)>,
{
    if !matches!(tokens.peek(), Some((0, Token::Open))) {
        return;
    }
    tokens.next();
    for (depth, token) in tokens.by_ref() {
        if *depth == 0 && *token == Token::Close {
            break;
        }
    }
}

fn is_word(token: &Token, word: &str) -> bool {
    matches!(token, Token::Word(w) if w.eq_ignore_ascii_case(word))
}

fn is_reserved(word: &str) -> bool {
    NOT_ALIASES.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Tokens paired with their parenthesis depth. Parentheses carry the depth
/// of the group they open or close.
fn tokenize(sql: &str) -> Vec<(usize, Token)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '\'' => {
                i = quoted_end(&chars, i, '\'');
                tokens.push((depth, Token::Literal));
            }
            '"' => {
                let end = quoted_end(&chars, i, '"');
                let inner: String = chars[i + 1..end.saturating_sub(1).max(i + 1)]
                    .iter()
                    .collect();
                tokens.push((depth, Token::Quoted(inner.replace("\"\"", "\""))));
                i = end;
            }
            '(' => {
                tokens.push((depth, Token::Open));
                depth += 1;
                i += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                tokens.push((depth, Token::Close));
                i += 1;
            }
            ',' => {
                tokens.push((depth, Token::Comma));
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                tokens.push((depth, Token::Dot));
                i += 1;
            }
            '*' => {
                tokens.push((depth, Token::Star));
                i += 1;
            }
            ';' => {
                tokens.push((depth, Token::Semicolon));
                i += 1;
            }
            ':' if chars.get(i + 1).is_some_and(|n| n.is_alphabetic() || *n == '_')
                && (i == 0 || chars[i - 1] != ':') =>
            {
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((depth, Token::Literal));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push((depth, Token::Word(chars[start..i].iter().collect())));
            }
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push((depth, Token::Literal));
            }
            _ => {
                tokens.push((depth, Token::Other));
                i += 1;
            }
        }
    }
    tokens
}

/// Index just past the closing `quote` of a quoted run starting at `start`.
/// A doubled quote is an escaped quote.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}
