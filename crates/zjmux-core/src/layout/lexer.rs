//! Tokenizer for the KDL subset zellij emits from `dump-layout`.
//!
//! Never fails: unterminated strings and comments run to end of input,
//! anything unrecognised becomes part of a bare word.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Bare identifier, number, or keyword (`true`, `#true`, `pane`, ...).
    Word(String),
    /// Quoted or raw string, escapes resolved.
    Str(String),
    Eq,
    Open,
    Close,
    /// Newline or `;`.
    Terminator,
    /// `/-` node/argument comment.
    SlashDash,
}

pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                tokens.push(Token::Terminator);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Terminator);
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '{' => {
                tokens.push(Token::Open);
                i += 1;
            }
            '}' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '"' => {
                let (s, next) = quoted(&chars, i + 1);
                tokens.push(Token::Str(s));
                i = next;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i = block_comment_end(&chars, i + 2);
            }
            '/' if chars.get(i + 1) == Some(&'-') => {
                tokens.push(Token::SlashDash);
                i += 2;
            }
            '\\' => {
                // Line continuation: swallow up to and including the newline.
                i += 1;
                while i < chars.len() && chars[i] != '\n' && chars[i].is_whitespace() {
                    i += 1;
                }
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
            }
            'r' if raw_string_start(&chars, i).is_some() => {
                let hashes = raw_string_start(&chars, i).unwrap_or(0);
                let (s, next) = raw(&chars, i + 1 + hashes + 1, hashes);
                tokens.push(Token::Str(s));
                i = next;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_word_break(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
        }
    }

    tokens
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '=' | ';' | '"')
}

/// Read a `"..."` string body starting just past the opening quote.
fn quoted(chars: &[char], mut i: usize) -> (String, usize) {
    let mut out = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return (out, i + 1),
            '\\' if i + 1 < chars.len() => {
                match chars[i + 1] {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                }
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    (out, i)
}

/// Number of `#` in a raw string opener at `i` (`r"`, `r#"`, ...), if any.
fn raw_string_start(chars: &[char], i: usize) -> Option<usize> {
    // Only when `r` starts a token: a bare word like `layer` must not be split.
    if i > 0 && !is_word_break(chars[i - 1]) {
        return None;
    }
    let mut j = i + 1;
    while chars.get(j) == Some(&'#') {
        j += 1;
    }
    (chars.get(j) == Some(&'"')).then_some(j - i - 1)
}

fn raw(chars: &[char], mut i: usize, hashes: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() {
        if chars[i] == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
            return (chars[start..i].iter().collect(), i + 1 + hashes);
        }
        i += 1;
    }
    (chars[start..].iter().collect(), i)
}

fn block_comment_end(chars: &[char], mut i: usize) -> usize {
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
