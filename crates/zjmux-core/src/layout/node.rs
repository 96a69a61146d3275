//! Recursive-descent parser from tokens to a KDL node tree.

use super::lexer::{Token, tokenize};

/// Blocks nested deeper than this are skipped wholesale.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub args: Vec<String>,
    pub props: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Boolean property; accepts KDL v1 `true` and v2 `#true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.prop(key), Some("true" | "#true"))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }
}

/// Parse a document into its top-level nodes.
pub fn parse_document(input: &str) -> Vec<Node> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
    };
    let mut nodes = Vec::new();
    // Stray closing braces at top level are ignored rather than ending input.
    loop {
        nodes.extend(parser.block(0));
        if !parser.eat(&Token::Close) {
            break;
        }
    }
    nodes
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parse sibling nodes until a `}` (left unconsumed) or end of input.
    fn block(&mut self, depth: usize) -> Vec<Node> {
        let mut nodes = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Close => break,
                Token::Terminator | Token::Eq => self.pos += 1,
                Token::Open => {
                    // Anonymous block: parse and discard.
                    self.pos += 1;
                    self.children(depth + 1);
                }
                Token::SlashDash => {
                    self.pos += 1;
                    while self.eat(&Token::Terminator) {}
                    let _ = self.node(depth);
                }
                Token::Word(_) | Token::Str(_) => {
                    if let Some(node) = self.node(depth) {
                        nodes.push(node);
                    }
                }
            }
        }
        nodes
    }

    /// Children block body after `{`; consumes the matching `}` if present.
    fn children(&mut self, depth: usize) -> Vec<Node> {
        if depth > MAX_DEPTH {
            self.skip_block();
            return Vec::new();
        }
        let nodes = self.block(depth);
        self.eat(&Token::Close);
        nodes
    }

    fn skip_block(&mut self) {
        let mut open = 1usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Open => open += 1,
                Token::Close => {
                    open -= 1;
                    if open == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(w)) | Some(Token::Str(w)) => {
                let v = w.clone();
                self.pos += 1;
                Some(v)
            }
            _ => None,
        }
    }

    fn node(&mut self, depth: usize) -> Option<Node> {
        let name = self.value()?;
        let mut node = Node {
            name,
            ..Default::default()
        };
        let mut discard_next = false;

        while let Some(token) = self.peek() {
            match token {
                Token::Terminator => {
                    self.pos += 1;
                    break;
                }
                Token::Close => break,
                Token::Open => {
                    self.pos += 1;
                    let children = self.children(depth + 1);
                    if !std::mem::take(&mut discard_next) {
                        node.children = children;
                    }
                    break;
                }
                Token::SlashDash => {
                    self.pos += 1;
                    discard_next = true;
                }
                Token::Eq => self.pos += 1,
                Token::Word(_) | Token::Str(_) => {
                    let Some(first) = self.value() else { break };
                    let entry = if self.eat(&Token::Eq) {
                        self.value().map(|v| (Some(first.clone()), v))
                    } else {
                        Some((None, first))
                    };
                    if std::mem::take(&mut discard_next) {
                        continue;
                    }
                    match entry {
                        Some((Some(key), v)) => node.props.push((key, v)),
                        Some((None, v)) => node.args.push(v),
                        None => {}
                    }
                }
            }
        }

        Some(node)
    }
}
