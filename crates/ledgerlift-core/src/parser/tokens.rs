// Token stream covering every byte of one compilation unit.
//
// Leaves of the syntax tree become tokens; whitespace and anything else
// the grammar does not cover becomes filler tokens on the hidden
// channel, so concatenating all token texts reproduces the source.

use tree_sitter::{Node, Tree};

/// Position of a token in a [`TokenStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenIndex(pub usize);

impl TokenIndex {
    pub fn next(self) -> Self {
        TokenIndex(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Significant syntax
    Default,
    /// Whitespace and comments
    Hidden,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: &'static str,
    pub start: usize,
    pub end: usize,
    pub channel: Channel,
}

impl Token {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, "line_comment" | "block_comment")
    }
}

#[derive(Debug, Clone)]
pub struct TokenStream {
    text: String,
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn from_tree(text: String, tree: &Tree) -> Self {
        let mut leaves = Vec::new();
        collect_leaves(tree.root_node(), &mut leaves);

        let mut tokens = Vec::with_capacity(leaves.len() * 2);
        let mut offset = 0;
        for leaf in leaves {
            if leaf.start < offset {
                continue;
            }
            if leaf.start > offset {
                tokens.push(filler(offset, leaf.start));
            }
            offset = leaf.end;
            tokens.push(leaf);
        }
        if offset < text.len() {
            tokens.push(filler(offset, text.len()));
        }

        Self { text, tokens }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: TokenIndex) -> Option<&Token> {
        self.tokens.get(index.0)
    }

    pub fn token_text(&self, index: TokenIndex) -> &str {
        self.get(index)
            .and_then(|t| self.text.get(t.start..t.end))
            .unwrap_or("")
    }

    /// First token of a node
    pub fn first_token(&self, node: &Node<'_>) -> TokenIndex {
        let start = node.start_byte();
        TokenIndex(self.tokens.partition_point(|t| t.start < start))
    }

    /// Last token of a node
    pub fn last_token(&self, node: &Node<'_>) -> TokenIndex {
        let end = node.end_byte();
        TokenIndex(self.tokens.partition_point(|t| t.end <= end).saturating_sub(1))
    }

    /// Nearest default-channel token before `index`
    pub fn previous_token(&self, index: TokenIndex) -> Option<TokenIndex> {
        (0..index.0.min(self.tokens.len()))
            .rev()
            .find(|&i| self.tokens[i].channel == Channel::Default)
            .map(TokenIndex)
    }

    /// Comments between `index` and the previous default-channel token
    pub fn comments_before(&self, index: TokenIndex) -> Vec<&str> {
        let mut comments = Vec::new();
        for i in (0..index.0.min(self.tokens.len())).rev() {
            let token = &self.tokens[i];
            if token.channel == Channel::Default {
                break;
            }
            if token.is_comment() {
                comments.push(self.token_text(TokenIndex(i)));
            }
        }
        comments.reverse();
        comments
    }

    /// Leading whitespace of the line the token starts on
    pub fn line_indent(&self, index: TokenIndex) -> &str {
        let Some(token) = self.get(index) else {
            return "";
        };
        let line_start = self.text[..token.start]
            .rfind(['\n', '\r'])
            .map_or(0, |i| i + 1);
        let line = &self.text[line_start..token.start];
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..width]
    }
}

fn filler(start: usize, end: usize) -> Token {
    Token {
        kind: "trivia",
        start,
        end,
        channel: Channel::Hidden,
    }
}

fn collect_leaves(root: Node<'_>, out: &mut Vec<Token>) {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.child_count() == 0 {
            if node.end_byte() > node.start_byte() {
                let comment = matches!(node.kind(), "line_comment" | "block_comment");
                out.push(Token {
                    kind: node.kind(),
                    start: node.start_byte(),
                    end: node.end_byte(),
                    channel: if comment { Channel::Hidden } else { Channel::Default },
                });
            }
        } else if cursor.goto_first_child() {
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;

    #[test]
    fn tokens_cover_source() {
        let text = "package a;\n\n// note\nclass A { int x; }\n";
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", text.to_string()).unwrap();
        let tokens = source.tokens();

        let rebuilt: String = (0..tokens.len())
            .map(|i| tokens.token_text(TokenIndex(i)))
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn comments_and_indent_are_found() {
        let text = "class A {\n\t/* all references */\n\tprivate B b;\n}\n";
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", text.to_string()).unwrap();
        let tokens = source.tokens();

        let private = (0..tokens.len())
            .map(TokenIndex)
            .find(|&i| tokens.token_text(i) == "private")
            .unwrap();
        assert_eq!(tokens.comments_before(private), vec!["/* all references */"]);
        assert_eq!(tokens.line_indent(private), "\t");
        assert_eq!(tokens.token_text(tokens.previous_token(private).unwrap()), "{");
    }
}
