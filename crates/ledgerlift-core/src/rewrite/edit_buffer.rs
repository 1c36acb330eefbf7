/*!
# Edit Buffer

Token-anchored edits over an immutable token stream.

Inserts land in slots between tokens: `insert_before(i)` and
`insert_after(i - 1)` share slot `i`. Within one slot the most recently
registered text renders first, so a pass that inserts a sorted list in
reverse order after a fixed anchor gets it back in forward order.
Replacements own a token range; inserts strictly inside a replaced range
are swallowed by it.
*/

use std::collections::{BTreeMap, HashMap};

use crate::parser::{TokenIndex, TokenStream};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("replacement of tokens {from}..={to} overlaps an earlier replacement of {prev_from}..={prev_to}")]
    Overlap {
        from: usize,
        to: usize,
        prev_from: usize,
        prev_to: usize,
    },

    #[error("token range {from}..={to} is reversed or outside a stream of {len} tokens")]
    OutOfRange { from: usize, to: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    InsertBefore,
    InsertAfter,
    Replace,
    Delete,
}

/// One staged edit
#[derive(Debug, Clone)]
pub struct Edit {
    pub anchor: TokenIndex,
    pub end: TokenIndex,
    pub kind: EditKind,
    pub text: String,
}

pub struct EditBuffer<'s> {
    tokens: &'s TokenStream,
    edits: Vec<Edit>,
    /// start -> (end, edit index)
    replaced: BTreeMap<usize, (usize, usize)>,
}

impl<'s> EditBuffer<'s> {
    pub fn new(tokens: &'s TokenStream) -> Self {
        Self {
            tokens,
            edits: Vec::new(),
            replaced: BTreeMap::new(),
        }
    }

    pub fn tokens(&self) -> &'s TokenStream {
        self.tokens
    }

    pub fn insert_before(&mut self, pos: TokenIndex, text: impl Into<String>) {
        self.edits.push(Edit {
            anchor: pos,
            end: pos,
            kind: EditKind::InsertBefore,
            text: text.into(),
        });
    }

    pub fn insert_after(&mut self, pos: TokenIndex, text: impl Into<String>) {
        self.edits.push(Edit {
            anchor: pos,
            end: pos,
            kind: EditKind::InsertAfter,
            text: text.into(),
        });
    }

    pub fn replace(
        &mut self,
        from: TokenIndex,
        to: TokenIndex,
        text: impl Into<String>,
    ) -> Result<(), EditError> {
        self.stage_range(from, to, EditKind::Replace, text.into())
    }

    pub fn delete(&mut self, from: TokenIndex, to: TokenIndex) -> Result<(), EditError> {
        self.stage_range(from, to, EditKind::Delete, String::new())
    }

    fn stage_range(
        &mut self,
        from: TokenIndex,
        to: TokenIndex,
        kind: EditKind,
        text: String,
    ) -> Result<(), EditError> {
        if from > to || to.0 >= self.tokens.len() {
            return Err(EditError::OutOfRange {
                from: from.0,
                to: to.0,
                len: self.tokens.len(),
            });
        }

        let before = self.replaced.range(..=to.0).next_back();
        if let Some((&prev_from, &(prev_to, _))) = before {
            if prev_to >= from.0 {
                return Err(EditError::Overlap {
                    from: from.0,
                    to: to.0,
                    prev_from,
                    prev_to,
                });
            }
        }

        self.replaced.insert(from.0, (to.0, self.edits.len()));
        self.edits.push(Edit {
            anchor: from,
            end: to,
            kind,
            text,
        });
        Ok(())
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Source text with every staged edit applied
    pub fn render(&self) -> String {
        let mut slots: HashMap<usize, Vec<&str>> = HashMap::new();
        for edit in &self.edits {
            let slot = match edit.kind {
                EditKind::InsertBefore => edit.anchor.0,
                EditKind::InsertAfter => edit.anchor.0 + 1,
                EditKind::Replace | EditKind::Delete => continue,
            };
            slots.entry(slot).or_default().push(&edit.text);
        }

        let len = self.tokens.len();
        let mut out = String::with_capacity(self.tokens.text().len() + 256);
        let emit_slot = |out: &mut String, slot: usize| {
            if let Some(texts) = slots.get(&slot) {
                for text in texts.iter().rev() {
                    out.push_str(text);
                }
            }
        };

        let mut i = 0;
        while i < len {
            emit_slot(&mut out, i);
            if let Some(&(end, edit)) = self.replaced.get(&i) {
                out.push_str(&self.edits[edit].text);
                i = end + 1;
                continue;
            }
            out.push_str(self.tokens.token_text(TokenIndex(i)));
            i += 1;
        }
        emit_slot(&mut out, len);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use pretty_assertions::assert_eq;

    fn index_of(tokens: &TokenStream, text: &str) -> TokenIndex {
        (0..tokens.len())
            .map(TokenIndex)
            .find(|&i| tokens.token_text(i) == text)
            .unwrap()
    }

    #[test]
    fn untouched_buffer_renders_source() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", "class A { int x; }".to_string()).unwrap();
        let buffer = EditBuffer::new(source.tokens());
        assert!(!buffer.has_pending_edits());
        assert_eq!(buffer.render(), "class A { int x; }");
    }

    #[test]
    fn later_inserts_in_a_slot_render_first() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", "class A {}".to_string()).unwrap();
        let tokens = source.tokens();
        let open = index_of(tokens, "{");

        let mut buffer = EditBuffer::new(tokens);
        buffer.insert_after(open, " c;");
        buffer.insert_after(open, " b;");
        buffer.insert_before(open.next(), " a;");
        assert_eq!(buffer.render(), "class A { a; b; c;}");
    }

    #[test]
    fn replace_swallows_inner_inserts() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser
            .parse("A.java", "class A { int f() { return 1; } }".to_string())
            .unwrap();
        let tokens = source.tokens();
        let ret = index_of(tokens, "return");
        let one = index_of(tokens, "1");
        let semi = one.next();

        let mut buffer = EditBuffer::new(tokens);
        buffer.insert_before(ret, "/*kept*/");
        buffer.insert_before(one, "/*lost*/");
        buffer.replace(ret, semi, "return 2;").unwrap();
        buffer.insert_after(semi, "/*after*/");
        assert_eq!(buffer.render(), "class A { int f() { /*kept*/return 2;/*after*/ } }");
    }

    #[test]
    fn overlapping_replacements_are_rejected() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", "class A { int x; }".to_string()).unwrap();
        let tokens = source.tokens();
        let int = index_of(tokens, "int");
        let x = index_of(tokens, "x");

        let mut buffer = EditBuffer::new(tokens);
        buffer.replace(int, x, "long y").unwrap();
        let err = buffer.delete(x, x.next()).unwrap_err();
        assert!(matches!(err, EditError::Overlap { .. }));

        let last = TokenIndex(tokens.len());
        assert!(matches!(
            buffer.delete(last, last),
            Err(EditError::OutOfRange { .. })
        ));
    }

    #[test]
    fn delete_removes_range() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser
            .parse("A.java", "class A { int x; int y; }".to_string())
            .unwrap();
        let tokens = source.tokens();
        let y = index_of(tokens, "y");
        let first_int = index_of(tokens, "int");
        let second_int = (first_int.0 + 1..tokens.len())
            .map(TokenIndex)
            .find(|&i| tokens.token_text(i) == "int")
            .unwrap();

        let mut buffer = EditBuffer::new(tokens);
        buffer.delete(second_int, y.next()).unwrap();
        assert_eq!(buffer.render(), "class A { int x;  }");
    }
}
