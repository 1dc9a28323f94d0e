//! Scanner for the line-oriented extraction format:
//!
//! ```text
//! Node(id='<id>', type='<type>')
//! Relationship(subj=Node(id='<id>', type='<type>'), obj=Node(id='<id>', type='<type>'), type='<type>'[, timestamp='<ts>'])
//! ```
//!
//! The model output around these entries (headings, bullets, prose) is
//! ignored. Every place a `Node(` or `Relationship(` keyword starts becomes
//! exactly one [`Entry`]; entries that do not complete are reported as
//! [`Entry::Unrecognized`] instead of failing the whole scan.

use std::fmt;

use crate::schema::NodeId;

const NODE_KEYWORD: &str = "Node";
const RELATIONSHIP_KEYWORD: &str = "Relationship";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub id: NodeId,
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRelationship {
    pub subj: ParsedNode,
    pub obj: ParsedNode,
    pub rel_type: String,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unrecognized {
    /// Byte offset of the keyword in the scanned text.
    pub offset: usize,
    pub text: String,
    pub error: ScanError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Node(ParsedNode),
    Relationship(ParsedRelationship),
    Unrecognized(Unrecognized),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    Expected {
        expected: &'static str,
        found: String,
    },
    UnterminatedString,
    InvalidId(String),
    EndOfLine {
        expected: &'static str,
    },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Expected { expected, found } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            ScanError::UnterminatedString => f.write_str("unterminated string literal"),
            ScanError::InvalidId(raw) => write!(f, "id must be a string or integer, got {}", raw),
            ScanError::EndOfLine { expected } => write!(f, "line ended while expecting {}", expected),
        }
    }
}

impl std::error::Error for ScanError {}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Str(&'a str),
    Int(&'a str),
    Punct(char),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier `{}`", s),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Int(s) => write!(f, "number {}", s),
            Token::Punct(c) => write!(f, "`{}`", c),
        }
    }
}

/// Tokenizer over a single line. Whitespace between tokens is insignificant.
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn next_token(&mut self, expected: &'static str) -> Result<Token<'a>, ScanError> {
        self.skip_whitespace();
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return Err(ScanError::EndOfLine { expected });
        };

        if first == '\'' {
            return self.string_literal();
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            self.pos += len;
            return Ok(Token::Ident(&rest[..len]));
        }

        if first.is_ascii_digit() || (first == '-' && rest[1..].starts_with(|c: char| c.is_ascii_digit())) {
            let len = 1 + rest[1..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len() - 1);
            self.pos += len;
            return Ok(Token::Int(&rest[..len]));
        }

        self.pos += first.len_utf8();
        Ok(Token::Punct(first))
    }

    /// A quote only closes the literal when the next non-blank character is
    /// `,` or `)`, so apostrophes inside ids such as `Ollivier's_case` survive.
    fn string_literal(&mut self) -> Result<Token<'a>, ScanError> {
        let src = self.src;
        let body_start = self.pos + 1;
        let body = &src[body_start..];

        for (i, c) in body.char_indices() {
            if c != '\'' {
                continue;
            }
            let after = body[i + 1..].trim_start();
            if after.starts_with(',') || after.starts_with(')') {
                self.pos = body_start + i + 1;
                return Ok(Token::Str(&body[..i]));
            }
        }

        Err(ScanError::UnterminatedString)
    }

    fn expect_punct(&mut self, punct: char, expected: &'static str) -> Result<(), ScanError> {
        match self.next_token(expected)? {
            Token::Punct(c) if c == punct => Ok(()),
            other => Err(ScanError::Expected {
                expected,
                found: other.to_string(),
            }),
        }
    }

    fn expect_ident(&mut self, name: &str, expected: &'static str) -> Result<(), ScanError> {
        match self.next_token(expected)? {
            Token::Ident(s) if s == name => Ok(()),
            other => Err(ScanError::Expected {
                expected,
                found: other.to_string(),
            }),
        }
    }

    fn expect_string(&mut self, expected: &'static str) -> Result<&'a str, ScanError> {
        match self.next_token(expected)? {
            Token::Str(s) => Ok(s),
            other => Err(ScanError::Expected {
                expected,
                found: other.to_string(),
            }),
        }
    }

    /// `name=`
    fn keyword_arg(&mut self, name: &str, expected: &'static str) -> Result<(), ScanError> {
        self.expect_ident(name, expected)?;
        self.expect_punct('=', "`=`")
    }

    fn peek_punct(&mut self, punct: char) -> bool {
        self.skip_whitespace();
        self.rest().starts_with(punct)
    }
}

fn node(lx: &mut Lexer<'_>) -> Result<ParsedNode, ScanError> {
    lx.expect_ident(NODE_KEYWORD, "`Node`")?;
    lx.expect_punct('(', "`(`")?;

    lx.keyword_arg("id", "`id`")?;
    let id = match lx.next_token("node id")? {
        Token::Str(s) => NodeId::Text(s.to_string()),
        Token::Int(raw) => raw
            .parse::<i64>()
            .map(NodeId::Integer)
            .map_err(|_| ScanError::InvalidId(raw.to_string()))?,
        other => return Err(ScanError::InvalidId(other.to_string())),
    };

    lx.expect_punct(',', "`,`")?;
    lx.keyword_arg("type", "`type`")?;
    let node_type = lx.expect_string("quoted node type")?.to_string();
    lx.expect_punct(')', "`)`")?;

    Ok(ParsedNode { id, node_type })
}

fn relationship(lx: &mut Lexer<'_>) -> Result<ParsedRelationship, ScanError> {
    lx.expect_ident(RELATIONSHIP_KEYWORD, "`Relationship`")?;
    lx.expect_punct('(', "`(`")?;

    lx.keyword_arg("subj", "`subj`")?;
    let subj = node(lx)?;
    lx.expect_punct(',', "`,`")?;

    lx.keyword_arg("obj", "`obj`")?;
    let obj = node(lx)?;
    lx.expect_punct(',', "`,`")?;

    lx.keyword_arg("type", "`type`")?;
    let rel_type = lx.expect_string("quoted relationship type")?.to_string();

    let timestamp = if lx.peek_punct(',') {
        lx.expect_punct(',', "`,`")?;
        lx.keyword_arg("timestamp", "`timestamp`")?;
        Some(lx.expect_string("quoted timestamp")?.to_string())
    } else {
        None
    };
    lx.expect_punct(')', "`)`")?;

    Ok(ParsedRelationship {
        subj,
        obj,
        rel_type,
        timestamp,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Keyword {
    Node,
    Relationship,
}

/// Next keyword occurrence at or after `from` that is not the tail of a longer identifier.
fn next_keyword(text: &str, from: usize) -> Option<(usize, Keyword)> {
    let mut search = from;
    loop {
        let haystack = &text[search..];
        let node = haystack.find("Node(").map(|i| (search + i, Keyword::Node));
        let rel = haystack
            .find("Relationship(")
            .map(|i| (search + i, Keyword::Relationship));

        let (pos, keyword) = match (node, rel) {
            (Some(n), Some(r)) => {
                if r.0 <= n.0 {
                    r
                } else {
                    n
                }
            }
            (Some(n), None) => n,
            (None, Some(r)) => r,
            (None, None) => return None,
        };

        let standalone = text[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        if standalone {
            return Some((pos, keyword));
        }
        search = pos + 1;
    }
}

/// Scan free text for extraction entries, in order of appearance.
pub fn scan(text: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while let Some((start, keyword)) = next_keyword(text, pos) {
        let line_end = text[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(text.len());
        let line = &text[start..line_end];
        let mut lx = Lexer::new(line);

        let parsed = match keyword {
            Keyword::Node => node(&mut lx).map(Entry::Node),
            Keyword::Relationship => relationship(&mut lx).map(Entry::Relationship),
        };

        match parsed {
            Ok(entry) => {
                entries.push(entry);
                pos = start + lx.pos;
            }
            Err(error) => {
                entries.push(Entry::Unrecognized(Unrecognized {
                    offset: start,
                    text: line.trim_end().to_string(),
                    error,
                }));
                // A broken relationship must not leak its inline nodes.
                pos = match keyword {
                    Keyword::Node => start + NODE_KEYWORD.len(),
                    Keyword::Relationship => line_end,
                };
            }
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_entry(id: &str, node_type: &str) -> Entry {
        Entry::Node(ParsedNode {
            id: NodeId::from(id),
            node_type: node_type.to_string(),
        })
    }

    #[test]
    fn scans_node_line() {
        let entries = scan("Node(id='Ollivier', type='SourceText')");
        assert_eq!(entries, vec![node_entry("Ollivier", "SourceText")]);
    }

    #[test]
    fn scans_relationship_with_and_without_timestamp() {
        let text = "\
Relationship(subj=Node(id='a', type='X'), obj=Node(id='b', type='Y'), type='results_in')
Relationship(subj=Node(id='a', type='X'), obj=Node(id='b', type='Y'), type='followed_by', timestamp='1889')";
        let entries = scan(text);
        assert_eq!(entries.len(), 2);

        let Entry::Relationship(first) = &entries[0] else {
            panic!("expected relationship, got {:?}", entries[0]);
        };
        assert_eq!(first.subj.id, NodeId::from("a"));
        assert_eq!(first.obj.node_type, "Y");
        assert_eq!(first.rel_type, "results_in");
        assert_eq!(first.timestamp, None);

        let Entry::Relationship(second) = &entries[1] else {
            panic!("expected relationship, got {:?}", entries[1]);
        };
        assert_eq!(second.timestamp.as_deref(), Some("1889"));
    }

    #[test]
    fn ignores_surrounding_prose_and_bullets() {
        let text = "Nodes:\n- Node(id='a', type='X')\n\nThat's all I found.\n";
        assert_eq!(scan(text), vec![node_entry("a", "X")]);
    }

    #[test]
    fn apostrophes_inside_ids_survive() {
        let entries = scan("Node(id='Ollivier's_case', type='SourceText')");
        assert_eq!(entries, vec![node_entry("Ollivier's_case", "SourceText")]);
    }

    #[test]
    fn integer_ids_are_accepted() {
        let entries = scan("Node(id=42, type='SourceText')");
        assert_eq!(
            entries,
            vec![Entry::Node(ParsedNode {
                id: NodeId::Integer(42),
                node_type: "SourceText".to_string(),
            })]
        );
    }

    #[test]
    fn truncated_entry_is_unrecognized() {
        let entries = scan("Node(id='a', type='X')\nNode(id='b', ty");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], node_entry("a", "X"));
        let Entry::Unrecognized(bad) = &entries[1] else {
            panic!("expected unrecognized, got {:?}", entries[1]);
        };
        assert_eq!(bad.text, "Node(id='b', ty");
        assert_eq!(bad.offset, 23);
    }

    #[test]
    fn unquoted_type_is_unrecognized() {
        let entries = scan("Node(id='a', type=Symptom)");
        assert!(matches!(
            &entries[0],
            Entry::Unrecognized(Unrecognized {
                error: ScanError::Expected { .. },
                ..
            })
        ));
    }

    #[test]
    fn non_scalar_id_is_rejected() {
        let entries = scan("Node(id=[1], type='X')");
        assert!(matches!(
            &entries[0],
            Entry::Unrecognized(Unrecognized {
                error: ScanError::InvalidId(_),
                ..
            })
        ));
    }

    #[test]
    fn broken_relationship_does_not_leak_inline_nodes() {
        let text = "Relationship(subj=Node(id='a', type='X'), obj=Node(id='b', type='Y'), type=)";
        let entries = scan(text);
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], Entry::Unrecognized(_)));
    }

    #[test]
    fn keyword_inside_identifier_is_not_an_entry() {
        assert!(scan("SubNode(id='a', type='X')").is_empty());
    }

    #[test]
    fn several_entries_on_one_line() {
        let entries = scan("Node(id='a', type='X') Node(id='b', type='Y')");
        assert_eq!(entries, vec![node_entry("a", "X"), node_entry("b", "Y")]);
    }

    #[test]
    fn strings_do_not_span_lines() {
        let entries = scan("Node(id='a\n', type='X')");
        assert!(matches!(
            &entries[0],
            Entry::Unrecognized(Unrecognized {
                error: ScanError::UnterminatedString,
                ..
            })
        ));
    }
}
