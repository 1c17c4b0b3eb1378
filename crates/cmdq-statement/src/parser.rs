//! Recursive-descent parser for the node's command language, run over
//! `sqlparser` tokens.
//!
//! ```text
//! PRINT <name|'literal'> [FROM BEGINNING] [INTERVAL|SAMPLE n] [LIMIT n]
//! REGISTER TOPIC [IF NOT EXISTS] <name>
//! DROP TOPIC [IF EXISTS] <name>
//! SET '<prop>' = '<value>'
//! UNSET '<prop>'
//! LIST|SHOW TOPICS|FUNCTIONS|PROPERTIES
//! ```
//!
//! Keywords are case-insensitive and statements are separated by `;`. The
//! tokenizer drops whitespace and both comment styles.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Span, Token, TokenWithSpan, Tokenizer, Word};
use thiserror::Error;

use crate::name::{NodeLocation, QualifiedName};
use crate::statement::{
    DropTopic, PrintTopic, RegisterTopic, SetProperty, Statement, StatementKind, UnsetProperty,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{location}: {message}")]
    Tokenize {
        message: String,
        location: NodeLocation,
    },
    #[error("{location}: number '{literal}' is out of range")]
    NumberOutOfRange {
        literal: String,
        location: NodeLocation,
    },
    #[error("{location}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        location: NodeLocation,
    },
    #[error("{location}: unknown statement '{keyword}'")]
    UnknownStatement {
        keyword: String,
        location: NodeLocation,
    },
    #[error("{location}: PRINT interval must be at least 1")]
    InvalidInterval { location: NodeLocation },
}

impl ParseError {
    pub fn location(&self) -> NodeLocation {
        match self {
            ParseError::Tokenize { location, .. }
            | ParseError::NumberOutOfRange { location, .. }
            | ParseError::UnexpectedToken { location, .. }
            | ParseError::UnknownStatement { location, .. }
            | ParseError::InvalidInterval { location } => *location,
        }
    }
}

/// A statement together with the slice of source text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub text: String,
    pub statement: Statement,
}

/// Parses every `;`-separated statement in `text`. Blank input yields an empty list.
pub fn parse_statements(text: &str) -> Result<Vec<ParsedStatement>, ParseError> {
    let tokens = Tokenizer::new(&GenericDialect {}, text)
        .tokenize_with_location()
        .map_err(|err| ParseError::Tokenize {
            message: err.message,
            location: node_location(err.location),
        })?;
    let mut tokens: Vec<TokenWithSpan> = tokens
        .into_iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();
    let end = tokens
        .last()
        .map(|t| t.span.end)
        .unwrap_or(Location { line: 1, column: 1 });
    tokens.push(TokenWithSpan::new(Token::EOF, Span::new(end, end)));

    Parser {
        src: SourceText::new(text),
        tokens,
        pos: 0,
    }
    .parse_all()
}

fn node_location(at: Location) -> NodeLocation {
    NodeLocation::new(
        u32::try_from(at.line).unwrap_or(u32::MAX),
        u32::try_from(at.column).unwrap_or(u32::MAX),
    )
}

fn describe(token: &Token) -> String {
    match token {
        Token::EOF => "end of input".into(),
        Token::SingleQuotedString(s) => format!("string '{s}'"),
        Token::Number(n, _) => format!("number {n}"),
        other => format!("'{other}'"),
    }
}

/// Submitted text with a line index, for slicing statements out by token span.
struct SourceText<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { text, line_starts }
    }

    /// Byte offset of a 1-based line/column position.
    fn offset(&self, at: Location) -> usize {
        let line = usize::try_from(at.line).unwrap_or(usize::MAX).saturating_sub(1);
        let Some(&start) = self.line_starts.get(line) else {
            return self.text.len();
        };
        let column = usize::try_from(at.column).unwrap_or(usize::MAX).saturating_sub(1);
        self.text[start..]
            .char_indices()
            .nth(column)
            .map(|(idx, _)| start + idx)
            .unwrap_or(self.text.len())
    }

    fn slice(&self, from: Location, to: Location) -> &'a str {
        let start = self.offset(from);
        let end = self.offset(to).max(start);
        &self.text[start..end]
    }
}

struct Parser<'a> {
    src: SourceText<'a>,
    tokens: Vec<TokenWithSpan>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_all(mut self) -> Result<Vec<ParsedStatement>, ParseError> {
        let mut out = Vec::new();
        loop {
            while self.peek().token == Token::SemiColon {
                self.advance();
            }
            if self.peek().token == Token::EOF {
                return Ok(out);
            }
            let start = self.peek().span.start;
            let kind = self.statement()?;
            let end = self.tokens[self.pos.saturating_sub(1)].span.end;
            if !matches!(self.peek().token, Token::SemiColon | Token::EOF) {
                return Err(self.unexpected("';' or end of input"));
            }
            out.push(ParsedStatement {
                text: self.src.slice(start, end).trim().to_string(),
                statement: Statement::located(kind, node_location(start)),
            });
        }
    }

    fn statement(&mut self) -> Result<StatementKind, ParseError> {
        let location = self.location();
        let keyword = match &self.peek().token {
            Token::Word(Word {
                value,
                quote_style: None,
                ..
            }) => value.clone(),
            _ => return Err(self.unexpected("a statement")),
        };
        self.advance();
        match keyword.to_ascii_uppercase().as_str() {
            "PRINT" => self.print(),
            "REGISTER" => {
                self.expect_keyword("TOPIC")?;
                let if_not_exists = if self.eat_keyword("IF") {
                    self.expect_keyword("NOT")?;
                    self.expect_keyword("EXISTS")?;
                    true
                } else {
                    false
                };
                let topic = self.qualified_name()?;
                Ok(StatementKind::RegisterTopic(RegisterTopic {
                    topic,
                    if_not_exists,
                }))
            }
            "DROP" => {
                self.expect_keyword("TOPIC")?;
                let if_exists = if self.eat_keyword("IF") {
                    self.expect_keyword("EXISTS")?;
                    true
                } else {
                    false
                };
                let topic = self.qualified_name()?;
                Ok(StatementKind::DropTopic(DropTopic { topic, if_exists }))
            }
            "SET" => {
                let name = self.string_literal("property name")?;
                if self.peek().token != Token::Eq {
                    return Err(self.unexpected("'='"));
                }
                self.advance();
                let value = self.string_literal("property value")?;
                Ok(StatementKind::SetProperty(SetProperty { name, value }))
            }
            "UNSET" => {
                let name = self.string_literal("property name")?;
                Ok(StatementKind::UnsetProperty(UnsetProperty { name }))
            }
            "LIST" | "SHOW" => {
                if self.eat_keyword("TOPICS") {
                    Ok(StatementKind::ListTopics)
                } else if self.eat_keyword("FUNCTIONS") {
                    Ok(StatementKind::ListFunctions)
                } else if self.eat_keyword("PROPERTIES") {
                    Ok(StatementKind::ListProperties)
                } else {
                    Err(self.unexpected("TOPICS, FUNCTIONS or PROPERTIES"))
                }
            }
            _ => Err(ParseError::UnknownStatement { keyword, location }),
        }
    }

    fn print(&mut self) -> Result<StatementKind, ParseError> {
        let topic = match &self.peek().token {
            Token::SingleQuotedString(literal) => {
                let name = QualifiedName::simple(literal.clone())
                    .ok_or_else(|| self.unexpected("a topic name"))?;
                self.advance();
                name
            }
            _ => self.qualified_name()?,
        };
        let from_beginning = if self.eat_keyword("FROM") {
            self.expect_keyword("BEGINNING")?;
            true
        } else {
            false
        };
        let interval = if self.eat_keyword("INTERVAL") || self.eat_keyword("SAMPLE") {
            let location = self.location();
            let value = self.number()?;
            if value == 0 {
                return Err(ParseError::InvalidInterval { location });
            }
            Some(value)
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            Some(self.number()?)
        } else {
            None
        };
        Ok(StatementKind::PrintTopic(PrintTopic::new(
            topic,
            from_beginning,
            interval,
            limit,
        )))
    }

    /// Plain or double-quoted identifiers joined by `.`.
    fn qualified_name(&mut self) -> Result<QualifiedName, ParseError> {
        let mut parts = vec![self.identifier("a name")?];
        while self.peek().token == Token::Period {
            self.advance();
            parts.push(self.identifier("a name part")?);
        }
        QualifiedName::from_parts(parts).ok_or_else(|| self.unexpected("a name"))
    }

    fn identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.peek().token {
            Token::Word(word) => {
                let value = word.value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn string_literal(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.peek().token {
            Token::SingleQuotedString(s) => {
                let value = s.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(format!("{expected} as a quoted string"))),
        }
    }

    fn number(&mut self) -> Result<u32, ParseError> {
        let location = self.location();
        let Token::Number(literal, _) = &self.peek().token else {
            return Err(self.unexpected("a number"));
        };
        let literal = literal.clone();
        self.advance();
        literal
            .parse::<u32>()
            .map_err(|_| ParseError::NumberOutOfRange { literal, location })
    }

    fn peek(&self) -> &TokenWithSpan {
        // the token stream always ends with EOF and `advance` never moves past it
        &self.tokens[self.pos]
    }

    fn location(&self) -> NodeLocation {
        node_location(self.peek().span.start)
    }

    fn advance(&mut self) {
        if self.peek().token != Token::EOF {
            self.pos += 1;
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(
            &self.peek().token,
            Token::Word(Word { value, quote_style: None, .. }) if value.eq_ignore_ascii_case(keyword)
        )
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: describe(&self.peek().token),
            location: self.location(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::DEFAULT_PRINT_INTERVAL;

    fn single(text: &str) -> StatementKind {
        let mut parsed = parse_statements(text).unwrap();
        assert_eq!(parsed.len(), 1, "expected one statement in {text:?}");
        parsed.remove(0).statement.into_kind()
    }

    #[test]
    fn parses_print_with_all_clauses() {
        let kind = single("print 'orders' from beginning interval 5 limit 10;");
        assert_eq!(
            kind,
            StatementKind::PrintTopic(PrintTopic::new(
                QualifiedName::simple("orders").unwrap(),
                true,
                Some(5),
                Some(10),
            ))
        );
    }

    #[test]
    fn print_without_interval_uses_default() {
        let StatementKind::PrintTopic(print) = single("PRINT prod.orders") else {
            panic!("expected print");
        };
        assert_eq!(print.topic().to_string(), "prod.orders");
        assert_eq!(print.interval(), DEFAULT_PRINT_INTERVAL);
        assert_eq!(print.limit(), None);
        assert!(!print.from_beginning());
    }

    #[test]
    fn print_rejects_zero_interval() {
        let err = parse_statements("PRINT orders INTERVAL 0").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidInterval {
                location: NodeLocation::new(1, 23)
            }
        );
    }

    #[test]
    fn parses_topic_ddl() {
        assert_eq!(
            single("REGISTER TOPIC IF NOT EXISTS orders"),
            StatementKind::RegisterTopic(RegisterTopic {
                topic: QualifiedName::simple("orders").unwrap(),
                if_not_exists: true,
            })
        );
        assert_eq!(
            single("drop topic orders"),
            StatementKind::DropTopic(DropTopic {
                topic: QualifiedName::simple("orders").unwrap(),
                if_exists: false,
            })
        );
    }

    #[test]
    fn parses_set_and_unset_with_escaped_quotes() {
        assert_eq!(
            single("SET 'ksql.service.id' = 'it''s'"),
            StatementKind::SetProperty(SetProperty {
                name: "ksql.service.id".into(),
                value: "it's".into(),
            })
        );
        assert_eq!(
            single("UNSET 'auto.offset.reset'"),
            StatementKind::UnsetProperty(UnsetProperty {
                name: "auto.offset.reset".into(),
            })
        );
    }

    #[test]
    fn splits_multiple_statements_and_keeps_their_text() {
        let parsed = parse_statements(
            "REGISTER TOPIC orders;\n  -- then look at it\n  LIST TOPICS ;; SHOW functions",
        )
        .unwrap();
        let texts: Vec<_> = parsed.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["REGISTER TOPIC orders", "LIST TOPICS", "SHOW functions"]);
        assert_eq!(parsed[1].statement.location(), Some(NodeLocation::new(3, 3)));
        assert_eq!(parsed[2].statement.kind(), &StatementKind::ListFunctions);
    }

    #[test]
    fn blank_text_has_no_statements() {
        assert!(parse_statements("").unwrap().is_empty());
        assert!(parse_statements("  ;  -- nothing\n").unwrap().is_empty());
    }

    #[test]
    fn reports_unknown_statement_and_trailing_garbage() {
        let err = parse_statements("EXPLODE everything").unwrap_err();
        assert!(matches!(err, ParseError::UnknownStatement { ref keyword, .. } if keyword == "EXPLODE"));

        let err = parse_statements("LIST TOPICS now").unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 1:13: expected ';' or end of input, found 'now'"
        );
    }

    #[test]
    fn reports_token_level_errors() {
        assert!(matches!(
            parse_statements("SET 'a' 'b'").unwrap_err(),
            ParseError::UnexpectedToken { .. }
        ));
        let err = parse_statements("LIST TOPICS;\nUNSET 'open").unwrap_err();
        assert!(matches!(err, ParseError::Tokenize { .. }), "{err:?}");
        assert_eq!(err.location().line, 2);
        assert!(matches!(
            parse_statements("PRINT orders LIMIT 99999999999").unwrap_err(),
            ParseError::NumberOutOfRange { .. }
        ));
        assert_eq!(
            parse_statements("PRINT orders LIMIT -1").unwrap_err().to_string(),
            "line 1:20: expected a number, found '-'"
        );
    }

    #[test]
    fn quoted_identifiers_and_block_comments() {
        let parsed = parse_statements("/* setup */ REGISTER TOPIC \"Prod\".orders").unwrap();
        assert_eq!(parsed[0].text, "REGISTER TOPIC \"Prod\".orders");
        assert_eq!(parsed[0].statement.location(), Some(NodeLocation::new(1, 13)));
        let StatementKind::RegisterTopic(register) = parsed[0].statement.kind() else {
            panic!("expected register");
        };
        assert_eq!(register.topic.to_string(), "Prod.orders");
    }

    #[test]
    fn statement_text_survives_multibyte_characters() {
        let parsed = parse_statements("PRINT 'überweisungen'; LIST TOPICS").unwrap();
        assert_eq!(parsed[0].text, "PRINT 'überweisungen'");
        assert_eq!(parsed[1].text, "LIST TOPICS");
    }
}
