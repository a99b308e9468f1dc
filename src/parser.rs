use std::sync::Arc;

use miette::NamedSource;
use tracing::debug;

use crate::ast::*;
use crate::config::Config;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::loader::{Loader, NoLoader};

const DEFAULT_NAME: &str = "<template>";

/// Recursive-descent parser with one token of lookahead.
///
/// Partials are loaded and parsed while parsing, through the parser's
/// [`Loader`]; definitions are registered as soon as their end tag is seen.
pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    curr: Token,
    peek: Token,
    name: String,
    named: NamedNodes,
    loader: &'a dyn Loader,
    config: Config,
    depth: usize,
    trim_next: bool,
}

impl<'a> Parser<'a> {
    /// Parser with the default configuration and no partial support.
    pub fn new(input: &'a str) -> Self {
        Self::build(input, DEFAULT_NAME, &NoLoader, Config::default(), 0)
    }

    pub fn with_options(
        input: &'a str,
        name: &str,
        loader: &'a dyn Loader,
        config: &Config,
    ) -> Result<Self, ParseError> {
        config.validate()?;
        Ok(Self::build(input, name, loader, config.clone(), 0))
    }

    fn build(
        input: &'a str,
        name: &str,
        loader: &'a dyn Loader,
        config: Config,
        depth: usize,
    ) -> Self {
        let mut lexer =
            Tokenizer::with_delimiters(input, &config.open_delimiter, &config.close_delimiter);
        let curr = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            curr,
            peek,
            name: name.to_string(),
            named: NamedNodes::new(),
            loader,
            config,
            depth,
            trim_next: false,
        }
    }

    pub fn parse(mut self) -> Result<Root, ParseError> {
        let nodes = self.parse_nodes(None)?;
        Ok(Root {
            nodes,
            named: self.named,
        })
    }

    fn advance(&mut self) {
        let next = self.lexer.next_token();
        self.curr = std::mem::replace(&mut self.peek, next);
    }

    /// Text and tags up to the end of input, or up to the end tag named
    /// `closing` when parsing a body.
    fn parse_nodes(&mut self, closing: Option<&str>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            match self.curr.kind {
                TokenKind::Eof if closing.is_none() => break,
                TokenKind::Text => {
                    let mut text = std::mem::take(&mut self.curr.literal);
                    if std::mem::take(&mut self.trim_next) {
                        text = text.trim_start().to_string();
                    }
                    if !text.is_empty() {
                        nodes.push(Node::Literal(text));
                    }
                    self.advance();
                }
                TokenKind::Open | TokenKind::OpenTrim => {
                    if self.curr.kind == TokenKind::OpenTrim {
                        trim_last(&mut nodes);
                    }
                    self.trim_next = false;
                    self.advance();
                    if self.curr.kind == TokenKind::End {
                        let Some(name) = closing else {
                            return Err(self.unexpected());
                        };
                        self.parse_end(name)?;
                        break;
                    }
                    if let Some(node) = self.parse_tag()? {
                        nodes.push(node);
                    }
                }
                _ => return Err(self.unexpected()),
            }
        }
        Ok(nodes)
    }

    fn parse_tag(&mut self) -> Result<Option<Node>, ParseError> {
        let node = match self.curr.kind {
            TokenKind::Block | TokenKind::Inverted => self.parse_block()?,
            TokenKind::Section => self.parse_section()?,
            TokenKind::Define => self.parse_define()?,
            TokenKind::Exec => self.parse_exec()?,
            TokenKind::Comment => self.parse_comment()?,
            TokenKind::Partial => self.parse_partial()?,
            TokenKind::EscapeVar | TokenKind::UnescapeVar => self.parse_variable()?,
            TokenKind::Assign => self.parse_assignment()?,
            TokenKind::Delim => {
                self.parse_delim()?;
                return Ok(None);
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Some(node))
    }

    /// `{{/ name }}`: the name must repeat the one of the opening tag.
    fn parse_end(&mut self, name: &str) -> Result<(), ParseError> {
        self.advance();
        if !self.curr.is_value() || self.curr.literal != name {
            return Err(self.unexpected());
        }
        self.advance();
        self.expect_close()
    }

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let inverted = self.curr.kind == TokenKind::Inverted;
        self.advance();
        let key = self.parse_key()?;
        self.expect_close()?;
        let body = self.parse_nodes(Some(key.name()))?;
        Ok(Node::Block {
            key,
            inverted,
            body,
        })
    }

    fn parse_section(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let name = self.expect_ident()?;
        self.expect_close()?;
        let body = self.parse_nodes(Some(name.as_str()))?;
        Ok(Node::Section { name, body })
    }

    fn parse_define(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let name = self.expect_ident()?;
        self.expect_close()?;
        let body: Arc<[Node]> = self.parse_nodes(Some(name.as_str()))?.into();
        if !self.named.register(name.clone(), Arc::clone(&body)) {
            debug!(name = %name, "duplicate definition ignored");
        }
        Ok(Node::Define { name, body })
    }

    fn parse_exec(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let name = self.expect_ident()?;
        let key = if self.curr.is_close() {
            None
        } else {
            Some(self.parse_key()?)
        };
        self.expect_close()?;
        Ok(Node::Exec { name, key })
    }

    fn parse_comment(&mut self) -> Result<Node, ParseError> {
        self.advance();
        if self.curr.kind != TokenKind::Text {
            return Err(self.unexpected());
        }
        let text = std::mem::take(&mut self.curr.literal);
        self.advance();
        self.expect_close()?;
        Ok(Node::Comment(text))
    }

    fn parse_partial(&mut self) -> Result<Node, ParseError> {
        self.advance();
        if !matches!(self.curr.kind, TokenKind::Ident | TokenKind::String) {
            return Err(self.unexpected());
        }
        let name = std::mem::take(&mut self.curr.literal);
        self.advance();
        self.expect_close()?;

        if self.depth >= self.config.max_partial_depth {
            return Err(ParseError::PartialDepth {
                name,
                limit: self.config.max_partial_depth,
            });
        }
        debug!(partial = %name, depth = self.depth + 1, "loading partial");
        let source = self
            .loader
            .load(&name)
            .map_err(|source| ParseError::Load {
                name: name.clone(),
                source,
            })?;
        let root = Parser::build(
            &source,
            &name,
            self.loader,
            self.config.clone(),
            self.depth + 1,
        )
        .parse()
        .map_err(|err| ParseError::Partial {
            name: name.clone(),
            source: Box::new(err),
        })?;
        self.named.merge(root.named);
        Ok(Node::Partial {
            name,
            body: root.nodes,
        })
    }

    /// `{{= <open> <close> =}}`. The new pair is installed before the token
    /// following the closing tag is scanned.
    fn parse_delim(&mut self) -> Result<(), ParseError> {
        self.advance();
        if self.curr.kind != TokenKind::Text {
            return Err(self.unexpected());
        }
        let open = std::mem::take(&mut self.curr.literal);
        self.advance();
        if self.curr.kind != TokenKind::Text {
            return Err(self.unexpected());
        }
        let close = std::mem::take(&mut self.curr.literal);
        self.lexer.set_delimiters(&open, &close);
        self.advance();
        self.expect_close()
    }

    fn parse_variable(&mut self) -> Result<Node, ParseError> {
        let escape = self.curr.kind == TokenKind::EscapeVar;
        self.advance();
        let key = self.parse_key()?;
        self.expect_close()?;
        Ok(Node::Variable { key, escape })
    }

    fn parse_assignment(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let ident = self.expect_ident()?;
        let key = self.parse_key()?;
        self.expect_close()?;
        Ok(Node::Assignment { ident, key })
    }

    fn parse_key(&mut self) -> Result<Key, ParseError> {
        let Some(operand) = self.parse_argument() else {
            return Err(self.unexpected());
        };
        let mut filters = Vec::new();
        while self.curr.kind == TokenKind::Pipe {
            self.advance();
            filters.push(self.parse_filter()?);
        }
        Ok(Key { operand, filters })
    }

    /// Filter name followed by every value token up to the next non-value.
    fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        while let Some(arg) = self.parse_argument() {
            args.push(arg);
        }
        Ok(Filter { name, args })
    }

    /// Consumes a value token, folding a leading `-` into numbers.
    fn parse_argument(&mut self) -> Option<Argument> {
        let negative = self.curr.kind == TokenKind::Minus
            && matches!(self.peek.kind, TokenKind::Integer | TokenKind::Float);
        if negative {
            self.advance();
        }
        let kind = match self.curr.kind {
            TokenKind::Ident => ArgumentKind::Ident,
            TokenKind::Integer => ArgumentKind::Integer,
            TokenKind::Float => ArgumentKind::Float,
            TokenKind::Bool => ArgumentKind::Bool,
            TokenKind::String => ArgumentKind::String,
            _ => return None,
        };
        let mut literal = std::mem::take(&mut self.curr.literal);
        if negative {
            literal.insert(0, '-');
        }
        self.advance();
        Some(Argument::new(literal, kind))
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        if self.curr.kind != TokenKind::Ident {
            return Err(self.unexpected());
        }
        let ident = std::mem::take(&mut self.curr.literal);
        self.advance();
        Ok(ident)
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        match self.curr.kind {
            TokenKind::Close => {}
            TokenKind::CloseTrim => self.trim_next = true,
            _ => return Err(self.unexpected()),
        }
        self.advance();
        Ok(())
    }

    fn unexpected(&self) -> ParseError {
        let position = self.curr.position;
        ParseError::Unexpected {
            found: self.curr.to_string(),
            line: position.line,
            column: position.column,
            context: self.lexer.line_text(position.line).to_string(),
            span: (position.offset, self.curr.literal.len()).into(),
            src: NamedSource::new(&self.name, self.lexer.source().to_string()),
        }
    }
}

/// Strips trailing whitespace from the last literal, for `{{-`.
fn trim_last(nodes: &mut Vec<Node>) {
    if let Some(Node::Literal(text)) = nodes.last_mut() {
        let len = text.trim_end().len();
        text.truncate(len);
        if text.is_empty() {
            nodes.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;

    fn parse(input: &str) -> Result<Root, ParseError> {
        Parser::new(input).parse()
    }

    fn ident_key(name: &str) -> Key {
        Key {
            operand: Argument::ident(name),
            filters: vec![],
        }
    }

    #[test]
    fn empty_template() {
        let root = parse("").unwrap();
        assert!(root.nodes.is_empty());
        assert!(root.named.is_empty());
    }

    #[test]
    fn literal_and_variables() {
        let root = parse("hello {{name}} - {{&raw}}").unwrap();
        assert_eq!(
            root.nodes,
            vec![
                Node::Literal("hello ".into()),
                Node::Variable {
                    key: ident_key("name"),
                    escape: true
                },
                Node::Literal(" - ".into()),
                Node::Variable {
                    key: ident_key("raw"),
                    escape: false
                },
            ]
        );
    }

    #[test]
    fn nested_blocks() {
        let root = parse("{{# block}}echo {{#nest}}x{{/nest}}{{/ block}}").unwrap();
        let Node::Block { key, inverted, body } = &root.nodes[0] else {
            panic!("expected a block, got {:?}", root.nodes[0]);
        };
        assert_eq!(key.name(), "block");
        assert!(!inverted);
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[1], Node::Block { key, .. } if key.name() == "nest"));
    }

    #[test]
    fn inverted_block() {
        let root = parse("{{^ block}}none{{/ block}}").unwrap();
        assert!(matches!(&root.nodes[0], Node::Block { inverted: true, .. }));
    }

    #[test]
    fn filter_pipeline_with_arguments() {
        let root = parse(r#"{{ text | split "_" | firstn 1 | add 2.3 -3 x }}"#).unwrap();
        let Node::Variable { key, .. } = &root.nodes[0] else {
            panic!("expected a variable");
        };
        assert_eq!(key.name(), "text");
        let names: Vec<_> = key.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["split", "firstn", "add"]);
        assert_eq!(key.filters[0].args, vec![Argument::new("_", ArgumentKind::String)]);
        assert_eq!(
            key.filters[2].args,
            vec![
                Argument::new("2.3", ArgumentKind::Float),
                Argument::new("-3", ArgumentKind::Integer),
                Argument::ident("x"),
            ]
        );
    }

    #[test]
    fn literal_operand() {
        let root = parse(r#"{{ "abc" | upper }}{{: n 4 }}"#).unwrap();
        assert!(matches!(
            &root.nodes[0],
            Node::Variable { key, .. } if key.operand.kind == ArgumentKind::String
        ));
        assert_eq!(
            root.nodes[1],
            Node::Assignment {
                ident: "n".into(),
                key: Key {
                    operand: Argument::new("4", ArgumentKind::Integer),
                    filters: vec![],
                },
            }
        );
    }

    #[test]
    fn comment_is_kept_for_dumps() {
        let root = parse("a{{! not | rendered }}b").unwrap();
        assert_eq!(root.nodes[1], Node::Comment("not | rendered".into()));
    }

    #[test]
    fn mismatched_end_tag() {
        for input in ["{{#a}}x{{/b}}", "{{%a}}x{{/b}}", "{{<a}}x{{/b}}"] {
            let err = parse(input).unwrap_err();
            assert!(
                matches!(&err, ParseError::Unexpected { found, .. } if found == "identifier(b)"),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn unclosed_block() {
        let err = parse("{{#a}}x").unwrap_err();
        assert!(matches!(err, ParseError::Unexpected { found, .. } if found == "<eof>"));
    }

    #[test]
    fn stray_end_tag() {
        assert!(parse("x{{/a}}").is_err());
    }

    #[test]
    fn invalid_token_is_reported_with_position() {
        let err = parse("line one\n  {{ name | join \"oops }}").unwrap_err();
        let ParseError::Unexpected {
            found,
            line,
            column,
            context,
            ..
        } = err
        else {
            panic!("expected an unexpected token error");
        };
        assert!(found.starts_with("invalid("));
        assert_eq!(line, 2);
        assert_eq!(column, 18);
        assert_eq!(context, "{{ name | join \"oops }}");
    }

    #[test]
    fn delimiter_redefinition_applies_immediately() {
        let root = parse("{{= <% %> =}}<% variable %> {{ raw }} <%={{ }}=%>{{ again }}").unwrap();
        assert_eq!(
            root.nodes,
            vec![
                Node::Variable {
                    key: ident_key("variable"),
                    escape: true
                },
                Node::Literal(" {{ raw }} ".into()),
                Node::Variable {
                    key: ident_key("again"),
                    escape: true
                },
            ]
        );
    }

    #[test]
    fn malformed_delimiter_redefinition() {
        assert!(parse("{{= <% =}}").is_err());
        assert!(parse("{{=a b=}}").is_err());
    }

    #[test]
    fn exec_with_and_without_key() {
        let root = parse("{{@ template}}{{@ template ctx | lower}}").unwrap();
        assert_eq!(
            root.nodes[0],
            Node::Exec {
                name: "template".into(),
                key: None
            }
        );
        let Node::Exec { key: Some(key), .. } = &root.nodes[1] else {
            panic!("expected an exec with a key");
        };
        assert_eq!(key.name(), "ctx");
        assert_eq!(key.filters.len(), 1);
    }

    #[test]
    fn definitions_are_registered_first_writer_wins() {
        let root = parse("{{<x}}one{{/x}}{{<x}}two{{/x}}{{<y}}three{{/y}}").unwrap();
        assert_eq!(root.named.len(), 2);
        assert_eq!(
            &root.named.get("x").unwrap()[..],
            &[Node::Literal("one".into())][..]
        );
    }

    #[test]
    fn partial_is_spliced_and_merged() {
        let loader = InMemoryLoader::new()
            .with("header", "<h1>{{title}}</h1>{{<footer}}bye{{/footer}}")
            .with("nested", "[{{> header}}]");
        let config = Config::default();
        let root = Parser::with_options("{{> nested}}{{<footer}}ignored{{/footer}}", "main", &loader, &config)
            .unwrap()
            .parse()
            .unwrap();

        let Node::Partial { name, body } = &root.nodes[0] else {
            panic!("expected a partial");
        };
        assert_eq!(name, "nested");
        assert!(matches!(&body[1], Node::Partial { name, .. } if name == "header"));
        assert_eq!(
            &root.named.get("footer").unwrap()[..],
            &[Node::Literal("bye".into())][..]
        );
    }

    #[test]
    fn quoted_partial_name() {
        let loader = InMemoryLoader::new().with("repo.txt", "- {{Name}}");
        let config = Config::default();
        let root = Parser::with_options(r#"{{> "repo.txt" }}"#, "main", &loader, &config)
            .unwrap()
            .parse()
            .unwrap();
        assert!(matches!(&root.nodes[0], Node::Partial { name, .. } if name == "repo.txt"));
    }

    #[test]
    fn partials_use_their_own_delimiters() {
        let loader = InMemoryLoader::new().with("inner", "{{ a }}");
        let config = Config::default();
        let root = Parser::with_options("{{=<% %>=}}<%> inner %><% b %>", "main", &loader, &config)
            .unwrap()
            .parse()
            .unwrap();
        let Node::Partial { body, .. } = &root.nodes[0] else {
            panic!("expected a partial");
        };
        assert!(matches!(&body[0], Node::Variable { key, .. } if key.name() == "a"));
        assert!(matches!(&root.nodes[1], Node::Variable { key, .. } if key.name() == "b"));
    }

    #[test]
    fn missing_partial_fails_the_parse() {
        let err = parse("{{> missing }}").unwrap_err();
        assert!(matches!(err, ParseError::Load { name, .. } if name == "missing"));
    }

    #[test]
    fn broken_partial_fails_the_parse() {
        let loader = InMemoryLoader::new().with("broken", "{{#a}}");
        let config = Config::default();
        let err = Parser::with_options("{{> broken }}", "main", &loader, &config)
            .unwrap()
            .parse()
            .unwrap_err();
        assert!(matches!(err, ParseError::Partial { name, .. } if name == "broken"));
    }

    #[test]
    fn self_including_partial_hits_the_depth_limit() {
        let loader = InMemoryLoader::new().with("loop", "x{{> loop }}");
        let config = Config::default().max_partial_depth(4);
        let err = Parser::with_options("{{> loop }}", "main", &loader, &config)
            .unwrap()
            .parse()
            .unwrap_err();

        let mut err = &err;
        let mut levels = 0;
        while let ParseError::Partial { source, .. } = err {
            err = source;
            levels += 1;
        }
        assert_eq!(levels, 4);
        assert!(matches!(err, ParseError::PartialDepth { limit: 4, .. }));
    }

    #[test]
    fn trim_markers_strip_adjacent_whitespace() {
        let root = parse("a  \n {{- x -}} \n b").unwrap();
        assert_eq!(
            root.nodes,
            vec![
                Node::Literal("a".into()),
                Node::Variable {
                    key: ident_key("x"),
                    escape: true
                },
                Node::Literal("b".into()),
            ]
        );
    }

    #[test]
    fn configured_delimiters() {
        let config = Config::default().delimiters("[[", "]]");
        let root = Parser::with_options("{{ a }}[[ b ]]", "main", &NoLoader, &config)
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(root.nodes[0], Node::Literal("{{ a }}".into()));
        assert!(matches!(&root.nodes[1], Node::Variable { key, .. } if key.name() == "b"));
    }

    #[test]
    fn invalid_configured_delimiter() {
        let config = Config::default().delimiters("ab", "]]");
        assert!(matches!(
            Parser::with_options("", "main", &NoLoader, &config),
            Err(ParseError::InvalidDelimiter { .. })
        ));
    }
}
