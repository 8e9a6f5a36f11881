use crate::{
    frontend::SourceFile,
    intern::InternedSymbol,
    ir::{BinaryOp, Expr, Program, Statement, UnaryOp, Value, Variable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),

    KwFn,
    KwIf,
    KwElse,
    KwWhile,
    KwPrint,
    KwReturn,
    KwTrue,
    KwFalse,
    KwNull,

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    span: Span,
}

pub struct Parser<'src> {
    source: &'src SourceFile,
    tokens: Vec<Token>,
    position: usize,
}

impl<'src> Parser<'src> {
    pub fn parse_program(source: &'src SourceFile) -> Program {
        let mut parser = Parser {
            source,
            tokens: Vec::new(),
            position: 0,
        };
        parser.tokens = parser.tokenize();

        let mut statements = Vec::new();
        while !parser.is_eof() {
            statements.push(parser.parse_item());
        }

        Program::new_ast(statements)
    }

    fn report_fatal_error(&self, position: usize, message: &str) -> ! {
        eprintln!(
            "{} ({}:{}:{})",
            message,
            self.source.origin,
            self.source.row_for_position(position),
            self.source.column_for_position(position)
        );
        std::process::exit(1);
    }

    /* Lexing */

    fn tokenize(&self) -> Vec<Token> {
        let contents = &self.source.contents;
        let mut tokens = Vec::new();
        let mut chars = contents.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            let kind = match c {
                c if c.is_whitespace() => continue,
                '/' if matches!(chars.peek(), Some((_, '/'))) => {
                    for (_, c) in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '=' if matches!(chars.peek(), Some((_, '='))) => {
                    chars.next();
                    TokenKind::Equals
                }
                '=' => TokenKind::Assign,
                '!' if matches!(chars.peek(), Some((_, '='))) => {
                    chars.next();
                    TokenKind::NotEquals
                }
                '!' => TokenKind::Bang,
                '<' if matches!(chars.peek(), Some((_, '='))) => {
                    chars.next();
                    TokenKind::LessOrEqual
                }
                '<' => TokenKind::LessThan,
                '>' if matches!(chars.peek(), Some((_, '='))) => {
                    chars.next();
                    TokenKind::GreaterOrEqual
                }
                '>' => TokenKind::GreaterThan,
                '"' => {
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '"')) => break,
                            Some((_, c)) => value.push(c),
                            None => self.report_fatal_error(start, "Unterminated string literal"),
                        }
                    }
                    TokenKind::Str(value)
                }
                c if c.is_ascii_digit() => {
                    let mut end = start + 1;
                    while let Some((i, c)) = chars.peek().copied() {
                        if !c.is_ascii_digit() {
                            break;
                        }
                        end = i + 1;
                        chars.next();
                    }
                    let value = contents[start..end].parse().unwrap_or_else(|_| {
                        self.report_fatal_error(start, "Integer literal out of range")
                    });
                    TokenKind::Int(value)
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut end = start + c.len_utf8();
                    while let Some((i, c)) = chars.peek().copied() {
                        if !c.is_alphanumeric() && c != '_' {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    match &contents[start..end] {
                        "fn" => TokenKind::KwFn,
                        "if" => TokenKind::KwIf,
                        "else" => TokenKind::KwElse,
                        "while" => TokenKind::KwWhile,
                        "print" => TokenKind::KwPrint,
                        "return" => TokenKind::KwReturn,
                        "true" => TokenKind::KwTrue,
                        "false" => TokenKind::KwFalse,
                        "null" => TokenKind::KwNull,
                        ident => TokenKind::Ident(ident.to_owned()),
                    }
                }
                _ => self.report_fatal_error(start, &format!("Unexpected character '{c}'")),
            };

            let end = chars.peek().map_or(contents.len(), |(i, _)| *i);
            tokens.push(Token {
                kind,
                span: Span { start, end },
            });
        }

        tokens
    }

    /* Parsing */

    fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let Some(token) = self.tokens.get(self.position).cloned() else {
            self.report_fatal_error(
                self.source.contents.len(),
                "Unexpected end of file",
            )
        };
        self.position += 1;
        token
    }

    fn expect(&mut self, kind: TokenKind, expecting: &str) -> Token {
        let token = self.advance();
        if token.kind != kind {
            self.report_fatal_error(
                token.span.start,
                &format!("Expected {expecting} but found {:?}", token.kind),
            );
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_item(&mut self) -> Statement {
        if self.peek_kind() == Some(&TokenKind::KwFn) {
            self.parse_function()
        } else {
            self.parse_statement()
        }
    }

    fn parse_function(&mut self) -> Statement {
        self.expect(TokenKind::KwFn, "`fn`");
        let name = self.parse_identifier("a function name");

        self.expect(TokenKind::LeftParen, "`(`");
        let mut parameters = Vec::new();
        if self.peek_kind() != Some(&TokenKind::RightParen) {
            loop {
                parameters.push(self.parse_identifier("a parameter name"));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "`)`");

        Statement::Function {
            name,
            parameters,
            body: self.parse_block(),
        }
    }

    fn parse_identifier(&mut self, expecting: &str) -> InternedSymbol {
        let token = self.advance();
        let TokenKind::Ident(name) = token.kind else {
            self.report_fatal_error(
                token.span.start,
                &format!("Expected {expecting} but found {:?}", token.kind),
            )
        };
        InternedSymbol::new(&name)
    }

    fn parse_block(&mut self) -> Vec<Statement> {
        self.expect(TokenKind::LeftBrace, "`{`");
        let mut statements = Vec::new();
        while self.peek_kind() != Some(&TokenKind::RightBrace) {
            statements.push(self.parse_statement());
        }
        self.expect(TokenKind::RightBrace, "`}`");
        statements
    }

    fn parse_statement(&mut self) -> Statement {
        match self.peek_kind() {
            Some(TokenKind::KwIf) => {
                self.advance();
                let condition = self.parse_expr();
                let then_body = self.parse_block();
                let else_body = if self.eat(&TokenKind::KwElse) {
                    self.parse_block()
                } else {
                    Vec::new()
                };
                Statement::If {
                    condition,
                    then_body,
                    else_body,
                }
            }
            Some(TokenKind::KwWhile) => {
                self.advance();
                let condition = self.parse_expr();
                let body = self.parse_block();
                Statement::While { condition, body }
            }
            Some(TokenKind::KwPrint) => {
                self.advance();
                let value = self.parse_expr();
                self.expect(TokenKind::Semicolon, "`;`");
                Statement::Print(value)
            }
            Some(TokenKind::KwReturn) => {
                self.advance();
                let value = if self.peek_kind() == Some(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                self.expect(TokenKind::Semicolon, "`;`");
                Statement::Return(value)
            }
            Some(TokenKind::Ident(_))
                if self.tokens.get(self.position + 1).map(|t| &t.kind)
                    == Some(&TokenKind::Assign) =>
            {
                let target = self.parse_identifier("a variable name");
                self.advance(); // `=`
                let value = self.parse_expr();
                self.expect(TokenKind::Semicolon, "`;`");
                Statement::Assign {
                    target: Variable::new(target),
                    value,
                }
            }
            _ => {
                let value = self.parse_expr();
                self.expect(TokenKind::Semicolon, "`;`");
                Statement::Expr(value)
            }
        }
    }

    fn parse_expr(&mut self) -> Expr {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Expr {
        let lhs = self.parse_additive();

        let operator = match self.peek_kind() {
            Some(TokenKind::Equals) => BinaryOp::Equals,
            Some(TokenKind::NotEquals) => BinaryOp::NotEquals,
            Some(TokenKind::LessThan) => BinaryOp::LessThan,
            Some(TokenKind::LessOrEqual) => BinaryOp::LessOrEqual,
            Some(TokenKind::GreaterThan) => BinaryOp::GreaterThan,
            Some(TokenKind::GreaterOrEqual) => BinaryOp::GreaterOrEqual,
            _ => return lhs,
        };
        self.advance();

        Expr::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(self.parse_additive()),
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let operator = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Subtract,
                _ => return lhs,
            };
            self.advance();
            lhs = Expr::Binary {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(self.parse_multiplicative()),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let operator = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Multiply,
                Some(TokenKind::Slash) => BinaryOp::Divide,
                _ => return lhs,
            };
            self.advance();
            lhs = Expr::Binary {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(self.parse_unary()),
            };
        }
    }

    fn parse_unary(&mut self) -> Expr {
        let operator = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Negate,
            Some(TokenKind::Bang) => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.advance();
        Expr::Unary {
            operator,
            operand: Box::new(self.parse_unary()),
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(value) => Expr::Literal(Value::Int(value)),
            TokenKind::Str(value) => Expr::Literal(Value::Str(value)),
            TokenKind::KwTrue => Expr::Literal(Value::Bool(true)),
            TokenKind::KwFalse => Expr::Literal(Value::Bool(false)),
            TokenKind::KwNull => Expr::Literal(Value::Null),
            TokenKind::LeftParen => {
                let inner = self.parse_expr();
                self.expect(TokenKind::RightParen, "`)`");
                inner
            }
            TokenKind::Ident(name) => {
                let symbol = InternedSymbol::new(&name);
                if self.eat(&TokenKind::LeftParen) {
                    let mut arguments = Vec::new();
                    if self.peek_kind() != Some(&TokenKind::RightParen) {
                        loop {
                            arguments.push(self.parse_expr());
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RightParen, "`)`");
                    Expr::Call {
                        function: symbol,
                        arguments,
                    }
                } else {
                    Expr::Var(Variable::new(symbol))
                }
            }
            kind => self.report_fatal_error(
                token.span.start,
                &format!("Expected an expression but found {kind:?}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(source: &str) -> Program {
        let source = SourceFile::from_memory(source);
        Parser::parse_program(&source)
    }

    #[test]
    fn parses_a_function_with_control_flow() {
        let program = parse(indoc! {"
            fn count(n) {
                i = 0;
                while i < n {
                    print i;
                    i = i + 1;
                }
                return i;
            }
        "});

        assert_eq!(program.statements.len(), 1);
        let Statement::Function {
            parameters, body, ..
        } = &program.statements[0]
        else {
            panic!("expected a function");
        };
        assert_eq!(parameters.len(), 1);
        assert!(matches!(body[1], Statement::While { .. }));
    }

    #[test]
    fn parses_calls_and_precedence() {
        let program = parse("x = f(1) + 2 * 3;");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected an assignment");
        };
        let Expr::Binary {
            operator: BinaryOp::Add,
            rhs,
            ..
        } = value
        else {
            panic!("expected `+` at the top");
        };
        assert!(matches!(
            **rhs,
            Expr::Binary {
                operator: BinaryOp::Multiply,
                ..
            }
        ));
    }
}
