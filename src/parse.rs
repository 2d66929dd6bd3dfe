//! Análisis sintáctico.
//!
//! Parser recursivo descendente con un token de lookahead. Conforme
//! reconoce cada construcción aplica las reglas de [`crate::semantic`],
//! de modo que el árbol resultante ya está verificado: todo nombre está
//! declarado, los tipos concuerdan y las constantes están reducidas.
//!
//! El análisis se detiene en el primer error.

use std::mem;

use log::debug;
use thiserror::Error;

use crate::{
    ast::{
        Assignment, BinOp, Block, Declaration, Expression, Program, Routine, Statement, TransitionKind,
        TypeNode, UnaryOp, WriteArg,
    },
    lex::{Identifier, Keyword, LexerError, Token, TokenKind, Tokenizer},
    semantic::{self, Constant, DeclarationScope, Scopes, SemanticError},
    source::{Located, Position},
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error("unexpected symbol {0}")]
    UnexpectedSymbol(String),

    #[error("expected {expected} before {found}")]
    UnexpectedSymbolBefore { expected: String, found: String },

    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

pub type Parse<T> = Result<T, Located<ParserError>>;

impl From<Located<LexerError>> for Located<ParserError> {
    fn from(error: Located<LexerError>) -> Self {
        error.map(ParserError::from)
    }
}

impl From<Located<SemanticError>> for Located<ParserError> {
    fn from(error: Located<SemanticError>) -> Self {
        error.map(ParserError::from)
    }
}

/// Analiza un programa completo.
pub fn parse(text: &str, name: &str) -> Parse<Program> {
    Parser::new(Tokenizer::new(text))?.parse_program(name)
}

pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
    scopes: Scopes,
    loops: usize,
    path: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokenizer: Tokenizer<'a>) -> Parse<Self> {
        let current = tokenizer.current_token()?;

        Ok(Parser {
            tokenizer,
            current,
            scopes: Scopes::new(),
            loops: 0,
            path: Vec::new(),
        })
    }

    /// Analiza `[program x;] declaraciones begin ... end.`
    ///
    /// `name` se utiliza como nombre del programa cuando el encabezado
    /// `program` está ausente.
    pub fn parse_program(mut self, name: &str) -> Parse<Program> {
        let name = if self.is(Keyword::Program) {
            self.advance()?;
            let name = self.id()?;
            self.expect(TokenKind::Semicolon)?;

            name.into_inner().to_string()
        } else {
            name.to_owned()
        };

        self.declarations()?;
        let statements = self.compound()?;

        self.expect(TokenKind::Dot)?;
        self.expect(TokenKind::EndOfFile)?;

        let scope = self.scopes.into_global();
        debug!("parsed program `{}` with {} global declarations", name, scope.len());

        Ok(Program {
            name,
            block: Block {
                scope: Some(scope),
                statements,
            },
        })
    }

    fn declarations(&mut self) -> Parse<()> {
        loop {
            match self.current.kind {
                TokenKind::Keyword(Keyword::Var) => {
                    self.advance()?;
                    self.section(Parser::var_declaration)?;
                }

                TokenKind::Keyword(Keyword::Const) => {
                    self.advance()?;
                    self.section(Parser::const_declaration)?;
                }

                TokenKind::Keyword(Keyword::Type) => {
                    self.advance()?;
                    self.section(Parser::type_declaration)?;
                }

                TokenKind::Keyword(Keyword::Procedure | Keyword::Function) => self.routine()?,

                _ => break,
            }
        }

        let pending = self
            .scopes
            .top()
            .and_then(|scope| scope.routines().find(|(_, routine)| routine.forward))
            .map(|(name, routine)| (name.clone(), routine.position));

        match pending {
            Some((name, position)) => {
                let message = format!("forward declaration of {} has no body", name);
                semantic(SemanticError::Other(message), position)
            }

            None => Ok(()),
        }
    }

    fn section(&mut self, rule: fn(&mut Self) -> Parse<DeclarationScope>) -> Parse<()> {
        loop {
            let declarations = rule(self)?;
            self.scopes.merge(declarations)?;

            if self.current.kind != TokenKind::Id {
                break Ok(());
            }
        }
    }

    fn var_declaration(&mut self) -> Parse<DeclarationScope> {
        let names = self.id_list()?;
        self.expect(TokenKind::Colon)?;
        let typ = self.typ()?;
        self.expect(TokenKind::Semicolon)?;

        let mut declarations = DeclarationScope::new();
        for name in names {
            let (position, name) = name.split();
            let typ = typ.clone();

            declarations.insert(name, Declaration::Var { position, typ })?;
        }

        Ok(declarations)
    }

    fn const_declaration(&mut self) -> Parse<DeclarationScope> {
        let (position, name) = self.id()?.split();
        self.expect(TokenKind::Equal)?;

        let value = self.expression()?;
        let value = match semantic::fold(&value)? {
            Constant::Int(integer) if i32::try_from(integer).is_err() => {
                let error = LexerError::IntegerOverflow(integer.to_string());
                return Err(Located::at(error.into(), value.position()));
            }

            constant => Expression::constant(constant, value.position()),
        };

        self.expect(TokenKind::Semicolon)?;

        let mut declarations = DeclarationScope::new();
        declarations.insert(name, Declaration::Const { position, value })?;

        Ok(declarations)
    }

    fn type_declaration(&mut self) -> Parse<DeclarationScope> {
        let (position, name) = self.id()?.split();
        self.expect(TokenKind::Equal)?;
        let aliased = self.typ()?;
        self.expect(TokenKind::Semicolon)?;

        let mut declarations = DeclarationScope::new();
        declarations.insert(name, Declaration::Type { position, aliased })?;

        Ok(declarations)
    }

    fn routine(&mut self) -> Parse<()> {
        let is_function = self.is(Keyword::Function);
        self.advance()?;

        let (position, name) = self.id()?.split();
        let params = match self.current.kind {
            TokenKind::OpenParen => self.params()?,
            _ => DeclarationScope::new(),
        };

        let returns = if is_function {
            self.expect(TokenKind::Colon)?;
            Some(self.typ()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon)?;

        let mut path = self.path.clone();
        path.push(name.canonical());

        let routine = Routine {
            position,
            symbol: path.join("."),
            params,
            returns,
            body: Block::default(),
            forward: true,
        };

        let forward = self.is(Keyword::Forward);
        self.register(&name, &routine, forward)?;

        if forward {
            self.advance()?;
            self.expect(TokenKind::Semicolon)?;

            return Ok(());
        }

        self.path.push(name.canonical());
        self.scopes.enter_routine(routine.params.clone());

        if let Some(typ) = &routine.returns {
            let result = Declaration::Var {
                position,
                typ: typ.clone(),
            };

            self.scopes.declare(name.clone(), result)?;
        }

        let loops = mem::replace(&mut self.loops, 0);
        self.declarations()?;
        let statements = self.compound()?;
        self.expect(TokenKind::Semicolon)?;
        self.loops = loops;

        let locals = self.scopes.leave_routine();
        self.path.pop();

        debug!("parsed routine `{}`", routine.symbol);

        let declared = self.scopes.top_mut().and_then(|scope| scope.get_mut(&name));
        if let Some(Declaration::Routine(declared)) = declared {
            declared.body = Block {
                scope: Some(locals),
                statements,
            };

            declared.forward = false;
        }

        Ok(())
    }

    /// Registra la firma de una rutina o la reconcilia con su declaración `forward`.
    fn register(&mut self, name: &Identifier, routine: &Routine, forward: bool) -> Parse<()> {
        let scope = match self.scopes.top_mut() {
            Some(scope) => scope,
            None => return Ok(()),
        };

        match scope.get(name) {
            Some(Declaration::Routine(existing)) if existing.forward && !forward => {
                if existing.same_signature(routine) {
                    Ok(())
                } else {
                    let message = format!("{} does not match its forward declaration", name);
                    semantic(SemanticError::Other(message), routine.position)
                }
            }

            Some(_) => {
                let error = SemanticError::DuplicateDeclaration(name.clone());
                semantic(error, routine.position)
            }

            None => {
                let declaration = Declaration::Routine(routine.clone());
                Ok(scope.insert(name.clone(), declaration)?)
            }
        }
    }

    fn params(&mut self) -> Parse<DeclarationScope> {
        self.expect(TokenKind::OpenParen)?;

        let mut params = DeclarationScope::new();
        if self.current.kind != TokenKind::CloseParen {
            loop {
                let group = self.id_list()?;
                self.expect(TokenKind::Colon)?;
                let typ = self.typ()?;

                for name in group {
                    let (position, name) = name.split();
                    let typ = typ.clone();

                    params.insert(name, Declaration::Var { position, typ })?;
                }

                if self.current.kind != TokenKind::Semicolon {
                    break;
                }

                self.advance()?;
            }
        }

        self.expect(TokenKind::CloseParen)?;
        Ok(params)
    }

    fn typ(&mut self) -> Parse<TypeNode> {
        let typ = match self.current.kind {
            TokenKind::Keyword(Keyword::Integer) => TypeNode::INT,
            TokenKind::Keyword(Keyword::Double) => TypeNode::DOUBLE,
            TokenKind::Keyword(Keyword::Boolean) => TypeNode::BOOLEAN,
            TokenKind::Keyword(Keyword::Array) => return self.array_type(),
            TokenKind::Keyword(Keyword::Record) => return self.record_type(),

            TokenKind::Id => {
                let name = self.id()?;
                let resolved = self.scopes.lookup(&name)?;

                return match resolved.declaration {
                    Declaration::Type { aliased, .. } => Ok(aliased.clone()),
                    _ => {
                        let error = SemanticError::UnexpectedType(format!("`{}` is not a type", name.as_ref()));
                        semantic(error, name.position())
                    }
                };
            }

            _ => return self.unexpected(),
        };

        self.advance()?;
        Ok(typ)
    }

    fn array_type(&mut self) -> Parse<TypeNode> {
        self.keyword(Keyword::Array)?;
        self.expect(TokenKind::OpenSquare)?;

        let mut ranges = vec![self.range()?];
        while self.current.kind == TokenKind::Comma {
            self.advance()?;
            ranges.push(self.range()?);
        }

        self.expect(TokenKind::CloseSquare)?;
        self.keyword(Keyword::Of)?;

        let element = self.typ()?;
        let array = ranges.into_iter().rev().fold(element, |element, (low, high)| TypeNode::Array {
            element: Box::new(element),
            low: Box::new(low),
            high: Box::new(high),
        });

        Ok(array)
    }

    fn range(&mut self) -> Parse<(Expression, Expression)> {
        let low = self.integer_constant()?;
        self.expect(TokenKind::DoubleDot)?;
        let high = self.integer_constant()?;

        match (low.as_constant(), high.as_constant()) {
            (Some(from), Some(to)) if from > to => {
                let message = format!("empty range {}..{}", from, to);
                semantic(SemanticError::Other(message), low.position())
            }

            _ => Ok((low, high)),
        }
    }

    fn integer_constant(&mut self) -> Parse<Expression> {
        let expression = self.expression()?;
        let position = expression.position();

        match semantic::fold(&expression)? {
            Constant::Int(value) if i32::try_from(value).is_ok() => {
                Ok(Expression::constant(Constant::Int(value), position))
            }

            Constant::Int(value) => {
                let error = LexerError::IntegerOverflow(value.to_string());
                Err(Located::at(error.into(), position))
            }

            _ => {
                let description = format!("`{}` in array bounds, expected `integer`", expression.typ());
                semantic(SemanticError::UnexpectedType(description), position)
            }
        }
    }

    fn record_type(&mut self) -> Parse<TypeNode> {
        self.keyword(Keyword::Record)?;

        let mut fields: Vec<(Identifier, TypeNode)> = Vec::new();
        while self.current.kind == TokenKind::Id {
            let names = self.id_list()?;
            self.expect(TokenKind::Colon)?;
            let typ = self.typ()?;

            for name in names {
                let (position, name) = name.split();
                if fields.iter().any(|(field, _)| *field == name) {
                    return semantic(SemanticError::DuplicateDeclaration(name), position);
                }

                fields.push((name, typ.clone()));
            }

            if self.current.kind != TokenKind::Semicolon {
                break;
            }

            self.advance()?;
        }

        self.keyword(Keyword::End)?;
        Ok(TypeNode::Record { fields })
    }

    fn compound(&mut self) -> Parse<Vec<Statement>> {
        self.keyword(Keyword::Begin)?;
        let statements = self.statement_list()?;
        self.keyword(Keyword::End)?;

        Ok(statements)
    }

    fn statement_list(&mut self) -> Parse<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            if let Some(statement) = self.statement()? {
                statements.push(statement);
            }

            if self.current.kind != TokenKind::Semicolon {
                break Ok(statements);
            }

            self.advance()?;
        }
    }

    /// Retorna `None` ante una sentencia vacía.
    fn statement(&mut self) -> Parse<Option<Statement>> {
        let statement = match self.current.kind {
            TokenKind::Keyword(Keyword::Begin) => Statement::Block(Block {
                scope: None,
                statements: self.compound()?,
            }),

            TokenKind::Keyword(Keyword::If) => self.if_statement()?,
            TokenKind::Keyword(Keyword::While) => self.while_statement()?,
            TokenKind::Keyword(Keyword::Repeat) => self.repeat_statement()?,
            TokenKind::Keyword(Keyword::For) => self.for_statement()?,

            TokenKind::Keyword(Keyword::Break) => self.transition(TransitionKind::Break)?,
            TokenKind::Keyword(Keyword::Continue) => self.transition(TransitionKind::Continue)?,

            TokenKind::Id => self.id_statement()?,

            _ => return Ok(None),
        };

        Ok(Some(statement))
    }

    fn if_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::If)?;
        let condition = self.expression()?;
        semantic::check_condition(&condition)?;

        self.keyword(Keyword::Then)?;
        let then = Box::new(self.statement()?.unwrap_or_else(empty));

        let otherwise = if self.is(Keyword::Else) {
            self.advance()?;
            Some(Box::new(self.statement()?.unwrap_or_else(empty)))
        } else {
            None
        };

        Ok(Statement::IfElse {
            condition,
            then,
            otherwise,
        })
    }

    fn while_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::While)?;
        let condition = self.expression()?;
        semantic::check_condition(&condition)?;

        self.keyword(Keyword::Do)?;
        let body = self.loop_body(Parser::statement)?.unwrap_or_else(empty);

        Ok(Statement::While {
            condition,
            body: Box::new(body),
        })
    }

    fn repeat_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Repeat)?;
        let statements = self.loop_body(Parser::statement_list)?;

        self.keyword(Keyword::Until)?;
        let condition = self.expression()?;
        semantic::check_condition(&condition)?;

        let body = Statement::Block(Block {
            scope: None,
            statements,
        });

        Ok(Statement::Repeat {
            body: Box::new(body),
            condition,
        })
    }

    fn for_statement(&mut self) -> Parse<Statement> {
        let position = self.keyword(Keyword::For)?.position;

        let name = self.id()?;
        let target = self.designator(name)?;
        if target.typ() != &TypeNode::INT {
            let description = format!("`{}` as loop counter, expected `integer`", target.typ());
            return semantic(SemanticError::UnexpectedType(description), target.position());
        }

        self.expect(TokenKind::Assign)?;
        let value = self.expression()?;
        semantic::check_assignable(&TypeNode::INT, &value, "as loop start")?;

        if self.is(Keyword::Downto) {
            let message = String::from("`downto` loops are not supported");
            return semantic(SemanticError::Other(message), self.current.position);
        }

        self.keyword(Keyword::To)?;
        let bound = self.expression()?;
        semantic::check_assignable(&TypeNode::INT, &bound, "as loop bound")?;

        self.keyword(Keyword::Do)?;
        let body = self.loop_body(Parser::statement)?.unwrap_or_else(empty);

        Ok(Statement::For {
            position,
            init: Assignment { target, value },
            bound,
            body: Box::new(body),
        })
    }

    fn loop_body<T>(&mut self, rule: fn(&mut Self) -> Parse<T>) -> Parse<T> {
        self.loops += 1;
        let result = rule(self);
        self.loops -= 1;

        result
    }

    fn transition(&mut self, kind: TransitionKind) -> Parse<Statement> {
        let position = self.advance()?.position;

        if self.loops == 0 {
            let keyword = match kind {
                TransitionKind::Break => Keyword::Break,
                TransitionKind::Continue => Keyword::Continue,
            };

            let message = format!("`{}` outside of a loop", keyword);
            return semantic(SemanticError::Other(message), position);
        }

        Ok(Statement::Transition { kind, position })
    }

    fn id_statement(&mut self) -> Parse<Statement> {
        let name = self.id()?;

        let canonical = name.as_ref().canonical();
        let is_write = canonical == "write" || canonical == "writeln";

        let is_routine = self
            .scopes
            .lookup(&name)
            .map(|resolved| matches!(resolved.declaration, Declaration::Routine(_)));

        match is_routine {
            Err(_) if is_write => self.write(canonical == "writeln"),
            Ok(true) => self.call_statement(name),
            _ if self.current.kind == TokenKind::OpenParen => self.call_statement(name),
            _ => self.assignment(name),
        }
    }

    fn call_statement(&mut self, name: Located<Identifier>) -> Parse<Statement> {
        let (symbol, params, returns) = {
            let routine = self.scopes.lookup_routine(&name)?;
            (routine.symbol.clone(), routine.param_types(), routine.returns.clone())
        };

        let args = self.arguments(&name, &params)?;

        Ok(Statement::Call {
            name: name.into_inner(),
            symbol,
            args,
            params,
            returns,
        })
    }

    fn assignment(&mut self, name: Located<Identifier>) -> Parse<Statement> {
        let target = self.designator(name)?;

        let position = self.current.position;
        let op = match self.current.kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::TimesAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Divide),
            _ => return self.expected(TokenKind::Assign),
        };

        self.advance()?;

        let mut value = self.expression()?;
        if let Some(op) = op {
            value = Expression::binary(op, target.clone(), value, position)?;
        }

        semantic::check_assignable(target.typ(), &value, "in assignment")?;
        Ok(Statement::Assign(Assignment { target, value }))
    }

    fn write(&mut self, newline: bool) -> Parse<Statement> {
        let mut args = Vec::new();

        if self.current.kind == TokenKind::OpenParen {
            self.advance()?;

            if self.current.kind != TokenKind::CloseParen {
                loop {
                    args.push(self.write_arg()?);
                    if self.current.kind != TokenKind::Comma {
                        break;
                    }

                    self.advance()?;
                }
            }

            self.expect(TokenKind::CloseParen)?;
        }

        Ok(Statement::Write { newline, args })
    }

    fn write_arg(&mut self) -> Parse<WriteArg> {
        if self.current.kind == TokenKind::Str {
            let token = self.advance()?;
            return Ok(WriteArg::Text(token.value));
        }

        let value = self.expression()?;
        match value.typ() {
            TypeNode::Simple(_) => Ok(WriteArg::Value(value)),
            typ => {
                let description = format!("`{}` in write", typ);
                semantic(SemanticError::UnexpectedType(description), value.position())
            }
        }
    }

    fn arguments(&mut self, name: &Located<Identifier>, params: &[TypeNode]) -> Parse<Vec<Expression>> {
        let mut args = Vec::new();

        if self.current.kind == TokenKind::OpenParen {
            self.advance()?;

            if self.current.kind != TokenKind::CloseParen {
                args.push(self.expression()?);
                while self.current.kind == TokenKind::Comma {
                    self.advance()?;
                    args.push(self.expression()?);
                }
            }

            self.expect(TokenKind::CloseParen)?;
        }

        if args.len() != params.len() {
            let message = format!(
                "{} expects {} argument(s), found {}",
                name.as_ref(),
                params.len(),
                args.len()
            );

            return semantic(SemanticError::Other(message), name.position());
        }

        for (arg, param) in args.iter().zip(params) {
            semantic::check_assignable(param, arg, "as argument")?;
        }

        Ok(args)
    }

    /// Una variable seguida de selectores de índice o campo.
    fn designator(&mut self, name: Located<Identifier>) -> Parse<Expression> {
        let position = name.position();
        let resolved = self.scopes.lookup(&name)?;

        let variable = match resolved.declaration {
            Declaration::Var { typ, .. } => {
                let name = name.as_ref().clone();
                Expression::identifier(name, typ.clone(), resolved.storage, position)
            }

            Declaration::Const { .. } => {
                let message = format!("cannot assign to constant {}", name.as_ref());
                return semantic(SemanticError::Other(message), position);
            }

            Declaration::Routine(_) | Declaration::Type { .. } => {
                let description = format!("`{}` is not a variable", name.as_ref());
                return semantic(SemanticError::UnexpectedType(description), position);
            }
        };

        self.selectors(variable)
    }

    fn selectors(&mut self, mut expression: Expression) -> Parse<Expression> {
        loop {
            match self.current.kind {
                TokenKind::OpenSquare => {
                    let mut position = self.advance()?.position;

                    loop {
                        let index = self.expression()?;
                        expression = Expression::index(expression, index, position)?;

                        if self.current.kind != TokenKind::Comma {
                            break;
                        }

                        position = self.advance()?.position;
                    }

                    self.expect(TokenKind::CloseSquare)?;
                }

                TokenKind::Dot if matches!(expression.typ(), TypeNode::Record { .. }) => {
                    let position = self.advance()?.position;
                    let field = self.id()?.into_inner();

                    expression = Expression::field(expression, field, position)?;
                }

                _ => break Ok(expression),
            }
        }
    }

    fn expression(&mut self) -> Parse<Expression> {
        let mut left = self.simple_expression()?;

        while let Some(op) = relational(self.current.kind) {
            let position = self.advance()?.position;
            let right = self.simple_expression()?;

            left = Expression::binary(op, left, right, position)?;
        }

        Ok(left)
    }

    fn simple_expression(&mut self) -> Parse<Expression> {
        let mut left = self.term()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Keyword(Keyword::Or) => BinOp::Or,
                _ => break Ok(left),
            };

            let position = self.advance()?.position;
            let right = self.term()?;

            left = Expression::binary(op, left, right, position)?;
        }
    }

    fn term(&mut self) -> Parse<Expression> {
        let mut left = self.unary()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Times => BinOp::Mul,
                TokenKind::Slash => BinOp::Divide,
                TokenKind::Keyword(Keyword::Div) => BinOp::Div,
                TokenKind::Keyword(Keyword::Mod) => BinOp::Mod,
                TokenKind::Keyword(Keyword::And) => BinOp::And,
                _ => break Ok(left),
            };

            let position = self.advance()?.position;
            let right = self.unary()?;

            left = Expression::binary(op, left, right, position)?;
        }
    }

    fn unary(&mut self) -> Parse<Expression> {
        let op = match self.current.kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            _ => return self.primary(),
        };

        let position = self.advance()?.position;
        let operand = self.unary()?;

        Ok(Expression::unary(op, operand, position)?)
    }

    fn primary(&mut self) -> Parse<Expression> {
        let position = self.current.position;

        match self.current.kind {
            TokenKind::Integer => {
                let token = self.advance()?;
                match token.value.parse::<u64>() {
                    Ok(value) if value <= i32::MAX as u64 => Ok(Expression::int(value, position)),
                    _ => {
                        let error = LexerError::IntegerOverflow(token.text);
                        Err(Located::at(error.into(), position))
                    }
                }
            }

            TokenKind::Double => {
                let token = self.advance()?;
                match token.value.parse::<f64>() {
                    Ok(value) => Ok(Expression::double(value, position)),
                    Err(_) => {
                        let error = LexerError::MalformedNumber(token.text);
                        Err(Located::at(error.into(), position))
                    }
                }
            }

            TokenKind::Keyword(keyword @ (Keyword::True | Keyword::False)) => {
                self.advance()?;
                Ok(Expression::boolean(keyword == Keyword::True, position))
            }

            TokenKind::OpenParen => {
                self.advance()?;
                let expression = self.expression()?;
                self.expect(TokenKind::CloseParen)?;

                Ok(expression)
            }

            TokenKind::Id => {
                let name = self.id()?;
                self.id_expression(name)
            }

            _ => self.unexpected(),
        }
    }

    fn id_expression(&mut self, name: Located<Identifier>) -> Parse<Expression> {
        if self.current.kind == TokenKind::OpenParen {
            return self.call_expression(name);
        }

        let position = name.position();
        let variable = {
            let resolved = self.scopes.lookup(&name)?;

            match resolved.declaration {
                Declaration::Var { typ, .. } => {
                    let id = name.as_ref().clone();
                    Some(Expression::identifier(id, typ.clone(), resolved.storage, position))
                }

                Declaration::Const { value, .. } => {
                    let constant = semantic::fold(value)?;
                    return Ok(Expression::constant(constant, position));
                }

                Declaration::Routine(_) => None,

                Declaration::Type { .. } => {
                    let error = ParserError::UnexpectedSymbol(format!("`{}`", name.as_ref()));
                    return Err(Located::at(error, position));
                }
            }
        };

        match variable {
            Some(variable) => self.selectors(variable),
            None => self.call_expression(name),
        }
    }

    fn call_expression(&mut self, name: Located<Identifier>) -> Parse<Expression> {
        let position = name.position();
        let (symbol, params, returns) = {
            let routine = self.scopes.lookup_routine(&name)?;
            (routine.symbol.clone(), routine.param_types(), routine.returns.clone())
        };

        let returns = match returns {
            Some(returns) => returns,
            None => {
                let description = format!("procedure `{}` used as a value", name.as_ref());
                return semantic(SemanticError::UnexpectedType(description), position);
            }
        };

        let args = self.arguments(&name, &params)?;
        let name = name.into_inner();

        Ok(Expression::call(name, symbol, args, params, returns, position))
    }

    fn id_list(&mut self) -> Parse<Vec<Located<Identifier>>> {
        let mut names = vec![self.id()?];
        while self.current.kind == TokenKind::Comma {
            self.advance()?;
            names.push(self.id()?);
        }

        Ok(names)
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        match self.current.kind {
            TokenKind::Id => {
                let token = self.advance()?;
                Ok(Located::at(Identifier::new(token.text), token.position))
            }

            _ => self.expected(TokenKind::Id),
        }
    }

    fn is(&self, keyword: Keyword) -> bool {
        self.current.kind == TokenKind::Keyword(keyword)
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<Token> {
        self.expect(TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind) -> Parse<Token> {
        if self.current.kind == kind {
            self.advance()
        } else {
            self.expected(kind)
        }
    }

    /// Avanza al siguiente token y retorna el anterior.
    fn advance(&mut self) -> Parse<Token> {
        let next = self.tokenizer.next_token()?;
        Ok(mem::replace(&mut self.current, next))
    }

    fn expected<T>(&self, kind: TokenKind) -> Parse<T> {
        let error = ParserError::UnexpectedSymbolBefore {
            expected: kind.to_string(),
            found: self.current.describe(),
        };

        Err(Located::at(error, self.current.position))
    }

    fn unexpected<T>(&self) -> Parse<T> {
        let error = ParserError::UnexpectedSymbol(self.current.describe());
        Err(Located::at(error, self.current.position))
    }
}

fn semantic<T>(error: SemanticError, position: Position) -> Parse<T> {
    Err(Located::at(error.into(), position))
}

fn empty() -> Statement {
    Statement::Block(Block::default())
}

fn relational(kind: TokenKind) -> Option<BinOp> {
    let op = match kind {
        TokenKind::Equal => BinOp::Equal,
        TokenKind::NotEqual => BinOp::NotEqual,
        TokenKind::Less => BinOp::Less,
        TokenKind::LessEqual => BinOp::LessOrEqual,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::GreaterEqual => BinOp::GreaterOrEqual,
        _ => return None,
    };

    Some(op)
}
