//! Análisis semántico.
//!
//! El parser invoca estas reglas conforme reconoce cada construcción,
//! por lo cual no existe una pasada semántica separada. Este módulo
//! define el ámbito de declaraciones, la pila de ámbitos visible en
//! cada punto del programa, la tabla de tipos de los operadores y la
//! evaluación de expresiones constantes.

use thiserror::Error;

use std::collections::HashMap;

use crate::{
    ast::{BinOp, Declaration, ExprKind, Expression, SimpleKind, Storage, TypeNode, UnaryOp},
    lex::Identifier,
    source::{Located, Position},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("identifier {0} is not declared")]
    UnknownIdentifier(Identifier),

    #[error("duplicate declaration of {0}")]
    DuplicateDeclaration(Identifier),

    #[error("unexpected type {0}")]
    UnexpectedType(String),

    #[error("{0}")]
    Other(String),
}

fn fail<T>(error: SemanticError, position: Position) -> Semantic<T> {
    Err(Located::at(error, position))
}

fn mismatch<T>(description: String, position: Position) -> Semantic<T> {
    fail(SemanticError::UnexpectedType(description), position)
}

/// Mapeo ordenado de nombres a declaraciones.
///
/// El orden de inserción se conserva, ya que determina el orden de los
/// parámetros y de la emisión de variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationScope {
    entries: Vec<(Identifier, Declaration)>,
    index: HashMap<Identifier, usize>,
}

impl DeclarationScope {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &Identifier) -> Option<&Declaration> {
        self.index.get(name).map(|&index| &self.entries[index].1)
    }

    pub fn get_mut(&mut self, name: &Identifier) -> Option<&mut Declaration> {
        let index = *self.index.get(name)?;
        Some(&mut self.entries[index].1)
    }

    pub fn contains(&self, name: &Identifier) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Declaration)> {
        self.entries.iter().map(|(name, declaration)| (name, declaration))
    }

    /// Agrega una declaración, fallando si el nombre ya existe.
    pub fn insert(&mut self, name: Identifier, declaration: Declaration) -> Semantic<()> {
        if self.contains(&name) {
            let position = declaration.position();
            return fail(SemanticError::DuplicateDeclaration(name), position);
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, declaration));

        Ok(())
    }

    /// Fusiona otro ámbito en este, fallando ante el primer nombre repetido.
    pub fn update(&mut self, other: DeclarationScope) -> Semantic<()> {
        for (name, declaration) in other.entries {
            self.insert(name, declaration)?;
        }

        Ok(())
    }

    /// Variables declaradas, en orden.
    pub fn vars(&self) -> impl Iterator<Item = (&Identifier, &TypeNode)> {
        self.iter().filter_map(|(name, declaration)| match declaration {
            Declaration::Var { typ, .. } => Some((name, typ)),
            _ => None,
        })
    }

    /// Rutinas declaradas, en orden.
    pub fn routines(&self) -> impl Iterator<Item = (&Identifier, &crate::ast::Routine)> {
        self.iter().filter_map(|(name, declaration)| match declaration {
            Declaration::Routine(routine) => Some((name, routine)),
            _ => None,
        })
    }
}

/// Región a la que pertenece un marco de la pila de ámbitos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Region {
    Global,
    Params,
    Locals,
}

#[derive(Debug)]
struct Frame {
    region: Region,
    depth: usize,
    scope: DeclarationScope,
}

/// Resultado de resolver un nombre.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub declaration: &'a Declaration,
    pub storage: Storage,
}

/// Pila de ámbitos visibles.
///
/// La base es el ámbito global. Cada rutina agrega un marco de
/// parámetros y encima uno de variables locales. Las búsquedas recorren
/// la pila desde el tope. Una rutina anidada no puede acceder a las
/// variables de rutinas que la encierran, ya que estas no viven en la
/// misma función generada.
#[derive(Debug)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Default for Scopes {
    fn default() -> Self {
        Scopes {
            frames: vec![Frame {
                region: Region::Global,
                depth: 0,
                scope: DeclarationScope::new(),
            }],
        }
    }
}

impl Scopes {
    pub fn new() -> Self {
        Default::default()
    }

    /// Nivel de anidamiento de rutinas; el programa principal es 0.
    pub fn depth(&self) -> usize {
        self.frames.last().map(|frame| frame.depth).unwrap_or(0)
    }

    pub fn region(&self) -> Region {
        self.frames
            .last()
            .map(|frame| frame.region)
            .unwrap_or(Region::Global)
    }

    pub fn top(&self) -> Option<&DeclarationScope> {
        self.frames.last().map(|frame| &frame.scope)
    }

    pub fn top_mut(&mut self) -> Option<&mut DeclarationScope> {
        self.frames.last_mut().map(|frame| &mut frame.scope)
    }

    /// Declara un nombre en el ámbito del tope.
    ///
    /// Las variables locales de una rutina no pueden ocultar a sus parámetros.
    pub fn declare(&mut self, name: Identifier, declaration: Declaration) -> Semantic<()> {
        let params = match self.region() {
            Region::Locals => self.frames.iter().rev().nth(1),
            _ => None,
        };

        if params.map_or(false, |frame| frame.scope.contains(&name)) {
            let position = declaration.position();
            return fail(SemanticError::DuplicateDeclaration(name), position);
        }

        match self.top_mut() {
            Some(scope) => scope.insert(name, declaration),
            None => fail(SemanticError::Other(String::from("no scope")), declaration.position()),
        }
    }

    /// Fusiona un ámbito completo en el tope.
    pub fn merge(&mut self, declarations: DeclarationScope) -> Semantic<()> {
        for (name, declaration) in declarations.entries {
            self.declare(name, declaration)?;
        }

        Ok(())
    }

    /// Entra al cuerpo de una rutina.
    pub fn enter_routine(&mut self, params: DeclarationScope) {
        let depth = self.depth() + 1;

        self.frames.push(Frame {
            region: Region::Params,
            depth,
            scope: params,
        });

        self.frames.push(Frame {
            region: Region::Locals,
            depth,
            scope: DeclarationScope::new(),
        });
    }

    /// Sale del cuerpo de una rutina, retornando sus variables locales.
    pub fn leave_routine(&mut self) -> DeclarationScope {
        let locals = self.pop();
        self.pop();

        locals
    }

    fn pop(&mut self) -> DeclarationScope {
        if self.frames.len() > 1 {
            self.frames.pop().map(|frame| frame.scope).unwrap_or_default()
        } else {
            DeclarationScope::new()
        }
    }

    /// Consume la pila y retorna el ámbito global.
    pub fn into_global(mut self) -> DeclarationScope {
        self.frames.truncate(1);
        self.frames.pop().map(|frame| frame.scope).unwrap_or_default()
    }

    /// Resuelve un nombre desde el tope de la pila.
    pub fn lookup(&self, name: &Located<Identifier>) -> Semantic<Resolved<'_>> {
        let position = name.position();
        let name = name.as_ref();

        let frame = self
            .frames
            .iter()
            .rev()
            .find(|frame| frame.scope.contains(name));

        let frame = match frame {
            Some(frame) => frame,
            None => return fail(SemanticError::UnknownIdentifier(name.clone()), position),
        };

        let declaration = match frame.scope.get(name) {
            Some(declaration) => declaration,
            None => return fail(SemanticError::UnknownIdentifier(name.clone()), position),
        };

        let is_var = matches!(declaration, Declaration::Var { .. });
        if is_var && frame.depth != 0 && frame.depth != self.depth() {
            let message = format!("cannot access {} from a nested routine", name);
            return fail(SemanticError::Other(message), position);
        }

        let storage = match frame.depth {
            0 => Storage::Global,
            _ => Storage::Local,
        };

        Ok(Resolved {
            declaration,
            storage,
        })
    }

    /// Resuelve un nombre considerando solamente rutinas.
    ///
    /// Dentro de una función su nombre designa a la variable resultado,
    /// por lo cual las llamadas recursivas necesitan saltarse esa variable.
    pub fn lookup_routine(&self, name: &Located<Identifier>) -> Semantic<&crate::ast::Routine> {
        let found = self
            .frames
            .iter()
            .rev()
            .find_map(|frame| match frame.scope.get(name.as_ref()) {
                Some(Declaration::Routine(routine)) => Some(routine),
                _ => None,
            });

        match found {
            Some(routine) => Ok(routine),
            None => fail(
                SemanticError::UnknownIdentifier(name.as_ref().clone()),
                name.position(),
            ),
        }
    }
}

/// Tipo resultante de un operador binario.
pub fn binary_type(op: BinOp, left: &TypeNode, right: &TypeNode, position: Position) -> Semantic<TypeNode> {
    use SimpleKind::*;

    let operands = (left.simple(), right.simple());
    let numeric = left.is_numeric() && right.is_numeric();

    let result = match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => match operands {
            (Some(Int), Some(Int)) => Some(Int),
            _ if numeric => Some(Double),
            _ => None,
        },

        BinOp::Divide if numeric => Some(Double),

        BinOp::Div | BinOp::Mod => match operands {
            (Some(Int), Some(Int)) => Some(Int),
            _ => None,
        },

        BinOp::And | BinOp::Or => match operands {
            (Some(Int), Some(Int)) => Some(Int),
            (Some(Boolean), Some(Boolean)) => Some(Boolean),
            _ => None,
        },

        BinOp::Equal | BinOp::NotEqual => match operands {
            (Some(Boolean), Some(Boolean)) => Some(Boolean),
            _ if numeric => Some(Boolean),
            _ => None,
        },

        op if op.is_relational() && numeric => Some(Boolean),

        _ => None,
    };

    match result {
        Some(kind) => Ok(TypeNode::Simple(kind)),
        None => mismatch(format!("`{}` {} `{}`", left, op, right), position),
    }
}

/// Tipo resultante de un operador unario.
pub fn unary_type(op: UnaryOp, operand: &TypeNode, position: Position) -> Semantic<TypeNode> {
    let valid = match op {
        UnaryOp::Plus | UnaryOp::Minus => operand.is_numeric(),
        UnaryOp::Not => matches!(
            operand.simple(),
            Some(SimpleKind::Int | SimpleKind::Boolean)
        ),
    };

    if valid {
        Ok(operand.clone())
    } else {
        mismatch(format!("{} `{}`", op, operand), position)
    }
}

/// Tipo de los elementos al indexar un arreglo.
pub fn element_type(array: &TypeNode, index: &TypeNode, position: Position) -> Semantic<TypeNode> {
    let element = match array {
        TypeNode::Array { element, .. } => element,
        _ => return mismatch(format!("`{}` is not an array", array), position),
    };

    if index.simple() != Some(SimpleKind::Int) {
        return mismatch(format!("`{}` as array index", index), position);
    }

    Ok(element.as_ref().clone())
}

/// Índice y tipo de un campo de registro.
pub fn field_type(
    record: &TypeNode,
    field: &Identifier,
    position: Position,
) -> Semantic<(usize, TypeNode)> {
    if !matches!(record, TypeNode::Record { .. }) {
        return mismatch(format!("`{}` is not a record", record), position);
    }

    match record.field(field) {
        Some((index, typ)) => Ok((index, typ.clone())),
        None => fail(SemanticError::UnknownIdentifier(field.clone()), position),
    }
}

/// Determina si un valor del tipo `value` puede guardarse en `target`.
///
/// Los enteros se ensanchan implícitamente a `double`. Los tipos
/// agregados requieren la misma forma.
pub fn assignable(target: &TypeNode, value: &TypeNode) -> bool {
    match (target.simple(), value.simple()) {
        (Some(SimpleKind::Double), Some(SimpleKind::Int)) => true,
        (Some(this), Some(that)) => this == that,
        _ => target.same_shape(value),
    }
}

/// Verifica una asignación o paso de argumento.
pub fn check_assignable(target: &TypeNode, value: &Expression, context: &str) -> Semantic<()> {
    if assignable(target, value.typ()) {
        Ok(())
    } else {
        let description = format!("`{}` {}, expected `{}`", value.typ(), context, target);
        mismatch(description, value.position())
    }
}

/// Las condiciones de control de flujo deben ser booleanas.
pub fn check_condition(condition: &Expression) -> Semantic<()> {
    match condition.typ().simple() {
        Some(SimpleKind::Boolean) => Ok(()),
        _ => mismatch(
            format!("`{}` in condition, expected `boolean`", condition.typ()),
            condition.position(),
        ),
    }
}

/// Valor de una expresión constante.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl Constant {
    fn as_double(self) -> f64 {
        match self {
            Constant::Int(value) => value as f64,
            Constant::Double(value) => value,
            Constant::Bool(value) => value as u8 as f64,
        }
    }
}

/// Evalúa una expresión constante.
///
/// Las constantes con nombre ya fueron reemplazadas por literales al
/// momento de construir la expresión, por lo cual cualquier
/// identificador restante es una variable y la expresión no es constante.
pub fn fold(expression: &Expression) -> Semantic<Constant> {
    let position = expression.position();
    let not_constant = || {
        fail(
            SemanticError::Other(String::from("expression is not constant")),
            position,
        )
    };

    match expression.kind() {
        ExprKind::IntLiteral(value) => match i64::try_from(*value) {
            Ok(value) => Ok(Constant::Int(value)),
            Err(_) => overflow(position),
        },

        ExprKind::DoubleLiteral(value) => Ok(Constant::Double(*value)),
        ExprKind::BoolLiteral(value) => Ok(Constant::Bool(*value)),

        ExprKind::Unary(op, operand) => match (op, fold(operand)?) {
            (UnaryOp::Plus, constant) => Ok(constant),
            (UnaryOp::Minus, Constant::Int(value)) => match value.checked_neg() {
                Some(value) => Ok(Constant::Int(value)),
                None => overflow(position),
            },

            (UnaryOp::Minus, Constant::Double(value)) => Ok(Constant::Double(-value)),
            (UnaryOp::Not, Constant::Int(value)) => Ok(Constant::Int(!value)),
            (UnaryOp::Not, Constant::Bool(value)) => Ok(Constant::Bool(!value)),
            _ => not_constant(),
        },

        ExprKind::Binary(op, left, right) => {
            let (left, right) = (fold(left)?, fold(right)?);
            fold_binary(*op, left, right, position)
        }

        _ => not_constant(),
    }
}

fn overflow<T>(position: Position) -> Semantic<T> {
    fail(
        SemanticError::Other(String::from("constant expression overflows")),
        position,
    )
}

fn fold_binary(op: BinOp, left: Constant, right: Constant, position: Position) -> Semantic<Constant> {
    use Constant::*;

    let division_by_zero = || {
        fail(
            SemanticError::Other(String::from("division by zero in constant expression")),
            position,
        )
    };

    let checked = |result: Option<i64>| match result {
        Some(value) => Ok(Int(value)),
        None => overflow(position),
    };

    let result = match (op, left, right) {
        (BinOp::Add, Int(a), Int(b)) => checked(a.checked_add(b))?,
        (BinOp::Sub, Int(a), Int(b)) => checked(a.checked_sub(b))?,
        (BinOp::Mul, Int(a), Int(b)) => checked(a.checked_mul(b))?,

        (BinOp::Div | BinOp::Mod, Int(_), Int(0)) => return division_by_zero(),
        (BinOp::Div, Int(a), Int(b)) => checked(a.checked_div(b))?,
        (BinOp::Mod, Int(a), Int(b)) => checked(a.checked_rem(b))?,

        (BinOp::And, Int(a), Int(b)) => Int(a & b),
        (BinOp::Or, Int(a), Int(b)) => Int(a | b),
        (BinOp::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(a || b),

        (BinOp::Equal, Bool(a), Bool(b)) => Bool(a == b),
        (BinOp::NotEqual, Bool(a), Bool(b)) => Bool(a != b),

        (op, Int(a), Int(b)) if op.is_relational() => Bool(compare(op, a, b)),
        (op, a, b) if op.is_relational() => Bool(compare(op, a.as_double(), b.as_double())),

        (BinOp::Divide, _, b) if b.as_double() == 0.0 => return division_by_zero(),
        (BinOp::Divide, a, b) => Double(a.as_double() / b.as_double()),

        (BinOp::Add, a, b) => Double(a.as_double() + b.as_double()),
        (BinOp::Sub, a, b) => Double(a.as_double() - b.as_double()),
        (BinOp::Mul, a, b) => Double(a.as_double() * b.as_double()),

        _ => {
            let message = format!("operator {} is not constant", op);
            return fail(SemanticError::Other(message), position);
        }
    };

    Ok(result)
}

fn compare<T: PartialOrd>(op: BinOp, a: T, b: T) -> bool {
    match op {
        BinOp::Equal => a == b,
        BinOp::NotEqual => a != b,
        BinOp::Less => a < b,
        BinOp::LessOrEqual => a <= b,
        BinOp::Greater => a > b,
        _ => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(column: u32) -> Position {
        Position::new(1, column)
    }

    fn var(typ: TypeNode) -> Declaration {
        Declaration::Var {
            position: at(1),
            typ,
        }
    }

    fn located(name: &str) -> Located<Identifier> {
        Located::at(Identifier::new(name), at(1))
    }

    #[test]
    fn operator_table() {
        let int = TypeNode::INT;
        let double = TypeNode::DOUBLE;
        let boolean = TypeNode::BOOLEAN;

        let result = |op, a: &TypeNode, b: &TypeNode| binary_type(op, a, b, at(1)).ok();

        assert_eq!(result(BinOp::Add, &int, &int), Some(TypeNode::INT));
        assert_eq!(result(BinOp::Mul, &int, &double), Some(TypeNode::DOUBLE));
        assert_eq!(result(BinOp::Divide, &int, &int), Some(TypeNode::DOUBLE));
        assert_eq!(result(BinOp::Div, &int, &int), Some(TypeNode::INT));
        assert_eq!(result(BinOp::Mod, &double, &int), None);
        assert_eq!(result(BinOp::And, &boolean, &boolean), Some(TypeNode::BOOLEAN));
        assert_eq!(result(BinOp::And, &boolean, &int), None);
        assert_eq!(result(BinOp::Less, &int, &double), Some(TypeNode::BOOLEAN));
        assert_eq!(result(BinOp::Less, &boolean, &boolean), None);
        assert_eq!(result(BinOp::Equal, &boolean, &boolean), Some(TypeNode::BOOLEAN));
        assert_eq!(result(BinOp::Add, &boolean, &int), None);
    }

    #[test]
    fn mismatch_reports_operand_types() {
        let error = binary_type(BinOp::Add, &TypeNode::BOOLEAN, &TypeNode::INT, at(7))
            .unwrap_err();

        assert_eq!(error.position(), at(7));
        assert_eq!(
            error.to_string(),
            "1:7 - unexpected type `boolean` + `integer`"
        );
    }

    #[test]
    fn integers_widen_to_double() {
        assert!(assignable(&TypeNode::DOUBLE, &TypeNode::INT));
        assert!(!assignable(&TypeNode::INT, &TypeNode::DOUBLE));
        assert!(!assignable(&TypeNode::BOOLEAN, &TypeNode::INT));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut scope = DeclarationScope::new();
        scope.insert(Identifier::new("a"), var(TypeNode::INT)).unwrap();

        let mut other = DeclarationScope::new();
        other.insert(Identifier::new("b"), var(TypeNode::INT)).unwrap();
        other.insert(Identifier::new("A"), var(TypeNode::DOUBLE)).unwrap();

        let error = scope.update(other).unwrap_err();
        assert!(matches!(
            error.val(),
            SemanticError::DuplicateDeclaration(name) if name.as_ref() == "A"
        ));

        let names: Vec<_> = scope.iter().map(|(name, _)| name.to_string()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn lookup_walks_from_the_top() {
        let mut scopes = Scopes::new();
        scopes.declare(Identifier::new("x"), var(TypeNode::INT)).unwrap();

        let mut params = DeclarationScope::new();
        params.insert(Identifier::new("x"), var(TypeNode::DOUBLE)).unwrap();
        scopes.enter_routine(params);

        let resolved = scopes.lookup(&located("X")).unwrap();
        assert_eq!(resolved.storage, Storage::Local);
        assert!(matches!(
            resolved.declaration,
            Declaration::Var { typ, .. } if *typ == TypeNode::DOUBLE
        ));

        scopes.leave_routine();

        let resolved = scopes.lookup(&located("x")).unwrap();
        assert_eq!(resolved.storage, Storage::Global);
        assert!(scopes.lookup(&located("y")).is_err());
    }

    #[test]
    fn enclosing_locals_are_not_captured() {
        let mut scopes = Scopes::new();
        scopes.enter_routine(DeclarationScope::new());
        scopes.declare(Identifier::new("local"), var(TypeNode::INT)).unwrap();
        scopes.enter_routine(DeclarationScope::new());

        let error = scopes.lookup(&located("local")).unwrap_err();
        assert!(matches!(error.val(), SemanticError::Other(_)));
        assert_eq!(scopes.depth(), 2);
    }

    #[test]
    fn constants_fold() {
        let expression = Expression::binary(
            BinOp::Mul,
            Expression::int(6, at(1)),
            Expression::unary(UnaryOp::Minus, Expression::int(7, at(6)), at(5)).unwrap(),
            at(3),
        )
        .unwrap();

        assert_eq!(fold(&expression).unwrap(), Constant::Int(-42));

        let division = Expression::binary(
            BinOp::Div,
            Expression::int(1, at(1)),
            Expression::int(0, at(7)),
            at(3),
        )
        .unwrap();

        assert!(fold(&division).is_err());
    }

    #[test]
    fn variables_are_not_constant() {
        let x = Expression::identifier(Identifier::new("x"), TypeNode::INT, Storage::Global, at(1));
        assert!(fold(&x).is_err());
    }
}
