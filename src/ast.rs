//! Árbol sintáctico verificado.
//!
//! El parser construye estos nodos de abajo hacia arriba mientras
//! verifica el programa. Cada expresión calcula su tipo resultante en
//! su constructor y lo conserva sin volver a calcularlo; una vez
//! construido, un nodo es de solo lectura.

use std::fmt::{self, Display};

use crate::{
    lex::Identifier,
    semantic::{self, DeclarationScope, Semantic},
    source::Position,
};

/// Un programa completo.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub block: Block,
}

/// Tipo escalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleKind {
    Int,
    Double,
    Boolean,
}

/// Tipo de una variable, parámetro o expresión.
///
/// Las referencias por nombre a tipos declarados con `type` se resuelven
/// durante el análisis, por lo cual un `TypeNode` siempre es estructural.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Simple(SimpleKind),

    /// Los límites son expresiones constantes ya reducidas a literales.
    Array {
        element: Box<TypeNode>,
        low: Box<Expression>,
        high: Box<Expression>,
    },

    Record {
        fields: Vec<(Identifier, TypeNode)>,
    },
}

impl TypeNode {
    pub const INT: TypeNode = TypeNode::Simple(SimpleKind::Int);
    pub const DOUBLE: TypeNode = TypeNode::Simple(SimpleKind::Double);
    pub const BOOLEAN: TypeNode = TypeNode::Simple(SimpleKind::Boolean);

    /// Obtiene el tipo escalar, si lo es.
    pub fn simple(&self) -> Option<SimpleKind> {
        match self {
            TypeNode::Simple(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.simple(), Some(SimpleKind::Int | SimpleKind::Double))
    }

    /// Límites inferior y superior de un arreglo.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            TypeNode::Array { low, high, .. } => Some((low.as_constant()?, high.as_constant()?)),
            _ => None,
        }
    }

    /// Cantidad de elementos de un arreglo.
    pub fn len(&self) -> Option<u64> {
        self.bounds().map(|(low, high)| (high - low + 1) as u64)
    }

    /// Busca un campo de registro por nombre, retornando su índice y tipo.
    pub fn field(&self, name: &Identifier) -> Option<(usize, &TypeNode)> {
        match self {
            TypeNode::Record { fields } => fields
                .iter()
                .enumerate()
                .find(|(_, (field, _))| field == name)
                .map(|(index, (_, typ))| (index, typ)),

            _ => None,
        }
    }

    /// Igualdad estructural, ignorando posiciones de origen.
    pub fn same_shape(&self, other: &TypeNode) -> bool {
        match (self, other) {
            (TypeNode::Simple(this), TypeNode::Simple(that)) => this == that,

            (TypeNode::Array { element, .. }, TypeNode::Array { element: other_element, .. }) => {
                self.bounds() == other.bounds() && element.same_shape(other_element)
            }

            (TypeNode::Record { fields }, TypeNode::Record { fields: other_fields }) => {
                fields.len() == other_fields.len()
                    && fields
                        .iter()
                        .zip(other_fields)
                        .all(|((a, a_type), (b, b_type))| a == b && a_type.same_shape(b_type))
            }

            _ => false,
        }
    }
}

impl Display for SimpleKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleKind::Int => fmt.write_str("integer"),
            SimpleKind::Double => fmt.write_str("double"),
            SimpleKind::Boolean => fmt.write_str("boolean"),
        }
    }
}

impl Display for TypeNode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Simple(kind) => kind.fmt(fmt),

            TypeNode::Array { element, .. } => match self.bounds() {
                Some((low, high)) => write!(fmt, "array[{}..{}] of {}", low, high, element),
                None => write!(fmt, "array of {}", element),
            },

            TypeNode::Record { fields } => {
                fmt.write_str("record ")?;
                for (name, typ) in fields {
                    write!(fmt, "{}: {}; ", name, typ)?;
                }

                fmt.write_str("end")
            }
        }
    }
}

/// Una declaración con nombre.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Var {
        position: Position,
        typ: TypeNode,
    },

    Const {
        position: Position,
        value: Expression,
    },

    Type {
        position: Position,
        aliased: TypeNode,
    },

    Routine(Routine),
}

impl Declaration {
    pub fn position(&self) -> Position {
        match self {
            Declaration::Var { position, .. } => *position,
            Declaration::Const { position, .. } => *position,
            Declaration::Type { position, .. } => *position,
            Declaration::Routine(routine) => routine.position,
        }
    }
}

/// Procedimiento o función.
///
/// Una declaración `forward` registra solamente la firma; el cuerpo se
/// adjunta cuando aparece la definición correspondiente.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub position: Position,

    /// Símbolo calificado, como `outer.inner` para rutinas anidadas.
    pub symbol: String,

    /// Parámetros en orden de declaración, todos [`Declaration::Var`].
    pub params: DeclarationScope,

    pub returns: Option<TypeNode>,
    pub body: Block,
    pub forward: bool,
}

impl Routine {
    /// Tipos de los parámetros en orden.
    pub fn param_types(&self) -> Vec<TypeNode> {
        self.params
            .iter()
            .filter_map(|(_, declaration)| match declaration {
                Declaration::Var { typ, .. } => Some(typ.clone()),
                _ => None,
            })
            .collect()
    }

    /// Compara firmas para reconciliar declaraciones `forward`.
    pub fn same_signature(&self, other: &Routine) -> bool {
        let returns = match (&self.returns, &other.returns) {
            (None, None) => true,
            (Some(this), Some(that)) => this.same_shape(that),
            _ => false,
        };

        let these = self.params.iter();
        let those = other.params.iter();

        returns
            && self.params.len() == other.params.len()
            && these.zip(those).all(|((this_name, this), (that_name, that))| {
                let same_type = match (this, that) {
                    (Declaration::Var { typ: a, .. }, Declaration::Var { typ: b, .. }) => {
                        a.same_shape(b)
                    }

                    _ => false,
                };

                this_name == that_name && same_type
            })
    }
}

/// Ubicación de almacenamiento de una variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Storage {
    /// Variable del programa principal.
    Global,

    /// Parámetro o variable local de la rutina actual.
    Local,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Divide,
    Div,
    Mod,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl BinOp {
    pub fn is_relational(self) -> bool {
        use BinOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual
        )
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        let string = match self {
            Add            => "+",
            Sub            => "-",
            Mul            => "*",
            Divide         => "/",
            Div            => "div",
            Mod            => "mod",
            And            => "and",
            Or             => "or",
            Equal          => "=",
            NotEqual       => "<>",
            Less           => "<",
            LessOrEqual    => "<=",
            Greater        => ">",
            GreaterOrEqual => ">=",
        };

        fmt.write_str(string)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

impl Display for UnaryOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Plus => fmt.write_str("+"),
            UnaryOp::Minus => fmt.write_str("-"),
            UnaryOp::Not => fmt.write_str("not"),
        }
    }
}

/// Una expresión con su tipo resultante.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    position: Position,
    typ: TypeNode,
    kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binary(BinOp, Box<Expression>, Box<Expression>),
    Unary(UnaryOp, Box<Expression>),

    Identifier {
        name: Identifier,
        storage: Storage,
    },

    IntLiteral(u64),
    DoubleLiteral(f64),
    BoolLiteral(bool),

    /// Llamada a función; `params` son los tipos declarados de la firma.
    Call {
        name: Identifier,
        symbol: String,
        args: Vec<Expression>,
        params: Vec<TypeNode>,
    },

    /// `array[index]`
    Index(Box<Expression>, Box<Expression>),

    /// `record.field`, con el índice del campo en el registro.
    Field(Box<Expression>, Identifier, usize),
}

impl Expression {
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn typ(&self) -> &TypeNode {
        &self.typ
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn int(value: u64, position: Position) -> Self {
        Expression {
            position,
            typ: TypeNode::INT,
            kind: ExprKind::IntLiteral(value),
        }
    }

    pub fn double(value: f64, position: Position) -> Self {
        Expression {
            position,
            typ: TypeNode::DOUBLE,
            kind: ExprKind::DoubleLiteral(value),
        }
    }

    pub fn boolean(value: bool, position: Position) -> Self {
        Expression {
            position,
            typ: TypeNode::BOOLEAN,
            kind: ExprKind::BoolLiteral(value),
        }
    }

    pub fn identifier(name: Identifier, typ: TypeNode, storage: Storage, position: Position) -> Self {
        Expression {
            position,
            typ,
            kind: ExprKind::Identifier { name, storage },
        }
    }

    /// Operación binaria; el tipo resultante sale de la tabla de operadores.
    pub fn binary(op: BinOp, left: Expression, right: Expression, position: Position) -> Semantic<Self> {
        let typ = semantic::binary_type(op, left.typ(), right.typ(), position)?;

        Ok(Expression {
            position,
            typ,
            kind: ExprKind::Binary(op, Box::new(left), Box::new(right)),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expression, position: Position) -> Semantic<Self> {
        let typ = semantic::unary_type(op, operand.typ(), position)?;

        Ok(Expression {
            position,
            typ,
            kind: ExprKind::Unary(op, Box::new(operand)),
        })
    }

    pub fn call(
        name: Identifier,
        symbol: String,
        args: Vec<Expression>,
        params: Vec<TypeNode>,
        returns: TypeNode,
        position: Position,
    ) -> Self {
        Expression {
            position,
            typ: returns,
            kind: ExprKind::Call {
                name,
                symbol,
                args,
                params,
            },
        }
    }

    pub fn index(array: Expression, index: Expression, position: Position) -> Semantic<Self> {
        let typ = semantic::element_type(array.typ(), index.typ(), position)?;

        Ok(Expression {
            position,
            typ,
            kind: ExprKind::Index(Box::new(array), Box::new(index)),
        })
    }

    pub fn field(record: Expression, field: Identifier, position: Position) -> Semantic<Self> {
        let (index, typ) = semantic::field_type(record.typ(), &field, position)?;

        Ok(Expression {
            position,
            typ,
            kind: ExprKind::Field(Box::new(record), field, index),
        })
    }

    /// Construye la expresión literal de una constante ya evaluada.
    pub fn constant(constant: semantic::Constant, position: Position) -> Self {
        use semantic::Constant;

        match constant {
            Constant::Int(value) if value < 0 => Expression {
                position,
                typ: TypeNode::INT,
                kind: ExprKind::Unary(
                    UnaryOp::Minus,
                    Box::new(Expression::int(value.unsigned_abs(), position)),
                ),
            },

            Constant::Int(value) => Expression::int(value as u64, position),
            Constant::Double(value) => Expression::double(value, position),
            Constant::Bool(value) => Expression::boolean(value, position),
        }
    }

    /// Valor entero de un literal, posiblemente negado.
    pub fn as_constant(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::IntLiteral(value) => i64::try_from(*value).ok(),
            ExprKind::Unary(UnaryOp::Minus, operand) => operand.as_constant().map(|value| -value),
            ExprKind::Unary(UnaryOp::Plus, operand) => operand.as_constant(),
            _ => None,
        }
    }

    /// Determina si la expresión designa una ubicación asignable.
    pub fn is_designator(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier { .. } | ExprKind::Index(..) | ExprKind::Field(..)
        )
    }
}

/// Secuencia de sentencias con su ámbito de declaraciones opcional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub scope: Option<DeclarationScope>,
    pub statements: Vec<Statement>,
}

/// `target := value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Expression,
    pub value: Expression,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Break,
    Continue,
}

/// Argumento de `write`/`writeln`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteArg {
    Value(Expression),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Block),

    IfElse {
        condition: Expression,
        then: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },

    /// `for init to bound do body`; el límite se reevalúa en cada iteración.
    For {
        position: Position,
        init: Assignment,
        bound: Expression,
        body: Box<Statement>,
    },

    While {
        condition: Expression,
        body: Box<Statement>,
    },

    Repeat {
        body: Box<Statement>,
        condition: Expression,
    },

    Assign(Assignment),

    Call {
        name: Identifier,
        symbol: String,
        args: Vec<Expression>,
        params: Vec<TypeNode>,
        returns: Option<TypeNode>,
    },

    Write {
        newline: bool,
        args: Vec<WriteArg>,
    },

    Transition {
        kind: TransitionKind,
        position: Position,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::Constant;

    fn at(column: u32) -> Position {
        Position::new(1, column)
    }

    fn array(low: i64, high: i64, element: TypeNode) -> TypeNode {
        TypeNode::Array {
            element: Box::new(element),
            low: Box::new(Expression::constant(Constant::Int(low), at(1))),
            high: Box::new(Expression::constant(Constant::Int(high), at(9))),
        }
    }

    #[test]
    fn negative_constants_fold_back() {
        let expression = Expression::constant(Constant::Int(-3), at(4));
        assert_eq!(expression.as_constant(), Some(-3));
        assert_eq!(expression.typ(), &TypeNode::INT);
    }

    #[test]
    fn arrays_compare_by_shape() {
        let a = array(-2, 2, TypeNode::INT);
        let b = array(-2, 2, TypeNode::INT);
        let c = array(0, 4, TypeNode::INT);

        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
        assert_eq!(c.len(), Some(5));
        assert_eq!(a.to_string(), "array[-2..2] of integer");
    }

    #[test]
    fn record_fields_are_indexed() {
        let record = TypeNode::Record {
            fields: vec![
                (Identifier::new("x"), TypeNode::INT),
                (Identifier::new("Y"), TypeNode::DOUBLE),
            ],
        };

        let (index, typ) = record.field(&Identifier::new("y")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(typ, &TypeNode::DOUBLE);
        assert!(record.field(&Identifier::new("z")).is_none());
    }

    #[test]
    fn types_are_cached_at_construction() {
        let sum = Expression::binary(
            BinOp::Add,
            Expression::int(1, at(1)),
            Expression::double(2.5, at(5)),
            at(3),
        )
        .unwrap();

        assert_eq!(sum.typ(), &TypeNode::DOUBLE);
    }
}
