//! Representación intermedia.
//!
//! El generador de código produce una lista lineal de instrucciones por
//! función en un subconjunto textual de LLVM IR. Las instrucciones
//! [`Instruction::Transition`] son saltos pendientes que corresponden a
//! `break` y `continue`; se resuelven al concluir cada ciclo. La forma
//! textual se produce en [`crate::codegen::llvm`].

pub use crate::ast::TransitionKind;

/// Programa completo listo para emitirse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub externals: Vec<External>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

/// Función provista por el runtime de C.
#[derive(Debug, Clone, PartialEq)]
pub struct External {
    pub name: &'static str,
    pub returns: Type,
    pub parameters: Vec<Type>,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Global {
    /// Variable del programa, inicializada en cero.
    Variable { name: String, typ: Type },

    /// Cadena constante terminada en nulo.
    Text { name: String, bytes: Vec<u8> },
}

impl Global {
    pub fn name(&self) -> &str {
        match self {
            Global::Variable { name, .. } => name,
            Global::Text { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub returns: Type,
    pub parameters: Vec<(String, Type)>,
    pub body: Vec<Instruction>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    I1,
    I32,
    Double,
    Ptr,
    Array(u64, Box<Type>),
    Struct(Vec<Type>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Valor o dirección con nombre local, sin el `%`.
    Local(String),

    /// Símbolo global, sin el `@`.
    Global(String),

    Int(i64),
    Double(f64),

    /// Entero literal en contexto de `double`, emitido como `N.0`.
    Widened(u64),

    Bool(bool),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl Predicate {
    pub fn is_float(self) -> bool {
        use Predicate::*;
        matches!(self, Oeq | One | Olt | Ole | Ogt | Oge)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CastOp {
    SiToFp,
    ZExt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca {
        slot: String,
        typ: Type,
    },

    Load {
        output: String,
        typ: Type,
        slot: Operand,
    },

    Store {
        typ: Type,
        value: Operand,
        slot: Operand,
    },

    Binary {
        output: String,
        op: BinaryOp,
        typ: Type,
        lhs: Operand,
        rhs: Operand,
    },

    Compare {
        output: String,
        predicate: Predicate,
        typ: Type,
        lhs: Operand,
        rhs: Operand,
    },

    Negate {
        output: String,
        value: Operand,
    },

    Cast {
        output: String,
        op: CastOp,
        from: Type,
        value: Operand,
        to: Type,
    },

    ElementPtr {
        output: String,
        aggregate: Type,
        base: Operand,
        indices: Vec<Operand>,
    },

    Call {
        output: Option<String>,
        returns: Type,
        target: String,

        /// Tipos fijos de una función variádica, como `(ptr, ...)`.
        variadic: Option<Vec<Type>>,
        arguments: Vec<(Type, Operand)>,
    },

    SetLabel(Label),
    Jump(Label),

    JumpIf {
        condition: Operand,
        then: Label,
        otherwise: Label,
    },

    /// Salto pendiente de `break` o `continue`.
    Transition {
        kind: TransitionKind,
        target: Option<Label>,
    },

    Return(Option<(Type, Operand)>),
}

impl Instruction {
    /// Determina si la instrucción termina un bloque básico.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_)
                | Instruction::JumpIf { .. }
                | Instruction::Transition { .. }
                | Instruction::Return(_)
        )
    }
}
