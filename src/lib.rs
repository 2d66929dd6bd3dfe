//! Compilador para un lenguaje estilo Pascal.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST ([`ast`]) por medio de análisis sintáctico en
//! [`parse`]. Las verificaciones de [`semantic`] ocurren durante el
//! mismo recorrido, por lo que todo árbol que produce el parser ya es
//! un programa válido.
//!
//! # Back end
//! El árbol se traduce a la representación intermedia de [`ir`], la
//! cual se escribe como texto de LLVM en [`target`]. El ensamblado y
//! enlazado se delegan a `clang` en [`link`].

#[macro_use]
mod macros;

pub mod ast;
pub mod error;
pub mod ir;
pub mod lex;
pub mod link;
pub mod parse;
pub mod semantic;
pub mod source;

mod codegen;

/// Emisión de código.
///
/// Este módulo reexporta suficientes ítems internos relacionados a
/// generación de código para traducir un AST a texto de IR.
pub mod target {
    pub use crate::codegen::{emit, generate, ir_type};
}

/// Compila un programa completo hasta IR.
pub fn compile(text: &str, name: &str) -> parse::Parse<ir::Program> {
    let program = parse::parse(text, name)?;
    Ok(codegen::generate(&program))
}
