//! Generación de código.
//!
//! Traduce el árbol verificado a [`ir::Program`]. Cada variable del
//! programa principal se vuelve un global inicializado en cero. Las
//! rutinas reservan en su bloque de entrada un slot `%x.addr` por cada
//! parámetro y variable local, por lo que no se requieren nodos phi:
//! toda lectura es un `load` y toda escritura un `store`.
//!
//! Los temporales se nombran según la posición de origen de la
//! expresión que los produce (`%s<línea>-<columna>`), con un sufijo
//! numérico cuando una misma posición se emite más de una vez.

use std::{collections::HashMap, mem};

use log::debug;

use crate::{
    ast::{
        Assignment, BinOp, Block, ExprKind, Expression, Program, Routine, SimpleKind, Statement,
        Storage, TypeNode, UnaryOp, WriteArg,
    },
    ir::{
        self, BinaryOp, CastOp, External, Function, Global, Instruction, Label, Operand, Predicate,
        Type,
    },
    lex::Identifier,
    source::Position,
};

pub mod llvm;
pub mod patch;

pub use llvm::emit;

/// Traduce un programa completo.
pub fn generate(program: &Program) -> ir::Program {
    let mut generator = CodeGenerator::default();
    generator.program(program);
    generator.finish()
}

#[derive(Default)]
pub struct CodeGenerator {
    labels: u32,
    names: HashMap<String, u32>,
    formats: HashMap<String, String>,
    texts: HashMap<String, String>,
    globals: Vec<Global>,
    functions: Vec<Function>,
    allocas: Vec<Instruction>,
    code: Vec<Instruction>,
    uses_printf: bool,
}

enum Lowered {
    Arithmetic(BinaryOp),
    Compare(Predicate),
}

impl CodeGenerator {
    pub fn program(&mut self, program: &Program) {
        let scope = program.block.scope.as_ref();

        for (name, typ) in scope.into_iter().flat_map(|scope| scope.vars()) {
            self.globals.push(Global::Variable {
                name: global_symbol(name),
                typ: ir_type(typ),
            });
        }

        for (_, routine) in scope.into_iter().flat_map(|scope| scope.routines()) {
            self.routine(routine);
        }

        // El punto de entrada va después de todas las rutinas
        self.begin_function();
        self.statements(&program.block.statements);
        self.push(Instruction::Return(Some((Type::I32, Operand::Int(0)))));

        let body = self.end_function();
        self.add_function(Function {
            name: String::from("main"),
            returns: Type::I32,
            parameters: Vec::new(),
            body,
        });
    }

    pub fn finish(self) -> ir::Program {
        let mut externals = Vec::new();
        if self.uses_printf {
            externals.push(External {
                name: "printf",
                returns: Type::I32,
                parameters: vec![Type::Ptr],
                variadic: true,
            });
        }

        ir::Program {
            externals,
            globals: self.globals,
            functions: self.functions,
        }
    }

    fn routine(&mut self, routine: &Routine) {
        self.begin_function();

        let mut parameters = Vec::new();
        for (name, typ) in routine.params.vars() {
            let typ = ir_type(typ);
            let argument = format!("{}.arg", name.canonical());

            self.alloca(slot_name(name), typ.clone());
            self.push(Instruction::Store {
                typ: typ.clone(),
                value: Operand::Local(argument.clone()),
                slot: Operand::Local(slot_name(name)),
            });

            parameters.push((argument, typ));
        }

        let locals = routine.body.scope.as_ref();
        for (name, typ) in locals.into_iter().flat_map(|scope| scope.vars()) {
            self.alloca(slot_name(name), ir_type(typ));
        }

        self.statements(&routine.body.statements);

        // El resultado de una función vive en la variable homónima
        let returns = match &routine.returns {
            Some(typ) => {
                let typ = ir_type(typ);
                let result = routine.symbol.rsplit('.').next().unwrap_or(&routine.symbol);

                self.push(Instruction::Load {
                    output: String::from("retval"),
                    typ: typ.clone(),
                    slot: Operand::Local(format!("{}.addr", result)),
                });

                self.push(Instruction::Return(Some((
                    typ.clone(),
                    Operand::Local(String::from("retval")),
                ))));

                typ
            }

            None => {
                self.push(Instruction::Return(None));
                Type::Void
            }
        };

        let body = self.end_function();
        self.add_function(Function {
            name: user_symbol(&routine.symbol),
            returns,
            parameters,
            body,
        });

        for (_, nested) in locals.into_iter().flat_map(|scope| scope.routines()) {
            self.routine(nested);
        }
    }

    fn begin_function(&mut self) {
        self.names.clear();
        self.allocas.clear();
        self.code.clear();
    }

    /// Cuerpo final, con todos los slots reservados al inicio.
    fn end_function(&mut self) -> Vec<Instruction> {
        let mut body = mem::take(&mut self.allocas);
        body.append(&mut self.code);

        body
    }

    fn alloca(&mut self, slot: String, typ: Type) {
        self.allocas.push(Instruction::Alloca { slot, typ });
    }

    fn add_function(&mut self, function: Function) {
        debug!(
            "generated `{}` with {} instructions",
            function.name,
            function.body.len()
        );

        self.functions.push(function);
    }

    fn statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(Block { statements, .. }) => self.statements(statements),

            Statement::IfElse {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.expression(condition);

                let then_label = self.label();
                let else_label = otherwise.as_ref().map(|_| self.label());
                let merge = self.label();

                self.push(Instruction::JumpIf {
                    condition,
                    then: then_label,
                    otherwise: else_label.unwrap_or(merge),
                });

                self.push(Instruction::SetLabel(then_label));
                self.statement(then);
                self.push(Instruction::Jump(merge));

                if let (Some(label), Some(otherwise)) = (else_label, otherwise) {
                    self.push(Instruction::SetLabel(label));
                    self.statement(otherwise);
                    self.push(Instruction::Jump(merge));
                }

                self.push(Instruction::SetLabel(merge));
            }

            Statement::While { condition, body } => {
                let check = self.label();
                let start_label = self.label();
                let exit = self.label();

                self.push(Instruction::Jump(check));
                self.push(Instruction::SetLabel(check));

                let condition = self.expression(condition);
                self.push(Instruction::JumpIf {
                    condition,
                    then: start_label,
                    otherwise: exit,
                });

                let start = self.code.len();
                self.push(Instruction::SetLabel(start_label));
                self.statement(body);
                self.push(Instruction::Jump(check));
                self.push(Instruction::SetLabel(exit));

                self.close_loop(start, exit, check);
            }

            Statement::Repeat { body, condition } => {
                let start_label = self.label();
                let check = self.label();
                let exit = self.label();

                self.push(Instruction::Jump(start_label));

                let start = self.code.len();
                self.push(Instruction::SetLabel(start_label));
                self.statement(body);
                self.push(Instruction::Jump(check));
                self.push(Instruction::SetLabel(check));

                let condition = self.expression(condition);
                self.push(Instruction::JumpIf {
                    condition,
                    then: exit,
                    otherwise: start_label,
                });

                self.push(Instruction::SetLabel(exit));
                self.close_loop(start, exit, check);
            }

            Statement::For {
                position,
                init,
                bound,
                body,
            } => self.for_loop(*position, init, bound, body),

            Statement::Assign(Assignment { target, value }) => {
                let value = self.coerce(value, target.typ());
                let slot = self.address(target);

                self.push(Instruction::Store {
                    typ: ir_type(target.typ()),
                    value,
                    slot,
                });
            }

            Statement::Call {
                symbol,
                args,
                params,
                returns,
                ..
            } => {
                let returns = returns.as_ref().map(ir_type).unwrap_or(Type::Void);
                self.call(None, symbol, args, params, returns);
            }

            Statement::Write { newline, args } => self.write(*newline, args),

            Statement::Transition { kind, .. } => self.push(Instruction::Transition {
                kind: *kind,
                target: None,
            }),
        }
    }

    /// `for i := a to b do s` equivale a `i := a - 1; while ++i <= b do s`.
    fn for_loop(&mut self, position: Position, init: &Assignment, bound: &Expression, body: &Statement) {
        let value = self.coerce(&init.value, &TypeNode::INT);
        let slot = self.address(&init.target);

        self.push(Instruction::Store {
            typ: Type::I32,
            value,
            slot: slot.clone(),
        });

        let initial = self.name(position, ".pre");
        self.push(Instruction::Load {
            output: initial.clone(),
            typ: Type::I32,
            slot: slot.clone(),
        });

        let decremented = self.name(position, ".dec");
        self.push(Instruction::Binary {
            output: decremented.clone(),
            op: BinaryOp::Sub,
            typ: Type::I32,
            lhs: Operand::Local(initial),
            rhs: Operand::Int(1),
        });

        self.push(Instruction::Store {
            typ: Type::I32,
            value: Operand::Local(decremented),
            slot: slot.clone(),
        });

        let check = self.label();
        let start_label = self.label();
        let exit = self.label();

        self.push(Instruction::Jump(check));
        self.push(Instruction::SetLabel(check));

        // Lo emitido antes de `check` puede ser código muerto
        let slot = self.address(&init.target);

        let current = self.name(position, ".cur");
        self.push(Instruction::Load {
            output: current.clone(),
            typ: Type::I32,
            slot: slot.clone(),
        });

        let next = self.name(position, ".next");
        self.push(Instruction::Binary {
            output: next.clone(),
            op: BinaryOp::Add,
            typ: Type::I32,
            lhs: Operand::Local(current),
            rhs: Operand::Int(1),
        });

        self.push(Instruction::Store {
            typ: Type::I32,
            value: Operand::Local(next.clone()),
            slot,
        });

        let bound = self.coerce(bound, &TypeNode::INT);
        let compare = self.name(position, ".cmp");
        self.push(Instruction::Compare {
            output: compare.clone(),
            predicate: Predicate::Sle,
            typ: Type::I32,
            lhs: Operand::Local(next),
            rhs: bound,
        });

        self.push(Instruction::JumpIf {
            condition: Operand::Local(compare),
            then: start_label,
            otherwise: exit,
        });

        let start = self.code.len();
        self.push(Instruction::SetLabel(start_label));
        self.statement(body);
        self.push(Instruction::Jump(check));
        self.push(Instruction::SetLabel(exit));

        self.close_loop(start, exit, check);
    }

    /// Resuelve las transiciones del ciclo que inicia en `start`.
    fn close_loop(&mut self, start: usize, exit: Label, next: Label) {
        let resolved = patch::resolve_transitions(&mut self.code[start..], exit, next);
        let removed = patch::eliminate_dead_code(&mut self.code, start);

        if resolved > 0 {
            debug!(
                "loop L{}: {} transitions resolved, {} dead instructions removed",
                exit.0, resolved, removed
            );
        }
    }

    fn write(&mut self, newline: bool, args: &[WriteArg]) {
        let mut format = String::new();
        let mut arguments = Vec::new();

        for arg in args {
            match arg {
                WriteArg::Text(text) => {
                    format.push_str("%s");
                    let name = self.text(text);
                    arguments.push((Type::Ptr, Operand::Global(name)));
                }

                WriteArg::Value(value) => match value.typ().simple() {
                    Some(SimpleKind::Int) => {
                        format.push_str("%d");
                        arguments.push((Type::I32, self.expression(value)));
                    }

                    Some(SimpleKind::Double) => {
                        format.push_str("%f");
                        arguments.push((Type::Double, self.expression(value)));
                    }

                    Some(SimpleKind::Boolean) => {
                        format.push_str("%d");

                        let operand = self.expression(value);
                        let output = self.name(value.position(), ".cast");
                        self.push(Instruction::Cast {
                            output: output.clone(),
                            op: CastOp::ZExt,
                            from: Type::I1,
                            value: operand,
                            to: Type::I32,
                        });

                        arguments.push((Type::I32, Operand::Local(output)));
                    }

                    None => (),
                },
            }
        }

        if newline {
            format.push('\n');
        }

        if format.is_empty() {
            return;
        }

        let format = self.format(&format);
        arguments.insert(0, (Type::Ptr, Operand::Global(format)));

        self.uses_printf = true;
        self.push(Instruction::Call {
            output: None,
            returns: Type::I32,
            target: String::from("printf"),
            variadic: Some(vec![Type::Ptr]),
            arguments,
        });
    }

    fn call(
        &mut self,
        output: Option<String>,
        symbol: &str,
        args: &[Expression],
        params: &[TypeNode],
        returns: Type,
    ) {
        let arguments = args
            .iter()
            .zip(params)
            .map(|(arg, param)| (ir_type(param), self.coerce(arg, param)))
            .collect();

        self.push(Instruction::Call {
            output,
            returns,
            target: user_symbol(symbol),
            variadic: None,
            arguments,
        });
    }

    fn expression(&mut self, expression: &Expression) -> Operand {
        let position = expression.position();

        match expression.kind() {
            ExprKind::IntLiteral(value) => Operand::Int(*value as i64),
            ExprKind::DoubleLiteral(value) => Operand::Double(*value),
            ExprKind::BoolLiteral(value) => Operand::Bool(*value),

            ExprKind::Identifier { .. } | ExprKind::Index(..) | ExprKind::Field(..) => {
                let slot = self.address(expression);
                let output = self.name(position, "");

                self.push(Instruction::Load {
                    output: output.clone(),
                    typ: ir_type(expression.typ()),
                    slot,
                });

                Operand::Local(output)
            }

            ExprKind::Unary(op, operand) => self.unary(*op, operand, position),
            ExprKind::Binary(op, left, right) => self.binary(*op, left, right, expression),

            ExprKind::Call {
                symbol,
                args,
                params,
                ..
            } => {
                let output = self.name(position, "");
                let returns = ir_type(expression.typ());

                self.call(Some(output.clone()), symbol, args, params, returns);
                Operand::Local(output)
            }
        }
    }

    /// Evalúa una expresión ensanchando enteros cuando el destino es `double`.
    fn coerce(&mut self, expression: &Expression, target: &TypeNode) -> Operand {
        let widen = target.simple() == Some(SimpleKind::Double)
            && expression.typ().simple() == Some(SimpleKind::Int);

        if !widen {
            return self.expression(expression);
        }

        if let ExprKind::IntLiteral(value) = expression.kind() {
            return Operand::Widened(*value);
        }

        let value = self.expression(expression);
        let output = self.name(expression.position(), ".cast");

        self.push(Instruction::Cast {
            output: output.clone(),
            op: CastOp::SiToFp,
            from: Type::I32,
            value,
            to: Type::Double,
        });

        Operand::Local(output)
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expression, position: Position) -> Operand {
        let value = self.expression(operand);
        if op == UnaryOp::Plus {
            return value;
        }

        let output = self.name(position, "");
        let instruction = match (op, operand.typ().simple()) {
            (UnaryOp::Minus, Some(SimpleKind::Double)) => Instruction::Negate {
                output: output.clone(),
                value,
            },

            (UnaryOp::Minus, _) => Instruction::Binary {
                output: output.clone(),
                op: BinaryOp::Sub,
                typ: Type::I32,
                lhs: Operand::Int(0),
                rhs: value,
            },

            (_, Some(SimpleKind::Boolean)) => Instruction::Binary {
                output: output.clone(),
                op: BinaryOp::Xor,
                typ: Type::I1,
                lhs: value,
                rhs: Operand::Bool(true),
            },

            (_, _) => Instruction::Binary {
                output: output.clone(),
                op: BinaryOp::Xor,
                typ: Type::I32,
                lhs: value,
                rhs: Operand::Int(-1),
            },
        };

        self.push(instruction);
        Operand::Local(output)
    }

    fn binary(&mut self, op: BinOp, left: &Expression, right: &Expression, expression: &Expression) -> Operand {
        let is_double = |typ: &TypeNode| typ.simple() == Some(SimpleKind::Double);

        // Tipo en el que se evalúan ambos operandos
        let operands = if op.is_relational() {
            if !left.typ().is_numeric() {
                TypeNode::BOOLEAN
            } else if is_double(left.typ()) || is_double(right.typ()) {
                TypeNode::DOUBLE
            } else {
                TypeNode::INT
            }
        } else if op == BinOp::Divide {
            TypeNode::DOUBLE
        } else {
            expression.typ().clone()
        };

        let lhs = self.coerce(left, &operands);
        let rhs = self.coerce(right, &operands);

        let output = self.name(expression.position(), "");
        let typ = ir_type(&operands);

        let instruction = match lower(op, is_double(&operands)) {
            Lowered::Arithmetic(op) => Instruction::Binary {
                output: output.clone(),
                op,
                typ,
                lhs,
                rhs,
            },

            Lowered::Compare(predicate) => Instruction::Compare {
                output: output.clone(),
                predicate,
                typ,
                lhs,
                rhs,
            },
        };

        self.push(instruction);
        Operand::Local(output)
    }

    /// Dirección de una variable o de un elemento o campo dentro de ella.
    fn address(&mut self, expression: &Expression) -> Operand {
        let position = expression.position();

        match expression.kind() {
            ExprKind::Identifier { name, storage } => match storage {
                Storage::Global => Operand::Global(global_symbol(name)),
                Storage::Local => Operand::Local(slot_name(name)),
            },

            ExprKind::Index(array, index) => {
                let base = self.address(array);
                let (low, _) = array.typ().bounds().unwrap_or((0, 0));

                let index = self.expression(index);
                let index = if low != 0 {
                    let output = self.name(position, ".idx");
                    self.push(Instruction::Binary {
                        output: output.clone(),
                        op: BinaryOp::Sub,
                        typ: Type::I32,
                        lhs: index,
                        rhs: Operand::Int(low),
                    });

                    Operand::Local(output)
                } else {
                    index
                };

                self.element(position, array.typ(), base, index)
            }

            ExprKind::Field(record, _, field) => {
                let base = self.address(record);
                self.element(position, record.typ(), base, Operand::Int(*field as i64))
            }

            // El parser solo aplica selectores a variables, así que este
            // caso no ocurre hoy; un valor sin dirección va a un slot temporal
            _ => {
                let typ = ir_type(expression.typ());
                let value = self.expression(expression);
                let slot = self.name(position, ".tmp");

                self.alloca(slot.clone(), typ.clone());

                self.push(Instruction::Store {
                    typ,
                    value,
                    slot: Operand::Local(slot.clone()),
                });

                Operand::Local(slot)
            }
        }
    }

    fn element(&mut self, position: Position, aggregate: &TypeNode, base: Operand, index: Operand) -> Operand {
        let output = self.name(position, ".ptr");
        self.push(Instruction::ElementPtr {
            output: output.clone(),
            aggregate: ir_type(aggregate),
            base,
            indices: vec![Operand::Int(0), index],
        });

        Operand::Local(output)
    }

    fn format(&mut self, format: &str) -> String {
        if let Some(name) = self.formats.get(format) {
            return name.clone();
        }

        let name = format!(".fmt.{}", self.formats.len());
        self.add_text(&name, format);
        self.formats.insert(format.to_owned(), name.clone());

        name
    }

    fn text(&mut self, text: &str) -> String {
        if let Some(name) = self.texts.get(text) {
            return name.clone();
        }

        let name = format!(".str.{}", self.texts.len());
        self.add_text(&name, text);
        self.texts.insert(text.to_owned(), name.clone());

        name
    }

    fn add_text(&mut self, name: &str, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);

        self.globals.push(Global::Text {
            name: name.to_owned(),
            bytes,
        });
    }

    fn label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;

        label
    }

    /// Nombre único de temporal dentro de la función actual.
    fn name(&mut self, position: Position, suffix: &str) -> String {
        let base = format!("s{}-{}{}", position.line(), position.column(), suffix);

        let count = self.names.entry(base.clone()).or_insert(0);
        *count += 1;

        match *count {
            1 => base,
            count => format!("{}.{}", base, count - 1),
        }
    }

    fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }
}

fn lower(op: BinOp, is_double: bool) -> Lowered {
    use Lowered::{Arithmetic, Compare};

    match (op, is_double) {
        (BinOp::Add, false) => Arithmetic(BinaryOp::Add),
        (BinOp::Add, true) => Arithmetic(BinaryOp::FAdd),
        (BinOp::Sub, false) => Arithmetic(BinaryOp::Sub),
        (BinOp::Sub, true) => Arithmetic(BinaryOp::FSub),
        (BinOp::Mul, false) => Arithmetic(BinaryOp::Mul),
        (BinOp::Mul, true) => Arithmetic(BinaryOp::FMul),
        (BinOp::Divide, _) => Arithmetic(BinaryOp::FDiv),
        (BinOp::Div, _) => Arithmetic(BinaryOp::SDiv),
        (BinOp::Mod, _) => Arithmetic(BinaryOp::SRem),
        (BinOp::And, _) => Arithmetic(BinaryOp::And),
        (BinOp::Or, _) => Arithmetic(BinaryOp::Or),

        (BinOp::Equal, false) => Compare(Predicate::Eq),
        (BinOp::Equal, true) => Compare(Predicate::Oeq),
        (BinOp::NotEqual, false) => Compare(Predicate::Ne),
        (BinOp::NotEqual, true) => Compare(Predicate::One),
        (BinOp::Less, false) => Compare(Predicate::Slt),
        (BinOp::Less, true) => Compare(Predicate::Olt),
        (BinOp::LessOrEqual, false) => Compare(Predicate::Sle),
        (BinOp::LessOrEqual, true) => Compare(Predicate::Ole),
        (BinOp::Greater, false) => Compare(Predicate::Sgt),
        (BinOp::Greater, true) => Compare(Predicate::Ogt),
        (BinOp::GreaterOrEqual, false) => Compare(Predicate::Sge),
        (BinOp::GreaterOrEqual, true) => Compare(Predicate::Oge),
    }
}

/// Tipo de IR de un tipo del lenguaje.
pub fn ir_type(typ: &TypeNode) -> Type {
    match typ {
        TypeNode::Simple(SimpleKind::Int) => Type::I32,
        TypeNode::Simple(SimpleKind::Double) => Type::Double,
        TypeNode::Simple(SimpleKind::Boolean) => Type::I1,

        TypeNode::Array { element, .. } => {
            Type::Array(typ.len().unwrap_or(0), Box::new(ir_type(element)))
        }

        TypeNode::Record { fields } => {
            Type::Struct(fields.iter().map(|(_, typ)| ir_type(typ)).collect())
        }
    }
}

fn global_symbol(name: &Identifier) -> String {
    format!("global_{}", name.canonical())
}

fn slot_name(name: &Identifier) -> String {
    format!("{}.addr", name.canonical())
}

fn user_symbol(symbol: &str) -> String {
    format!("user_{}", symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn generate_text(text: &str) -> ir::Program {
        generate(&parse(text, "test").unwrap())
    }

    fn function<'a>(program: &'a ir::Program, name: &str) -> &'a Function {
        program
            .functions
            .iter()
            .find(|function| function.name == name)
            .unwrap()
    }

    /// Locales usados en una función que ninguna instrucción define.
    fn undefined_locals(function: &Function) -> Vec<String> {
        let mut defined: Vec<&str> = function
            .parameters
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();

        let mut used = Vec::new();
        for instruction in &function.body {
            let (output, operands): (Option<&String>, Vec<&Operand>) = match instruction {
                Instruction::Alloca { slot, .. } => (Some(slot), vec![]),
                Instruction::Load { output, slot, .. } => (Some(output), vec![slot]),
                Instruction::Store { value, slot, .. } => (None, vec![value, slot]),
                Instruction::Binary { output, lhs, rhs, .. }
                | Instruction::Compare { output, lhs, rhs, .. } => (Some(output), vec![lhs, rhs]),
                Instruction::Negate { output, value } | Instruction::Cast { output, value, .. } => {
                    (Some(output), vec![value])
                }
                Instruction::ElementPtr {
                    output,
                    base,
                    indices,
                    ..
                } => (Some(output), std::iter::once(base).chain(indices).collect()),
                Instruction::Call {
                    output, arguments, ..
                } => (output.as_ref(), arguments.iter().map(|(_, value)| value).collect()),
                Instruction::JumpIf { condition, .. } => (None, vec![condition]),
                Instruction::Return(Some((_, value))) => (None, vec![value]),
                _ => (None, vec![]),
            };

            defined.extend(output.map(String::as_str));
            used.extend(operands.into_iter().filter_map(|operand| match operand {
                Operand::Local(name) => Some(name.clone()),
                _ => None,
            }));
        }

        used.retain(|name| !defined.contains(&name.as_str()));
        used
    }

    fn has_unresolved(code: &[Instruction]) -> bool {
        code.iter()
            .any(|instruction| matches!(instruction, Instruction::Transition { target: None, .. }))
    }

    #[test]
    fn globals_and_main() {
        let program = generate_text("var a: integer; x: double; begin a := 1; x := a end.");

        assert_eq!(
            program.globals,
            vec![
                Global::Variable {
                    name: String::from("global_a"),
                    typ: Type::I32
                },
                Global::Variable {
                    name: String::from("global_x"),
                    typ: Type::Double
                },
            ]
        );

        let main = function(&program, "main");
        assert_eq!(main.returns, Type::I32);
        assert_eq!(
            main.body.last(),
            Some(&Instruction::Return(Some((Type::I32, Operand::Int(0)))))
        );

        assert!(main.body.iter().any(|instruction| matches!(
            instruction,
            Instruction::Cast {
                op: CastOp::SiToFp,
                ..
            }
        )));
    }

    #[test]
    fn literals_widen_without_a_cast() {
        let program = generate_text("var x: double; begin x := 3 end.");
        let main = function(&program, "main");

        assert_eq!(
            main.body[0],
            Instruction::Store {
                typ: Type::Double,
                value: Operand::Widened(3),
                slot: Operand::Global(String::from("global_x")),
            }
        );
    }

    #[test]
    fn temporaries_are_named_by_position() {
        let program = generate_text("var a: integer;\nbegin a := a + 1 end.");
        let main = function(&program, "main");

        assert_eq!(
            main.body[0],
            Instruction::Load {
                output: String::from("s2-12"),
                typ: Type::I32,
                slot: Operand::Global(String::from("global_a")),
            }
        );

        assert!(matches!(
            &main.body[1],
            Instruction::Binary { output, op: BinaryOp::Add, .. } if output == "s2-14"
        ));
    }

    #[test]
    fn repeated_positions_get_unique_names() {
        let program = generate_text("var a: array[1..3] of integer; begin a[2] += 1 end.");
        let main = function(&program, "main");

        let mut outputs: Vec<&str> = main
            .body
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Load { output, .. }
                | Instruction::Binary { output, .. }
                | Instruction::ElementPtr { output, .. } => Some(output.as_str()),
                _ => None,
            })
            .collect();

        let count = outputs.len();
        outputs.sort_unstable();
        outputs.dedup();

        assert_eq!(outputs.len(), count);
    }

    #[test]
    fn loops_leave_no_pending_transitions() {
        let text = "
            var i: integer;
            begin
                while true do begin
                    for i := 1 to 10 do begin
                        if i = 5 then continue;
                        if i = 7 then break
                    end;
                    break
                end;

                repeat break until false
            end.
        ";

        let program = generate_text(text);
        let main = function(&program, "main");

        assert!(!has_unresolved(&main.body));
    }

    #[test]
    fn for_after_a_break_computes_its_own_address() {
        let text = "
            var a: array[1..2] of integer; k, n: integer;
            begin
                while false do begin
                    break;
                    for a[k] := 1 to n do n := n + 1
                end;

                repeat
                    continue;
                    for a[k + 1] := 1 to 2 do n := n + 1
                until true
            end.
        ";

        let program = generate_text(text);
        let main = function(&program, "main");

        assert!(!has_unresolved(&main.body));
        assert_eq!(undefined_locals(main), Vec::<String>::new());
    }

    #[test]
    fn every_local_is_defined() {
        let text = "
            type point = record x, y: double end;
            var a: array[0..3] of point; i: integer;

            function norm(x, y: double): double;
            var s: double;
            begin s := x * x; norm := s + y * y end;

            begin
                for i := 0 to 3 do begin
                    a[i].x := i;
                    a[i].y += 1.5;
                    if norm(a[i].x, a[i].y) > 4 then break
                end;

                writeln(norm(a[1].x, -a[1].y), ' ', not (i < 2))
            end.
        ";

        let program = generate_text(text);
        for function in &program.functions {
            assert_eq!(undefined_locals(function), Vec::<String>::new(), "{}", function.name);
        }
    }

    #[test]
    fn break_removes_the_rest_of_the_block() {
        let program = generate_text("var a: integer; begin while true do begin break; a := 1 end end.");
        let main = function(&program, "main");

        assert!(!main
            .body
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Store { .. })));
    }

    #[test]
    fn inner_breaks_target_the_inner_exit() {
        let text = "begin while true do begin while false do break; break end end.";
        let program = generate_text(text);
        let main = function(&program, "main");

        let targets: Vec<Label> = main
            .body
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Transition {
                    target: Some(target),
                    ..
                } => Some(*target),
                _ => None,
            })
            .collect();

        assert_eq!(targets.len(), 2);
        assert_ne!(targets[0], targets[1]);
    }

    #[test]
    fn routines_use_stack_slots() {
        let text = "
            function twice(x: integer): integer;
            var y: integer;
            begin y := x * 2; twice := y end;
            begin writeln(twice(4)) end.
        ";

        let program = generate_text(text);
        let twice = function(&program, "user_twice");

        assert_eq!(twice.parameters, vec![(String::from("x.arg"), Type::I32)]);
        assert_eq!(
            twice.body[..4],
            [
                Instruction::Alloca {
                    slot: String::from("x.addr"),
                    typ: Type::I32
                },
                Instruction::Alloca {
                    slot: String::from("twice.addr"),
                    typ: Type::I32
                },
                Instruction::Alloca {
                    slot: String::from("y.addr"),
                    typ: Type::I32
                },
                Instruction::Store {
                    typ: Type::I32,
                    value: Operand::Local(String::from("x.arg")),
                    slot: Operand::Local(String::from("x.addr")),
                },
            ]
        );

        assert_eq!(
            twice.body.last(),
            Some(&Instruction::Return(Some((
                Type::I32,
                Operand::Local(String::from("retval"))
            ))))
        );

        assert_eq!(program.externals.len(), 1);
    }

    #[test]
    fn formats_and_texts_are_shared() {
        let text = "var a: integer; begin writeln('a'); writeln('a'); writeln(a); writeln(a) end.";
        let program = generate_text(text);

        let names: Vec<&str> = program.globals.iter().map(Global::name).collect();
        assert_eq!(names, ["global_a", ".str.0", ".fmt.0", ".fmt.1"]);
    }

    #[test]
    fn nested_routines_are_emitted_after_their_parent() {
        let text = "
            procedure outer;
                procedure inner; begin end;
            begin inner end;
            begin outer end.
        ";

        let program = generate_text(text);
        let names: Vec<&str> = program
            .functions
            .iter()
            .map(|function| function.name.as_str())
            .collect();

        assert_eq!(names, ["user_outer", "user_outer.inner", "main"]);
    }

    #[test]
    fn array_access_is_rebased() {
        let program = generate_text("var a: array[1..3] of integer; begin a[2] := 5 end.");
        let main = function(&program, "main");

        assert!(matches!(
            &main.body[0],
            Instruction::Binary { op: BinaryOp::Sub, rhs: Operand::Int(1), .. }
        ));

        assert!(matches!(
            &main.body[1],
            Instruction::ElementPtr { aggregate: Type::Array(3, _), .. }
        ));
    }
}
