//! Intérprete de referencia para programas de IR.
//!
//! Ejecuta directamente las listas de instrucciones que produce el
//! generador, sin pasar por LLVM, y acumula lo que el programa imprime
//! mediante `printf`.

#![allow(dead_code)]

use std::collections::HashMap;

use pascalc::ir::{
    BinaryOp, CastOp, Function, Global, Instruction, Label, Operand, Predicate, Program, Type,
};

const STEP_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    Ptr(Pointer),
    Aggregate(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Root {
    Global(String),
    Slot(usize, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    root: Root,
    path: Vec<usize>,
}

/// Compila y ejecuta un programa, retornando su salida.
pub fn run_source(text: &str) -> String {
    let program = pascalc::compile(text, "test").expect("program should compile");
    run(&program)
}

pub fn run(program: &Program) -> String {
    let mut machine = Machine::new(program);
    machine.call("main", Vec::new());
    machine.output
}

struct Machine<'a> {
    functions: HashMap<&'a str, &'a Function>,
    texts: HashMap<&'a str, &'a [u8]>,
    memory: HashMap<Root, Value>,
    frames: usize,
    steps: usize,
    output: String,
}

impl<'a> Machine<'a> {
    fn new(program: &'a Program) -> Self {
        let mut memory = HashMap::new();
        let mut texts = HashMap::new();

        for global in &program.globals {
            match global {
                Global::Variable { name, typ } => {
                    memory.insert(Root::Global(name.clone()), zero(typ));
                }

                Global::Text { name, bytes } => {
                    texts.insert(name.as_str(), bytes.as_slice());
                }
            }
        }

        let functions = program
            .functions
            .iter()
            .map(|function| (function.name.as_str(), function))
            .collect();

        Machine {
            functions,
            texts,
            memory,
            frames: 0,
            steps: 0,
            output: String::new(),
        }
    }

    fn call(&mut self, name: &str, arguments: Vec<Value>) -> Option<Value> {
        let function = *self
            .functions
            .get(name)
            .unwrap_or_else(|| panic!("undefined function {}", name));

        self.frames += 1;
        let frame = self.frames;

        let labels: HashMap<Label, usize> = function
            .body
            .iter()
            .enumerate()
            .filter_map(|(index, instruction)| match instruction {
                Instruction::SetLabel(label) => Some((*label, index)),
                _ => None,
            })
            .collect();

        let mut locals: HashMap<String, Value> = function
            .parameters
            .iter()
            .map(|(name, _)| name.clone())
            .zip(arguments)
            .collect();

        let mut pc = 0;
        loop {
            self.steps += 1;
            assert!(self.steps < STEP_LIMIT, "step limit exceeded");

            let instruction = function
                .body
                .get(pc)
                .unwrap_or_else(|| panic!("fell off the end of {}", name));

            pc += 1;

            let jump = |label: &Label| labels[label];

            match instruction {
                Instruction::Alloca { slot, typ } => {
                    let root = Root::Slot(frame, slot.clone());
                    self.memory.insert(root.clone(), zero(typ));
                    locals.insert(slot.clone(), Value::Ptr(Pointer { root, path: vec![] }));
                }

                Instruction::Load { output, slot, .. } => {
                    let pointer = pointer(value(&locals, slot));
                    let loaded = self.load(&pointer);
                    locals.insert(output.clone(), loaded);
                }

                Instruction::Store { value: stored, slot, .. } => {
                    let pointer = pointer(value(&locals, slot));
                    let stored = value(&locals, stored);
                    self.store(&pointer, stored);
                }

                Instruction::Binary {
                    output,
                    op,
                    lhs,
                    rhs,
                    ..
                } => {
                    let result = binary(*op, value(&locals, lhs), value(&locals, rhs));
                    locals.insert(output.clone(), result);
                }

                Instruction::Compare {
                    output,
                    predicate,
                    lhs,
                    rhs,
                    ..
                } => {
                    let result = compare(*predicate, value(&locals, lhs), value(&locals, rhs));
                    locals.insert(output.clone(), Value::Bool(result));
                }

                Instruction::Negate { output, value: operand } => {
                    let result = match value(&locals, operand) {
                        Value::Double(value) => Value::Double(-value),
                        other => panic!("fneg on {:?}", other),
                    };

                    locals.insert(output.clone(), result);
                }

                Instruction::Cast {
                    output,
                    op,
                    value: operand,
                    ..
                } => {
                    let result = match (op, value(&locals, operand)) {
                        (CastOp::SiToFp, Value::Int(value)) => Value::Double(value as f64),
                        (CastOp::ZExt, Value::Bool(value)) => Value::Int(value as i64),
                        (op, other) => panic!("{:?} on {:?}", op, other),
                    };

                    locals.insert(output.clone(), result);
                }

                Instruction::ElementPtr {
                    output,
                    base,
                    indices,
                    ..
                } => {
                    let mut pointer = pointer(value(&locals, base));
                    for index in &indices[1..] {
                        match value(&locals, index) {
                            Value::Int(index) => pointer.path.push(index as usize),
                            other => panic!("index {:?}", other),
                        }
                    }

                    locals.insert(output.clone(), Value::Ptr(pointer));
                }

                Instruction::Call {
                    output,
                    target,
                    arguments,
                    ..
                } => {
                    let arguments: Vec<Value> = arguments
                        .iter()
                        .map(|(_, argument)| value(&locals, argument))
                        .collect();

                    let result = if target == "printf" {
                        self.printf(arguments);
                        Some(Value::Int(0))
                    } else {
                        self.call(target, arguments)
                    };

                    if let (Some(output), Some(result)) = (output, result) {
                        locals.insert(output.clone(), result);
                    }
                }

                Instruction::SetLabel(_) => (),
                Instruction::Jump(label) => pc = jump(label),

                Instruction::JumpIf {
                    condition,
                    then,
                    otherwise,
                } => {
                    pc = match value(&locals, condition) {
                        Value::Bool(true) => jump(then),
                        Value::Bool(false) => jump(otherwise),
                        other => panic!("branch on {:?}", other),
                    };
                }

                Instruction::Transition {
                    target: Some(label),
                    ..
                } => pc = jump(label),

                Instruction::Transition { target: None, .. } => panic!("unresolved transition"),

                Instruction::Return(returned) => {
                    return returned
                        .as_ref()
                        .map(|(_, returned)| value(&locals, returned));
                }
            }
        }
    }

    fn load(&self, pointer: &Pointer) -> Value {
        let mut current = &self.memory[&pointer.root];
        for &index in &pointer.path {
            current = match current {
                Value::Aggregate(elements) => &elements[index],
                other => panic!("cannot index {:?}", other),
            };
        }

        current.clone()
    }

    fn store(&mut self, pointer: &Pointer, stored: Value) {
        let mut current = self
            .memory
            .get_mut(&pointer.root)
            .expect("store to unallocated memory");

        for &index in &pointer.path {
            current = match current {
                Value::Aggregate(elements) => &mut elements[index],
                other => panic!("cannot index {:?}", other),
            };
        }

        *current = stored;
    }

    fn text(&self, argument: &Value) -> String {
        match argument {
            Value::Ptr(Pointer {
                root: Root::Global(name),
                ..
            }) => {
                let bytes = self.texts[name.as_str()];
                String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned()
            }

            other => panic!("expected a string, found {:?}", other),
        }
    }

    fn printf(&mut self, arguments: Vec<Value>) {
        let format = self.text(&arguments[0]);
        let mut arguments = arguments[1..].iter();

        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                self.output.push(c);
                continue;
            }

            let argument = arguments.next().expect("missing printf argument");
            let formatted = match (chars.next(), argument) {
                (Some('d'), Value::Int(value)) => value.to_string(),
                (Some('f'), Value::Double(value)) => format!("{:.6}", value),
                (Some('s'), text) => self.text(text),
                (directive, argument) => panic!("%{:?} with {:?}", directive, argument),
            };

            self.output.push_str(&formatted);
        }
    }
}

fn value(locals: &HashMap<String, Value>, operand: &Operand) -> Value {
    match operand {
        Operand::Local(name) => locals
            .get(name)
            .unwrap_or_else(|| panic!("undefined local %{}", name))
            .clone(),

        Operand::Global(name) => Value::Ptr(Pointer {
            root: Root::Global(name.clone()),
            path: vec![],
        }),

        Operand::Int(value) => Value::Int(*value),
        Operand::Double(value) => Value::Double(*value),
        Operand::Widened(value) => Value::Double(*value as f64),
        Operand::Bool(value) => Value::Bool(*value),
    }
}

fn pointer(value: Value) -> Pointer {
    match value {
        Value::Ptr(pointer) => pointer,
        other => panic!("expected a pointer, found {:?}", other),
    }
}

fn zero(typ: &Type) -> Value {
    match typ {
        Type::I1 => Value::Bool(false),
        Type::I32 => Value::Int(0),
        Type::Double => Value::Double(0.0),
        Type::Array(len, element) => Value::Aggregate(vec![zero(element); *len as usize]),
        Type::Struct(fields) => Value::Aggregate(fields.iter().map(zero).collect()),
        other => panic!("no zero value for {:?}", other),
    }
}

/// Aritmética de 32 bits con complemento a dos.
fn wrap(value: i64) -> Value {
    Value::Int(value as i32 as i64)
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    use BinaryOp::*;

    match (op, lhs, rhs) {
        (Add, Value::Int(a), Value::Int(b)) => wrap(a.wrapping_add(b)),
        (Sub, Value::Int(a), Value::Int(b)) => wrap(a.wrapping_sub(b)),
        (Mul, Value::Int(a), Value::Int(b)) => wrap(a.wrapping_mul(b)),
        (SDiv, Value::Int(a), Value::Int(b)) => wrap(a / b),
        (SRem, Value::Int(a), Value::Int(b)) => wrap(a % b),
        (And, Value::Int(a), Value::Int(b)) => wrap(a & b),
        (Or, Value::Int(a), Value::Int(b)) => wrap(a | b),
        (Xor, Value::Int(a), Value::Int(b)) => wrap(a ^ b),

        (FAdd, Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (FSub, Value::Double(a), Value::Double(b)) => Value::Double(a - b),
        (FMul, Value::Double(a), Value::Double(b)) => Value::Double(a * b),
        (FDiv, Value::Double(a), Value::Double(b)) => Value::Double(a / b),

        (And, Value::Bool(a), Value::Bool(b)) => Value::Bool(a && b),
        (Or, Value::Bool(a), Value::Bool(b)) => Value::Bool(a || b),
        (Xor, Value::Bool(a), Value::Bool(b)) => Value::Bool(a ^ b),

        (op, lhs, rhs) => panic!("{:?} on {:?} and {:?}", op, lhs, rhs),
    }
}

fn compare(predicate: Predicate, lhs: Value, rhs: Value) -> bool {
    use Predicate::*;

    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(&b),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(&b),
        (lhs, rhs) => panic!("comparing {:?} and {:?}", lhs, rhs),
    };

    let ordering = ordering.expect("unordered comparison");
    match predicate {
        Eq | Oeq => ordering.is_eq(),
        Ne | One => ordering.is_ne(),
        Slt | Olt => ordering.is_lt(),
        Sle | Ole => ordering.is_le(),
        Sgt | Ogt => ordering.is_gt(),
        Sge | Oge => ordering.is_ge(),
    }
}
