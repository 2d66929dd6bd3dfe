//! Forma textual de la IR.
//!
//! El resultado es un módulo de LLVM con punteros opacos que puede
//! alimentarse directamente a `clang -x ir`.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

use crate::ir::{
    BinaryOp, CastOp, External, Function, Global, Instruction, Label, Operand, Predicate, Program,
    Type,
};

/// Escribe un programa completo.
pub fn emit<W: Write>(program: &Program, output: &mut W) -> io::Result<()> {
    for External {
        name,
        returns,
        parameters,
        variadic,
    } in &program.externals
    {
        let mut parameters = list(parameters);
        if *variadic {
            parameters.push_str(", ...");
        }

        writeln!(output, "declare {} @{}({})", returns, name, parameters)?;
    }

    if !program.externals.is_empty() {
        writeln!(output)?;
    }

    for global in &program.globals {
        match global {
            Global::Variable { name, typ } => {
                writeln!(output, "@{} = global {} zeroinitializer", name, typ)?
            }

            Global::Text { name, bytes } => writeln!(
                output,
                "@{} = private unnamed_addr constant [{} x i8] c\"{}\"",
                name,
                bytes.len(),
                escape(bytes)
            )?,
        }
    }

    for function in &program.functions {
        writeln!(output)?;

        let writer = FunctionWriter {
            output: &mut *output,
            function,
        };

        writer.write_ir()?;
    }

    Ok(())
}

struct FunctionWriter<'a, W> {
    output: &'a mut W,
    function: &'a Function,
}

impl<W: Write> FunctionWriter<'_, W> {
    fn write_ir(mut self) -> io::Result<()> {
        let Function {
            name,
            returns,
            parameters,
            body,
        } = self.function;

        let parameters: Vec<String> = parameters
            .iter()
            .map(|(name, typ)| format!("{} %{}", typ, name))
            .collect();

        writeln!(
            self.output,
            "define {} @{}({}) {{",
            returns,
            name,
            parameters.join(", ")
        )?;

        writeln!(self.output, "entry:")?;

        // Lo que sigue a un terminador es inalcanzable hasta la próxima etiqueta
        let mut terminated = false;
        for instruction in body {
            match instruction {
                Instruction::SetLabel(label) => {
                    if !terminated {
                        emit!(self, "br label %{}", label)?;
                    }

                    writeln!(self.output, "{}:", label)?;
                    terminated = false;
                }

                _ if terminated => (),

                _ => {
                    self.put_instruction(instruction)?;
                    terminated = instruction.is_terminator();
                }
            }
        }

        writeln!(self.output, "}}")
    }

    fn put_instruction(&mut self, instruction: &Instruction) -> io::Result<()> {
        use Instruction::*;

        match instruction {
            Alloca { slot, typ } => emit!(self, "%{} = alloca {}", slot, typ),

            Load { output, typ, slot } => emit!(self, "%{} = load {}, ptr {}", output, typ, slot),

            Store { typ, value, slot } => emit!(self, "store {} {}, ptr {}", typ, value, slot),

            Binary {
                output,
                op,
                typ,
                lhs,
                rhs,
            } => emit!(self, "%{} = {} {} {}, {}", output, op, typ, lhs, rhs),

            Compare {
                output,
                predicate,
                typ,
                lhs,
                rhs,
            } => {
                let opcode = if predicate.is_float() { "fcmp" } else { "icmp" };
                emit!(
                    self,
                    "%{} = {} {} {} {}, {}",
                    output,
                    opcode,
                    predicate,
                    typ,
                    lhs,
                    rhs
                )
            }

            Negate { output, value } => emit!(self, "%{} = fneg double {}", output, value),

            Cast {
                output,
                op,
                from,
                value,
                to,
            } => emit!(self, "%{} = {} {} {} to {}", output, op, from, value, to),

            ElementPtr {
                output,
                aggregate,
                base,
                indices,
            } => {
                let indices: Vec<String> = indices
                    .iter()
                    .map(|index| format!("i32 {}", index))
                    .collect();

                emit!(
                    self,
                    "%{} = getelementptr inbounds {}, ptr {}, {}",
                    output,
                    aggregate,
                    base,
                    indices.join(", ")
                )
            }

            Call {
                output,
                returns,
                target,
                variadic,
                arguments,
            } => {
                let callee = match variadic {
                    Some(fixed) => format!("{} ({}, ...)", returns, list(fixed)),
                    None => returns.to_string(),
                };

                let arguments: Vec<String> = arguments
                    .iter()
                    .map(|(typ, value)| format!("{} {}", typ, value))
                    .collect();

                match output {
                    Some(output) => emit!(
                        self,
                        "%{} = call {} @{}({})",
                        output,
                        callee,
                        target,
                        arguments.join(", ")
                    ),

                    None => emit!(self, "call {} @{}({})", callee, target, arguments.join(", ")),
                }
            }

            SetLabel(label) => writeln!(self.output, "{}:", label),
            Jump(label) => emit!(self, "br label %{}", label),

            JumpIf {
                condition,
                then,
                otherwise,
            } => emit!(
                self,
                "br i1 {}, label %{}, label %{}",
                condition,
                then,
                otherwise
            ),

            Transition {
                target: Some(label),
                ..
            } => emit!(self, "br label %{}", label),

            Transition { kind, target: None } => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unresolved {:?} in `{}`", kind, self.function.name),
            )),

            Return(Some((typ, value))) => emit!(self, "ret {} {}", typ, value),
            Return(None) => emit!(self, "ret void"),
        }
    }
}

fn list(types: &[Type]) -> String {
    let types: Vec<String> = types.iter().map(Type::to_string).collect();
    types.join(", ")
}

fn escape(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'"' | b'\\' => escaped.push_str(&format!("\\{:02X}", byte)),
            b' '..=b'~' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{:02X}", byte)),
        }
    }

    escaped
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => fmt.write_str("void"),
            Type::I1 => fmt.write_str("i1"),
            Type::I32 => fmt.write_str("i32"),
            Type::Double => fmt.write_str("double"),
            Type::Ptr => fmt.write_str("ptr"),
            Type::Array(len, element) => write!(fmt, "[{} x {}]", len, element),
            Type::Struct(fields) => write!(fmt, "{{ {} }}", list(fields)),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(name) => write!(fmt, "%{}", name),
            Operand::Global(name) => write!(fmt, "@{}", name),
            Operand::Int(value) => write!(fmt, "{}", value),
            Operand::Double(value) => write!(fmt, "0x{:016X}", value.to_bits()),
            Operand::Widened(value) => write!(fmt, "{}.0", value),
            Operand::Bool(value) => write!(fmt, "{}", value),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;

        let opcode = match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            SDiv => "sdiv",
            SRem => "srem",
            FAdd => "fadd",
            FSub => "fsub",
            FMul => "fmul",
            FDiv => "fdiv",
            And => "and",
            Or => "or",
            Xor => "xor",
        };

        fmt.write_str(opcode)
    }
}

impl Display for Predicate {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Predicate::*;

        let predicate = match self {
            Eq => "eq",
            Ne => "ne",
            Slt => "slt",
            Sle => "sle",
            Sgt => "sgt",
            Sge => "sge",
            Oeq => "oeq",
            One => "one",
            Olt => "olt",
            Ole => "ole",
            Ogt => "ogt",
            Oge => "oge",
        };

        fmt.write_str(predicate)
    }
}

impl Display for CastOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastOp::SiToFp => fmt.write_str("sitofp"),
            CastOp::ZExt => fmt.write_str("zext"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codegen::generate, parse::parse};

    fn emit_text(text: &str) -> String {
        let program = generate(&parse(text, "test").unwrap());

        let mut output = Vec::new();
        emit(&program, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn operands() {
        assert_eq!(Operand::Double(1.5).to_string(), "0x3FF8000000000000");
        assert_eq!(Operand::Widened(3).to_string(), "3.0");
        assert_eq!(Operand::Local(String::from("s1-2")).to_string(), "%s1-2");
        assert_eq!(Operand::Bool(true).to_string(), "true");
    }

    #[test]
    fn aggregate_types() {
        let typ = Type::Array(3, Box::new(Type::Struct(vec![Type::I32, Type::Double])));
        assert_eq!(typ.to_string(), "[3 x { i32, double }]");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(escape(b"a\"b\\c\n\0"), "a\\22b\\5Cc\\0A\\00");
    }

    #[test]
    fn module_layout() {
        let text = emit_text("var a: integer; begin a := 2; writeln('a = ', a) end.");

        assert!(text.starts_with("declare i32 @printf(ptr, ...)\n"));
        assert!(text.contains("@global_a = global i32 zeroinitializer\n"));
        assert!(text.contains("@.str.0 = private unnamed_addr constant [5 x i8] c\"a = \\00\"\n"));
        assert!(text.contains("@.fmt.0 = private unnamed_addr constant [6 x i8] c\"%s%d\\0A\\00\"\n"));
        assert!(text.contains("define i32 @main() {\nentry:\n  store i32 2, ptr @global_a\n"));
        assert!(text.contains("call i32 (ptr, ...) @printf(ptr @.fmt.0, ptr @.str.0, i32 %s1-"));
        assert!(text.ends_with("  ret i32 0\n}\n"));
    }

    #[test]
    fn no_printf_without_output() {
        let text = emit_text("var a: integer; begin a := 1 end.");
        assert!(!text.contains("printf"));
    }

    #[test]
    fn labels_are_entered_by_a_branch() {
        let text = emit_text("var a: integer; begin if a > 0 then a := 1 end.");

        for (index, line) in text.lines().enumerate() {
            if line.starts_with('L') && line.ends_with(':') && index > 0 {
                let previous = text.lines().nth(index - 1).unwrap_or("");
                assert!(previous.trim_start().starts_with("br "), "{}", previous);
            }
        }
    }

    #[test]
    fn routine_signature() {
        let text = emit_text("procedure p(x: double); begin end; begin p(1) end.");

        assert!(text.contains("define void @user_p(double %x.arg) {"));
        assert!(text.contains("  call void @user_p(double 1.0)\n"));
        assert!(text.contains("  ret void\n"));
    }
}
