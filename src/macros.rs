/// Escribe una instrucción indentada en `$self.output`.
macro_rules! emit {
    ($self:expr, $($format:tt)*) => {{
        write!($self.output, "  ")?;
        writeln!($self.output, $($format)*)
    }};
}
