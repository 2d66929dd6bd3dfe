//! Reporte de errores de compilación.
//!
//! Los errores de cada fase viajan como [`Located`]. [`Diagnostics`]
//! los agrupa y los presenta junto a la línea de código donde ocurren.

use crate::source::{Located, Position, Source};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn position(&self) -> Position;
}

pub struct Diagnostics<'a> {
    kind: &'static str,
    source: Option<&'a Source>,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl<'a> Diagnostics<'a> {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Asocia el código fuente del cual se citan líneas.
    pub fn source(self, source: &'a Source) -> Self {
        Diagnostics {
            source: Some(source),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for Diagnostics<'_> {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            source: None,
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics<'_> {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics<'_> {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| {
                let error: Box<dyn LocatedError> = Box::new(error);
                error
            })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl Display for Diagnostics<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics {
            kind,
            source,
            errors,
        } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let position = error.position();
            let name = source.map(Source::name).unwrap_or("<input>");
            writeln!(fmt, " --> {}:{}", name, position)?;

            let line = source.and_then(|source| source.with_line(position.line(), str::to_owned));
            if let Some(line) = line {
                let digits = position.line().to_string().chars().count();
                let skip = position.column().saturating_sub(1) as usize;

                writeln!(fmt, "{:digits$} |", "", digits = digits)?;
                writeln!(fmt, "{} | {}", position.line(), line)?;
                writeln!(fmt, "{:digits$} | {:skip$}^", "", "", digits = digits, skip = skip)?;
            }

            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn position(&self) -> Position {
        Located::position(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::LexerError, parse::parse};

    #[test]
    fn renders_the_offending_line() {
        let text = "begin\n  x := 1\nend.";
        let source = Source::new("test.pas", text);

        let error = parse(text, "test").unwrap_err();
        let rendered = Diagnostics::from(error)
            .kind("Semantic error")
            .source(&source)
            .to_string();

        assert_eq!(
            rendered,
            "Semantic error: identifier x is not declared\n \
             --> test.pas:2:3\n  \
             |\n\
             2 |   x := 1\n  \
             |   ^\n\
             \n\
             Build failed with 1 error\n"
        );
    }

    #[test]
    fn counts_every_error() {
        let errors = vec![
            Located::at(LexerError::Unterminated("string"), Position::new(1, 1)),
            Located::at(LexerError::Unterminated("string"), Position::new(2, 1)),
        ];

        let rendered = Diagnostics::from(errors).to_string();
        assert!(rendered.starts_with("error: "));
        assert!(rendered.contains(" --> <input>:2:1\n"));
        assert!(rendered.ends_with("Build failed with 2 errors\n"));
    }

    #[test]
    fn nothing_to_report() {
        let diagnostics = Diagnostics::default();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.to_string(), "No errors were reported\n");
    }
}
