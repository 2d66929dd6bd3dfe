//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de la posición en el código fuente original
//! donde se originan, lo cual permite determinar un punto exacto
//! en donde ocurre un error de abstracción arbitraria.

use std::fmt::{self, Debug, Display, Formatter};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    position: Position,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la posición.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Descarta la posición y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Position, T) {
        (self.position, self.value)
    }

    /// Construye a partir de un valor y una posición.
    pub fn at(value: T, position: Position) -> Self {
        Located { value, position }
    }

    /// Transforma el valor con la misma posición.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            position: self.position,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} - {}", self.position, self.value)
    }
}

impl<E: std::error::Error> std::error::Error for Located<E> {}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición arbitraria.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

impl Debug for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Nombre de origen y texto completo de un programa.
///
/// El compilador lee el archivo fuente completo a memoria antes de
/// comenzar el análisis léxico. Esta estructura conserva el texto para
/// que los diagnósticos puedan citar las líneas donde ocurren errores.
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Crea un origen a partir de su nombre y contenido.
    pub fn new<N, T>(name: N, text: T) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Source {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texto completo.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Invoca a `callback` con el contenido de una línea, si existe.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).checked_sub(1)?;
        self.text.lines().nth(index).map(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_stops_align_to_four() {
        let position = Position::new(1, 2).tab();
        assert_eq!(position.column(), 5);

        let position = Position::new(1, 5).tab();
        assert_eq!(position.column(), 9);
    }

    #[test]
    fn located_display_prefixes_position() {
        let located = Located::at("unknown symbol #", Position::new(3, 7));
        assert_eq!(located.to_string(), "3:7 - unknown symbol #");
    }

    #[test]
    fn source_lines_are_one_based() {
        let source = Source::new("<test>", "begin\n  a := 1;\nend.");
        assert_eq!(source.with_line(2, str::to_owned).as_deref(), Some("  a := 1;"));
        assert_eq!(source.with_line(0, str::to_owned), None);
        assert_eq!(source.with_line(9, str::to_owned), None);
    }
}
