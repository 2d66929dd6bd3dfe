//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente
//! en unidades léxicas denominadas tokens. Los espacios en blanco se
//! descartan durante esta operación, al igual que los comentarios salvo
//! que se soliciten explícitamente con [`Tokenizer::with_comments()`].
//! Cada token emitido está asociado a una posición en el código fuente
//! original, lo cual permite rastrear errores en fases posteriores.
//!
//! # Autómata
//! El reconocimiento se realiza con un autómata finito determinista
//! dirigido por tabla. La tabla `[estado][byte] -> estado` se construye
//! una única vez en tiempo de compilación mediante [`build_table()`].
//! Un token termina cuando la transición desde el estado actual lleva
//! a [`State::End`]; el estado en el que se detuvo el autómata decide
//! la clase del token.
//!
//! # Contenido de un token
//! Cada token conserva su lexema original. Las constantes enteras en
//! bases alternativas (`$FF`, `&17`, `%101`) y las constantes con
//! exponente incluyen además un valor normalizado en decimal.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje es case-insensitive, por lo cual tanto `procedure`
//!   como `PROCEDURE` y `ProcEDure` resultan en [`Keyword::Procedure`].
//! - `1..5` es un rango y no el flotante `1.` seguido de `.5`.

use crate::source::{Located, Position};
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use log::trace;
use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// Una constante numérica quedó incompleta, como `$` o `1e`.
    #[error("malformed number {0}")]
    MalformedNumber(String),

    /// Una constante entera no cabe en 64 bits.
    #[error("integer literal {0} is too large")]
    IntegerOverflow(String),

    /// Una cadena o comentario de bloque alcanzó el fin de archivo.
    #[error("unterminated {0}")]
    Unterminated(&'static str),
}

/// Un identificador.
///
/// La igualdad y el hash de los identificadores ignoran mayúsculas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<NoCase<String>>);

impl Identifier {
    /// Construye un identificador a partir de su lexema.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Identifier(Rc::new(NoCase::new(name.into())))
    }

    /// Forma canónica en minúsculas, apta para símbolos de IR.
    pub fn canonical(&self) -> String {
        self.as_ref().to_ascii_lowercase()
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token es inmutable una vez producido. `value` coincide con `text`
/// excepto para constantes que requieren normalización y cadenas, cuyo
/// valor excluye las comillas.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub position: Position,
    pub kind: TokenKind,
    pub text: String,
    pub value: String,
}

impl Token {
    /// Descripción del token para mensajes de error.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::EndOfFile => String::from("end of file"),
            _ => format!("`{}`", self.text),
        }
    }
}

/// Clase de un token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identificador.
    Id,

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal entero, en cualquier base.
    Integer,

    /// Literal de punto flotante.
    Double,

    /// Literal de cadena entre comillas simples.
    Str,

    /// Comentario de línea (`//`) o de bloque (`{ }`).
    Comment,

    /// Fin del flujo de entrada.
    EndOfFile,

    Plus,
    Minus,
    Times,
    Slash,
    Equal,
    Comma,
    Colon,
    Semicolon,
    Less,
    Greater,
    Dot,
    OpenParen,
    CloseParen,
    OpenSquare,
    CloseSquare,
    Caret,
    At,
    PlusAssign,
    MinusAssign,
    TimesAssign,
    SlashAssign,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Assign,
    DoubleDot,
}

impl TokenKind {
    /// Tabla fija de símbolos de puntuación y operadores.
    const SYMBOLS: &'static [(&'static str, TokenKind)] = &[
        ("+", TokenKind::Plus),
        ("-", TokenKind::Minus),
        ("*", TokenKind::Times),
        ("/", TokenKind::Slash),
        ("=", TokenKind::Equal),
        (",", TokenKind::Comma),
        (":", TokenKind::Colon),
        (";", TokenKind::Semicolon),
        ("<", TokenKind::Less),
        (">", TokenKind::Greater),
        (".", TokenKind::Dot),
        ("(", TokenKind::OpenParen),
        (")", TokenKind::CloseParen),
        ("[", TokenKind::OpenSquare),
        ("]", TokenKind::CloseSquare),
        ("^", TokenKind::Caret),
        ("@", TokenKind::At),
        ("+=", TokenKind::PlusAssign),
        ("-=", TokenKind::MinusAssign),
        ("*=", TokenKind::TimesAssign),
        ("/=", TokenKind::SlashAssign),
        ("<>", TokenKind::NotEqual),
        ("<=", TokenKind::LessEqual),
        (">=", TokenKind::GreaterEqual),
        (":=", TokenKind::Assign),
        ("..", TokenKind::DoubleDot),
    ];

    fn from_symbol(symbol: &str) -> Option<TokenKind> {
        Self::SYMBOLS
            .iter()
            .find(|&&(text, _)| text == symbol)
            .map(|&(_, kind)| kind)
    }

    fn symbol(self) -> Option<&'static str> {
        Self::SYMBOLS
            .iter()
            .find(|&&(_, kind)| kind == self)
            .map(|&(text, _)| text)
    }
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;

        match self {
            Id => fmt.write_str("identifier"),
            Keyword(keyword) => write!(fmt, "`{}`", keyword),
            Integer => fmt.write_str("integer literal"),
            Double => fmt.write_str("double literal"),
            Str => fmt.write_str("string literal"),
            Comment => fmt.write_str("comment"),
            EndOfFile => fmt.write_str("end of file"),
            symbol => match symbol.symbol() {
                Some(text) => write!(fmt, "`{}`", text),
                None => write!(fmt, "{:?}", symbol),
            },
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    Array,
    Begin,
    Boolean,
    Break,
    Case,
    Const,
    Continue,
    Div,
    Do,
    Double,
    Downto,
    Else,
    End,
    False,
    For,
    Forward,
    Function,
    If,
    Integer,
    Mod,
    Not,
    Of,
    Or,
    Procedure,
    Program,
    Record,
    Repeat,
    Then,
    To,
    True,
    Type,
    Until,
    Var,
    While,
}

impl Keyword {
    const KEYWORDS: &'static [(&'static str, Keyword)] = &[
        ("and",       Keyword::And),
        ("array",     Keyword::Array),
        ("begin",     Keyword::Begin),
        ("boolean",   Keyword::Boolean),
        ("break",     Keyword::Break),
        ("case",      Keyword::Case),
        ("const",     Keyword::Const),
        ("continue",  Keyword::Continue),
        ("div",       Keyword::Div),
        ("do",        Keyword::Do),
        ("double",    Keyword::Double),
        ("downto",    Keyword::Downto),
        ("else",      Keyword::Else),
        ("end",       Keyword::End),
        ("false",     Keyword::False),
        ("for",       Keyword::For),
        ("forward",   Keyword::Forward),
        ("function",  Keyword::Function),
        ("if",        Keyword::If),
        ("integer",   Keyword::Integer),
        ("mod",       Keyword::Mod),
        ("not",       Keyword::Not),
        ("of",        Keyword::Of),
        ("or",        Keyword::Or),
        ("procedure", Keyword::Procedure),
        ("program",   Keyword::Program),
        ("record",    Keyword::Record),
        ("repeat",    Keyword::Repeat),
        ("then",      Keyword::Then),
        ("to",        Keyword::To),
        ("true",      Keyword::True),
        ("type",      Keyword::Type),
        ("until",     Keyword::Until),
        ("var",       Keyword::Var),
        ("while",     Keyword::While),
    ];
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Keyword::KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Keyword::KEYWORDS
            .iter()
            .find(|&&(name, _)| NoCase::new(name) == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Posibles estados del autómata.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
enum State {
    /// Frontera de token: la transición no consume el byte actual.
    End,

    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Espacios en blanco y cambios de línea.
    Blank,

    /// Término que puede ser un identificador o una palabra clave.
    Word,

    /// Constante entera decimal.
    Integer,

    /// Se encontró `<dígitos>.`; si no sigue un dígito se retrocede.
    IntegerDot,

    /// Parte fraccionaria de un flotante.
    Fraction,

    /// Se encontró `e` o `E` después de un número.
    Exponent,

    /// Signo del exponente.
    ExponentSign,

    /// Dígitos del exponente.
    ExponentDigits,

    /// `$`, seguido de dígitos hexadecimales.
    HexPrefix,
    Hex,

    /// `&`, seguido de dígitos octales.
    OctalPrefix,
    Octal,

    /// `%`, seguido de dígitos binarios.
    BinaryPrefix,
    Binary,

    /// Interior de una cadena.
    Str,

    /// Comilla de cierre, o la primera de un par `''`.
    StrQuote,

    /// Se encontró `/`: división, `/=` o inicio de comentario.
    Slash,

    /// Comentario de línea, termina antes de `'\n'`.
    LineComment,

    /// Comentario de bloque, termina en `}`.
    BlockComment,
    BlockCommentEnd,

    /// Operador de un carácter que puede extenderse con `=`.
    Operator,

    /// `<`, que puede extenderse con `>` o `=`.
    Less,

    /// `.`, que puede extenderse con `.`.
    Dot,
    DoubleDot,

    /// Símbolo completo que no admite extensiones.
    Symbol,
}

const STATE_COUNT: usize = State::Symbol as usize + 1;

type Table = [[State; 256]; STATE_COUNT];

/// Tabla de transiciones, precomputada en tiempo de compilación.
static TABLE: Table = build_table();

const fn build_table() -> Table {
    use State::*;

    let mut table = [[End; 256]; STATE_COUNT];

    let mut index = 0;
    while index < 256 {
        let byte = index as u8;

        if byte.is_ascii_alphabetic() || byte == b'_' {
            table[Start as usize][index] = Word;
        }

        if byte.is_ascii_alphanumeric() || byte == b'_' {
            table[Word as usize][index] = Word;
        }

        if byte.is_ascii_digit() {
            table[Start as usize][index] = Integer;
            table[Integer as usize][index] = Integer;
            table[IntegerDot as usize][index] = Fraction;
            table[Fraction as usize][index] = Fraction;
            table[Exponent as usize][index] = ExponentDigits;
            table[ExponentSign as usize][index] = ExponentDigits;
            table[ExponentDigits as usize][index] = ExponentDigits;
        }

        if byte.is_ascii_hexdigit() {
            table[HexPrefix as usize][index] = Hex;
            table[Hex as usize][index] = Hex;
        }

        if byte >= b'0' && byte <= b'7' {
            table[OctalPrefix as usize][index] = Octal;
            table[Octal as usize][index] = Octal;
        }

        if byte == b'0' || byte == b'1' {
            table[BinaryPrefix as usize][index] = Binary;
            table[Binary as usize][index] = Binary;
        }

        table[Str as usize][index] = Str;
        table[LineComment as usize][index] = LineComment;
        table[BlockComment as usize][index] = BlockComment;

        index += 1;
    }

    // Números
    table[Integer as usize][b'.' as usize] = IntegerDot;
    table[IntegerDot as usize][b'.' as usize] = End;
    table[Integer as usize][b'e' as usize] = Exponent;
    table[Integer as usize][b'E' as usize] = Exponent;
    table[Fraction as usize][b'e' as usize] = Exponent;
    table[Fraction as usize][b'E' as usize] = Exponent;
    table[Exponent as usize][b'+' as usize] = ExponentSign;
    table[Exponent as usize][b'-' as usize] = ExponentSign;
    table[Start as usize][b'$' as usize] = HexPrefix;
    table[Start as usize][b'&' as usize] = OctalPrefix;
    table[Start as usize][b'%' as usize] = BinaryPrefix;

    // Espacios en blanco
    let blanks = [b' ', b'\t', b'\n', b'\r'];
    let mut index = 0;
    while index < blanks.len() {
        table[Start as usize][blanks[index] as usize] = Blank;
        table[Blank as usize][blanks[index] as usize] = Blank;
        index += 1;
    }

    // Cadenas
    table[Start as usize][b'\'' as usize] = Str;
    table[Str as usize][b'\'' as usize] = StrQuote;
    table[StrQuote as usize][b'\'' as usize] = Str;

    // Comentarios
    table[Start as usize][b'/' as usize] = Slash;
    table[Slash as usize][b'/' as usize] = LineComment;
    table[Slash as usize][b'=' as usize] = Symbol;
    table[LineComment as usize][b'\n' as usize] = End;
    table[Start as usize][b'{' as usize] = BlockComment;
    table[BlockComment as usize][b'}' as usize] = BlockCommentEnd;

    // Operadores de uno o dos caracteres
    let extensible = [b'+', b'-', b'*', b':', b'>'];
    let mut index = 0;
    while index < extensible.len() {
        table[Start as usize][extensible[index] as usize] = Operator;
        index += 1;
    }

    table[Operator as usize][b'=' as usize] = Symbol;
    table[Start as usize][b'<' as usize] = Less;
    table[Less as usize][b'>' as usize] = Symbol;
    table[Less as usize][b'=' as usize] = Symbol;
    table[Start as usize][b'.' as usize] = Dot;
    table[Dot as usize][b'.' as usize] = DoubleDot;

    let symbols = [b'=', b';', b',', b'(', b')', b'[', b']', b'^', b'@'];
    let mut index = 0;
    while index < symbols.len() {
        table[Start as usize][symbols[index] as usize] = Symbol;
        index += 1;
    }

    table
}

/// Analizador léxico con un token de lookahead.
///
/// Los tokens se producen bajo demanda. [`Tokenizer::current_token()`]
/// memoiza el último token producido, mientras que
/// [`Tokenizer::next_token()`] avanza. Al agotarse la entrada se emite
/// [`TokenKind::EndOfFile`] indefinidamente.
pub struct Tokenizer<'a> {
    text: &'a str,
    cursor: usize,
    position: Position,
    current: Option<Token>,
    comments: bool,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    /// Crea un tokenizer en estado inicial a partir del texto completo.
    pub fn new(text: &'a str) -> Self {
        Tokenizer {
            text,
            cursor: 0,
            position: Position::default(),
            current: None,
            comments: false,
            finished: false,
        }
    }

    /// Emite comentarios como tokens en vez de descartarlos.
    pub fn with_comments(self) -> Self {
        Tokenizer {
            comments: true,
            ..self
        }
    }

    /// Avanza y retorna el siguiente token.
    pub fn next_token(&mut self) -> Result<Token, Located<LexerError>> {
        let token = self.scan()?;
        trace!("{} {:?} {:?}", token.position, token.kind, token.text);

        self.current = Some(token.clone());
        Ok(token)
    }

    /// Retorna el token más reciente sin avanzar.
    ///
    /// Si todavía no se ha producido ningún token, se produce el primero.
    pub fn current_token(&mut self) -> Result<Token, Located<LexerError>> {
        match &self.current {
            Some(token) => Ok(token.clone()),
            None => self.next_token(),
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el tokenizer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores, con lo cual se reporta más de un error léxico en una
    /// misma ejecución.
    pub fn try_exhaustive(mut self) -> Result<Vec<Token>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Recorre el autómata hasta producir un token.
    fn scan(&mut self) -> Result<Token, Located<LexerError>> {
        loop {
            let start = self.cursor;
            let position = self.position;

            let mut state = State::Start;
            loop {
                let next = match self.peek() {
                    Some(byte) => TABLE[state as usize][byte as usize],
                    None => State::End,
                };

                if next == State::End {
                    break;
                }

                self.bump();
                state = next;
            }

            if let Some(token) = self.accept(state, start, position)? {
                return Ok(token);
            }
        }
    }

    /// Clasifica el lexema reconocido según el estado final.
    ///
    /// Retorna `None` para lexemas que se descartan.
    fn accept(
        &mut self,
        state: State,
        start: usize,
        position: Position,
    ) -> Result<Option<Token>, Located<LexerError>> {
        use State::*;

        let fail = |error| Err(Located::at(error, position));

        let kind = match state {
            End => unreachable!("the automaton never rests in the end state"),

            Start => match self.peek() {
                None => TokenKind::EndOfFile,
                Some(_) => {
                    let symbol = self.text[start..].chars().next().unwrap_or('\0');
                    for _ in 0..symbol.len_utf8() {
                        self.bump();
                    }

                    return fail(LexerError::UnknownSymbol(symbol.to_string()));
                }
            },

            Blank => return Ok(None),

            // Se retrocede exactamente una posición, de forma que el `.`
            // vuelva a escanearse como inicio de `..` u otro símbolo
            IntegerDot => {
                self.cursor -= 1;
                self.position = self.position.back();
                TokenKind::Integer
            }

            Word => match Keyword::from_str(&self.text[start..self.cursor]) {
                Ok(keyword) => TokenKind::Keyword(keyword),
                Err(()) => TokenKind::Id,
            },

            Integer | Hex | Octal | Binary => TokenKind::Integer,
            Fraction | ExponentDigits => TokenKind::Double,

            Exponent | ExponentSign | HexPrefix | OctalPrefix | BinaryPrefix => {
                let text = self.text[start..self.cursor].to_owned();
                return fail(LexerError::MalformedNumber(text));
            }

            StrQuote => TokenKind::Str,
            Str => return fail(LexerError::Unterminated("string literal")),

            BlockComment => return fail(LexerError::Unterminated("comment")),
            LineComment | BlockCommentEnd if !self.comments => return Ok(None),
            LineComment | BlockCommentEnd => TokenKind::Comment,

            Slash | Operator | Less | Dot | DoubleDot | Symbol => {
                match TokenKind::from_symbol(&self.text[start..self.cursor]) {
                    Some(kind) => kind,
                    None => {
                        let text = self.text[start..self.cursor].to_owned();
                        return fail(LexerError::UnknownSymbol(text));
                    }
                }
            }
        };

        let text = match kind {
            TokenKind::EndOfFile => String::from("EndOfFile"),
            _ => self.text[start..self.cursor].to_owned(),
        };

        let value = match state {
            Integer | IntegerDot => normalize_integer(&text, 10, position)?,
            Hex => normalize_integer(&text[1..], 16, position)?,
            Octal => normalize_integer(&text[1..], 8, position)?,
            Binary => normalize_integer(&text[1..], 2, position)?,

            ExponentDigits => match text.parse::<f64>() {
                Ok(value) => format!("{:?}", value),
                Err(_) => return fail(LexerError::MalformedNumber(text)),
            },

            StrQuote => text[1..text.len() - 1].replace("''", "'"),
            _ => text.clone(),
        };

        Ok(Some(Token {
            position,
            kind,
            text,
            value,
        }))
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.cursor).copied()
    }

    /// Consume un byte y actualiza la posición.
    fn bump(&mut self) {
        if let Some(byte) = self.peek() {
            self.cursor += 1;
            self.position = match byte {
                b'\n' => self.position.newline(),
                b'\t' => self.position.tab(),
                // Bytes de continuación UTF-8 no ocupan una columna propia
                0x80..=0xbf => self.position,
                _ => self.position.advance(),
            };
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_token() {
            Ok(token) if token.kind == TokenKind::EndOfFile => {
                self.finished = true;
                None
            }

            result => Some(result),
        }
    }
}

/// Convierte un lexema entero en base arbitraria a su valor decimal.
fn normalize_integer(
    digits: &str,
    radix: u32,
    position: Position,
) -> Result<String, Located<LexerError>> {
    let digits = digits.trim_end_matches('.');
    u64::from_str_radix(digits, radix)
        .map(|value| value.to_string())
        .map_err(|_| Located::at(LexerError::IntegerOverflow(digits.to_owned()), position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        Tokenizer::new(input)
            .map(|token| token.map(|token| (token.kind, token.value)))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn error(input: &str) -> Located<LexerError> {
        Tokenizer::new(input)
            .find_map(Result::err)
            .expect("want to test errors")
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let actual = kinds("begin BEGIN BeGiN beginning");
        assert_eq!(
            actual,
            vec![
                (TokenKind::Keyword(Keyword::Begin), "begin".to_owned()),
                (TokenKind::Keyword(Keyword::Begin), "BEGIN".to_owned()),
                (TokenKind::Keyword(Keyword::Begin), "BeGiN".to_owned()),
                (TokenKind::Id, "beginning".to_owned()),
            ]
        );
    }

    #[test]
    fn alternative_bases_are_normalized() {
        let actual = kinds("$FF &17 %101");
        assert_eq!(
            actual,
            vec![
                (TokenKind::Integer, "255".to_owned()),
                (TokenKind::Integer, "15".to_owned()),
                (TokenKind::Integer, "5".to_owned()),
            ]
        );
    }

    #[test]
    fn range_is_not_a_double() {
        let actual = kinds("1..5");
        assert_eq!(
            actual,
            vec![
                (TokenKind::Integer, "1".to_owned()),
                (TokenKind::DoubleDot, "..".to_owned()),
                (TokenKind::Integer, "5".to_owned()),
            ]
        );
    }

    #[test]
    fn range_backtrack_keeps_columns() {
        let tokens = Tokenizer::new("a[10..20]").try_exhaustive().unwrap();
        let columns: Vec<_> = tokens.iter().map(|t| t.position.column()).collect();
        assert_eq!(columns, vec![1, 2, 3, 5, 7, 9]);
    }

    #[test]
    fn doubles_and_exponents() {
        let actual = kinds("3.25 1.5e3 2E-2 7e+1");
        assert_eq!(
            actual,
            vec![
                (TokenKind::Double, "3.25".to_owned()),
                (TokenKind::Double, "1500.0".to_owned()),
                (TokenKind::Double, "0.02".to_owned()),
                (TokenKind::Double, "70.0".to_owned()),
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        let actual: Vec<_> = kinds(":= <= <> >= += -= *= /= .. : < > .")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();

        use TokenKind::*;
        assert_eq!(
            actual,
            vec![
                Assign,
                LessEqual,
                NotEqual,
                GreaterEqual,
                PlusAssign,
                MinusAssign,
                TimesAssign,
                SlashAssign,
                DoubleDot,
                Colon,
                Less,
                Greater,
                Dot
            ]
        );
    }

    #[test]
    fn comments_are_skipped_unless_requested() {
        let source = "a // line\n{ block\n comment } b";
        let actual: Vec<_> = kinds(source).into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(actual, vec![TokenKind::Id, TokenKind::Id]);

        let tokens = Tokenizer::new(source).with_comments().try_exhaustive().unwrap();
        let actual: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            actual,
            vec![
                TokenKind::Id,
                TokenKind::Comment,
                TokenKind::Comment,
                TokenKind::Id
            ]
        );

        assert_eq!(tokens[3].position, Position::new(3, 12));
    }

    #[test]
    fn strings_strip_quotes() {
        let actual = kinds("'hello' 'it''s'");
        assert_eq!(
            actual,
            vec![
                (TokenKind::Str, "hello".to_owned()),
                (TokenKind::Str, "it's".to_owned()),
            ]
        );
    }

    #[test]
    fn positions_track_rows_and_columns() {
        let tokens = Tokenizer::new("var\n  a: integer;").try_exhaustive().unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| (t.position.line(), t.position.column())).collect();
        assert_eq!(positions, vec![(1, 1), (2, 3), (2, 4), (2, 6), (2, 13)]);
    }

    #[test]
    fn end_of_file_is_idempotent() {
        let mut tokenizer = Tokenizer::new("x");
        assert_eq!(tokenizer.next_token().unwrap().kind, TokenKind::Id);
        for _ in 0..3 {
            assert_eq!(tokenizer.next_token().unwrap().kind, TokenKind::EndOfFile);
        }

        assert_eq!(tokenizer.current_token().unwrap().kind, TokenKind::EndOfFile);
    }

    #[test]
    fn current_token_does_not_advance() {
        let mut tokenizer = Tokenizer::new("a b");
        assert_eq!(tokenizer.current_token().unwrap().text, "a");
        assert_eq!(tokenizer.current_token().unwrap().text, "a");
        assert_eq!(tokenizer.next_token().unwrap().text, "b");
    }

    #[test]
    fn unknown_symbol_is_reported() {
        let error = error("a := #");
        assert_eq!(error.val(), &LexerError::UnknownSymbol("#".to_owned()));
        assert_eq!(error.position(), Position::new(1, 6));
    }

    #[test]
    fn malformed_and_unterminated() {
        assert_eq!(error("$ ").val(), &LexerError::MalformedNumber("$".to_owned()));
        assert_eq!(error("1e;").val(), &LexerError::MalformedNumber("1e".to_owned()));
        assert_eq!(error("'abc").val(), &LexerError::Unterminated("string literal"));
        assert_eq!(error("{ abc").val(), &LexerError::Unterminated("comment"));
    }

    #[test]
    fn integer_overflow() {
        let error = error("99999999999999999999999");
        assert!(matches!(error.val(), LexerError::IntegerOverflow(_)));
    }

    #[test]
    fn exhaustive_collects_every_error() {
        let errors = Tokenizer::new("# a ! b ?").try_exhaustive().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
