//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, Command};
use pascalc::{
    error::Diagnostics,
    lex::Tokenizer,
    link::{LinkOptions, Linker},
    parse::{self, ParserError},
    source::Source,
    target,
};

use std::{fs, fs::File, io::Write, path::Path, process};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("pascalc")
        .version(crate_version!())
        .about("Pascal-like language compiler")
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("INPUT")
                .help("Source file"),
        )
        .arg(
            Arg::new("asm")
                .short('S')
                .help("Generate LLVM IR instead of linking"),
        )
        .arg(Arg::new("strip").short('s').help("Strip executables"))
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' along with -S for stdout)"),
        )
        .arg(
            Arg::new("tokens")
                .long("tokens")
                .help("Print the token table and exit"),
        )
        .arg(Arg::new("ast").long("ast").help("Print the checked AST and exit"))
        .get_matches();

    // Se extraen argumentos necesarios
    let input = args.value_of("input").context("No input file")?;
    let text =
        fs::read_to_string(input).with_context(|| format!("Failed to read: {}", input))?;

    let source = Source::new(input, text);

    if args.is_present("tokens") {
        return print_tokens(&source);
    }

    let program = match parse::parse(source.text(), input) {
        Ok(program) => program,
        Err(error) => {
            let kind = match error.val() {
                ParserError::Lexer(_) => "Lexical error",
                ParserError::Semantic(_) => "Semantic error",
                _ => "Syntax error",
            };

            eprint!("{}", Diagnostics::from(error).kind(kind).source(&source));
            process::exit(1);
        }
    };

    if args.is_present("ast") {
        println!("{:#?}", program);
        return Ok(());
    }

    let program = target::generate(&program);

    let asm = args.is_present("asm");
    let output = match (asm, args.value_of("output")) {
        (_, Some(output)) => output.to_owned(),
        (true, None) => Path::new(input)
            .with_extension("ll")
            .to_string_lossy()
            .into_owned(),
        (false, None) => String::from("a.out"),
    };

    match (asm, output.as_str()) {
        // Salida a stdout sin enlazado
        (true, "-") => {
            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();

            target::emit(&program, &mut stdout).context("Failed to emit to stdout")?;
            stdout.flush()?;
        }

        // Salida a archivo sin enlazado
        (true, path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            target::emit(&program, &mut file)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }

        // Salida a stdout con enlazado
        (false, "-") => bail!("Refusing to write executable to stdout"),

        // Salida a archivo con enlazado
        (false, path) => {
            let mut options = LinkOptions::empty();
            if args.is_present("strip") {
                options |= LinkOptions::STRIP;
            }

            let mut linker = Linker::spawn(&path, options).context("Failed to link")?;
            target::emit(&program, linker.stdin()).context("Failed to emit IR to the linker")?;

            linker
                .finish()
                .with_context(|| format!("Failed to generate executable: {}", path))?;
        }
    };

    Ok(())
}

/// Imprime la tabla de lexemas, incluyendo comentarios.
fn print_tokens(source: &Source) -> anyhow::Result<()> {
    let tokens = match Tokenizer::new(source.text()).with_comments().try_exhaustive() {
        Ok(tokens) => tokens,
        Err(errors) => {
            let diagnostics = Diagnostics::from(errors).kind("Lexical error");
            eprint!("{}", diagnostics.source(source));
            process::exit(1);
        }
    };

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();

    writeln!(stdout, "{:>5} {:>5}  {:<16} {:<20} VALUE", "ROW", "COL", "KIND", "TEXT")?;
    for token in tokens {
        writeln!(
            stdout,
            "{:>5} {:>5}  {:<16} {:<20} {}",
            token.position.line(),
            token.position.column(),
            token.kind.to_string(),
            token.text,
            token.value
        )?;
    }

    Ok(())
}
