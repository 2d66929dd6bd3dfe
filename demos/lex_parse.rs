use pascalc::{error::Diagnostics, lex::Tokenizer, parse, source::Source};
use std::io::Read;

fn main() -> std::io::Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    let source = Source::new("<stdin>", text);

    let diagnostics = match Tokenizer::new(source.text()).try_exhaustive() {
        Err(errors) => Diagnostics::from(errors).kind("Lexical error"),

        Ok(tokens) => {
            print!("Tokens: {:#?}\n\n", tokens);

            match parse::parse(source.text(), "stdin") {
                Err(error) => Diagnostics::from(error).kind("Syntax error"),

                Ok(ast) => {
                    println!("Ast: {:#?}", ast);
                    Diagnostics::default()
                }
            }
        }
    };

    if !diagnostics.is_empty() {
        eprint!("{}", diagnostics.source(&source));
    }

    Ok(())
}
