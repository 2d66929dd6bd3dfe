use pascalc::{compile, error::Diagnostics, source::Source, target};
use std::io::Read;

fn main() -> std::io::Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    let source = Source::new("<stdin>", text);

    match compile(source.text(), "stdin") {
        Ok(program) => target::emit(&program, &mut std::io::stdout()),
        Err(error) => {
            eprint!("{}", Diagnostics::from(error).source(&source));
            Ok(())
        }
    }
}
