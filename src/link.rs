//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido IR, esta debe ser compilada y enlazada
//! contra la biblioteca de C del sistema para producir un binario
//! ejecutable. Ambas tareas se delegan a `clang`.

use std::{
    io::{BufWriter, Read, Write},
    path::Path,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
};

use bitflags::bitflags;
use log::debug;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;
    }
}

/// Un error de compilación o enlazado de IR.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// El enlazador inició su ejecución, pero falló en enlazar.
    #[error("linker exited with status code {0:?}\n{1}")]
    Failed(ExitStatus, String),
}

/// Comando de enlazado.
const COMMAND: &str = "clang";

/// Instancia del enlazador para un ejecutable definido.
pub struct Linker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl Linker {
    /// Inicia una instancia del enlazador.
    ///
    /// El enlazador tratará de emitir un ejecutable y escribirlo a
    /// la ruta indicada por `output`.
    pub fn spawn<O>(output: &O, opts: LinkOptions) -> Result<Self, LinkerError>
    where
        O: AsRef<Path>,
    {
        // La IR se recibe por stdin
        let mut command = Command::new(COMMAND);
        command
            .args(&["-x", "ir", "-", "-o"])
            .arg(output.as_ref())
            .stdin(Stdio::piped())
            .stderr(Stdio::piped());

        if opts.contains(LinkOptions::STRIP) {
            command.arg("-s");
        }

        debug!("spawning {:?}", command);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "linker stdin is closed")
        })?;

        Ok(Linker {
            child,
            stdin: BufWriter::new(stdin),
        })
    }

    /// Obtiene la entrada estándar del proceso que espera recibir IR.
    ///
    /// Luego de crear una instancia con [`Linker::spawn()`], se debe
    /// escribir la IR en la forma exacta en que fue emitida.
    pub fn stdin(&mut self) -> &mut BufWriter<ChildStdin> {
        &mut self.stdin
    }

    /// Indica el fin del flujo de código y finaliza el enlazado.
    pub fn finish(self) -> Result<(), LinkerError> {
        let Linker {
            mut child,
            mut stdin,
        } = self;

        stdin.flush()?;
        drop(stdin);

        let mut stderr = String::new();
        if let Some(pipe) = child.stderr.as_mut() {
            pipe.read_to_string(&mut stderr)?;
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkerError::Failed(status, stderr))
        }
    }
}
