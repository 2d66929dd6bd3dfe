//! Resolución de `break`/`continue` y eliminación de código muerto.
//!
//! Ambas pasadas operan sobre el listado lineal de una función en
//! construcción, inmediatamente después de generar un ciclo. Solamente
//! se examina el rango que inicia con el cuerpo del ciclo, de forma que
//! transiciones anteriores pertenecientes a ciclos externos no se ven
//! afectadas.

use crate::ir::{Instruction, Label, TransitionKind};

/// Asigna destino a cada transición pendiente en `code`.
///
/// `break` salta a `exit` y `continue` a `next`. Retorna la cantidad
/// de transiciones resueltas.
pub fn resolve_transitions(code: &mut [Instruction], exit: Label, next: Label) -> usize {
    let mut resolved = 0;

    while let Some(index) = first_unresolved(code) {
        if let Instruction::Transition { kind, target } = &mut code[index] {
            *target = Some(match kind {
                TransitionKind::Break => exit,
                TransitionKind::Continue => next,
            });
        }

        resolved += 1;
    }

    resolved
}

fn first_unresolved(code: &[Instruction]) -> Option<usize> {
    code.iter().position(|instruction| {
        matches!(instruction, Instruction::Transition { target: None, .. })
    })
}

/// Descarta instrucciones inalcanzables a partir de `from`.
///
/// Lo que sigue a una transición resuelta es inalcanzable hasta la
/// siguiente etiqueta. Retorna la cantidad de instrucciones eliminadas.
pub fn eliminate_dead_code(code: &mut Vec<Instruction>, from: usize) -> usize {
    let before = code.len();

    let mut index = 0;
    let mut skipping = false;

    code.retain(|instruction| {
        let current = index;
        index += 1;

        if current < from {
            return true;
        }

        match instruction {
            Instruction::SetLabel(_) => {
                skipping = false;
                true
            }

            _ if skipping => false,

            Instruction::Transition {
                target: Some(_), ..
            } => {
                skipping = true;
                true
            }

            _ => true,
        }
    });

    before - code.len()
}
