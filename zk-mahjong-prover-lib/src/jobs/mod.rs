// Units of work run inside the execution context.
//
// prepare_circuit: one circuit's share of the setup pipeline (constraint system,
//                  proving key, witness generator).
// generate_proof:  one proof request, answered with a job response.

pub mod generate_proof;
pub mod prepare_circuit;

pub use generate_proof::generate_proof;
pub use prepare_circuit::{
    KeyOrigin, PreparedCircuit, SrsMaterial, constraint_system_key, prepare_circuit,
    proving_key_key,
};
