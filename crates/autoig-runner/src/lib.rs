//! AutoIG Runner - solver invocation backends
//!
//! Provides the [`RunInvoker`](autoig_core::RunInvoker) implementations that
//! drive real toolchains:
//! - MiniZinc, optionally under the `runsolver` babysitter
//! - Conjure and Savile Row, with per-solver option catalogue
//! - Savile Row and Minion for the generator, with a negative table of
//!   instances already produced
//! - Bounded process execution with timestamped output

pub mod conjure;
pub mod minion;
pub mod minizinc;
pub mod process;
pub mod scratch;
pub mod solvers;

// Re-export key types
pub use conjure::{conjure_solve_command, ConjureInvoker, ConjureSolve};
pub use minion::{encode_negative_table, MinionGeneration, MinionModel, MinionOutcome};
pub use minizinc::MiniZincInvoker;
pub use process::{run_bounded, CommandLine, ProcessOutput, TimedLine};
pub use scratch::{scratch_path, ScratchFiles};
pub use solvers::{lookup_solver, SeedOption, SolverInfo, TimeUnit};
