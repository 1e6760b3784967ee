//! Rule-based subject experts built on the engine.

pub mod diagnostic;
pub mod information;
pub mod interview;

pub use diagnostic::{DiagnosticExpert, DiagnosticOutput, DiagnosticSession, ResponseMatch};
pub use information::{ExpertResponse, InformationExpert};
