//! Numerical building blocks: adaptive quadrature, SVD-based linear algebra
//! and the Levenberg–Marquardt solver.

pub mod lm;
pub mod lstsq;
pub mod quadrature;

pub use lm::*;
pub use lstsq::*;
pub use quadrature::*;
