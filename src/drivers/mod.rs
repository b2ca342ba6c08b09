//! Hardware drivers.

pub mod ite5570;
