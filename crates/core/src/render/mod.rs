//! Chart- and table-ready views of service results. Everything here is pure.

pub mod forecast;
pub mod portfolio;
