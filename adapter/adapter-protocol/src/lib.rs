mod codegdb;
mod dap;

pub use crate::codegdb::*;
