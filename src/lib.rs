extern crate pest;
#[macro_use]
extern crate pest_derive;
pub mod dump_error;
pub(crate) mod escapes;
pub mod format_specs;
pub(crate) mod rewrite;
pub mod session;
