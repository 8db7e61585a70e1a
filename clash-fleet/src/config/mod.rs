pub mod def;
pub mod internal;
