pub mod jsonschema;
pub mod typing;
