//! Fixture builders shared by the scanner tests: compiled class files
//! assembled in memory and jar archives written from them.

pub mod classfile;
pub mod jar;

pub use classfile::{Annotation, ClassFileBuilder, ElementValue, FieldBuilder, MethodBuilder};
