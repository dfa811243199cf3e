//! Type descriptors (`I`, `Ljava/lang/String;`, `[[J`, `(IZ)V`) and the
//! source-style names they stand for.

use crate::errors::ClassFormatError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Primitive(&'static str),
    Reference(String),
    Array {
        element: Box<TypeName>,
        dimensions: usize,
    },
    Void,
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Primitive(name) => f.write_str(name),
            TypeName::Reference(name) => f.write_str(name),
            TypeName::Array {
                element,
                dimensions,
            } => {
                write!(f, "{element}")?;
                for _ in 0..*dimensions {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            TypeName::Void => f.write_str("void"),
        }
    }
}

/// Parses one field or return descriptor.
pub fn parse_type(descriptor: &str) -> Result<TypeName, ClassFormatError> {
    let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());

    let dimensions = descriptor.bytes().take_while(|b| *b == b'[').count();
    let element = &descriptor[dimensions..];
    let element_type = match element.as_bytes() {
        [b'B'] => TypeName::Primitive("byte"),
        [b'C'] => TypeName::Primitive("char"),
        [b'D'] => TypeName::Primitive("double"),
        [b'F'] => TypeName::Primitive("float"),
        [b'I'] => TypeName::Primitive("int"),
        [b'J'] => TypeName::Primitive("long"),
        [b'S'] => TypeName::Primitive("short"),
        [b'Z'] => TypeName::Primitive("boolean"),
        [b'V'] if dimensions == 0 => TypeName::Void,
        [b'L', inner @ .., b';'] if !inner.is_empty() && !inner.contains(&b';') => {
            TypeName::Reference(element[1..element.len() - 1].replace('/', "."))
        }
        _ => return Err(invalid()),
    };

    if dimensions == 0 {
        Ok(element_type)
    } else {
        Ok(TypeName::Array {
            element: Box::new(element_type),
            dimensions,
        })
    }
}

/// Source-style name of a descriptor, e.g. `[[I` becomes `int[][]`.
/// A descriptor that cannot be named is returned unchanged.
pub fn type_name(descriptor: &str) -> String {
    match parse_type(descriptor) {
        Ok(name) => name.to_string(),
        Err(_) => descriptor.to_string(),
    }
}

/// Splits a method descriptor into its raw parameter descriptors and its
/// raw return descriptor. Only the boundaries are checked here; naming each
/// part is left to [`type_name`].
pub fn split_method_descriptor(descriptor: &str) -> Result<(Vec<&str>, &str), ClassFormatError> {
    let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());
    let bytes = descriptor.as_bytes();

    if bytes.first() != Some(&b'(') {
        return Err(invalid());
    }
    let mut pos = 1;
    let mut parameters = Vec::new();
    loop {
        match bytes.get(pos) {
            Some(b')') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let end = type_end(bytes, pos).ok_or_else(invalid)?;
                parameters.push(&descriptor[pos..end]);
                pos = end;
            }
            None => return Err(invalid()),
        }
    }

    let end = type_end(bytes, pos).ok_or_else(invalid)?;
    if end != bytes.len() {
        return Err(invalid());
    }
    Ok((parameters, &descriptor[pos..end]))
}

/// End offset of the single type starting at `start`.
fn type_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    while bytes.get(pos) == Some(&b'[') {
        pos += 1;
    }
    match bytes.get(pos)? {
        b'L' => {
            let close = bytes[pos..].iter().position(|b| *b == b';')?;
            Some(pos + close + 1)
        }
        b')' | b'(' => None,
        tag if tag.is_ascii() => Some(pos + 1),
        _ => None,
    }
}
