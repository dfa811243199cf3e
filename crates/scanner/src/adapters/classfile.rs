use super::descriptor::{split_method_descriptor, type_name};
use super::{CONSTRUCTOR_NAME, Modifiers, STATIC_INITIALIZER_NAME};
use crate::errors::ClassFormatError;
use tracing::debug;

const MAGIC: u32 = 0xCAFE_BABE;
const MAX_ANNOTATION_DEPTH: usize = 64;

/// A declarative tag attached to a class, field, member or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRef {
    pub type_name: String,
    /// Retained at runtime, as opposed to only in the class file.
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Constructor,
    /// The static initializer; neither a method nor a constructor.
    Initializer,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access: Modifiers,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<AnnotationRef>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access: Modifiers,
    pub kind: MemberKind,
    pub name: String,
    pub descriptor: String,
    /// Raw parameter descriptors, in order.
    pub parameters: Vec<String>,
    pub return_descriptor: String,
    pub annotations: Vec<AnnotationRef>,
    /// Tags per parameter position. May be shorter than `parameters`.
    pub parameter_annotations: Vec<Vec<AnnotationRef>>,
}

/// The parsed structure of one compiled unit.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub major_version: u16,
    pub minor_version: u16,
    pub access: Modifiers,
    /// Qualified name, `.`-separated.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub annotations: Vec<AnnotationRef>,
}

pub fn parse_class(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor_version = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let mut access = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let name = constant_pool.class_name(this_class)?;
    let super_class = reader.read_u2()?;
    let super_name = match super_class {
        0 => None,
        index => Some(constant_pool.class_name(index)?),
    };

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(constant_pool.class_name(reader.read_u2()?)?);
    }

    let fields_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        let access = Modifiers::from_bits(reader.read_u2()?);
        let name = constant_pool.utf8(reader.read_u2()?)?.to_string();
        let descriptor = constant_pool.utf8(reader.read_u2()?)?.to_string();

        let mut annotations = Vec::new();
        let attributes_count = reader.read_u2()?;
        for _ in 0..attributes_count {
            let (attribute_name, info) = read_attribute(&mut reader, &constant_pool)?;
            if let Some(visible) = annotations_visibility(attribute_name) {
                annotations.extend(read_annotations_or_empty(info, &constant_pool, visible));
            }
        }

        fields.push(FieldInfo {
            access,
            name,
            descriptor,
            annotations,
        });
    }

    let methods_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(parse_method(&mut reader, &constant_pool)?);
    }

    let mut annotations = Vec::new();
    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let (attribute_name, info) = read_attribute(&mut reader, &constant_pool)?;
        if let Some(visible) = annotations_visibility(attribute_name) {
            annotations.extend(read_annotations_or_empty(info, &constant_pool, visible));
        } else if attribute_name == "InnerClasses" {
            if let Some(inner_access) = nested_access_flags(info, this_class) {
                access = inner_access;
            }
        }
    }

    Ok(ClassFile {
        major_version,
        minor_version,
        access: Modifiers::from_bits(access),
        name,
        super_name,
        interfaces,
        fields,
        methods,
        annotations,
    })
}

fn parse_method(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<MethodInfo, ClassFormatError> {
    let access = Modifiers::from_bits(reader.read_u2()?);
    let name = constant_pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = constant_pool.utf8(reader.read_u2()?)?.to_string();

    let (parameters, return_descriptor) = split_method_descriptor(&descriptor)?;
    let parameters: Vec<String> = parameters.into_iter().map(str::to_string).collect();
    let return_descriptor = return_descriptor.to_string();

    let kind = match name.as_str() {
        CONSTRUCTOR_NAME => MemberKind::Constructor,
        STATIC_INITIALIZER_NAME => MemberKind::Initializer,
        _ => MemberKind::Method,
    };

    let mut annotations = Vec::new();
    let mut parameter_annotations: Vec<Vec<AnnotationRef>> = Vec::new();
    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let (attribute_name, info) = read_attribute(reader, constant_pool)?;
        if let Some(visible) = annotations_visibility(attribute_name) {
            annotations.extend(read_annotations_or_empty(info, constant_pool, visible));
        } else if let Some(visible) = parameter_annotations_visibility(attribute_name) {
            let per_parameter = match read_parameter_annotations(info, constant_pool, visible) {
                Ok(per_parameter) => per_parameter,
                Err(error) => {
                    debug!("Ignoring malformed {attribute_name} on {name}: {error}");
                    Vec::new()
                }
            };
            if parameter_annotations.len() < per_parameter.len() {
                parameter_annotations.resize_with(per_parameter.len(), Vec::new);
            }
            for (slot, tags) in parameter_annotations.iter_mut().zip(per_parameter) {
                slot.extend(tags);
            }
        }
    }

    Ok(MethodInfo {
        access,
        kind,
        name,
        descriptor,
        parameters,
        return_descriptor,
        annotations,
        parameter_annotations,
    })
}

fn read_attribute<'data, 'pool>(
    reader: &mut ClassReader<'data>,
    constant_pool: &'pool ConstantPool,
) -> Result<(&'pool str, &'data [u8]), ClassFormatError> {
    let name_index = reader.read_u2()?;
    let length = reader.read_u4()? as usize;
    let name = constant_pool.utf8(name_index)?;
    let info = reader.read_slice(length)?;
    Ok((name, info))
}

fn annotations_visibility(attribute_name: &str) -> Option<bool> {
    match attribute_name {
        "RuntimeVisibleAnnotations" => Some(true),
        "RuntimeInvisibleAnnotations" => Some(false),
        _ => None,
    }
}

fn parameter_annotations_visibility(attribute_name: &str) -> Option<bool> {
    match attribute_name {
        "RuntimeVisibleParameterAnnotations" => Some(true),
        "RuntimeInvisibleParameterAnnotations" => Some(false),
        _ => None,
    }
}

/// Malformed tag attributes lose their tags, not the whole unit.
fn read_annotations_or_empty(
    info: &[u8],
    constant_pool: &ConstantPool,
    visible: bool,
) -> Vec<AnnotationRef> {
    let mut reader = ClassReader::new(info);
    match read_annotations(&mut reader, constant_pool, visible) {
        Ok(annotations) => annotations,
        Err(error) => {
            debug!("Ignoring malformed annotation attribute: {error}");
            Vec::new()
        }
    }
}

fn read_annotations(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
    visible: bool,
) -> Result<Vec<AnnotationRef>, ClassFormatError> {
    let count = reader.read_u2()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_name = read_annotation(reader, constant_pool, 0)?;
        annotations.push(AnnotationRef { type_name, visible });
    }
    Ok(annotations)
}

fn read_parameter_annotations(
    info: &[u8],
    constant_pool: &ConstantPool,
    visible: bool,
) -> Result<Vec<Vec<AnnotationRef>>, ClassFormatError> {
    let mut reader = ClassReader::new(info);
    let parameters = reader.read_u1()?;
    let mut per_parameter = Vec::with_capacity(parameters as usize);
    for _ in 0..parameters {
        per_parameter.push(read_annotations(&mut reader, constant_pool, visible)?);
    }
    Ok(per_parameter)
}

/// Reads one annotation structure and returns its qualified type name.
fn read_annotation(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
    depth: usize,
) -> Result<String, ClassFormatError> {
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFormatError::InvalidAnnotation(
            "annotation nesting too deep".into(),
        ));
    }
    let type_descriptor = constant_pool.utf8(reader.read_u2()?)?;
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.read_u2()?; // element_name_index
        skip_element_value(reader, constant_pool, depth)?;
    }
    Ok(type_name(type_descriptor))
}

fn skip_element_value(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
    depth: usize,
) -> Result<(), ClassFormatError> {
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            reader.read_u2()?;
        }
        b'e' => {
            reader.read_u2()?; // type_name_index
            reader.read_u2()?; // const_name_index
        }
        b'@' => {
            read_annotation(reader, constant_pool, depth + 1)?;
        }
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                skip_element_value(reader, constant_pool, depth + 1)?;
            }
        }
        tag => {
            return Err(ClassFormatError::InvalidAnnotation(format!(
                "unknown element value tag '{}'",
                tag as char
            )));
        }
    }
    Ok(())
}

/// Access flags recorded for `this_class` in an `InnerClasses` attribute.
/// Nested classes keep their declared visibility there.
fn nested_access_flags(info: &[u8], this_class: u16) -> Option<u16> {
    let mut reader = ClassReader::new(info);
    let classes = reader.read_u2().ok()?;
    for _ in 0..classes {
        let inner_class = reader.read_u2().ok()?;
        reader.read_u2().ok()?; // outer_class_info_index
        reader.read_u2().ok()?; // inner_name_index
        let inner_access = reader.read_u2().ok()?;
        if inner_class == this_class {
            return Some(inner_access);
        }
    }
    None
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(decode_modified_utf8(bytes))
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // long and double take two slots
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                7 => {
                    let name_index = reader.read_u2()?;
                    Constant::Class { name_index }
                }
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassFormatError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassFormatError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassFormatError::InvalidConstantIndex { index }),
        }
    }

    /// Qualified, `.`-separated name of a class constant.
    fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.replace('/', ".")),
            _ => Err(ClassFormatError::InvalidConstantIndex { index }),
        }
    }
}

/// Decodes the modified UTF-8 used by class files: `NUL` is two bytes and
/// supplementary characters are surrogate pairs of three bytes each.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        let first = bytes[pos];
        let (unit, width) = match first {
            0x00..=0x7F => (u16::from(first), 1),
            0xC0..=0xDF if pos + 1 < bytes.len() => (
                (u16::from(first & 0x1F) << 6) | u16::from(bytes[pos + 1] & 0x3F),
                2,
            ),
            0xE0..=0xEF if pos + 2 < bytes.len() => (
                (u16::from(first & 0x0F) << 12)
                    | (u16::from(bytes[pos + 1] & 0x3F) << 6)
                    | u16::from(bytes[pos + 2] & 0x3F),
                3,
            ),
            _ => (0xFFFD, 1),
        };
        units.push(unit);
        pos += width;
    }
    String::from_utf16_lossy(&units)
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassFormatError> {
        let magic = self.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::InvalidMagic(magic));
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassFormatError> {
        let value = *self
            .data
            .get(self.pos)
            .ok_or(ClassFormatError::UnexpectedEof)?;
        self.pos += 1;
        Ok(value)
    }

    fn read_u2(&mut self) -> Result<u16, ClassFormatError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassFormatError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.read_slice(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::classfile::{ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
    use testing::{Annotation, ClassFileBuilder, ElementValue, FieldBuilder, MethodBuilder};

    fn sample_class() -> ClassFileBuilder {
        ClassFileBuilder::new("a.B")
            .super_class("a.Base")
            .interface("java.io.Serializable")
            .interface("java.lang.Comparable")
            .annotation(Annotation::visible("a.Entity"))
            .annotation(Annotation::invisible("a.Generated"))
            .field(
                FieldBuilder::new("count", "I")
                    .access(ACC_PRIVATE | ACC_STATIC | ACC_FINAL)
                    .annotation(Annotation::visible("a.Column")),
            )
            .field(FieldBuilder::new("names", "[Ljava/lang/String;").access(ACC_PUBLIC))
            .method(
                MethodBuilder::constructor("(ILjava/lang/String;)V")
                    .access(ACC_PUBLIC)
                    .parameter_annotation(1, Annotation::visible("a.NotNull")),
            )
            .method(MethodBuilder::new("run", "([[I)Ljava/lang/Object;").access(ACC_PUBLIC))
            .method(MethodBuilder::static_initializer())
            .source_file("B.java")
    }

    #[test]
    fn test_parses_hierarchy() {
        let class = parse_class(&sample_class().build()).unwrap();

        assert_eq!(class.major_version, 52);
        assert_eq!(class.name, "a.B");
        assert_eq!(class.super_name.as_deref(), Some("a.Base"));
        assert_eq!(
            class.interfaces,
            vec!["java.io.Serializable", "java.lang.Comparable"]
        );
        assert!(class.access.is_public());
    }

    #[test]
    fn test_parses_class_annotations_with_visibility() {
        let class = parse_class(&sample_class().build()).unwrap();
        assert_eq!(
            class.annotations,
            vec![
                AnnotationRef {
                    type_name: "a.Entity".to_string(),
                    visible: true
                },
                AnnotationRef {
                    type_name: "a.Generated".to_string(),
                    visible: false
                },
            ]
        );
    }

    #[test]
    fn test_parses_fields() {
        let class = parse_class(&sample_class().build()).unwrap();
        assert_eq!(class.fields.len(), 2);

        let count = &class.fields[0];
        assert_eq!(count.name, "count");
        assert_eq!(count.descriptor, "I");
        assert!(count.access.is_static());
        assert_eq!(count.annotations[0].type_name, "a.Column");

        assert_eq!(class.fields[1].descriptor, "[Ljava/lang/String;");
    }

    #[test]
    fn test_parses_methods() {
        let class = parse_class(&sample_class().build()).unwrap();
        let kinds: Vec<MemberKind> = class.methods.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MemberKind::Constructor,
                MemberKind::Method,
                MemberKind::Initializer
            ]
        );

        let constructor = &class.methods[0];
        assert_eq!(constructor.parameters, vec!["I", "Ljava/lang/String;"]);
        assert_eq!(constructor.return_descriptor, "V");
        assert_eq!(constructor.parameter_annotations.len(), 2);
        assert!(constructor.parameter_annotations[0].is_empty());
        assert_eq!(constructor.parameter_annotations[1][0].type_name, "a.NotNull");

        let run = &class.methods[1];
        assert_eq!(run.parameters, vec!["[[I"]);
        assert_eq!(run.return_descriptor, "Ljava/lang/Object;");
    }

    #[test]
    fn test_root_class_has_no_super() {
        let bytes = ClassFileBuilder::new("java.lang.Object")
            .without_super_class()
            .build();
        let class = parse_class(&bytes).unwrap();
        assert!(class.super_name.is_none());
        assert!(class.interfaces.is_empty());
    }

    #[test]
    fn test_skips_annotation_element_values() {
        let tag = Annotation::visible("a.Config")
            .element("size", ElementValue::Long(1 << 40))
            .element("name", ElementValue::String("x".into()))
            .element(
                "mode",
                ElementValue::Enum {
                    type_name: "a.Mode".into(),
                    constant: "FAST".into(),
                },
            )
            .element("type", ElementValue::Class("Ljava/lang/String;".into()))
            .element(
                "nested",
                ElementValue::Nested(
                    Annotation::visible("a.Inner").element("v", ElementValue::Int(3)),
                ),
            )
            .element(
                "values",
                ElementValue::Array(vec![ElementValue::Int(1), ElementValue::Int(2)]),
            );
        let bytes = ClassFileBuilder::new("a.Configured")
            .annotation(tag)
            .annotation(Annotation::visible("a.After"))
            .build();

        let class = parse_class(&bytes).unwrap();
        let names: Vec<&str> = class
            .annotations
            .iter()
            .map(|a| a.type_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.Config", "a.After"]);
    }

    #[test]
    fn test_truncated_class_is_rejected() {
        let bytes = sample_class().build();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            parse_class(truncated),
            Err(ClassFormatError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = sample_class().build();
        bytes[0] = 0;
        assert!(matches!(
            parse_class(&bytes),
            Err(ClassFormatError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_malformed_annotation_degrades_to_no_tags() {
        let mut pool = ConstantPool {
            entries: vec![Constant::Unusable, Constant::Utf8("La/Tag;".into())],
        };
        // one annotation, one element with an unknown tag 'X'
        let info = [0, 1, 0, 1, 0, 1, 0, 1, b'X', 0, 0];
        assert!(read_annotations_or_empty(&info, &pool, true).is_empty());

        pool.entries.push(Constant::Utf8("v".into()));
        let valid = [0, 1, 0, 1, 0, 0];
        assert_eq!(
            read_annotations_or_empty(&valid, &pool, true)[0].type_name,
            "a.Tag"
        );
    }

    #[test]
    fn test_inner_class_flags_override_outer_flags() {
        // one entry: inner=2 outer=0 name=0 flags=private|static
        let info = [0, 1, 0, 2, 0, 0, 0, 0, 0, 0x0A];
        assert_eq!(nested_access_flags(&info, 2), Some(0x000A));
        assert_eq!(nested_access_flags(&info, 3), None);
    }

    #[test]
    fn test_decode_modified_utf8() {
        assert_eq!(decode_modified_utf8(b"plain"), "plain");
        // NUL as 0xC0 0x80
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80, b'b']), "a\0b");
        // U+1F600 as a surrogate pair
        let emoji = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&emoji), "\u{1F600}");
    }
}
