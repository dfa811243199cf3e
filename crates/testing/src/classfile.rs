//! Assembles minimal but well-formed class files.
//!
//! Names may be given in dotted (`a.b.C`) or internal (`a/b/C`) form. Only
//! the structures the scanner reads are emitted: constant pool, access
//! flags, hierarchy, fields, methods and tag attributes.

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

const MAGIC: u32 = 0xCAFE_BABE;
const JAVA_8_MAJOR: u16 = 52;

fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

#[derive(Debug, Clone)]
pub enum ElementValue {
    Int(i32),
    Long(i64),
    String(String),
    Enum { type_name: String, constant: String },
    Class(String),
    Nested(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub type_name: String,
    pub visible: bool,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// A tag retained at runtime.
    pub fn visible(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            visible: true,
            elements: Vec::new(),
        }
    }

    /// A tag retained only in the class file.
    pub fn invisible(type_name: &str) -> Self {
        Self {
            visible: false,
            ..Self::visible(type_name)
        }
    }

    pub fn element(mut self, name: &str, value: ElementValue) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldBuilder {
    access: u16,
    name: String,
    descriptor: String,
    annotations: Vec<Annotation>,
}

impl FieldBuilder {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            access: 0,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            annotations: Vec::new(),
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MethodBuilder {
    access: u16,
    name: String,
    descriptor: String,
    annotations: Vec<Annotation>,
    parameter_annotations: Vec<(usize, Annotation)>,
}

impl MethodBuilder {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            access: 0,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
        }
    }

    pub fn constructor(descriptor: &str) -> Self {
        Self::new("<init>", descriptor)
    }

    pub fn static_initializer() -> Self {
        Self::new("<clinit>", "()V").access(ACC_STATIC)
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn parameter_annotation(mut self, index: usize, annotation: Annotation) -> Self {
        self.parameter_annotations.push((index, annotation));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    access: u16,
    name: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<Annotation>,
    fields: Vec<FieldBuilder>,
    methods: Vec<MethodBuilder>,
    source_file: Option<String>,
}

impl ClassFileBuilder {
    /// A public class extending `java.lang.Object`.
    pub fn new(name: &str) -> Self {
        Self {
            access: ACC_PUBLIC | ACC_SUPER,
            name: name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = Some(name.to_string());
        self
    }

    /// Emits `super_class = 0`, as only the hierarchy root does.
    pub fn without_super_class(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(name.to_string());
        self
    }

    /// Relative path of this class inside a container, e.g. `a/B.class`.
    pub fn entry_path(&self) -> String {
        format!("{}.class", internal_name(&self.name))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut body = Vec::new();

        put_u2(&mut body, self.access);
        put_u2(&mut body, pool.class(&self.name));
        let super_index = self
            .super_class
            .as_deref()
            .map(|name| pool.class(name))
            .unwrap_or(0);
        put_u2(&mut body, super_index);

        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.class(interface));
        }

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            put_u2(&mut body, field.access);
            put_u2(&mut body, pool.utf8(&field.name));
            put_u2(&mut body, pool.utf8(&field.descriptor));
            let attributes = annotation_attributes(&mut pool, &field.annotations);
            write_attributes(&mut body, &attributes);
        }

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            put_u2(&mut body, method.access);
            put_u2(&mut body, pool.utf8(&method.name));
            put_u2(&mut body, pool.utf8(&method.descriptor));
            let mut attributes = annotation_attributes(&mut pool, &method.annotations);
            attributes.extend(parameter_annotation_attributes(
                &mut pool,
                &method.parameter_annotations,
            ));
            write_attributes(&mut body, &attributes);
        }

        let mut attributes = annotation_attributes(&mut pool, &self.annotations);
        if let Some(source_file) = &self.source_file {
            let name = pool.utf8("SourceFile");
            let mut info = Vec::new();
            put_u2(&mut info, pool.utf8(source_file));
            attributes.push((name, info));
        }
        write_attributes(&mut body, &attributes);

        let mut out = Vec::with_capacity(10 + pool.bytes.len() + body.len());
        out.extend_from_slice(&MAGIC.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, JAVA_8_MAJOR);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

struct ConstantPool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    ints: HashMap<i32, u16>,
    longs: HashMap<i64, u16>,
}

impl ConstantPool {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
            ints: HashMap::new(),
            longs: HashMap::new(),
        }
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8.get(value) {
            return index;
        }
        let index = self.next;
        self.next += 1;
        self.bytes.push(1);
        put_u2(&mut self.bytes, value.len() as u16);
        self.bytes.extend_from_slice(value.as_bytes());
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = internal_name(name);
        if let Some(&index) = self.classes.get(&name) {
            return index;
        }
        let name_index = self.utf8(&name);
        let index = self.next;
        self.next += 1;
        self.bytes.push(7);
        put_u2(&mut self.bytes, name_index);
        self.classes.insert(name, index);
        index
    }

    fn int(&mut self, value: i32) -> u16 {
        if let Some(&index) = self.ints.get(&value) {
            return index;
        }
        let index = self.next;
        self.next += 1;
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.ints.insert(value, index);
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        if let Some(&index) = self.longs.get(&value) {
            return index;
        }
        let index = self.next;
        // longs take two slots
        self.next += 2;
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.longs.insert(value, index);
        index
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    put_u2(out, attributes.len() as u16);
    for (name_index, info) in attributes {
        put_u2(out, *name_index);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(info);
    }
}

fn annotation_attributes(pool: &mut ConstantPool, annotations: &[Annotation]) -> Vec<(u16, Vec<u8>)> {
    let mut attributes = Vec::new();
    for (visible, attribute_name) in [
        (true, "RuntimeVisibleAnnotations"),
        (false, "RuntimeInvisibleAnnotations"),
    ] {
        let selected: Vec<&Annotation> = annotations
            .iter()
            .filter(|annotation| annotation.visible == visible)
            .collect();
        if selected.is_empty() {
            continue;
        }
        let name = pool.utf8(attribute_name);
        let mut info = Vec::new();
        put_u2(&mut info, selected.len() as u16);
        for annotation in selected {
            write_annotation(pool, &mut info, annotation);
        }
        attributes.push((name, info));
    }
    attributes
}

fn parameter_annotation_attributes(
    pool: &mut ConstantPool,
    parameter_annotations: &[(usize, Annotation)],
) -> Vec<(u16, Vec<u8>)> {
    let mut attributes = Vec::new();
    for (visible, attribute_name) in [
        (true, "RuntimeVisibleParameterAnnotations"),
        (false, "RuntimeInvisibleParameterAnnotations"),
    ] {
        let selected: Vec<&(usize, Annotation)> = parameter_annotations
            .iter()
            .filter(|(_, annotation)| annotation.visible == visible)
            .collect();
        let Some(parameter_count) = selected.iter().map(|(index, _)| index + 1).max() else {
            continue;
        };
        let name = pool.utf8(attribute_name);
        let mut info = vec![parameter_count as u8];
        for parameter in 0..parameter_count {
            let annotations: Vec<&Annotation> = selected
                .iter()
                .filter(|(index, _)| *index == parameter)
                .map(|(_, annotation)| annotation)
                .collect();
            put_u2(&mut info, annotations.len() as u16);
            for annotation in annotations {
                write_annotation(pool, &mut info, annotation);
            }
        }
        attributes.push((name, info));
    }
    attributes
}

fn write_annotation(pool: &mut ConstantPool, out: &mut Vec<u8>, annotation: &Annotation) {
    let descriptor = format!("L{};", internal_name(&annotation.type_name));
    put_u2(out, pool.utf8(&descriptor));
    put_u2(out, annotation.elements.len() as u16);
    for (name, value) in &annotation.elements {
        put_u2(out, pool.utf8(name));
        write_element_value(pool, out, value);
    }
}

fn write_element_value(pool: &mut ConstantPool, out: &mut Vec<u8>, value: &ElementValue) {
    match value {
        ElementValue::Int(value) => {
            out.push(b'I');
            put_u2(out, pool.int(*value));
        }
        ElementValue::Long(value) => {
            out.push(b'J');
            put_u2(out, pool.long(*value));
        }
        ElementValue::String(value) => {
            out.push(b's');
            put_u2(out, pool.utf8(value));
        }
        ElementValue::Enum {
            type_name,
            constant,
        } => {
            out.push(b'e');
            put_u2(out, pool.utf8(&format!("L{};", internal_name(type_name))));
            put_u2(out, pool.utf8(constant));
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            put_u2(out, pool.utf8(descriptor));
        }
        ElementValue::Nested(annotation) => {
            out.push(b'@');
            write_annotation(pool, out, annotation);
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_element_value(pool, out, value);
            }
        }
    }
}
