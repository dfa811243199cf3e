use super::classfile::{AnnotationRef, ClassFile, FieldInfo, MemberKind, MethodInfo, parse_class};
use super::descriptor::type_name;
use super::loader::{EntryLoader, UnitLoader};
use super::{CONSTRUCTOR_NAME, Declaration, MetadataAdapter, ModifierScope, Modifiers};
use crate::config::ScanConfig;
use crate::errors::{LoadAttempt, ResolveError};
use crate::vfs::Entry;
use tracing::trace;

const CLASS_SUFFIX: &str = ".class";

static DEFAULT_LOADER: EntryLoader = EntryLoader;

/// Resolves compiled units by loading their bytes and parsing them.
///
/// Loaders are tried in order and the first one that yields a unit with the
/// expected qualified name wins. Without configured loaders the entry's own
/// bytes are used.
pub struct BytecodeAdapter {
    loaders: Vec<Box<dyn UnitLoader>>,
    max_entry_bytes: u64,
    include_invisible_annotations: bool,
}

impl Default for BytecodeAdapter {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl BytecodeAdapter {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            loaders: Vec::new(),
            max_entry_bytes: config.max_entry_bytes,
            include_invisible_annotations: config.include_invisible_annotations,
        }
    }

    pub fn with_loader(mut self, loader: impl UnitLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    fn loaders(&self) -> Vec<&dyn UnitLoader> {
        if self.loaders.is_empty() {
            vec![&DEFAULT_LOADER as &dyn UnitLoader]
        } else {
            self.loaders.iter().map(|loader| loader.as_ref()).collect()
        }
    }

    fn load_with(
        &self,
        loader: &dyn UnitLoader,
        qualified_name: &str,
        entry: &dyn Entry,
    ) -> Result<ClassFile, String> {
        let bytes = loader
            .load(qualified_name, entry)
            .map_err(|error| error.to_string())?;
        if bytes.len() as u64 > self.max_entry_bytes {
            return Err(format!(
                "{} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_entry_bytes
            ));
        }
        let class = parse_class(&bytes).map_err(|error| error.to_string())?;
        if class.name != qualified_name {
            return Err(format!("found {} instead", class.name));
        }
        Ok(class)
    }

    fn tag_names(&self, annotations: &[AnnotationRef]) -> Vec<String> {
        annotations
            .iter()
            .filter(|annotation| annotation.visible || self.include_invisible_annotations)
            .map(|annotation| annotation.type_name.clone())
            .collect()
    }
}

/// `a/b/C$1.class` to `a.b.C$1`.
pub fn qualified_name(relative_path: &str) -> Option<String> {
    let stem = relative_path.strip_suffix(CLASS_SUFFIX)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace('/', "."))
}

impl MetadataAdapter for BytecodeAdapter {
    type Unit = ClassFile;
    type Field = FieldInfo;
    type Member = MethodInfo;

    fn accepts_input(&self, path: &str) -> bool {
        path.ends_with(CLASS_SUFFIX)
    }

    fn resolve(&self, entry: &dyn Entry) -> Result<ClassFile, ResolveError> {
        let name = qualified_name(entry.relative_path()).ok_or_else(|| ResolveError::InvalidPath {
            path: entry.to_string(),
        })?;

        if let Some(size) = entry.size() {
            if size > self.max_entry_bytes {
                return Err(ResolveError::TooLarge {
                    path: entry.to_string(),
                    size,
                    limit: self.max_entry_bytes,
                });
            }
        }

        let mut attempts = Vec::new();
        for loader in self.loaders() {
            match self.load_with(loader, &name, entry) {
                Ok(class) => {
                    trace!("Resolved {name} with {loader}");
                    return Ok(class);
                }
                Err(reason) => attempts.push(LoadAttempt {
                    loader: loader.to_string(),
                    reason,
                }),
            }
        }

        Err(ResolveError::Unresolved { name, attempts })
    }

    fn class_name(&self, unit: &ClassFile) -> String {
        unit.name.clone()
    }

    fn superclass_name(&self, unit: &ClassFile) -> String {
        unit.super_name.clone().unwrap_or_default()
    }

    fn interface_names(&self, unit: &ClassFile) -> Vec<String> {
        unit.interfaces.clone()
    }

    fn class_annotation_names(&self, unit: &ClassFile) -> Vec<String> {
        self.tag_names(&unit.annotations)
    }

    fn fields<'u>(&self, unit: &'u ClassFile) -> Vec<&'u FieldInfo> {
        unit.fields.iter().collect()
    }

    fn field_name(&self, field: &FieldInfo) -> String {
        field.name.clone()
    }

    fn field_type_name(&self, field: &FieldInfo) -> String {
        type_name(&field.descriptor)
    }

    fn field_annotation_names(&self, field: &FieldInfo) -> Vec<String> {
        self.tag_names(&field.annotations)
    }

    fn members<'u>(&self, unit: &'u ClassFile) -> Vec<&'u MethodInfo> {
        unit.methods.iter().collect()
    }

    fn member_name(&self, member: &MethodInfo) -> Option<String> {
        match member.kind {
            MemberKind::Method => Some(member.name.clone()),
            MemberKind::Constructor => Some(CONSTRUCTOR_NAME.to_string()),
            MemberKind::Initializer => None,
        }
    }

    fn parameter_names(&self, member: &MethodInfo) -> Vec<String> {
        member
            .parameters
            .iter()
            .map(|descriptor| type_name(descriptor))
            .collect()
    }

    fn return_type_name(&self, member: &MethodInfo) -> String {
        type_name(&member.return_descriptor)
    }

    fn member_modifier(&self, member: &MethodInfo) -> String {
        let scope = match member.kind {
            MemberKind::Constructor => ModifierScope::Constructor,
            MemberKind::Method | MemberKind::Initializer => ModifierScope::Method,
        };
        member.access.keywords(scope)
    }

    fn member_annotation_names(&self, member: &MethodInfo) -> Vec<String> {
        self.tag_names(&member.annotations)
    }

    fn parameter_annotation_names(&self, member: &MethodInfo, index: usize) -> Vec<String> {
        member
            .parameter_annotations
            .get(index)
            .map(|annotations| self.tag_names(annotations))
            .unwrap_or_default()
    }

    fn modifiers(
        &self,
        declaration: Declaration<'_, ClassFile, FieldInfo, MethodInfo>,
    ) -> Option<Modifiers> {
        Some(match declaration {
            Declaration::Unit(unit) => unit.access,
            Declaration::Field(field) => field.access,
            Declaration::Member(member) => member.access,
        })
    }
}
