//! Normalized metadata records, one set per resolved unit.

use crate::adapters::{Declaration, MetadataAdapter, Modifiers};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
    pub modifiers: Option<Modifiers>,
    pub tags: Vec<String>,
}

/// A method or constructor. Constructors carry the sentinel name `<init>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDescriptor {
    pub name: String,
    /// `name(T1, T2)`, unique within the owning unit.
    pub key: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub modifiers: String,
    pub is_public: bool,
    pub tags: Vec<String>,
    /// One list per parameter position.
    pub parameter_tags: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitMetadata {
    pub name: String,
    /// Empty for the root of the hierarchy.
    pub superclass: String,
    pub interfaces: Vec<String>,
    pub modifiers: Option<Modifiers>,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub members: Vec<MemberDescriptor>,
}

impl UnitMetadata {
    pub fn member(&self, key: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|member| member.key == key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// `owner.name(T1, T2)` for every member, in declaration order.
    pub fn full_member_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.members
            .iter()
            .map(|member| format!("{}.{}", self.name, member.key))
    }
}

/// Extracts the record set of `unit`.
///
/// Members without a name cannot be keyed and are left out. When two fields
/// share a name or two members share a key, the first one is kept.
pub fn describe<A>(adapter: &A, unit: &A::Unit) -> UnitMetadata
where
    A: MetadataAdapter + ?Sized,
{
    let name = adapter.class_name(unit);

    let mut field_names = FxHashSet::default();
    let mut fields = Vec::new();
    for field in adapter.fields(unit) {
        let field_name = adapter.field_name(field);
        if !field_names.insert(field_name.clone()) {
            debug!("Ignoring duplicate field {name}.{field_name}");
            continue;
        }
        fields.push(FieldDescriptor {
            type_name: adapter.field_type_name(field),
            modifiers: adapter.modifiers(Declaration::Field(field)),
            tags: adapter.field_annotation_names(field),
            name: field_name,
        });
    }

    let mut member_keys = FxHashSet::default();
    let mut members = Vec::new();
    for member in adapter.members(unit) {
        let (Some(member_name), Some(key)) =
            (adapter.member_name(member), adapter.member_key(unit, member))
        else {
            continue;
        };
        if !member_keys.insert(key.clone()) {
            debug!("Ignoring duplicate member {name}.{key}");
            continue;
        }

        let parameter_types = adapter.parameter_names(member);
        let parameter_tags = (0..parameter_types.len())
            .map(|index| adapter.parameter_annotation_names(member, index))
            .collect();
        members.push(MemberDescriptor {
            name: member_name,
            key,
            return_type: adapter.return_type_name(member),
            modifiers: adapter.member_modifier(member),
            is_public: adapter.is_public(Declaration::Member(member)),
            tags: adapter.member_annotation_names(member),
            parameter_types,
            parameter_tags,
        });
    }

    UnitMetadata {
        superclass: adapter.superclass_name(unit),
        interfaces: adapter.interface_names(unit),
        modifiers: adapter.modifiers(Declaration::Unit(unit)),
        is_public: adapter.is_public(Declaration::Unit(unit)),
        tags: adapter.class_annotation_names(unit),
        fields,
        members,
        name,
    }
}
