//! Extraction of structural metadata from compiled units.
//!
//! [`MetadataAdapter`] is implemented once per unit representation. Every
//! implementation produces the same shaped answers: qualified names with `.`
//! separators, array types written as `T[]`, constructors named
//! [`CONSTRUCTOR_NAME`] and member keys of the form `name(T1, T2)`.

pub mod bytecode;
pub mod classfile;
pub mod descriptor;
pub mod loader;

use crate::errors::ResolveError;
use crate::vfs::Entry;
use serde::Serialize;
use std::fmt;

/// Name reported for constructors. Not a valid identifier.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static initializer in compiled units.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// A declaration whose modifiers can be asked for.
pub enum Declaration<'a, U, F, M> {
    Unit(&'a U),
    Field(&'a F),
    Member(&'a M),
}

pub trait MetadataAdapter {
    type Unit;
    type Field;
    type Member;

    /// Whether `path` names an entry this adapter can resolve. Never touches
    /// storage.
    fn accepts_input(&self, path: &str) -> bool;

    fn resolve(&self, entry: &dyn Entry) -> Result<Self::Unit, ResolveError>;

    fn class_name(&self, unit: &Self::Unit) -> String;

    /// Empty for the root of the hierarchy.
    fn superclass_name(&self, unit: &Self::Unit) -> String;

    fn interface_names(&self, unit: &Self::Unit) -> Vec<String>;

    fn class_annotation_names(&self, unit: &Self::Unit) -> Vec<String>;

    fn fields<'u>(&self, unit: &'u Self::Unit) -> Vec<&'u Self::Field>;

    fn field_name(&self, field: &Self::Field) -> String;

    fn field_type_name(&self, field: &Self::Field) -> String;

    fn field_annotation_names(&self, field: &Self::Field) -> Vec<String>;

    /// Methods and constructors, in declaration order.
    fn members<'u>(&self, unit: &'u Self::Unit) -> Vec<&'u Self::Member>;

    /// `None` for members that are neither methods nor constructors.
    fn member_name(&self, member: &Self::Member) -> Option<String>;

    fn parameter_names(&self, member: &Self::Member) -> Vec<String>;

    fn return_type_name(&self, member: &Self::Member) -> String;

    fn member_modifier(&self, member: &Self::Member) -> String;

    fn member_annotation_names(&self, member: &Self::Member) -> Vec<String>;

    /// Tags of the parameter at `index`; empty when there are none or the
    /// index is out of range.
    fn parameter_annotation_names(&self, member: &Self::Member, index: usize) -> Vec<String>;

    fn modifiers(
        &self,
        declaration: Declaration<'_, Self::Unit, Self::Field, Self::Member>,
    ) -> Option<Modifiers>;

    fn is_public(&self, declaration: Declaration<'_, Self::Unit, Self::Field, Self::Member>) -> bool {
        self.modifiers(declaration)
            .is_some_and(|modifiers| modifiers.is_public())
    }

    /// `name(T1, T2)`, or `None` when the member has no name.
    fn member_key(&self, _unit: &Self::Unit, member: &Self::Member) -> Option<String> {
        let name = self.member_name(member)?;
        Some(format!("{name}({})", self.parameter_names(member).join(", ")))
    }

    /// `owner.name(T1, T2)`.
    fn full_member_key(&self, unit: &Self::Unit, member: &Self::Member) -> Option<String> {
        let key = self.member_key(unit, member)?;
        Some(format!("{}.{key}", self.class_name(unit)))
    }
}

/// Which keywords a modifier set may render as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierScope {
    Class,
    Field,
    Method,
    Constructor,
}

/// Access flags as stored in compiled units.
///
/// The bit values match the JVM access flags, which share their layout with
/// source-level modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;

    const ACCESS: u16 = Self::PUBLIC | Self::PROTECTED | Self::PRIVATE;
    const CLASS_MASK: u16 = Self::ACCESS
        | Self::ABSTRACT
        | Self::STATIC
        | Self::FINAL
        | Self::STRICT
        | Self::INTERFACE;
    const FIELD_MASK: u16 =
        Self::ACCESS | Self::STATIC | Self::FINAL | Self::TRANSIENT | Self::VOLATILE;
    const METHOD_MASK: u16 = Self::ACCESS
        | Self::ABSTRACT
        | Self::STATIC
        | Self::FINAL
        | Self::SYNCHRONIZED
        | Self::NATIVE
        | Self::STRICT;

    const KEYWORDS: [(u16, &'static str); 12] = [
        (Self::PUBLIC, "public"),
        (Self::PROTECTED, "protected"),
        (Self::PRIVATE, "private"),
        (Self::ABSTRACT, "abstract"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::TRANSIENT, "transient"),
        (Self::VOLATILE, "volatile"),
        (Self::SYNCHRONIZED, "synchronized"),
        (Self::NATIVE, "native"),
        (Self::STRICT, "strictfp"),
        (Self::INTERFACE, "interface"),
    ];

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub const fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// The flags valid for `scope`, so that flags sharing a bit (varargs and
    /// transient, bridge and volatile, super and synchronized) never leak
    /// into the wrong declaration kind.
    pub const fn in_scope(self, scope: ModifierScope) -> Self {
        let mask = match scope {
            ModifierScope::Class => Self::CLASS_MASK,
            ModifierScope::Field => Self::FIELD_MASK,
            ModifierScope::Method => Self::METHOD_MASK,
            ModifierScope::Constructor => Self::ACCESS,
        };
        Self(self.0 & mask)
    }

    /// Space separated keywords in canonical order, e.g. `public static final`.
    pub fn keywords(self, scope: ModifierScope) -> String {
        self.in_scope(scope).to_string()
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, keyword) in Self::KEYWORDS {
            if self.0 & flag == 0 {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(keyword)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_follow_canonical_order() {
        let modifiers =
            Modifiers::from_bits(Modifiers::FINAL | Modifiers::STATIC | Modifiers::PUBLIC);
        assert_eq!(modifiers.keywords(ModifierScope::Field), "public static final");
    }

    #[test]
    fn test_shared_bits_are_scoped() {
        // ACC_PUBLIC | ACC_VARARGS | ACC_BRIDGE
        let method = Modifiers::from_bits(0x0001 | 0x0080 | 0x0040);
        assert_eq!(method.keywords(ModifierScope::Method), "public");

        // ACC_PUBLIC | ACC_SUPER
        let class = Modifiers::from_bits(0x0001 | 0x0020);
        assert_eq!(class.keywords(ModifierScope::Class), "public");

        let field = Modifiers::from_bits(Modifiers::PRIVATE | Modifiers::TRANSIENT);
        assert_eq!(field.keywords(ModifierScope::Field), "private transient");
    }

    #[test]
    fn test_constructor_scope_keeps_access_only() {
        let constructor = Modifiers::from_bits(Modifiers::PROTECTED | Modifiers::SYNCHRONIZED);
        assert_eq!(constructor.keywords(ModifierScope::Constructor), "protected");
    }

    #[test]
    fn test_interface_keywords() {
        let interface = Modifiers::from_bits(
            Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT,
        );
        assert!(interface.is_interface());
        assert_eq!(
            interface.keywords(ModifierScope::Class),
            "public abstract interface"
        );
    }

    #[test]
    fn test_no_modifiers_render_empty() {
        assert_eq!(Modifiers::default().to_string(), "");
        assert!(!Modifiers::default().is_public());
    }
}
