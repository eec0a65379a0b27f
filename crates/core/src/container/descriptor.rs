use std::any::TypeId;
use std::fmt;

/// Nominal part of a [`TypeDescriptor`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeIdent {
    /// A Rust type, usually a trait object such as `dyn Repository`
    Type { id: TypeId, name: &'static str },
    /// Opaque string key for bindings that are not named by a type
    Key(String),
    /// Wildcard used for parameters without a declared type
    Any,
    /// The absent alternative of an optional or union parameter
    None,
}

/// Identity of a requested or bound type.
///
/// Two descriptors are equal when their identifiers and their generic argument
/// lists match positionally, so descriptors built independently for the same
/// type hit the same registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    ident: TypeIdent,
    args: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Descriptor for a Rust type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            ident: TypeIdent::Type {
                id: TypeId::of::<T>(),
                name: std::any::type_name::<T>(),
            },
            args: Vec::new(),
        }
    }

    /// Descriptor for an opaque string key
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            ident: TypeIdent::Key(key.into()),
            args: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self {
            ident: TypeIdent::Any,
            args: Vec::new(),
        }
    }

    pub fn none() -> Self {
        Self {
            ident: TypeIdent::None,
            args: Vec::new(),
        }
    }

    /// Attach generic arguments, making them part of the lookup key
    pub fn with_args(mut self, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_arg(self, arg: TypeDescriptor) -> Self {
        self.with_args([arg])
    }

    pub fn ident(&self) -> &TypeIdent {
        &self.ident
    }

    pub fn args(&self) -> &[TypeDescriptor] {
        &self.args
    }

    pub fn is_generic(&self) -> bool {
        !self.args.is_empty()
    }

    pub fn is_any(&self) -> bool {
        matches!(self.ident, TypeIdent::Any)
    }

    pub fn is_none(&self) -> bool {
        matches!(self.ident, TypeIdent::None)
    }

    /// Check whether `other` is this descriptor or appears in its generic arguments
    pub fn contains(&self, other: &TypeDescriptor) -> bool {
        self == other || self.args.iter().any(|arg| arg.contains(other))
    }

    /// Structural compatibility used by the registry scan fallback.
    ///
    /// Identifiers must match and argument lists must have the same length;
    /// each argument pair must be compatible or have `Any` on either side.
    pub fn is_assignable_to(&self, other: &TypeDescriptor) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        self.ident == other.ident
            && self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(other.args.iter())
                .all(|(left, right)| left.is_assignable_to(right))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ident {
            TypeIdent::Type { name, .. } => write!(f, "{}", name)?,
            TypeIdent::Key(key) => write!(f, "\"{}\"", key)?,
            TypeIdent::Any => write!(f, "Any")?,
            TypeIdent::None => write!(f, "None")?,
        }
        if !self.args.is_empty() {
            let args = self
                .args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "<{}>", args)?;
        }
        Ok(())
    }
}

/// Shape of a parameter annotation, interpreted by the condition chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Plain(TypeDescriptor),
    Optional(TypeDescriptor),
    Union(Vec<TypeDescriptor>),
    Collection(TypeDescriptor),
    Iterator(TypeDescriptor),
    Generic(TypeDescriptor),
    ForwardRef(TypeDescriptor),
}

impl TypeShape {
    /// Plain shape; descriptors carrying generic arguments become `Generic`
    pub fn plain(descriptor: TypeDescriptor) -> Self {
        if descriptor.is_generic() {
            TypeShape::Generic(descriptor)
        } else {
            TypeShape::Plain(descriptor)
        }
    }

    /// Union shape; a two-way union whose second alternative is `None` becomes `Optional`
    pub fn union(mut alternatives: Vec<TypeDescriptor>) -> Self {
        if alternatives.len() == 2 && alternatives[1].is_none() {
            alternatives.truncate(1);
            if let Some(inner) = alternatives.pop() {
                return TypeShape::Optional(inner);
            }
        }
        TypeShape::Union(alternatives)
    }

    /// Descriptors this shape mentions, in declaration order
    pub fn descriptors(&self) -> Vec<&TypeDescriptor> {
        match self {
            TypeShape::Union(alternatives) => alternatives.iter().collect(),
            TypeShape::Plain(d)
            | TypeShape::Optional(d)
            | TypeShape::Collection(d)
            | TypeShape::Iterator(d)
            | TypeShape::Generic(d)
            | TypeShape::ForwardRef(d) => vec![d],
        }
    }

    /// Check whether resolving this shape eagerly would need `descriptor`
    pub fn references_eagerly(&self, descriptor: &TypeDescriptor) -> bool {
        match self {
            TypeShape::ForwardRef(_) => false,
            other => other.descriptors().iter().any(|d| d.contains(descriptor)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypeShape::Plain(_) => "plain",
            TypeShape::Optional(_) => "optional",
            TypeShape::Union(_) => "union",
            TypeShape::Collection(_) => "collection",
            TypeShape::Iterator(_) => "iterator",
            TypeShape::Generic(_) => "generic",
            TypeShape::ForwardRef(_) => "forward_ref",
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Plain(d) | TypeShape::Generic(d) => write!(f, "{}", d),
            TypeShape::Optional(d) => write!(f, "Option<{}>", d),
            TypeShape::Union(alternatives) => {
                let joined = alternatives
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" | ");
                write!(f, "{}", joined)
            }
            TypeShape::Collection(d) => write!(f, "Vec<{}>", d),
            TypeShape::Iterator(d) => write!(f, "Iterator<{}>", d),
            TypeShape::ForwardRef(d) => write!(f, "ForwardRef<{}>", d),
        }
    }
}

/// One declared constructor or function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub shape: TypeShape,
}

impl Parameter {
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Single dependency of type `T`
    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::plain(TypeDescriptor::of::<T>()))
    }

    /// Single dependency bound under an explicit descriptor
    pub fn keyed(name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        Self::new(name, TypeShape::plain(descriptor))
    }

    /// Parameter without a declared type
    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Plain(TypeDescriptor::any()))
    }

    pub fn optional<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Optional(TypeDescriptor::of::<T>()))
    }

    pub fn union(name: impl Into<String>, alternatives: Vec<TypeDescriptor>) -> Self {
        Self::new(name, TypeShape::union(alternatives))
    }

    /// Every binding of `T`, in registration order
    pub fn all<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Collection(TypeDescriptor::of::<T>()))
    }

    pub fn lazy<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Iterator(TypeDescriptor::of::<T>()))
    }

    pub fn forward<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::ForwardRef(TypeDescriptor::of::<T>()))
    }
}
