//! Type system and the per-module type manager.
//!
//! Types are hash-consed: the [`TypeManager`] hands out the same
//! [`Handle<Type>`] for structurally identical types, so type equality is
//! handle equality. Types never change after interning; a "modified" struct
//! is always a new struct.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::ops::{BitOr, Index};

use crate::arena::{Handle, UniqueArena};
use crate::function::PipelineStage;
use crate::io::IoAttributes;

/// Width of a scalar type in bytes.
pub type Bytes = u8;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    Bool,
    Sint,
    Uint,
    Float,
}

/// A scalar type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 4,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const U32: Self = Self {
        kind: ScalarKind::Uint,
        width: 4,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
    pub const F16: Self = Self {
        kind: ScalarKind::Float,
        width: 2,
    };

    pub fn name(self) -> &'static str {
        match (self.kind, self.width) {
            (ScalarKind::Bool, _) => "bool",
            (ScalarKind::Sint, _) => "i32",
            (ScalarKind::Uint, _) => "u32",
            (ScalarKind::Float, 2) => "f16",
            (ScalarKind::Float, _) => "f32",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self.kind, ScalarKind::Sint | ScalarKind::Uint)
    }

    pub fn is_numeric(self) -> bool {
        self.kind != ScalarKind::Bool
    }
}

/// Number of components in a vector, or columns/rows of a matrix.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum VectorSize {
    Bi = 2,
    Tri = 3,
    Quad = 4,
}

impl VectorSize {
    pub fn from_count(count: u32) -> Option<Self> {
        match count {
            2 => Some(Self::Bi),
            3 => Some(Self::Tri),
            4 => Some(Self::Quad),
            _ => None,
        }
    }

    pub fn count(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArraySize {
    Constant(u32),
    /// Runtime-sized array.
    Dynamic,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    Handle,
    Immediate,
    /// Shader-stage inputs.
    In,
    /// Shader-stage outputs.
    Out,
}

impl AddressSpace {
    pub fn name(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Private => "private",
            Self::Workgroup => "workgroup",
            Self::Uniform => "uniform",
            Self::Storage => "storage",
            Self::Handle => "handle",
            Self::Immediate => "immediate",
            Self::In => "__in",
            Self::Out => "__out",
        }
    }

    /// Whether variables in this space are bound to an external resource.
    pub fn is_resource(self) -> bool {
        matches!(self, Self::Uniform | Self::Storage | Self::Handle)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read_write",
        }
    }

    pub fn is_readable(self) -> bool {
        self != Self::Write
    }

    pub fn is_writable(self) -> bool {
        self != Self::Read
    }
}

/// Struct-level flags.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct StructFlags(u32);

impl StructFlags {
    /// The struct is the root type of a binding-backed buffer.
    pub const BLOCK: Self = Self(1 << 0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StructFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum TextureDimension {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureDimension {
    fn name(self) -> &'static str {
        match self {
            Self::D1 => "1d",
            Self::D2 => "2d",
            Self::D2Array => "2d_array",
            Self::D3 => "3d",
            Self::Cube => "cube",
            Self::CubeArray => "cube_array",
        }
    }
}

/// A member of a struct type, with its resolved layout.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Handle<Type>,
    pub index: u32,
    pub offset: u32,
    pub align: u32,
    pub size: u32,
    pub attributes: IoAttributes,
}

/// A named type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    pub name: Option<String>,
    pub inner: TypeInner,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeInner {
    Void,
    Scalar(Scalar),
    Vector {
        size: VectorSize,
        scalar: Scalar,
    },
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    Array {
        base: Handle<Type>,
        size: ArraySize,
        stride: u32,
    },
    Struct {
        members: Vec<StructMember>,
        align: u32,
        size: u32,
        size_no_padding: u32,
        flags: StructFlags,
    },
    Pointer {
        base: Handle<Type>,
        space: AddressSpace,
        access: Access,
    },
    Sampler {
        comparison: bool,
    },
    Texture {
        dim: TextureDimension,
        sampled: Scalar,
    },
    /// The type of a function used as a value (a call target).
    Function,
}

/// Input to [`TypeManager::structure_with_attributes`].
#[derive(Clone, Debug)]
pub struct MemberDesc {
    pub name: String,
    pub ty: Handle<Type>,
    pub attributes: IoAttributes,
}

impl MemberDesc {
    pub fn new(name: impl Into<String>, ty: Handle<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            attributes: IoAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: IoAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Where a struct has been used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructUsage {
    pub address_spaces: BTreeSet<AddressSpace>,
    pub stages: BTreeSet<PipelineStage>,
}

/// Rounds `value` up to the next multiple of `align`.
pub fn round_up(align: u32, value: u32) -> u32 {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Interns types for one module and answers layout queries about them.
#[derive(Clone, Debug, Default)]
pub struct TypeManager {
    arena: UniqueArena<Type>,
    usage: HashMap<Handle<Type>, StructUsage>,
}

impl Index<Handle<Type>> for TypeManager {
    type Output = Type;

    fn index(&self, handle: Handle<Type>) -> &Type {
        &self.arena[handle]
    }
}

impl TypeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns an arbitrary type.
    pub fn intern(&mut self, ty: Type) -> Handle<Type> {
        self.arena.insert(ty)
    }

    fn anonymous(&mut self, inner: TypeInner) -> Handle<Type> {
        self.intern(Type { name: None, inner })
    }

    /// Finds an already interned anonymous type without creating it.
    pub fn find(&self, inner: &TypeInner) -> Option<Handle<Type>> {
        self.arena.find(&Type {
            name: None,
            inner: inner.clone(),
        })
    }

    pub fn inner(&self, ty: Handle<Type>) -> &TypeInner {
        &self.arena[ty].inner
    }

    pub fn try_get(&self, ty: Handle<Type>) -> Option<&Type> {
        self.arena.try_get(ty)
    }

    /// Iterates over every interned type in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<Type>, &Type)> {
        self.arena.iter()
    }

    pub fn void(&mut self) -> Handle<Type> {
        self.anonymous(TypeInner::Void)
    }

    pub fn scalar(&mut self, scalar: Scalar) -> Handle<Type> {
        self.anonymous(TypeInner::Scalar(scalar))
    }

    pub fn bool(&mut self) -> Handle<Type> {
        self.scalar(Scalar::BOOL)
    }

    pub fn i32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::I32)
    }

    pub fn u32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::U32)
    }

    pub fn f32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::F32)
    }

    pub fn f16(&mut self) -> Handle<Type> {
        self.scalar(Scalar::F16)
    }

    pub fn vec(&mut self, size: VectorSize, scalar: Scalar) -> Handle<Type> {
        self.anonymous(TypeInner::Vector { size, scalar })
    }

    pub fn vec2(&mut self, scalar: Scalar) -> Handle<Type> {
        self.vec(VectorSize::Bi, scalar)
    }

    pub fn vec3(&mut self, scalar: Scalar) -> Handle<Type> {
        self.vec(VectorSize::Tri, scalar)
    }

    pub fn vec4(&mut self, scalar: Scalar) -> Handle<Type> {
        self.vec(VectorSize::Quad, scalar)
    }

    pub fn mat(&mut self, columns: VectorSize, rows: VectorSize, scalar: Scalar) -> Handle<Type> {
        self.anonymous(TypeInner::Matrix {
            columns,
            rows,
            scalar,
        })
    }

    /// `array<base, count>` with the natural element stride.
    pub fn array(&mut self, base: Handle<Type>, count: u32) -> Handle<Type> {
        let stride = self.natural_stride(base);
        self.array_with_stride(base, ArraySize::Constant(count), stride)
    }

    /// `array<base>` with the natural element stride.
    pub fn runtime_array(&mut self, base: Handle<Type>) -> Handle<Type> {
        let stride = self.natural_stride(base);
        self.array_with_stride(base, ArraySize::Dynamic, stride)
    }

    pub fn array_with_stride(
        &mut self,
        base: Handle<Type>,
        size: ArraySize,
        stride: u32,
    ) -> Handle<Type> {
        self.anonymous(TypeInner::Array { base, size, stride })
    }

    pub fn ptr(&mut self, space: AddressSpace, base: Handle<Type>, access: Access) -> Handle<Type> {
        self.anonymous(TypeInner::Pointer {
            base,
            space,
            access,
        })
    }

    pub fn sampler(&mut self) -> Handle<Type> {
        self.anonymous(TypeInner::Sampler { comparison: false })
    }

    pub fn comparison_sampler(&mut self) -> Handle<Type> {
        self.anonymous(TypeInner::Sampler { comparison: true })
    }

    pub fn texture(&mut self, dim: TextureDimension, sampled: Scalar) -> Handle<Type> {
        self.anonymous(TypeInner::Texture { dim, sampled })
    }

    pub fn function(&mut self) -> Handle<Type> {
        self.anonymous(TypeInner::Function)
    }

    /// Interns a struct with natural member layout.
    pub fn structure<S: Into<String>>(
        &mut self,
        name: &str,
        members: impl IntoIterator<Item = (S, Handle<Type>)>,
    ) -> Handle<Type> {
        let members = members
            .into_iter()
            .map(|(member, ty)| MemberDesc::new(member, ty))
            .collect();
        self.structure_with_attributes(name, members, StructFlags::empty())
    }

    /// Interns a struct with natural member layout, member attributes and
    /// struct flags.
    pub fn structure_with_attributes(
        &mut self,
        name: &str,
        members: Vec<MemberDesc>,
        flags: StructFlags,
    ) -> Handle<Type> {
        let mut offset = 0;
        let mut struct_align = 1;
        let mut laid_out = Vec::with_capacity(members.len());
        for (index, member) in members.into_iter().enumerate() {
            let align = self.align(member.ty).max(1);
            let size = self.size(member.ty);
            offset = round_up(align, offset);
            laid_out.push(StructMember {
                name: member.name,
                ty: member.ty,
                index: index as u32,
                offset,
                align,
                size,
                attributes: member.attributes,
            });
            offset += size;
            struct_align = struct_align.max(align);
        }
        let size = round_up(struct_align, offset);
        self.structure_explicit(name, laid_out, struct_align, size, offset, flags)
    }

    /// Interns a struct whose layout is supplied by the caller.
    pub fn structure_explicit(
        &mut self,
        name: &str,
        members: Vec<StructMember>,
        align: u32,
        size: u32,
        size_no_padding: u32,
        flags: StructFlags,
    ) -> Handle<Type> {
        self.intern(Type {
            name: Some(name.to_string()),
            inner: TypeInner::Struct {
                members,
                align,
                size,
                size_no_padding,
                flags,
            },
        })
    }

    pub fn record_address_space_usage(&mut self, ty: Handle<Type>, space: AddressSpace) {
        self.usage.entry(ty).or_default().address_spaces.insert(space);
    }

    pub fn record_stage_usage(&mut self, ty: Handle<Type>, stage: PipelineStage) {
        self.usage.entry(ty).or_default().stages.insert(stage);
    }

    pub fn usage(&self, ty: Handle<Type>) -> Option<&StructUsage> {
        self.usage.get(&ty)
    }

    /// Byte size of a value of type `ty`.
    pub fn size(&self, ty: Handle<Type>) -> u32 {
        match *self.inner(ty) {
            TypeInner::Scalar(scalar) => u32::from(scalar.width),
            TypeInner::Vector { size, scalar } => size.count() * u32::from(scalar.width),
            TypeInner::Matrix { columns, .. } => columns.count() * self.column_stride(ty),
            TypeInner::Array { size, stride, .. } => match size {
                ArraySize::Constant(count) => count * stride,
                ArraySize::Dynamic => stride,
            },
            TypeInner::Struct { size, .. } => size,
            _ => 0,
        }
    }

    /// Byte alignment of a value of type `ty`.
    pub fn align(&self, ty: Handle<Type>) -> u32 {
        match *self.inner(ty) {
            TypeInner::Scalar(scalar) => u32::from(scalar.width),
            TypeInner::Vector { size, scalar } => vector_align(size, scalar),
            TypeInner::Matrix { rows, scalar, .. } => vector_align(rows, scalar),
            TypeInner::Array { base, .. } => self.align(base),
            TypeInner::Struct { align, .. } => align,
            _ => 0,
        }
    }

    /// Byte distance between consecutive columns of a matrix, or zero for
    /// non-matrix types.
    pub fn column_stride(&self, ty: Handle<Type>) -> u32 {
        match *self.inner(ty) {
            TypeInner::Matrix { rows, scalar, .. } => round_up(
                vector_align(rows, scalar),
                rows.count() * u32::from(scalar.width),
            ),
            _ => 0,
        }
    }

    fn natural_stride(&self, element: Handle<Type>) -> u32 {
        round_up(self.align(element), self.size(element))
    }

    /// The column type of a matrix.
    pub fn column_type(&mut self, ty: Handle<Type>) -> Option<Handle<Type>> {
        match *self.inner(ty) {
            TypeInner::Matrix { rows, scalar, .. } => Some(self.vec(rows, scalar)),
            _ => None,
        }
    }

    /// The element type produced by indexing `ty` with `index`, or `None`
    /// if `ty` is not indexable. `index` only matters for structs.
    pub fn element(&mut self, ty: Handle<Type>, index: u32) -> Option<Handle<Type>> {
        if let Some(members) = self.members(ty) {
            return members.get(index as usize).map(|member| member.ty);
        }
        match *self.inner(ty) {
            TypeInner::Vector { scalar, .. } => Some(self.scalar(scalar)),
            TypeInner::Matrix { rows, scalar, .. } => Some(self.vec(rows, scalar)),
            TypeInner::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Number of indexable elements, `Some(None)` for runtime-sized arrays,
    /// and `None` for types that cannot be indexed.
    pub fn element_count(&self, ty: Handle<Type>) -> Option<Option<u32>> {
        match *self.inner(ty) {
            TypeInner::Vector { size, .. } => Some(Some(size.count())),
            TypeInner::Matrix { columns, .. } => Some(Some(columns.count())),
            TypeInner::Array { size, .. } => Some(match size {
                ArraySize::Constant(count) => Some(count),
                ArraySize::Dynamic => None,
            }),
            TypeInner::Struct { ref members, .. } => Some(Some(members.len() as u32)),
            _ => None,
        }
    }

    pub fn members(&self, ty: Handle<Type>) -> Option<&[StructMember]> {
        match self.inner(ty) {
            TypeInner::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    /// `(store type, address space, access)` of a pointer type.
    pub fn pointer(&self, ty: Handle<Type>) -> Option<(Handle<Type>, AddressSpace, Access)> {
        match *self.inner(ty) {
            TypeInner::Pointer {
                base,
                space,
                access,
            } => Some((base, space, access)),
            _ => None,
        }
    }

    /// The scalar of a scalar, vector or matrix type.
    pub fn scalar_of(&self, ty: Handle<Type>) -> Option<Scalar> {
        match *self.inner(ty) {
            TypeInner::Scalar(scalar)
            | TypeInner::Vector { scalar, .. }
            | TypeInner::Matrix { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    /// Number of components of a scalar (1) or vector type.
    pub fn width(&self, ty: Handle<Type>) -> Option<u32> {
        match *self.inner(ty) {
            TypeInner::Scalar(_) => Some(1),
            TypeInner::Vector { size, .. } => Some(size.count()),
            _ => None,
        }
    }

    pub fn is_void(&self, ty: Handle<Type>) -> bool {
        matches!(self.inner(ty), TypeInner::Void)
    }

    pub fn is_struct(&self, ty: Handle<Type>) -> bool {
        matches!(self.inner(ty), TypeInner::Struct { .. })
    }

    pub fn is_pointer(&self, ty: Handle<Type>) -> bool {
        matches!(self.inner(ty), TypeInner::Pointer { .. })
    }

    pub fn is_handle(&self, ty: Handle<Type>) -> bool {
        matches!(
            self.inner(ty),
            TypeInner::Sampler { .. } | TypeInner::Texture { .. }
        )
    }

    pub fn is_scalar_or_vector(&self, ty: Handle<Type>) -> bool {
        self.width(ty).is_some()
    }

    pub fn is_numeric_scalar_or_vector(&self, ty: Handle<Type>) -> bool {
        self.is_scalar_or_vector(ty) && self.scalar_of(ty).is_some_and(Scalar::is_numeric)
    }

    pub fn is_integer_scalar(&self, ty: Handle<Type>) -> bool {
        matches!(*self.inner(ty), TypeInner::Scalar(scalar) if scalar.is_integer())
    }

    pub fn is_bool_scalar_or_vector(&self, ty: Handle<Type>) -> bool {
        self.is_scalar_or_vector(ty) && self.scalar_of(ty) == Some(Scalar::BOOL)
    }

    /// Whether values of this type can be created by a `construct`.
    pub fn is_constructible(&self, ty: Handle<Type>) -> bool {
        match *self.inner(ty) {
            TypeInner::Scalar(_) | TypeInner::Vector { .. } | TypeInner::Matrix { .. } => true,
            TypeInner::Array { base, size, .. } => {
                matches!(size, ArraySize::Constant(_)) && self.is_constructible(base)
            }
            TypeInner::Struct { ref members, .. } => {
                members.iter().all(|member| self.is_constructible(member.ty))
            }
            _ => false,
        }
    }

    /// The user-facing spelling of a type, e.g. `ptr<uniform, S, read>`.
    pub fn friendly_name(&self, ty: Handle<Type>) -> String {
        let Some(entry) = self.try_get(ty) else {
            return "undef".into();
        };
        if let (Some(name), TypeInner::Struct { .. }) = (&entry.name, &entry.inner) {
            return name.clone();
        }
        let mut out = String::new();
        match entry.inner {
            TypeInner::Void => out.push_str("void"),
            TypeInner::Scalar(scalar) => out.push_str(scalar.name()),
            TypeInner::Vector { size, scalar } => {
                let _ = write!(out, "vec{}<{}>", size.count(), scalar.name());
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let _ = write!(
                    out,
                    "mat{}x{}<{}>",
                    columns.count(),
                    rows.count(),
                    scalar.name()
                );
            }
            TypeInner::Array { base, size, .. } => match size {
                ArraySize::Constant(count) => {
                    let _ = write!(out, "array<{}, {count}>", self.friendly_name(base));
                }
                ArraySize::Dynamic => {
                    let _ = write!(out, "array<{}>", self.friendly_name(base));
                }
            },
            TypeInner::Struct { .. } => out.push_str("struct"),
            TypeInner::Pointer {
                base,
                space,
                access,
            } => {
                let _ = write!(
                    out,
                    "ptr<{}, {}, {}>",
                    space.name(),
                    self.friendly_name(base),
                    access.name()
                );
            }
            TypeInner::Sampler { comparison } => {
                out.push_str(if comparison {
                    "sampler_comparison"
                } else {
                    "sampler"
                });
            }
            TypeInner::Texture { dim, sampled } => {
                let _ = write!(out, "texture_{}<{}>", dim.name(), sampled.name());
            }
            TypeInner::Function => out.push_str("<function>"),
        }
        out
    }
}

fn vector_align(size: VectorSize, scalar: Scalar) -> u32 {
    let width = u32::from(scalar.width);
    match size {
        VectorSize::Bi => 2 * width,
        VectorSize::Tri | VectorSize::Quad => 4 * width,
    }
}
