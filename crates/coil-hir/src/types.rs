//! Type system with size and alignment layout.
//!
//! Layouts are fixed-size and fixed-alignment; the binder computes them
//! once and lowering consumes them read-only.

#![allow(missing_docs)]

use coil_ir::{IrType, ValueShape};
use smol_str::SmolStr;

/// Interned type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// IEC 61131-3 elementary types with fixed widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    SInt,
    Int,
    DInt,
    LInt,
    USInt,
    UInt,
    UDInt,
    ULInt,
    Byte,
    Word,
    DWord,
    LWord,
    Real,
    LReal,
}

impl ScalarType {
    pub const ALL: [ScalarType; 15] = [
        ScalarType::Bool,
        ScalarType::SInt,
        ScalarType::Int,
        ScalarType::DInt,
        ScalarType::LInt,
        ScalarType::USInt,
        ScalarType::UInt,
        ScalarType::UDInt,
        ScalarType::ULInt,
        ScalarType::Byte,
        ScalarType::Word,
        ScalarType::DWord,
        ScalarType::LWord,
        ScalarType::Real,
        ScalarType::LReal,
    ];

    #[must_use]
    pub const fn byte_size(self) -> u16 {
        match self {
            ScalarType::Bool | ScalarType::SInt | ScalarType::USInt | ScalarType::Byte => 1,
            ScalarType::Int | ScalarType::UInt | ScalarType::Word => 2,
            ScalarType::DInt | ScalarType::UDInt | ScalarType::DWord | ScalarType::Real => 4,
            ScalarType::LInt | ScalarType::ULInt | ScalarType::LWord | ScalarType::LReal => 8,
        }
    }

    #[must_use]
    pub const fn ir_type(self) -> IrType {
        match self.byte_size() {
            1 => IrType::Byte,
            2 => IrType::Word,
            4 => IrType::DWord,
            _ => IrType::LWord,
        }
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarType::SInt | ScalarType::Int | ScalarType::DInt | ScalarType::LInt
        )
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::Real | ScalarType::LReal)
    }

    /// IEC type name, used as the suffix of builtin callee names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "BOOL",
            ScalarType::SInt => "SINT",
            ScalarType::Int => "INT",
            ScalarType::DInt => "DINT",
            ScalarType::LInt => "LINT",
            ScalarType::USInt => "USINT",
            ScalarType::UInt => "UINT",
            ScalarType::UDInt => "UDINT",
            ScalarType::ULInt => "ULINT",
            ScalarType::Byte => "BYTE",
            ScalarType::Word => "WORD",
            ScalarType::DWord => "DWORD",
            ScalarType::LWord => "LWORD",
            ScalarType::Real => "REAL",
            ScalarType::LReal => "LREAL",
        }
    }
}

/// One field of a struct layout, offset already assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: SmolStr,
    pub ty: TypeId,
    pub offset: u16,
}

/// Bound type with its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Scalar(ScalarType),
    Pointer { target: TypeId },
    Array {
        element: TypeId,
        lower: i32,
        upper: i32,
    },
    Struct {
        name: SmolStr,
        fields: Vec<StructField>,
        size: u16,
        align: u16,
    },
}

/// Registry of interned types. Scalars are pre-seeded.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<Type>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: ScalarType::ALL.iter().map(|&s| Type::Scalar(s)).collect(),
        }
    }

    /// Id of a pre-seeded scalar type.
    #[must_use]
    pub fn scalar(&self, scalar: ScalarType) -> TypeId {
        let index = ScalarType::ALL
            .iter()
            .position(|&s| s == scalar)
            .unwrap_or_default();
        TypeId(index as u32)
    }

    pub fn add_pointer(&mut self, target: TypeId) -> TypeId {
        self.add(Type::Pointer { target })
    }

    pub fn add_array(&mut self, element: TypeId, lower: i32, upper: i32) -> TypeId {
        self.add(Type::Array {
            element,
            lower,
            upper,
        })
    }

    /// Add a struct, computing field offsets with natural alignment.
    pub fn add_struct(
        &mut self,
        name: impl Into<SmolStr>,
        fields: Vec<(SmolStr, TypeId)>,
    ) -> TypeId {
        let mut laid_out = Vec::with_capacity(fields.len());
        let mut cursor: u16 = 0;
        let mut align: u16 = 1;
        for (field_name, ty) in fields {
            let field_align = self.align_of(ty);
            align = align.max(field_align);
            cursor = align_up(cursor, field_align);
            laid_out.push(StructField {
                name: field_name,
                ty,
                offset: cursor,
            });
            cursor += self.size_of(ty);
        }
        let size = align_up(cursor, align);
        self.add(Type::Struct {
            name: name.into(),
            fields: laid_out,
            size,
            align,
        })
    }

    fn add(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    #[must_use]
    pub fn size_of(&self, id: TypeId) -> u16 {
        match self.get(id) {
            Type::Scalar(scalar) => scalar.byte_size(),
            Type::Pointer { .. } => IrType::POINTER.byte_size(),
            Type::Array {
                element,
                lower,
                upper,
            } => {
                let count = (upper - lower + 1).max(0) as u16;
                self.size_of(*element) * count
            }
            Type::Struct { size, .. } => *size,
        }
    }

    #[must_use]
    pub fn align_of(&self, id: TypeId) -> u16 {
        match self.get(id) {
            Type::Scalar(scalar) => scalar.byte_size(),
            Type::Pointer { .. } => IrType::POINTER.byte_size(),
            Type::Array { element, .. } => self.align_of(*element),
            Type::Struct { align, .. } => *align,
        }
    }

    /// Scalar classification, if the type is elementary.
    #[must_use]
    pub fn as_scalar(&self, id: TypeId) -> Option<ScalarType> {
        match self.get(id) {
            Type::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    /// Whether values of this type fit in a single IR slot.
    #[must_use]
    pub fn is_slot_sized(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Scalar(_) | Type::Pointer { .. })
    }

    /// IR width of a slot-sized type.
    #[must_use]
    pub fn ir_type(&self, id: TypeId) -> Option<IrType> {
        match self.get(id) {
            Type::Scalar(scalar) => Some(scalar.ir_type()),
            Type::Pointer { .. } => Some(IrType::POINTER),
            _ => None,
        }
    }

    /// Shape descriptor for debug-table entries.
    #[must_use]
    pub fn value_shape(&self, id: TypeId) -> ValueShape {
        match self.get(id) {
            Type::Scalar(ScalarType::Bool) => ValueShape::Bool,
            Type::Scalar(scalar) => ValueShape::Scalar {
                bytes: scalar.byte_size() as u8,
                signed: scalar.is_signed(),
                float: scalar.is_float(),
            },
            Type::Pointer { .. } => ValueShape::Pointer,
            Type::Array {
                element,
                lower,
                upper,
            } => ValueShape::Array {
                element: Box::new(self.value_shape(*element)),
                lower: *lower,
                upper: *upper,
            },
            Type::Struct { fields, .. } => ValueShape::Struct {
                fields: fields
                    .iter()
                    .map(|field| coil_ir::pou::ShapeField {
                        name: field.name.clone(),
                        offset: field.offset,
                        shape: self.value_shape(field.ty),
                    })
                    .collect(),
            },
        }
    }
}

pub(crate) fn align_up(value: u16, align: u16) -> u16 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}
