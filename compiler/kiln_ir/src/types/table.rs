//! Per-context type table.
//!
//! Structural types are interned through an `FxHashMap`, so two
//! constructions of the same type yield the same [`TypeId`] and type
//! equality is ID equality. Named structs are the exception: each call to
//! [`TypeTable::named_struct`] creates a fresh identity, and its body is
//! filled in later (at most once).
//!
//! Frequently used primitives are pre-interned at fixed indices.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::id::TypeId;

/// Storage form of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TypeData {
    Void,
    Label,
    Metadata,
    Half,
    Float,
    Double,
    X86Fp80,
    Fp128,
    PpcFp128,
    X86Mmx,
    Int(u32),
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        var_arg: bool,
    },
    /// Literal (anonymous) struct, interned structurally.
    Struct {
        elements: Vec<TypeId>,
        packed: bool,
    },
    /// Named struct, unique by identity. `body` is `None` while opaque.
    Named {
        name: String,
        body: Option<StructBody>,
    },
    Array {
        element: TypeId,
        len: u64,
    },
    Pointer {
        pointee: TypeId,
        address_space: u32,
    },
    Vector {
        element: TypeId,
        len: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StructBody {
    pub(crate) elements: Vec<TypeId>,
    pub(crate) packed: bool,
}

/// Widest supported integer type.
pub const MAX_INT_WIDTH: u32 = 128;

pub(crate) struct TypeTable {
    types: Vec<TypeData>,
    interned: FxHashMap<TypeData, TypeId>,
    named: FxHashMap<String, TypeId>,
}

impl TypeTable {
    pub(crate) const VOID: TypeId = TypeId::new(0);
    pub(crate) const LABEL: TypeId = TypeId::new(1);
    pub(crate) const METADATA: TypeId = TypeId::new(2);
    pub(crate) const HALF: TypeId = TypeId::new(3);
    pub(crate) const FLOAT: TypeId = TypeId::new(4);
    pub(crate) const DOUBLE: TypeId = TypeId::new(5);
    pub(crate) const X86_FP80: TypeId = TypeId::new(6);
    pub(crate) const FP128: TypeId = TypeId::new(7);
    pub(crate) const PPC_FP128: TypeId = TypeId::new(8);
    pub(crate) const X86_MMX: TypeId = TypeId::new(9);
    pub(crate) const I1: TypeId = TypeId::new(10);
    pub(crate) const I8: TypeId = TypeId::new(11);
    pub(crate) const I16: TypeId = TypeId::new(12);
    pub(crate) const I32: TypeId = TypeId::new(13);
    pub(crate) const I64: TypeId = TypeId::new(14);
    pub(crate) const I128: TypeId = TypeId::new(15);

    pub(crate) fn new() -> Self {
        let mut table = Self {
            types: Vec::with_capacity(64),
            interned: FxHashMap::default(),
            named: FxHashMap::default(),
        };
        // Order must match the constants above.
        let primitives = [
            TypeData::Void,
            TypeData::Label,
            TypeData::Metadata,
            TypeData::Half,
            TypeData::Float,
            TypeData::Double,
            TypeData::X86Fp80,
            TypeData::Fp128,
            TypeData::PpcFp128,
            TypeData::X86Mmx,
            TypeData::Int(1),
            TypeData::Int(8),
            TypeData::Int(16),
            TypeData::Int(32),
            TypeData::Int(64),
            TypeData::Int(128),
        ];
        for data in primitives {
            table.intern(data);
        }
        table
    }

    /// Intern a structural type. Named structs must go through
    /// [`TypeTable::named_struct`].
    pub(crate) fn intern(&mut self, data: TypeData) -> TypeId {
        debug_assert!(!matches!(data, TypeData::Named { .. }));
        if let Some(&id) = self.interned.get(&data) {
            return id;
        }
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(data.clone());
        self.interned.insert(data, id);
        id
    }

    pub(crate) fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    // ── Checked constructors ────────────────────────────────────────

    pub(crate) fn int(&mut self, width: u32) -> Result<TypeId> {
        if width == 0 || width > MAX_INT_WIDTH {
            return Err(Error::InvalidIntWidth(width));
        }
        Ok(self.intern(TypeData::Int(width)))
    }

    pub(crate) fn function(&mut self, ret: TypeId, params: &[TypeId], var_arg: bool) -> Result<TypeId> {
        if !self.is_valid_return(ret) {
            return Err(Error::invalid_type(format!(
                "`{}` is not a valid return type",
                self.display(ret)
            )));
        }
        for &param in params {
            if !self.is_first_class(param) {
                return Err(Error::invalid_type(format!(
                    "`{}` is not a valid parameter type",
                    self.display(param)
                )));
            }
        }
        Ok(self.intern(TypeData::Function {
            ret,
            params: params.to_vec(),
            var_arg,
        }))
    }

    pub(crate) fn literal_struct(&mut self, elements: &[TypeId], packed: bool) -> Result<TypeId> {
        self.check_elements(elements, "struct element")?;
        Ok(self.intern(TypeData::Struct {
            elements: elements.to_vec(),
            packed,
        }))
    }

    /// Create an opaque named struct. Names are unique per table; a taken
    /// name gets a `.N` suffix.
    pub(crate) fn named_struct(&mut self, name: &str) -> TypeId {
        let mut unique = name.to_owned();
        let mut suffix = 0u32;
        while !unique.is_empty() && self.named.contains_key(&unique) {
            suffix += 1;
            unique = format!("{name}.{suffix}");
        }
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(TypeData::Named {
            name: unique.clone(),
            body: None,
        });
        if !unique.is_empty() {
            self.named.insert(unique, id);
        }
        id
    }

    pub(crate) fn lookup_named(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    pub(crate) fn set_struct_body(&mut self, id: TypeId, elements: &[TypeId], packed: bool) -> Result<()> {
        let name = match self.get(id) {
            TypeData::Named { name, body: None } => name.clone(),
            TypeData::Named { name, body: Some(_) } => {
                return Err(Error::BodyAlreadySet(name.clone()));
            }
            _ => {
                return Err(Error::KindMismatch {
                    expected: "named struct type",
                    found: self.display(id),
                })
            }
        };
        // A struct may refer to itself only through a pointer; direct
        // containment would make it unsized.
        if elements.contains(&id) {
            return Err(Error::invalid_type(format!(
                "struct `%{name}` cannot contain itself"
            )));
        }
        self.check_elements(elements, "struct element")?;
        if let TypeData::Named { body, .. } = &mut self.types[id.index()] {
            *body = Some(StructBody {
                elements: elements.to_vec(),
                packed,
            });
        }
        Ok(())
    }

    pub(crate) fn array(&mut self, element: TypeId, len: u64) -> Result<TypeId> {
        self.check_elements(&[element], "array element")?;
        Ok(self.intern(TypeData::Array { element, len }))
    }

    pub(crate) fn pointer(&mut self, pointee: TypeId, address_space: u32) -> Result<TypeId> {
        if matches!(self.get(pointee), TypeData::Void | TypeData::Label | TypeData::Metadata) {
            return Err(Error::invalid_type(format!(
                "pointer to `{}`",
                self.display(pointee)
            )));
        }
        Ok(self.intern(TypeData::Pointer {
            pointee,
            address_space,
        }))
    }

    pub(crate) fn vector(&mut self, element: TypeId, len: u32) -> Result<TypeId> {
        if len == 0 {
            return Err(Error::invalid_type("vector length must be at least 1"));
        }
        if !(self.is_int(element) || self.is_float(element) || self.is_pointer(element)) {
            return Err(Error::invalid_type(format!(
                "`{}` is not a valid vector element",
                self.display(element)
            )));
        }
        Ok(self.intern(TypeData::Vector { element, len }))
    }

    fn check_elements(&self, elements: &[TypeId], what: &str) -> Result<()> {
        for &element in elements {
            if !self.is_first_class(element) || !self.is_sized(element) {
                return Err(Error::invalid_type(format!(
                    "`{}` is not a valid {what}",
                    self.display(element)
                )));
            }
        }
        Ok(())
    }

    // ── Predicates ──────────────────────────────────────────────────

    pub(crate) fn is_int(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeData::Int(_))
    }

    pub(crate) fn int_width(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            TypeData::Int(width) => Some(*width),
            _ => None,
        }
    }

    pub(crate) fn is_float(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            TypeData::Half
                | TypeData::Float
                | TypeData::Double
                | TypeData::X86Fp80
                | TypeData::Fp128
                | TypeData::PpcFp128
        )
    }

    pub(crate) fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeData::Pointer { .. })
    }

    pub(crate) fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            TypeData::Pointer { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    pub(crate) fn is_vector(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeData::Vector { .. })
    }

    pub(crate) fn vector_info(&self, id: TypeId) -> Option<(TypeId, u32)> {
        match self.get(id) {
            TypeData::Vector { element, len } => Some((*element, *len)),
            _ => None,
        }
    }

    /// The scalar type of `id`, looking through one vector level.
    pub(crate) fn scalar(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            TypeData::Vector { element, .. } => *element,
            _ => id,
        }
    }

    pub(crate) fn is_int_or_int_vector(&self, id: TypeId) -> bool {
        self.is_int(self.scalar(id))
    }

    pub(crate) fn is_float_or_float_vector(&self, id: TypeId) -> bool {
        self.is_float(self.scalar(id))
    }

    pub(crate) fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeData::Function { .. })
    }

    pub(crate) fn is_aggregate(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            TypeData::Struct { .. } | TypeData::Named { .. } | TypeData::Array { .. }
        )
    }

    /// Types an SSA value may have.
    pub(crate) fn is_first_class(&self, id: TypeId) -> bool {
        !matches!(
            self.get(id),
            TypeData::Void | TypeData::Function { .. } | TypeData::Metadata
        )
    }

    fn is_valid_return(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeData::Void)
            || (self.is_first_class(id) && !matches!(self.get(id), TypeData::Label))
    }

    /// Whether the type has a size. Opaque named structs, and aggregates
    /// containing them, are unsized.
    pub(crate) fn is_sized(&self, id: TypeId) -> bool {
        match self.get(id) {
            TypeData::Void | TypeData::Label | TypeData::Metadata | TypeData::Function { .. } => {
                false
            }
            TypeData::Struct { elements, .. } => elements.iter().all(|&e| self.is_sized(e)),
            TypeData::Named { body, .. } => body
                .as_ref()
                .is_some_and(|b| b.elements.iter().all(|&e| self.is_sized(e))),
            TypeData::Array { element, .. } | TypeData::Vector { element, .. } => {
                self.is_sized(*element)
            }
            _ => true,
        }
    }

    /// Struct elements, or `IncompleteType` for an opaque named struct.
    pub(crate) fn struct_body(&self, id: TypeId) -> Result<(&[TypeId], bool)> {
        match self.get(id) {
            TypeData::Struct { elements, packed } => Ok((elements, *packed)),
            TypeData::Named {
                body: Some(body), ..
            } => Ok((&body.elements, body.packed)),
            TypeData::Named { name, body: None } => Err(Error::IncompleteType(name.clone())),
            _ => Err(Error::KindMismatch {
                expected: "struct type",
                found: self.display(id),
            }),
        }
    }

    pub(crate) fn function_info(&self, id: TypeId) -> Option<(TypeId, &[TypeId], bool)> {
        match self.get(id) {
            TypeData::Function {
                ret,
                params,
                var_arg,
            } => Some((*ret, params, *var_arg)),
            _ => None,
        }
    }

    /// The element type reached by following constant aggregate indices
    /// (as used by `extractvalue`/`insertvalue`).
    pub(crate) fn indexed_type(&self, mut ty: TypeId, indices: &[u32]) -> Result<TypeId> {
        for &index in indices {
            ty = match self.get(ty) {
                TypeData::Struct { .. } | TypeData::Named { .. } => {
                    let (elements, _) = self.struct_body(ty)?;
                    *elements.get(index as usize).ok_or(Error::IndexOutOfRange {
                        index: index as usize,
                        len: elements.len(),
                    })?
                }
                TypeData::Array { element, len } => {
                    if u64::from(index) >= *len {
                        return Err(Error::IndexOutOfRange {
                            index: index as usize,
                            len: *len as usize,
                        });
                    }
                    *element
                }
                _ => {
                    return Err(Error::invalid_operand(format!(
                        "cannot index into `{}`",
                        self.display(ty)
                    )))
                }
            };
        }
        Ok(ty)
    }

    // ── Rendering ───────────────────────────────────────────────────

    /// Textual form of a type, e.g. `{ i32, [4 x i8] }*`.
    pub(crate) fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, id);
        out
    }

    pub(crate) fn write_type(&self, out: &mut String, id: TypeId) {
        match self.get(id) {
            TypeData::Void => out.push_str("void"),
            TypeData::Label => out.push_str("label"),
            TypeData::Metadata => out.push_str("metadata"),
            TypeData::Half => out.push_str("half"),
            TypeData::Float => out.push_str("float"),
            TypeData::Double => out.push_str("double"),
            TypeData::X86Fp80 => out.push_str("x86_fp80"),
            TypeData::Fp128 => out.push_str("fp128"),
            TypeData::PpcFp128 => out.push_str("ppc_fp128"),
            TypeData::X86Mmx => out.push_str("x86_mmx"),
            TypeData::Int(width) => {
                let _ = write!(out, "i{width}");
            }
            TypeData::Function {
                ret,
                params,
                var_arg,
            } => {
                self.write_type(out, *ret);
                out.push_str(" (");
                for (i, &param) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, param);
                }
                if *var_arg {
                    if !params.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                }
                out.push(')');
            }
            TypeData::Struct { elements, packed } => self.write_struct_body(out, elements, *packed),
            TypeData::Named { name, .. } => {
                if name.is_empty() {
                    let _ = write!(out, "%{}", id.index());
                } else {
                    let _ = write!(out, "%{name}");
                }
            }
            TypeData::Array { element, len } => {
                let _ = write!(out, "[{len} x ");
                self.write_type(out, *element);
                out.push(']');
            }
            TypeData::Pointer {
                pointee,
                address_space,
            } => {
                self.write_type(out, *pointee);
                if *address_space != 0 {
                    let _ = write!(out, " addrspace({address_space})");
                }
                out.push('*');
            }
            TypeData::Vector { element, len } => {
                let _ = write!(out, "<{len} x ");
                self.write_type(out, *element);
                out.push('>');
            }
        }
    }

    pub(crate) fn write_struct_body(&self, out: &mut String, elements: &[TypeId], packed: bool) {
        if packed {
            out.push('<');
        }
        if elements.is_empty() {
            out.push_str("{}");
        } else {
            out.push_str("{ ");
            for (i, &element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.write_type(out, element);
            }
            out.push_str(" }");
        }
        if packed {
            out.push('>');
        }
    }

    /// Named structs in creation order, for printing type definitions.
    pub(crate) fn named_structs(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, data)| matches!(data, TypeData::Named { .. }))
            .map(|(index, _)| TypeId::new(index as u32))
    }
}
