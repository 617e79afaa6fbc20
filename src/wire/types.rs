//! Variable schema model: a named, typed scalar or up-to-3-dimensional
//! array whose dimensions may themselves be named other variables in the
//! same schema, resolved at runtime as values arrive rather than wired up
//! with back pointers.

use std::collections::BTreeMap;

use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    ArraySize,
}

impl BaseType {
    /// Size in bytes of one element of this type on the wire. `ArraySize`
    /// is always carried as a `u32` dimension value.
    pub fn element_size(self) -> usize {
        match self {
            BaseType::U8 | BaseType::I8 => 1,
            BaseType::U16 | BaseType::I16 => 2,
            BaseType::U32 | BaseType::I32 | BaseType::F32 | BaseType::ArraySize => 4,
            BaseType::U64 | BaseType::I64 | BaseType::F64 => 8,
        }
    }

    pub fn to_wire_tag(self) -> u8 {
        match self {
            BaseType::U8 => 0,
            BaseType::U16 => 1,
            BaseType::U32 => 2,
            BaseType::U64 => 3,
            BaseType::I8 => 4,
            BaseType::I16 => 5,
            BaseType::I32 => 6,
            BaseType::I64 => 7,
            BaseType::F32 => 8,
            BaseType::F64 => 9,
            BaseType::ArraySize => 10,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => BaseType::U8,
            1 => BaseType::U16,
            2 => BaseType::U32,
            3 => BaseType::U64,
            4 => BaseType::I8,
            5 => BaseType::I16,
            6 => BaseType::I32,
            7 => BaseType::I64,
            8 => BaseType::F32,
            9 => BaseType::F64,
            10 => BaseType::ArraySize,
            other => {
                return Err(StreamError::SchemaDecode(format!(
                    "unknown base type tag {other}"
                )))
            }
        })
    }
}

/// A defined variable, scalar (`dims == 0`) or an up-to-3-dimensional
/// array whose per-dimension size/local-size/local-offset are themselves
/// named `ArraySize` variables in the same schema.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub base_type: BaseType,
    pub dims: u32,
    /// Names of the variables holding this variable's global size per
    /// dimension (empty for a scalar).
    pub gs_names: Vec<String>,
    /// Names of the variables holding this variable's local size per
    /// dimension.
    pub ls_names: Vec<String>,
    /// Names of the variables holding this variable's local offset per
    /// dimension.
    pub lo_names: Vec<String>,
    /// Resolved global size per dimension, filled in as the named
    /// `ArraySize` variables are received.
    pub g_size: Vec<u32>,
    /// Resolved local size per dimension.
    pub l_size: Vec<u32>,
    /// Resolved local offset per dimension.
    pub l_offset: Vec<u32>,
    /// Total element count of the current local array, 0 until every
    /// `l_size[k] > 0`. Always 1 for a scalar.
    pub length: u64,
    /// Current value bytes, `element_size * length` long once sized.
    pub value_buf: Vec<u8>,
    /// Producer-side dirty flag: set by `set_value`, cleared after the
    /// variable is written into a frame.
    pub updated: bool,
}

impl Variable {
    pub fn element_size(&self) -> usize {
        self.base_type.element_size()
    }

    pub fn new_scalar(name: impl Into<String>, base_type: BaseType) -> Self {
        Self {
            name: name.into(),
            base_type,
            dims: 0,
            gs_names: Vec::new(),
            ls_names: Vec::new(),
            lo_names: Vec::new(),
            g_size: Vec::new(),
            l_size: Vec::new(),
            l_offset: Vec::new(),
            length: 1,
            value_buf: vec![0u8; base_type.element_size()],
            updated: false,
        }
    }

    pub fn new_array(
        name: impl Into<String>,
        base_type: BaseType,
        gs_names: Vec<String>,
        ls_names: Vec<String>,
        lo_names: Vec<String>,
    ) -> Result<Self> {
        let dims = gs_names.len() as u32;
        let name = name.into();
        if ls_names.len() != dims as usize || lo_names.len() != dims as usize {
            return Err(StreamError::VariableDimsMismatch(name));
        }
        if dims == 0 || dims > 3 {
            return Err(StreamError::InvalidSelectionDims(dims));
        }
        Ok(Self {
            name,
            base_type,
            dims,
            g_size: vec![0; dims as usize],
            l_size: vec![0; dims as usize],
            l_offset: vec![0; dims as usize],
            gs_names,
            ls_names,
            lo_names,
            length: 0,
            value_buf: Vec::new(),
            updated: false,
        })
    }

    pub fn is_array(&self) -> bool {
        self.dims > 0
    }

    pub fn is_sized(&self) -> bool {
        !self.is_array() || self.l_size.iter().all(|&s| s > 0)
    }

    /// Recomputes `length` from the currently resolved `l_size`, and
    /// resizes `value_buf` to match. A no-op for scalars.
    pub fn recompute_length(&mut self) {
        if !self.is_array() {
            return;
        }
        if self.is_sized() {
            self.length = self.l_size.iter().map(|&s| s as u64).product();
            self.value_buf = vec![0u8; self.element_size() * self.length as usize];
        } else {
            self.length = 0;
            self.value_buf.clear();
        }
    }

    /// Sets this variable's raw value bytes, marking it dirty. The caller
    /// is responsible for matching `bytes.len()` to `element_size *
    /// length` (scalars) or the current array sizing.
    pub fn set_value_bytes(&mut self, bytes: &[u8]) {
        self.value_buf.clear();
        self.value_buf.extend_from_slice(bytes);
        self.updated = true;
    }

    /// If this variable is one of an array's `ArraySize` dimension
    /// dependencies, applies `value` at dimension index `k` and
    /// recomputes `length`/`value_buf`. Called each time a named value
    /// for a dependency is received.
    pub fn apply_g_size(&mut self, dim: usize, value: u32) {
        if dim < self.g_size.len() {
            self.g_size[dim] = value;
        }
    }

    pub fn apply_l_size(&mut self, dim: usize, value: u32) {
        if dim < self.l_size.len() {
            self.l_size[dim] = value;
        }
        self.recompute_length();
    }

    pub fn apply_l_offset(&mut self, dim: usize, value: u32) {
        if dim < self.l_offset.len() {
            self.l_offset[dim] = value;
        }
    }
}

/// If `changed` is one of an array variable's `ArraySize` dimension
/// dependencies, applies its current value at that dimension and
/// recomputes the dependent variable's `length`/`value_buf`. Shared by
/// a local `set_value` on an `ArraySize` variable and an incoming frame
/// value for one, since both follow the same dependency resolution.
pub fn propagate_array_size_dependency(vars: &mut BTreeMap<String, Variable>, changed: &str) {
    let Some(changed_var) = vars.get(changed) else {
        return;
    };
    if changed_var.base_type != BaseType::ArraySize || changed_var.value_buf.len() != 4 {
        return;
    }
    let value = u32::from_ne_bytes(changed_var.value_buf[0..4].try_into().unwrap());

    for var in vars.values_mut() {
        if let Some(dim) = var.gs_names.iter().position(|n| n == changed) {
            var.apply_g_size(dim, value);
        }
        if let Some(dim) = var.ls_names.iter().position(|n| n == changed) {
            var.apply_l_size(dim, value);
        }
        if let Some(dim) = var.lo_names.iter().position(|n| n == changed) {
            var.apply_l_offset(dim, value);
        }
    }
}
