//! GLSL ES types as seen by the middle-end
//!
//! Types are small value objects: a basic type, a precision, a qualifier and
//! the vector/matrix dimensions. They are `Ord` so passes can collect them
//! in ordered sets and emit synthesized helpers deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of basic types the middle-end distinguishes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BasicType {
    Void,
    Float,
    Int,
    UInt,
    Bool,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    SamplerCubeShadow,
    SamplerExternal,
    /// `yuvCscStandardEXT`, the colour-space selector of EXT_YUV_target
    YuvCscStandard,
    /// A pixel local storage handle, before lowering to an image binding
    PixelLocal,
    /// The image type pixel local storage is lowered onto
    Image2D,
}

impl BasicType {
    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            BasicType::Sampler2D
                | BasicType::Sampler3D
                | BasicType::SamplerCube
                | BasicType::SamplerCubeShadow
                | BasicType::SamplerExternal
        )
    }

    pub fn is_sampler_cube(self) -> bool {
        matches!(self, BasicType::SamplerCube | BasicType::SamplerCubeShadow)
    }

    /// Single-letter tag used in mangled names
    fn mangled_tag(self) -> &'static str {
        match self {
            BasicType::Void => "v",
            BasicType::Float => "f",
            BasicType::Int => "i",
            BasicType::UInt => "u",
            BasicType::Bool => "b",
            BasicType::Sampler2D => "s2",
            BasicType::Sampler3D => "s3",
            BasicType::SamplerCube => "sC",
            BasicType::SamplerCubeShadow => "sCs",
            BasicType::SamplerExternal => "sX",
            BasicType::YuvCscStandard => "yc",
            BasicType::PixelLocal => "pl",
            BasicType::Image2D => "im2",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Precision {
    Undefined,
    Low,
    Medium,
    High,
}

impl Precision {
    /// Suffix used when synthesizing one helper function per precision
    pub fn suffix(self) -> &'static str {
        match self {
            Precision::Undefined => "",
            Precision::Low => "lowp",
            Precision::Medium => "mediump",
            Precision::High => "highp",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Qualifier {
    Temporary,
    Global,
    Const,
    Uniform,
    ParamIn,
    ParamOut,
    ParamInOut,
}

/// A complete type: basic type plus dimensions, precision and qualifier.
///
/// `primary_size` is the scalar/vector size, or the number of rows for a
/// matrix; `secondary_size` is the number of matrix columns and 1 for
/// everything else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Type {
    pub basic: BasicType,
    pub precision: Precision,
    pub qualifier: Qualifier,
    pub primary_size: u8,
    pub secondary_size: u8,
    pub array_size: Option<u16>,
}

impl Type {
    pub fn scalar(basic: BasicType, precision: Precision) -> Self {
        Self {
            basic,
            precision,
            qualifier: Qualifier::Temporary,
            primary_size: 1,
            secondary_size: 1,
            array_size: None,
        }
    }

    pub fn vector(basic: BasicType, precision: Precision, size: u8) -> Self {
        debug_assert!((2..=4).contains(&size));
        Self {
            primary_size: size,
            ..Self::scalar(basic, precision)
        }
    }

    /// A float matrix with `cols` columns of `rows` rows
    pub fn matrix(precision: Precision, cols: u8, rows: u8) -> Self {
        debug_assert!((2..=4).contains(&cols) && (2..=4).contains(&rows));
        Self {
            primary_size: rows,
            secondary_size: cols,
            ..Self::scalar(BasicType::Float, precision)
        }
    }

    pub fn void() -> Self {
        Self::scalar(BasicType::Void, Precision::Undefined)
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_primary_size(mut self, size: u8) -> Self {
        self.primary_size = size;
        self
    }

    pub fn is_matrix(&self) -> bool {
        self.secondary_size > 1
    }

    pub fn is_vector(&self) -> bool {
        self.secondary_size == 1 && self.primary_size > 1
    }

    pub fn is_scalar(&self) -> bool {
        self.primary_size == 1 && self.secondary_size == 1
    }

    pub fn is_array(&self) -> bool {
        self.array_size.is_some()
    }

    pub fn rows(&self) -> u8 {
        self.primary_size
    }

    pub fn cols(&self) -> u8 {
        self.secondary_size
    }

    /// Vector size, or matrix rows
    pub fn nominal_size(&self) -> u8 {
        self.primary_size
    }

    /// The type produced by indexing one step into this type: a column
    /// vector for matrices, a scalar for vectors. Always high precision so
    /// synthesized helpers never lose bits.
    pub fn field_type(&self) -> Type {
        if self.is_matrix() {
            Type::vector(self.basic, Precision::High, self.primary_size)
        } else {
            Type::scalar(self.basic, Precision::High)
        }
    }

    /// Short GLSL-style name, used when naming synthesized helpers
    /// (`vec4`, `ivec3`, `mat2x4`, ...)
    pub fn short_name(&self) -> String {
        if self.is_matrix() {
            return format!("mat{}x{}", self.cols(), self.rows());
        }
        if self.is_vector() {
            let prefix = match self.basic {
                BasicType::Float => "",
                BasicType::Int => "i",
                BasicType::UInt => "u",
                BasicType::Bool => "b",
                other => unreachable!("no short vector name for {:?}", other),
            };
            return format!("{}vec{}", prefix, self.primary_size);
        }
        match self.basic {
            BasicType::Float => "float".into(),
            BasicType::Int => "int".into(),
            BasicType::UInt => "uint".into(),
            BasicType::Bool => "bool".into(),
            other => unreachable!("no short scalar name for {:?}", other),
        }
    }

    /// Tag used in mangled function names
    pub fn mangled_tag(&self) -> String {
        let mut tag = String::new();
        if self.is_matrix() {
            tag.push('m');
        } else if self.is_vector() {
            tag.push('v');
        }
        tag.push_str(self.basic.mangled_tag());
        if self.is_matrix() {
            tag.push_str(&format!("{}{}", self.cols(), self.rows()));
        } else if self.is_vector() {
            tag.push_str(&format!("{}", self.primary_size));
        }
        if let Some(size) = self.array_size {
            tag.push_str(&format!("[{}]", size));
        }
        tag
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mangled_tag())
    }
}

/// Mangle a function name with its parameter types, uniquely identifying an
/// overload: `f(vf3;u1;`
pub fn mangle_name(name: &str, params: &[Type]) -> String {
    let mut mangled = String::from(name);
    mangled.push('(');
    for param in params {
        mangled.push_str(&param.mangled_tag());
        mangled.push(';');
    }
    mangled
}

/// Recover the bare function name from a mangled one
pub fn unmangle_name(mangled: &str) -> &str {
    mangled.split('(').next().unwrap_or(mangled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let v = Type::vector(BasicType::Float, Precision::Medium, 4);
        assert!(v.is_vector() && !v.is_matrix() && !v.is_scalar());

        let m = Type::matrix(Precision::High, 2, 3);
        assert!(m.is_matrix());
        assert_eq!(m.cols(), 2);
        assert_eq!(m.rows(), 3);

        assert!(Type::scalar(BasicType::Int, Precision::High).is_scalar());
    }

    #[test]
    fn test_field_type() {
        let m = Type::matrix(Precision::Medium, 4, 3);
        let field = m.field_type();
        assert!(field.is_vector());
        assert_eq!(field.primary_size, 3);
        assert_eq!(field.precision, Precision::High);

        let v = Type::vector(BasicType::UInt, Precision::Low, 2);
        assert!(v.field_type().is_scalar());
        assert_eq!(v.field_type().basic, BasicType::UInt);
    }

    #[test]
    fn test_short_names() {
        assert_eq!(
            Type::vector(BasicType::Float, Precision::High, 4).short_name(),
            "vec4"
        );
        assert_eq!(
            Type::vector(BasicType::Int, Precision::High, 3).short_name(),
            "ivec3"
        );
        assert_eq!(Type::matrix(Precision::High, 2, 4).short_name(), "mat2x4");
    }

    #[test]
    fn test_mangling_distinguishes_overloads() {
        let f1 = mangle_name("f", &[Type::scalar(BasicType::Float, Precision::High)]);
        let f2 = mangle_name("f", &[Type::vector(BasicType::Float, Precision::High, 3)]);
        assert_ne!(f1, f2);
        assert_eq!(unmangle_name(&f1), "f");
        assert_eq!(unmangle_name(&f2), "f");
    }
}
