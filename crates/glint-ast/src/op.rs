//! Operator and constant definitions
//!
//! These are closed sets: passes match exhaustively over them, and an
//! operator the middle-end does not know about is a front-end bug.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    Dfdx,
    Dfdy,
    Fwidth,
}

impl UnaryOp {
    /// Derivative operators are only well-defined in uniform control flow
    pub fn is_gradient(self) -> bool {
        matches!(self, UnaryOp::Dfdx | UnaryOp::Dfdy | UnaryOp::Fwidth)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BinaryOp {
    Comma,
    Add,
    Sub,
    Mul,
    Div,
    MatrixTimesVector,
    /// Indexing with a compile-time constant index
    IndexDirect,
    /// Indexing with a runtime index
    IndexIndirect,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
        )
    }

    pub fn is_compound_assignment(self) -> bool {
        self.is_assignment() && self != BinaryOp::Assign
    }

    /// The arithmetic operator a compound assignment applies
    pub fn compound_base(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            _ => None,
        }
    }
}

/// Builtin functions the middle-end recognizes by operator rather than by
/// name. Everything else a shader calls is either user-defined (recorded in
/// the call graph) or irrelevant to the passes in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinOp {
    // Implicit-derivative texture sampling
    Texture2D,
    Texture2DProj,
    TextureCube,
    // Explicit-gradient sampling
    TextureGrad,
    TextureCubeGradExt,
    Abs,
    Max,
    Min,
    // EXT_YUV_target colour conversions
    Yuv2Rgb,
    Rgb2Yuv,
    // Pixel local storage, before and after lowering
    PixelLocalLoad,
    PixelLocalStore,
    ImageLoad,
    ImageStore,
    MemoryBarrierImage,
}

impl BuiltinOp {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinOp::Texture2D => "texture2D",
            BuiltinOp::Texture2DProj => "texture2DProj",
            BuiltinOp::TextureCube => "textureCube",
            BuiltinOp::TextureGrad => "textureGrad",
            BuiltinOp::TextureCubeGradExt => "textureCubeGradEXT",
            BuiltinOp::Abs => "abs",
            BuiltinOp::Max => "max",
            BuiltinOp::Min => "min",
            BuiltinOp::Yuv2Rgb => "yuv_2_rgb",
            BuiltinOp::Rgb2Yuv => "rgb_2_yuv",
            BuiltinOp::PixelLocalLoad => "pixelLocalLoad",
            BuiltinOp::PixelLocalStore => "pixelLocalStore",
            BuiltinOp::ImageLoad => "imageLoad",
            BuiltinOp::ImageStore => "imageStore",
            BuiltinOp::MemoryBarrierImage => "memoryBarrierImage",
        }
    }

    /// Sampling that computes derivatives implicitly counts as a gradient
    /// operation for the whole-program analysis
    pub fn has_implicit_gradient(self) -> bool {
        matches!(
            self,
            BuiltinOp::Texture2D | BuiltinOp::Texture2DProj | BuiltinOp::TextureCube
        )
    }

    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            BuiltinOp::PixelLocalStore | BuiltinOp::ImageStore | BuiltinOp::MemoryBarrierImage
        )
    }
}

/// The EXT_YUV_target conversion standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YuvCscStandard {
    Itu601,
    Itu601FullRange,
    Itu709,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Yuv(YuvCscStandard),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    Return,
    Break,
    Continue,
    Discard,
}
