//! Stage, direction and type requirements of builtin values.

use stria_ir::{ArraySize, BuiltinValue, Handle, PipelineStage, Scalar, Type, TypeInner, VectorSize};

use super::shader_io::Direction;
use super::{Capability, Validator};

use PipelineStage::{Compute, Fragment, Vertex};

/// The expected type of a builtin, with the article used in messages.
#[derive(Clone, Copy)]
enum Expected {
    F32,
    Bool,
    U32,
    Vec3U32,
}

impl Expected {
    fn describe(self) -> &'static str {
        match self {
            Self::F32 => "a f32",
            Self::Bool => "a bool",
            Self::U32 => "an u32",
            Self::Vec3U32 => "an vec3<u32>",
        }
    }

    fn matches(self, inner: &TypeInner) -> bool {
        match self {
            Self::F32 => *inner == TypeInner::Scalar(Scalar::F32),
            Self::Bool => *inner == TypeInner::Scalar(Scalar::BOOL),
            Self::U32 => *inner == TypeInner::Scalar(Scalar::U32),
            Self::Vec3U32 => {
                *inner
                    == TypeInner::Vector {
                        size: VectorSize::Tri,
                        scalar: Scalar::U32,
                    }
            }
        }
    }
}

const COMPUTE: &[PipelineStage] = &[Compute];
const FRAGMENT: &[PipelineStage] = &[Fragment];
const VERTEX: &[PipelineStage] = &[Vertex];
const COMPUTE_OR_FRAGMENT: &[PipelineStage] = &[Compute, Fragment];

/// The common shape of most builtins: the stages that may use it, the one
/// direction it flows in, and its type.
fn rule(builtin: BuiltinValue) -> Option<(&'static [PipelineStage], Direction, Expected)> {
    use BuiltinValue as B;
    use Direction::{Input, Output};
    Some(match builtin {
        B::PointSize | B::InternalPointSize => (VERTEX, Output, Expected::F32),
        B::FragDepth => (FRAGMENT, Output, Expected::F32),
        B::FrontFacing => (FRAGMENT, Input, Expected::Bool),
        B::GlobalInvocationId | B::LocalInvocationId | B::NumWorkgroups | B::WorkgroupId => {
            (COMPUTE, Input, Expected::Vec3U32)
        }
        B::InstanceIndex | B::VertexIndex => (VERTEX, Input, Expected::U32),
        B::LocalInvocationIndex | B::SubgroupId | B::NumSubgroups => (COMPUTE, Input, Expected::U32),
        B::SampleIndex => (FRAGMENT, Input, Expected::U32),
        B::SubgroupInvocationId | B::SubgroupSize => (COMPUTE_OR_FRAGMENT, Input, Expected::U32),
        B::Position | B::SampleMask | B::ClipDistances => return None,
    })
}

impl Validator<'_> {
    /// The first rule `builtin` breaks when used as an entry point `dir`
    /// value of type `ty` in `stage`.
    pub(super) fn builtin_error(
        &self,
        builtin: BuiltinValue,
        stage: PipelineStage,
        dir: Direction,
        ty: Handle<Type>,
    ) -> Option<String> {
        let name = builtin.name();
        let inner = self.types.inner(ty);
        match builtin {
            BuiltinValue::Position => {
                if !matches!(stage, Fragment | Vertex) {
                    return Some(format!("{name} must be used in a fragment or vertex shader entry point"));
                }
                if stage == Vertex && dir == Direction::Input {
                    return Some(format!("{name} must be an output for a vertex entry point"));
                }
                if stage == Fragment && dir == Direction::Output {
                    return Some(format!("{name} must be an input for a fragment entry point"));
                }
                let vec4f = TypeInner::Vector {
                    size: VectorSize::Quad,
                    scalar: Scalar::F32,
                };
                (*inner != vec4f).then(|| format!("{name} must be an vec4<f32>"))
            }
            BuiltinValue::SampleMask => {
                if stage != Fragment {
                    return Some(format!("{name} must be used in a fragment entry point"));
                }
                (!Expected::U32.matches(inner)).then(|| format!("{name} must be an u32"))
            }
            BuiltinValue::ClipDistances => {
                if stage != Vertex {
                    return Some(format!("{name} must be used in a vertex shader entry point"));
                }
                if dir != Direction::Output {
                    return Some(format!("{name} must be an output of a shader entry point"));
                }
                let allow_f32 = self.capabilities.contains(Capability::AllowClipDistancesOnF32);
                let valid = match *inner {
                    TypeInner::Array {
                        base,
                        size: ArraySize::Constant(count),
                        ..
                    } => count <= 8 && Expected::F32.matches(self.types.inner(base)),
                    _ => allow_f32 && Expected::F32.matches(inner),
                };
                if valid {
                    None
                } else if allow_f32 {
                    Some(format!("{name} must be an f32 or an array<f32, N>, where N <= 8"))
                } else {
                    Some(format!("{name} must be an array<f32, N>, where N <= 8"))
                }
            }
            _ => {
                if builtin == BuiltinValue::PointSize
                    && !self.capabilities.contains(Capability::AllowPointSizeBuiltin)
                {
                    return Some(format!(
                        "use of {name} requires the '{}' capability",
                        Capability::AllowPointSizeBuiltin
                    ));
                }
                let (stages, direction, expected) = rule(builtin)?;
                if !stages.contains(&stage) {
                    let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
                    return Some(format!(
                        "{name} must be used in a {} shader entry point",
                        names.join(" or ")
                    ));
                }
                if dir != direction {
                    return Some(format!(
                        "{name} must be an {} of a shader entry point",
                        direction.name()
                    ));
                }
                (!expected.matches(inner)).then(|| format!("{name} must be {}", expected.describe()))
            }
        }
    }
}
