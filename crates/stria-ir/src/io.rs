//! Shader interface annotations carried by parameters, return values,
//! struct members and IO variables.

use std::fmt;

/// Builtin values that a shader can read or write.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum BuiltinValue {
    Position,
    VertexIndex,
    InstanceIndex,
    FrontFacing,
    SampleIndex,
    SampleMask,
    FragDepth,
    LocalInvocationId,
    LocalInvocationIndex,
    GlobalInvocationId,
    WorkgroupId,
    NumWorkgroups,
    SubgroupId,
    SubgroupSize,
    SubgroupInvocationId,
    NumSubgroups,
    ClipDistances,
    /// The user-facing `point_size`, gated behind a capability.
    PointSize,
    /// The compiler-internal `__point_size`.
    InternalPointSize,
}

impl BuiltinValue {
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::VertexIndex => "vertex_index",
            Self::InstanceIndex => "instance_index",
            Self::FrontFacing => "front_facing",
            Self::SampleIndex => "sample_index",
            Self::SampleMask => "sample_mask",
            Self::FragDepth => "frag_depth",
            Self::LocalInvocationId => "local_invocation_id",
            Self::LocalInvocationIndex => "local_invocation_index",
            Self::GlobalInvocationId => "global_invocation_id",
            Self::WorkgroupId => "workgroup_id",
            Self::NumWorkgroups => "num_workgroups",
            Self::SubgroupId => "subgroup_id",
            Self::SubgroupSize => "subgroup_size",
            Self::SubgroupInvocationId => "subgroup_invocation_id",
            Self::NumSubgroups => "num_subgroups",
            Self::ClipDistances => "clip_distances",
            Self::PointSize => "point_size",
            Self::InternalPointSize => "__point_size",
        }
    }
}

impl fmt::Display for BuiltinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum InterpolationType {
    Perspective,
    Linear,
    Flat,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum InterpolationSampling {
    Center,
    Centroid,
    Sample,
    First,
    Either,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Interpolation {
    pub ty: InterpolationType,
    pub sampling: Option<InterpolationSampling>,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = match self.ty {
            InterpolationType::Perspective => "perspective",
            InterpolationType::Linear => "linear",
            InterpolationType::Flat => "flat",
        };
        match self.sampling {
            None => write!(f, "@interpolate({ty})"),
            Some(sampling) => {
                let sampling = match sampling {
                    InterpolationSampling::Center => "center",
                    InterpolationSampling::Centroid => "centroid",
                    InterpolationSampling::Sample => "sample",
                    InterpolationSampling::First => "first",
                    InterpolationSampling::Either => "either",
                };
                write!(f, "@interpolate({ty}, {sampling})")
            }
        }
    }
}

/// A resource binding: `@group(group) @binding(binding)`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

impl BindingPoint {
    pub const fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

/// The bag of interface attributes a value may carry.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct IoAttributes {
    pub location: Option<u32>,
    pub blend_src: Option<u32>,
    pub color: Option<u32>,
    pub builtin: Option<BuiltinValue>,
    pub interpolation: Option<Interpolation>,
    pub invariant: bool,
    pub input_attachment_index: Option<u32>,
}

impl IoAttributes {
    pub fn location(location: u32) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    pub fn builtin(builtin: BuiltinValue) -> Self {
        Self {
            builtin: Some(builtin),
            ..Self::default()
        }
    }

    pub fn color(color: u32) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn with_blend_src(mut self, blend_src: u32) -> Self {
        self.blend_src = Some(blend_src);
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = Some(interpolation);
        self
    }

    pub fn with_invariant(mut self) -> Self {
        self.invariant = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Renders the attributes as a comma separated list, in declaration order.
    pub fn to_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(location) = self.location {
            out.push(format!("@location({location})"));
        }
        if let Some(blend_src) = self.blend_src {
            out.push(format!("@blend_src({blend_src})"));
        }
        if let Some(color) = self.color {
            out.push(format!("@color({color})"));
        }
        if let Some(builtin) = self.builtin {
            out.push(format!("@builtin({builtin})"));
        }
        if let Some(interpolation) = self.interpolation {
            out.push(interpolation.to_string());
        }
        if self.invariant {
            out.push("@invariant".into());
        }
        if let Some(index) = self.input_attachment_index {
            out.push(format!("@input_attachment_index({index})"));
        }
        out
    }
}
