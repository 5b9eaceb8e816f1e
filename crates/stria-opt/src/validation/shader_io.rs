//! Entry point interface rules: parameters, return values and the `__in`
//! and `__out` variables an entry point references.

use std::collections::HashMap;

use stria_ir::{
    AddressSpace, BindingPoint, BuiltinValue, Function, Handle, InstKind, Instruction,
    IoAttributes, PipelineStage, Scalar, StructMember, Type, TypeInner, Value, ValueKind,
};

use super::{Capability, Validator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Direction {
    Input,
    Output,
}

impl Direction {
    pub(super) fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Where an interface value is declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Site {
    Param(Handle<Value>),
    Return(Handle<Function>),
    Var(Handle<Instruction>),
}

/// One interface value of an entry point.
struct IoValue<'a> {
    site: Site,
    dir: Direction,
    ty: Handle<Type>,
    attributes: &'a IoAttributes,
    binding_point: Option<BindingPoint>,
}

impl IoValue<'_> {
    fn label(&self) -> &'static str {
        match (self.site, self.dir) {
            (Site::Param(_), _) => "input param",
            (Site::Return(_), _) => "return value",
            (Site::Var(_), Direction::Input) => "input var",
            (Site::Var(_), Direction::Output) => "output var",
        }
    }
}

/// Locations claimed so far, per direction.
#[derive(Default)]
struct Locations {
    inputs: HashMap<u32, Site>,
    outputs: HashMap<u32, Site>,
}

fn annotations(attributes: &IoAttributes, binding_point: Option<BindingPoint>) -> Vec<&'static str> {
    let mut out = Vec::new();
    if attributes.location.is_some() {
        out.push("@location");
    }
    if attributes.builtin.is_some() {
        out.push("built-in");
    }
    if attributes.color.is_some() {
        out.push("@color");
    }
    if binding_point.is_some() {
        out.push("binding point");
    }
    out
}

impl Validator<'_> {
    pub(super) fn check_shader_io(&mut self, function: Handle<Function>, stage: PipelineStage) {
        let module = self.module;
        let func = module.function(function);
        let mut locations = Locations::default();

        for &param in func.params() {
            let value = module.value(param);
            let (ValueKind::FunctionParam {
                attributes,
                binding_point,
                ..
            }, Some(ty)) = (value.kind(), value.ty())
            else {
                continue;
            };
            let io = IoValue {
                site: Site::Param(param),
                dir: Direction::Input,
                ty,
                attributes,
                binding_point: *binding_point,
            };
            self.check_io_value(stage, &io, &mut locations);
        }

        if self.types.is_void(func.return_type) {
            if !func.return_attributes.is_empty() {
                self.function_error(function, "return value with void type should never be annotated");
            }
        } else {
            let io = IoValue {
                site: Site::Return(function),
                dir: Direction::Output,
                ty: func.return_type,
                attributes: &func.return_attributes,
                binding_point: None,
            };
            self.check_io_value(stage, &io, &mut locations);
        }

        for var in self.call_graph.referenced_io_vars(function) {
            let instruction = module.instruction(var);
            let InstKind::Var(info) = &instruction.kind else {
                continue;
            };
            let view = instruction
                .result()
                .and_then(|v| module.value_type(v))
                .and_then(|ty| self.types.pointer(ty));
            let (store, dir) = match view {
                Some((store, AddressSpace::In, _)) => (store, Direction::Input),
                Some((store, AddressSpace::Out, _)) => (store, Direction::Output),
                _ => continue,
            };
            let io = IoValue {
                site: Site::Var(var),
                dir,
                ty: store,
                attributes: &info.attributes,
                binding_point: info.binding_point,
            };
            self.check_io_value(stage, &io, &mut locations);
        }
    }

    fn check_io_value(&mut self, stage: PipelineStage, io: &IoValue<'_>, locations: &mut Locations) {
        if let Site::Param(_) = io.site {
            if let Some((_, AddressSpace::Workgroup, _)) = self.types.pointer(io.ty) {
                self.io_error(
                    io.site,
                    "input param to entry point cannot be a ptr in the 'workgroup' address space",
                );
                return;
            }
        }

        if !self.capabilities.contains(Capability::LoosenValidationForShaderIo) {
            self.check_annotation_count(io);
        }

        self.check_io_attributes(stage, io, io.ty, io.attributes, false);

        let members = self.types.members(io.ty).map(<[StructMember]>::to_vec);
        if let Some(members) = &members {
            for member in members {
                self.check_io_attributes(stage, io, member.ty, &member.attributes, true);
            }
            self.check_blend_src_struct(stage, io, members);
        }

        self.record_locations(io, members.as_deref(), locations);
    }

    /// Every interface value needs exactly one kind of annotation, either on
    /// itself or on each member of its struct type.
    fn check_annotation_count(&mut self, io: &IoValue<'_>) {
        let label = io.label();
        let top = annotations(io.attributes, io.binding_point);
        if top.len() > 1 {
            let message = format!("{label} has more than one IO annotation, [ {} ]", top.join(", "));
            self.io_error(io.site, message);
            return;
        }

        let Some(members) = self.types.members(io.ty).map(<[StructMember]>::to_vec) else {
            if top.is_empty() {
                let message = format!(
                    "{label} must have at least one IO annotation, e.g. a binding point, a location, etc"
                );
                self.io_error(io.site, message);
            }
            return;
        };

        for member in &members {
            let own = annotations(&member.attributes, None);
            if let Some(shared) = top.first().copied().filter(|t| own.contains(t)) {
                let message = format!(
                    "{label} struct member has same IO annotation, as top-level struct, '{shared}'"
                );
                self.io_error(io.site, message);
            } else if top.is_empty() && own.is_empty() {
                let message = format!(
                    "{label} struct members must have at least one IO annotation, e.g. a binding point, a location, etc"
                );
                self.io_error(io.site, message);
            } else if own.len() > 1 {
                let message = format!(
                    "{label} struct member has more than one IO annotation, [ {} ]",
                    own.join(", ")
                );
                self.io_error(io.site, message);
            }
        }
    }

    /// Rules for one set of attributes, on the value itself or on a member
    /// of its struct type.
    fn check_io_attributes(
        &mut self,
        stage: PipelineStage,
        io: &IoValue<'_>,
        ty: Handle<Type>,
        attributes: &IoAttributes,
        member: bool,
    ) {
        let site = io.site;

        if attributes.invariant && attributes.builtin != Some(BuiltinValue::Position) {
            self.io_error(site, "invariant can only decorate a value if it is also decorated with position");
        }

        if *self.types.inner(ty) == TypeInner::Scalar(Scalar::BOOL) {
            if let Some(message) = self.bool_error(stage, io, attributes, member) {
                self.io_error(site, message);
            }
        }

        if attributes.location.is_some() {
            if stage == PipelineStage::Compute && io.dir == Direction::Input {
                self.io_error(site, "location attribute is not valid for compute shader inputs");
            } else if !self.location_type_allowed(ty) {
                let message = format!(
                    "{} with a location attribute must be a numeric scalar or vector, but has type {}",
                    io.label(),
                    self.type_name(ty)
                );
                self.io_error(site, message);
            }
        }

        if attributes.interpolation.is_some() {
            if attributes.location.is_none() {
                self.io_error(site, "interpolation attribute requires a location attribute");
            } else if self.types.is_struct(ty)
                && !self.capabilities.contains(Capability::AllowLocationForNumericElements)
            {
                let message = format!(
                    "interpolation cannot be applied to a struct without '{}' capability",
                    Capability::AllowLocationForNumericElements
                );
                self.io_error(site, message);
            }
        }

        if attributes.color.is_some() {
            if stage != PipelineStage::Fragment || io.dir != Direction::Input {
                let message = format!(
                    "color IO attributes cannot be declared for a {stage} shader {}. They can only be used for a fragment shader input.",
                    io.dir.name()
                );
                self.io_error(site, message);
            } else if !self.types.is_scalar_or_vector(ty) {
                self.io_error(site, "color must be a scalar or vector");
            }
        }

        if attributes.input_attachment_index.is_some() {
            let message = format!(
                "input attachment index IO attributes cannot be declared for a {stage} shader {}. They can only be used for a fragment shader resource.",
                io.dir.name()
            );
            self.io_error(site, message);
        }

        if let Some(builtin) = attributes.builtin {
            if !matches!(site, Site::Var(_)) {
                if let Some(message) = self.builtin_error(builtin, stage, io.dir, ty) {
                    self.io_error(site, message);
                }
            }
        }

        if attributes.blend_src.is_some() && !member {
            if io.dir == Direction::Input || stage != PipelineStage::Fragment {
                self.io_error(site, "blend_src can only be used on fragment shader outputs");
            } else {
                self.io_error(site, "blend_src cannot be used on non-struct-member types");
            }
        }
    }

    fn bool_error(
        &self,
        stage: PipelineStage,
        io: &IoValue<'_>,
        attributes: &IoAttributes,
        member: bool,
    ) -> Option<&'static str> {
        let front_facing = attributes.builtin == Some(BuiltinValue::FrontFacing);
        let fragment = stage == PipelineStage::Fragment;
        match io.site {
            Site::Param(_) if !fragment => Some("entry point params can only be a bool for fragment shaders"),
            Site::Param(_) if front_facing => None,
            Site::Param(_) if member => Some(
                "fragment entry point param members can only be a bool if decorated with @builtin(front_facing)",
            ),
            Site::Param(_) => Some(
                "fragment entry point params can only be a bool if decorated with @builtin(front_facing)",
            ),
            Site::Return(_) => Some("entry point returns can not be 'bool'"),
            Site::Var(_) if io.dir == Direction::Input && fragment => (!front_facing).then_some(
                "input address space values referenced by fragment shaders can only be a bool if decorated with @builtin(front_facing)",
            ),
            Site::Var(_) => Some(
                "IO address space values referenced by shader entry points can only be bool if in the input space, used only by fragment shaders and decorated with @builtin(front_facing)",
            ),
        }
    }

    fn location_type_allowed(&self, ty: Handle<Type>) -> bool {
        if self.types.is_numeric_scalar_or_vector(ty) {
            return true;
        }
        if !self.capabilities.contains(Capability::AllowLocationForNumericElements) {
            return false;
        }
        self.types.members(ty).is_some_and(|members| {
            members
                .iter()
                .all(|m| self.types.is_numeric_scalar_or_vector(m.ty))
        })
    }

    /// Dual source blending: a fragment output struct with exactly two
    /// located members carrying `@blend_src(0)` and `@blend_src(1)`.
    fn check_blend_src_struct(&mut self, stage: PipelineStage, io: &IoValue<'_>, members: &[StructMember]) {
        let site = io.site;
        for member in members {
            let nested = self.types.members(member.ty).is_some_and(|inner| {
                inner.iter().any(|m| m.attributes.blend_src.is_some())
            });
            if nested {
                self.io_error(site, "blend_src cannot be used on members of non-top level structs");
            }
        }

        if !members.iter().any(|m| m.attributes.blend_src.is_some()) {
            return;
        }
        if io.dir == Direction::Input || stage != PipelineStage::Fragment {
            self.io_error(site, "blend_src can only be used on fragment shader outputs");
            return;
        }
        let located = members.iter().filter(|m| m.attributes.location.is_some()).count();
        if located != 2 {
            self.io_error(
                site,
                "structs with blend_src members must have exactly 2 members with location annotations",
            );
            return;
        }

        let mut seen = [false; 2];
        let mut first_ty = None;
        for member in members {
            let Some(blend_src) = member.attributes.blend_src else {
                continue;
            };
            if member.attributes.location != Some(0) {
                self.io_error(site, "struct members with blend_src must be located at 0");
                continue;
            }
            let Some(slot) = seen.get_mut(blend_src as usize) else {
                self.io_error(site, "blend_src value must be 0 or 1");
                continue;
            };
            if *slot {
                self.io_error(site, format!("duplicate blend_src({blend_src}) on entry point output"));
                continue;
            }
            *slot = true;

            if !self.types.is_numeric_scalar_or_vector(member.ty) {
                let message = format!(
                    "blend_src must be a numeric scalar or vector, but has type {}",
                    self.type_name(member.ty)
                );
                self.io_error(site, message);
                continue;
            }
            match first_ty {
                None => first_ty = Some(member.ty),
                Some(first) if first != member.ty => {
                    let message = format!(
                        "blend_src type {} does not match other blend_src type {}",
                        self.type_name(member.ty),
                        self.type_name(first)
                    );
                    self.io_error(site, message);
                }
                Some(_) => {}
            }
        }
        if seen != [true, true] {
            self.io_error(
                site,
                "if any @blend_src is used on an output, then @blend_src(0) and @blend_src(1) must be used",
            );
        }
    }

    fn record_locations(&mut self, io: &IoValue<'_>, members: Option<&[StructMember]>, locations: &mut Locations) {
        let mut claimed = Vec::new();
        if let Some(location) = io.attributes.location {
            claimed.push(location);
        }
        if let Some(members) = members {
            if members.iter().any(|m| m.attributes.blend_src.is_some()) {
                claimed.push(0);
            } else {
                claimed.extend(members.iter().filter_map(|m| m.attributes.location));
            }
        }

        let map = match io.dir {
            Direction::Input => &mut locations.inputs,
            Direction::Output => &mut locations.outputs,
        };
        for location in claimed {
            if let Some(&first) = map.get(&location) {
                let message = format!("duplicate location({location}) on entry point {}", io.dir.name());
                self.io_error(io.site, message);
                self.io_note(first);
            } else {
                map.insert(location, io.site);
            }
        }
    }

    fn io_error(&mut self, site: Site, message: impl AsRef<str>) {
        let message = message.as_ref();
        match site {
            Site::Param(param) => self.param_error(param, message),
            Site::Return(function) => self.function_error(function, message),
            Site::Var(var) => self.inst_error(var, message),
        }
    }

    fn io_note(&mut self, site: Site) {
        match site {
            Site::Param(param) => self.declaration_note(param),
            Site::Return(function) => {
                let name = self.function_label(function);
                self.function_note(function, format!("{name} declared here"));
            }
            Site::Var(var) => {
                if let Some(result) = self.module.instruction(var).result() {
                    self.declaration_note(result);
                }
            }
        }
    }
}
