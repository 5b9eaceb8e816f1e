//! Opt-in relaxations of validation rules.

use std::fmt;

/// A single validation relaxation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// More than one entry point may live in a module.
    AllowMultipleEntryPoints,
    /// The user-facing `point_size` builtin may be used.
    AllowPointSizeBuiltin,
    /// `clip_distances` may be declared as a plain `f32`.
    AllowClipDistancesOnF32,
    /// `override` declarations may appear, and workgroup sizes may be
    /// override expressions.
    AllowOverrides,
    /// Relaxes the per-value IO annotation rules.
    LoosenValidationForShaderIo,
    /// `@location` may decorate structs whose members are all numeric.
    AllowLocationForNumericElements,
    /// `let` and `construct` may appear in the root block.
    AllowModuleScopeLets,
}

impl Capability {
    const ALL: [Self; 7] = [
        Self::AllowMultipleEntryPoints,
        Self::AllowPointSizeBuiltin,
        Self::AllowClipDistancesOnF32,
        Self::AllowOverrides,
        Self::LoosenValidationForShaderIo,
        Self::AllowLocationForNumericElements,
        Self::AllowModuleScopeLets,
    ];

    const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AllowMultipleEntryPoints => "kAllowMultipleEntryPoints",
            Self::AllowPointSizeBuiltin => "kAllowPointSizeBuiltin",
            Self::AllowClipDistancesOnF32 => "kAllowClipDistancesOnF32",
            Self::AllowOverrides => "kAllowOverrides",
            Self::LoosenValidationForShaderIo => "kLoosenValidationForShaderIO",
            Self::AllowLocationForNumericElements => "kAllowLocationForNumericElements",
            Self::AllowModuleScopeLets => "kAllowModuleScopeLets",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Capability`] flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    /// No relaxations.
    pub const EMPTY: Self = Self(0);

    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Returns `true` if `capability` is in the set.
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns a copy of the set with `capability` added.
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |&c| self.contains(c))
    }
}

impl From<Capability> for Capabilities {
    fn from(capability: Capability) -> Self {
        Self::EMPTY.with(capability)
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl std::ops::BitOr<Capability> for Capabilities {
    type Output = Self;
    fn bitor(self, rhs: Capability) -> Self {
        self.with(rhs)
    }
}

impl std::ops::BitOr for Capability {
    type Output = Capabilities;
    fn bitor(self, rhs: Self) -> Capabilities {
        Capabilities::from(self).with(rhs)
    }
}
