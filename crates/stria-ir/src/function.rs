//! Functions and entry points.

use std::fmt;

use crate::arena::Handle;
use crate::block::Block;
use crate::io::IoAttributes;
use crate::types::Type;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum PipelineStage {
    Compute,
    Fragment,
    Vertex,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Fragment => "fragment",
            Self::Vertex => "vertex",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A function. Entry points are functions with a pipeline stage.
#[derive(Clone, Debug)]
pub struct Function {
    /// Required for entry points.
    pub name: Option<String>,
    pub return_type: Handle<Type>,
    pub return_attributes: IoAttributes,
    pub stage: Option<PipelineStage>,
    /// `@workgroup_size` arguments, one to three values.
    pub workgroup_size: Option<Vec<Handle<Value>>>,
    pub(crate) params: Vec<Handle<Value>>,
    pub(crate) block: Handle<Block>,
    /// The function referenced as a value, i.e. the `call` target operand.
    pub(crate) value: Handle<Value>,
}

impl Function {
    pub fn params(&self) -> &[Handle<Value>] {
        &self.params
    }

    /// The entry block.
    pub fn block(&self) -> Handle<Block> {
        self.block
    }

    pub fn value(&self) -> Handle<Value> {
        self.value
    }

    pub fn is_entry_point(&self) -> bool {
        self.stage.is_some()
    }
}
