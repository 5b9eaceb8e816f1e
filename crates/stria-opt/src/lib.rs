//! Validation and transform passes over the stria IR.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] that can validate the module
//! around every pass, the IR [`validation`] rules, the [`Std140`] uniform
//! buffer transform and the immediate data helpers.

mod error;
mod immediate;
mod std140;
pub mod validation;

pub use error::OptError;
pub use immediate::{
    ImmediateRange, validate_internal_immediate_offset, validate_single_user_immediate,
};
pub use std140::{Std140, std140};
pub use validation::{Capabilities, Capability, Diagnostic, Failure, IrValidation, Severity, validate};

use std::fmt::Debug;

use stria_ir::Module;

/// A pass that checks or transforms an IR module.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a module. Returns `true` if anything was modified.
    fn run(&self, module: &mut Module) -> Result<bool, OptError>;
}

/// Runs passes in sequence, optionally validating before the first pass and
/// after each one.
#[derive(Debug, Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    validation: Option<Capabilities>,
}

impl PassManager {
    /// Creates an empty pass manager with no passes and no validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Validates the module with `capabilities` around every pass.
    pub fn with_validation(mut self, capabilities: Capabilities) -> Self {
        self.validation = Some(capabilities);
        self
    }

    /// Runs every pass once, in order. Returns `true` if any pass modified
    /// the module.
    pub fn run(&self, module: &mut Module) -> Result<bool, OptError> {
        self.check(module, "input")?;
        let mut changed = false;
        for pass in &self.passes {
            log::debug!("running pass '{}'", pass.name());
            let modified = pass.run(module)?;
            if modified {
                self.check(module, pass.name())?;
            }
            changed |= modified;
        }
        Ok(changed)
    }

    fn check(&self, module: &Module, after: &str) -> Result<(), OptError> {
        let Some(capabilities) = self.validation else {
            return Ok(());
        };
        validate(module, capabilities).map_err(|failure| {
            log::warn!("validation failed after '{after}'");
            OptError::Validation(failure)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stria_ir::{Builder, PipelineStage};

    #[derive(Debug)]
    struct Touch;

    impl Pass for Touch {
        fn name(&self) -> &str {
            "touch"
        }

        fn run(&self, module: &mut Module) -> Result<bool, OptError> {
            let void = module.types.void();
            // No terminator in the body.
            Builder::new(module).function("broken", void);
            Ok(true)
        }
    }

    #[test]
    fn empty_pipeline_is_a_noop() {
        let mut module = Module::new();
        let pm = PassManager::new().with_validation(Capabilities::new());
        assert!(!pm.run(&mut module).unwrap());
    }

    #[test]
    fn validation_runs_after_modifying_passes() {
        let mut module = Module::new();
        let mut pm = PassManager::new().with_validation(Capabilities::new());
        pm.add_pass(Box::new(Touch));
        let err = pm.run(&mut module).unwrap_err();
        assert!(matches!(err, OptError::Validation(_)), "{err}");
    }

    #[test]
    fn invalid_input_is_rejected_before_any_pass() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        b.entry_point("main", PipelineStage::Compute, void);

        let mut pm = PassManager::new().with_validation(Capabilities::new());
        pm.add_pass(Box::new(Std140));
        let err = pm.run(&mut module).unwrap_err();
        let OptError::Validation(failure) = err else {
            panic!("expected a validation failure");
        };
        assert!(failure.reason().contains("compute entry point requires @workgroup_size"));
    }

    #[test]
    fn unvalidated_pipeline_trusts_its_passes() {
        let mut module = Module::new();
        let mut pm = PassManager::new();
        pm.add_pass(Box::new(Touch));
        assert!(pm.run(&mut module).unwrap());
    }
}
