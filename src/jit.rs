use inkwell::{
    execution_engine::ExecutionEngine,
    module::Module,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};

type ReplFn = unsafe extern "C" fn() -> f64;

#[derive(Debug, thiserror::Error)]
pub enum JitError {
    #[error("failed to initialize native target: {0}")]
    TargetInit(String),
    #[error("unit failed verification: {0}")]
    BrokenUnit(String),
    #[error("failed to create execution engine: {0}")]
    CreateEngine(String),
    #[error("symbol '{0}' is not defined in any unit")]
    SymbolNotFound(String),
    #[error("failed to look up '{0}': {1}")]
    Lookup(String, String),
}

struct Unit<'ctx> {
    module: Module<'ctx>,
    engine: ExecutionEngine<'ctx>,
}

/// Execution backend: one MCJIT engine per compiled unit. Units are added in
/// session order and searched newest-first; symbols a unit leaves undeclared
/// resolve from process symbols (libm and friends) when it is first run.
pub struct Jit<'ctx> {
    units: Vec<Unit<'ctx>>,
}

impl<'ctx> Jit<'ctx> {
    pub fn new() -> Result<Self, JitError> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(JitError::TargetInit)?;
        Ok(Jit { units: Vec::new() })
    }

    /// Verify a unit and take ownership of it. Machine code is generated
    /// lazily, on the first symbol lookup against the unit.
    pub fn add(&mut self, module: Module<'ctx>) -> Result<(), JitError> {
        module
            .verify()
            .map_err(|err| JitError::BrokenUnit(err.to_string()))?;
        let engine = module
            .create_jit_execution_engine(OptimizationLevel::Default)
            .map_err(|err| JitError::CreateEngine(err.to_string()))?;
        self.units.push(Unit { module, engine });
        Ok(())
    }

    fn defining_unit(&self, name: &str) -> Option<&Unit<'ctx>> {
        self.units.iter().rev().find(|unit| {
            unit.module
                .get_function(name)
                .is_some_and(|f| f.count_basic_blocks() > 0)
        })
    }

    /// Call a zero-argument function by name and return its numeric result.
    pub fn invoke(&self, name: &str) -> Result<f64, JitError> {
        let unit = self
            .defining_unit(name)
            .ok_or_else(|| JitError::SymbolNotFound(name.to_string()))?;
        let function = unsafe { unit.engine.get_function::<ReplFn>(name) }
            .map_err(|err| JitError::Lookup(name.to_string(), err.to_string()))?;
        Ok(unsafe { function.call() })
    }

    /// Drop the newest unit defining `name`, freeing the symbol for reuse.
    pub fn retract(&mut self, name: &str) {
        if let Some(pos) = self.units.iter().rposition(|unit| {
            unit.module
                .get_function(name)
                .is_some_and(|f| f.count_basic_blocks() > 0)
        }) {
            self.units.remove(pos);
        }
    }
}
