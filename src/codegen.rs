use std::collections::HashMap;

use inkwell::{
    basic_block::BasicBlock,
    builder::{Builder, BuilderError},
    context::Context,
    module::Module,
    types::BasicMetadataTypeEnum,
    values::{BasicMetadataValueEnum, FloatValue, FunctionValue},
    FloatPredicate,
};

use crate::ast::{Expression, Function, Prototype};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("invalid binary operator '{0}'")]
    InvalidOperator(char),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("wrong number of arguments to '{name}': expected {expected}, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("function '{0}' cannot be redefined")]
    Redefinition(String),
    #[error("generated function '{0}' failed verification")]
    BrokenFunction(String),
    #[error("call to '{0}' produced no value")]
    ValuelessCall(String),
    #[error("builder has no insertion point")]
    NoInsertionPoint,
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

impl CodegenError {
    /// Internal errors indicate a bug in code generation itself, not bad user
    /// input, and abort the whole session instead of one construct.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CodegenError::BrokenFunction(_)
                | CodegenError::ValuelessCall(_)
                | CodegenError::NoInsertionPoint
                | CodegenError::Builder(_)
        )
    }
}

/// Translates one compilation unit. Owns the unit's module and builder;
/// borrows the session-lifetime signature registry so calls can resolve
/// functions that live in earlier units.
pub struct Codegen<'a, 'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    variables: HashMap<String, FloatValue<'ctx>>,
    signatures: &'a mut HashMap<String, Prototype>,
}

impl<'a, 'ctx> Codegen<'a, 'ctx> {
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        signatures: &'a mut HashMap<String, Prototype>,
    ) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        Codegen {
            context,
            module,
            builder,
            variables: HashMap::new(),
            signatures,
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// Hand the finished unit off to the execution backend.
    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// Declare `proto` in the unit with an f64^n -> f64 type, naming each
    /// parameter. Parameters are bound by position.
    fn declare(&self, proto: &Prototype) -> FunctionValue<'ctx> {
        let f64_type = self.context.f64_type();
        let param_types: Vec<BasicMetadataTypeEnum> = vec![f64_type.into(); proto.args.len()];
        let fn_type = f64_type.fn_type(&param_types, false);
        let fn_val = self.module.add_function(&proto.name, fn_type, None);

        for (param, name) in fn_val.get_param_iter().zip(&proto.args) {
            param.into_float_value().set_name(name);
        }

        fn_val
    }

    /// Resolve a callee: the active unit first, then the signature registry
    /// (declaring it in the unit on demand).
    fn get_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        if let Some(fn_val) = self.module.get_function(name) {
            return Some(fn_val);
        }
        let proto = self.signatures.get(name)?.clone();
        Some(self.declare(&proto))
    }

    pub fn compile_function(
        &mut self,
        function: &Function,
    ) -> Result<FunctionValue<'ctx>, CodegenError> {
        let proto = &function.prototype;

        // Registered before the body is translated, so the body may call the
        // function itself and later units can call it before it is linked.
        self.signatures.insert(proto.name.clone(), proto.clone());

        let fn_val = match self.module.get_function(&proto.name) {
            Some(fn_val) => fn_val,
            None => self.declare(proto),
        };
        if fn_val.count_basic_blocks() > 0 {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        let entry = self.context.append_basic_block(fn_val, "entry");
        self.builder.position_at_end(entry);

        self.variables.clear();
        self.variables.reserve(proto.args.len());
        for (param, name) in fn_val.get_param_iter().zip(&proto.args) {
            self.variables.insert(name.clone(), param.into_float_value());
        }

        let compiled = match self.compile_expr(&function.body) {
            Ok(ret) => self
                .builder
                .build_return(Some(&ret))
                .map(|_| ())
                .map_err(CodegenError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = compiled {
            // no dangling empty declaration is left behind
            unsafe { fn_val.delete() };
            return Err(err);
        }

        if fn_val.verify(true) {
            Ok(fn_val)
        } else {
            unsafe { fn_val.delete() };
            Err(CodegenError::BrokenFunction(proto.name.clone()))
        }
    }

    fn current_block(&self) -> Result<BasicBlock<'ctx>, CodegenError> {
        self.builder
            .get_insert_block()
            .ok_or(CodegenError::NoInsertionPoint)
    }

    fn current_function(&self) -> Result<FunctionValue<'ctx>, CodegenError> {
        self.current_block()?
            .get_parent()
            .ok_or(CodegenError::NoInsertionPoint)
    }

    fn compile_expr(&mut self, expr: &Expression) -> Result<FloatValue<'ctx>, CodegenError> {
        match expr {
            Expression::Literal(value) => Ok(self.context.f64_type().const_float(*value)),
            Expression::Variable(name) => self
                .variables
                .get(name)
                .copied()
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone())),
            Expression::Binary(op, lhs, rhs) => {
                let lhs = self.compile_expr(lhs)?;
                let rhs = self.compile_expr(rhs)?;

                match op {
                    '+' => Ok(self.builder.build_float_add(lhs, rhs, "addtmp")?),
                    '-' => Ok(self.builder.build_float_sub(lhs, rhs, "subtmp")?),
                    '*' => Ok(self.builder.build_float_mul(lhs, rhs, "multmp")?),
                    '<' => {
                        let cmp = self.builder.build_float_compare(
                            FloatPredicate::OLT,
                            lhs,
                            rhs,
                            "cmptmp",
                        )?;
                        // the i1 comparison becomes 1.0 or 0.0
                        Ok(self.builder.build_unsigned_int_to_float(
                            cmp,
                            self.context.f64_type(),
                            "booltmp",
                        )?)
                    }
                    op => Err(CodegenError::InvalidOperator(*op)),
                }
            }
            Expression::Call(callee, args) => self.compile_call(callee, args),
            Expression::If {
                cond,
                then,
                otherwise,
            } => self.compile_if(cond, then, otherwise),
            Expression::For {
                var,
                start,
                end,
                step,
                body,
            } => self.compile_for(var, start, end, step.as_deref(), body),
        }
    }

    fn compile_call(
        &mut self,
        callee: &str,
        args: &[Expression],
    ) -> Result<FloatValue<'ctx>, CodegenError> {
        let function = self
            .get_function(callee)
            .ok_or_else(|| CodegenError::UnknownFunction(callee.to_string()))?;

        let expected = function.count_params() as usize;
        if expected != args.len() {
            return Err(CodegenError::ArityMismatch {
                name: callee.to_string(),
                expected,
                found: args.len(),
            });
        }

        let mut compiled_args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        for arg in args {
            compiled_args.push(self.compile_expr(arg)?.into());
        }

        self.builder
            .build_call(function, &compiled_args, "calltmp")?
            .try_as_basic_value()
            .basic()
            .map(|value| value.into_float_value())
            .ok_or_else(|| CodegenError::ValuelessCall(callee.to_string()))
    }

    /// Branch into exactly one of then/else; both converge at the merge
    /// block, where a phi selects the value of the path actually taken.
    fn compile_if(
        &mut self,
        cond: &Expression,
        then: &Expression,
        otherwise: &Expression,
    ) -> Result<FloatValue<'ctx>, CodegenError> {
        let f64_type = self.context.f64_type();

        let cond_val = self.compile_expr(cond)?;
        let cond_bool = self.builder.build_float_compare(
            FloatPredicate::ONE,
            cond_val,
            f64_type.const_float(0.0),
            "ifcond",
        )?;

        let function = self.current_function()?;
        let then_bb = self.context.append_basic_block(function, "then");
        let else_bb = self.context.append_basic_block(function, "else");
        let merge_bb = self.context.append_basic_block(function, "ifcont");
        self.builder
            .build_conditional_branch(cond_bool, then_bb, else_bb)?;

        self.builder.position_at_end(then_bb);
        let then_val = self.compile_expr(then)?;
        self.builder.build_unconditional_branch(merge_bb)?;
        // branch codegen may have moved the insertion block
        let then_end = self.current_block()?;

        self.builder.position_at_end(else_bb);
        let else_val = self.compile_expr(otherwise)?;
        self.builder.build_unconditional_branch(merge_bb)?;
        let else_end = self.current_block()?;

        self.builder.position_at_end(merge_bb);
        let phi = self.builder.build_phi(f64_type, "iftmp")?;
        phi.add_incoming(&[(&then_val, then_end), (&else_val, else_end)]);

        Ok(phi.as_basic_value().into_float_value())
    }

    /// Phi-based induction variable; the body runs for effect only and the
    /// whole expression always evaluates to 0.0.
    fn compile_for(
        &mut self,
        var: &str,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
        body: &Expression,
    ) -> Result<FloatValue<'ctx>, CodegenError> {
        let f64_type = self.context.f64_type();

        let start_val = self.compile_expr(start)?;
        let preheader = self.current_block()?;
        let function = self.current_function()?;

        let loop_bb = self.context.append_basic_block(function, "loop");
        self.builder.build_unconditional_branch(loop_bb)?;
        self.builder.position_at_end(loop_bb);

        let induction = self.builder.build_phi(f64_type, var)?;
        induction.add_incoming(&[(&start_val, preheader)]);
        let current = induction.as_basic_value().into_float_value();

        // the loop variable may shadow a parameter of the same name
        let shadowed = self.variables.insert(var.to_string(), current);

        self.compile_expr(body)?;

        let step_val = match step {
            Some(step) => self.compile_expr(step)?,
            None => f64_type.const_float(1.0),
        };
        let next = self.builder.build_float_add(current, step_val, "nextvar")?;

        let end_val = self.compile_expr(end)?;
        let keep_going = self.builder.build_float_compare(
            FloatPredicate::ONE,
            end_val,
            f64_type.const_float(0.0),
            "loopcond",
        )?;

        let loop_end = self.current_block()?;
        let after_bb = self.context.append_basic_block(function, "afterloop");
        self.builder
            .build_conditional_branch(keep_going, loop_bb, after_bb)?;
        self.builder.position_at_end(after_bb);

        induction.add_incoming(&[(&next, loop_end)]);

        match shadowed {
            Some(prev) => self.variables.insert(var.to_string(), prev),
            None => self.variables.remove(var),
        };

        Ok(f64_type.const_float(0.0))
    }
}
