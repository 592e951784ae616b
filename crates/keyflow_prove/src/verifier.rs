//! The verifier.
//!
//! Walks every interface function with a symbolic annotation, querying
//! the engine for post-images and joining control-flow merges, while the
//! outer loop grows the interference set until the annotations are
//! stable under every other thread's effects.
//!
//! Interference is applied before each command that can observe shared
//! state; commands over purely thread-local state skip the application
//! (the right-mover optimization). Inside an `atomic` block application
//! is suspended and resumed at the block's end, making the whole block a
//! single step.

use tracing::{debug, info, trace};

use keyflow_language::{
    Expr, FuncId, Function, Program, Scope, Sort, Stmt, VarId,
};
use keyflow_logic::{
    equal, normalize, Annotation, Axiom, Comparator, Conjunct, Conjunction, StackAxiom,
    SymbolFactory, SymbolPool, SymbolicExpr,
};
use keyflow_solve::{
    EngineError, EngineResult, PostCommand, Solver, SolverConfig,
};

use crate::interference::Interference;
use crate::verdict::Verdict;

/// Bound on loop-invariant iterations before giving up.
const MAX_LOOP_ROUNDS: usize = 32;
/// Bound on outer interference iterations before giving up.
const MAX_OUTER_ROUNDS: usize = 16;

/// Checks linearizability of every interface function of the program.
pub fn check_linearizability(
    program: &Program,
    config: &SolverConfig,
) -> EngineResult<Verdict> {
    if let Err(e) = program.validate() {
        return Err(EngineError::config(format!("ill-formed program: {}", e)));
    }
    let solver = Solver::new(program, config)?;
    let mut verifier = Verifier::new(program, solver);

    match verifier.run() {
        Ok(()) => Ok(Verdict::Linearizable),
        Err(e) if e.is_refutation() => Ok(Verdict::NotLinearizable {
            reason: e.to_string(),
        }),
        Err(e) if e.is_inconclusive() => Ok(Verdict::Unknown {
            reason: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}

struct Verifier<'a> {
    program: &'a Program,
    solver: Solver<'a>,
    pool: SymbolPool,
    interference: Interference,
    new_effects: Vec<keyflow_logic::Effect>,
    current: Annotation,
    breaking: Vec<Annotation>,
    returning: Vec<(Annotation, Vec<Expr>)>,
    atomic_depth: usize,
}

impl<'a> Verifier<'a> {
    fn new(program: &'a Program, solver: Solver<'a>) -> Self {
        Verifier {
            program,
            solver,
            pool: SymbolPool::new(),
            interference: Interference::new(),
            new_effects: Vec::new(),
            current: Annotation::top(),
            breaking: Vec::new(),
            returning: Vec::new(),
            atomic_depth: 0,
        }
    }

    fn run(&mut self) -> EngineResult<()> {
        self.check_initializer()?;

        for round in 0..MAX_OUTER_ROUNDS {
            info!(round, interference = self.interference.len(), "outer iteration");
            self.new_effects.clear();

            let functions: Vec<FuncId> = self
                .program
                .interface_functions()
                .map(|(id, _)| id)
                .collect();
            for id in functions {
                self.verify_function(id)?;
            }

            let new_effects = std::mem::take(&mut self.new_effects);
            let grew =
                self.interference
                    .consolidate(&self.solver, &mut self.pool, new_effects)?;
            if !grew {
                info!(rounds = round + 1, "interference fixed point reached");
                return Ok(());
            }
        }
        Err(EngineError::solver_unknown()
            .because("the interference set did not stabilize within the iteration bound"))
    }

    //
    // Function-level driving
    //

    fn verify_function(&mut self, id: FuncId) -> EngineResult<()> {
        let function = self.program.func(id);
        info!(function = %function.name, "verifying interface function");

        self.current = self.entry_annotation(function)?;
        self.breaking.clear();
        self.returning.clear();

        let body = function.body.clone();
        self.visit_scope(&body)?;

        // Fall-through exit counts as a bare return.
        if !self.current.is_bottom() {
            let ann = std::mem::replace(&mut self.current, Annotation::bottom());
            self.returning.push((ann, Vec::new()));
        }

        let returning = std::mem::take(&mut self.returning);
        for (annotation, values) in returning {
            self.check_return(function, annotation, &values)?;
        }
        Ok(())
    }

    /// The entry state of an interface function: shared variables bound
    /// to fresh symbols under their invariants, parameters bound, and
    /// the operation obligation installed with its key in range.
    fn entry_annotation(&mut self, function: &Function) -> EngineResult<Annotation> {
        let mut now = Conjunction::new();

        let shared: Vec<(VarId, Sort)> = self
            .program
            .shared_vars()
            .map(|(id, decl)| (id, self.program.types.sort(decl.ty)))
            .collect();
        for (var, sort) in shared {
            let value = {
                let mut factory = SymbolFactory::new(&mut self.pool);
                factory.fresh_value(sort)
            };
            now.push(Axiom::EqualsTo { var, value });
        }

        // Shared-variable invariants, with the pointed-to cells
        // materialized so the invariant has something to speak about.
        let var_invariants = self.solver.config().variable_invariants.clone();
        for (var, predicate) in &var_invariants {
            let value = now
                .value_of(*var)
                .ok_or_else(|| EngineError::internal("unbound shared variable"))?;
            if self.pool.sort(value) != Some(Sort::Ptr) {
                return Err(EngineError::config(format!(
                    "variable invariant on non-pointer variable '{}'",
                    self.program.var(*var).name
                )));
            }
            self.solver
                .materialize_cell(&mut self.pool, &mut now, value)?;
            let mem = now
                .memory_at(value)
                .ok_or_else(|| EngineError::internal("materialization lost the cell"))?
                .clone();
            for conjunct in predicate.on_memory(&mem, None, &self.pool)? {
                now.conjuncts.push(conjunct);
            }
        }

        for param in &function.params {
            let sort = self.program.types.sort(self.program.var(*param).ty);
            let value = {
                let mut factory = SymbolFactory::new(&mut self.pool);
                factory.fresh_value(sort)
            };
            now.push(Axiom::EqualsTo { var: *param, value });
        }

        if let Some(spec) = &function.spec {
            let key = now
                .value_of(function.params[spec.key_param])
                .ok_or_else(|| EngineError::internal("unbound key parameter"))?;
            now.push(Axiom::Stack(StackAxiom::new(
                Comparator::Lt,
                SymbolicExpr::Min,
                key.into(),
                &self.pool,
            )?));
            now.push(Axiom::Stack(StackAxiom::new(
                Comparator::Lt,
                key.into(),
                SymbolicExpr::Max,
                &self.pool,
            )?));
            now.push(Axiom::Obligation {
                kind: spec.kind,
                key,
            });
        }

        Ok(Annotation::from_now(now))
    }

    /// Every return path of a specified function must carry a matching
    /// fulfillment whose return value agrees with the returned
    /// expression.
    fn check_return(
        &mut self,
        function: &Function,
        annotation: Annotation,
        values: &[Expr],
    ) -> EngineResult<()> {
        let Some(spec) = &function.spec else {
            return Ok(());
        };
        if self.solver.is_false(&self.pool, &annotation)? {
            return Ok(());
        }

        // One last chance for a pure linearization point.
        let annotation = self.solver.try_linearize(&mut self.pool, annotation)?;

        let fulfillment = annotation.now.axioms().find_map(|a| match a {
            Axiom::Fulfillment {
                kind,
                return_value,
                ..
            } if *kind == spec.kind => Some(*return_value),
            _ => None,
        });
        let Some(return_value) = fulfillment else {
            return Err(EngineError::linearization_failure(
                format!("{}", annotation.now),
                "no state change and no pure linearization evidence".to_string(),
            )
            .at(format!("return of '{}'", function.name))
            .because("the operation was never linearized on this path"));
        };

        // Check the declared return value against the returned
        // expression, when there is one.
        if let Some(returned) = values.first() {
            let agrees = Expr::eq(returned.clone(), Expr::Bool(return_value));
            if !self.solver.entails(&self.pool, &annotation, &agrees)? {
                return Err(EngineError::linearization_failure(
                    format!("{}", annotation.now),
                    format!("linearized with return value {}", return_value),
                )
                .at(format!("return of '{}'", function.name))
                .because("the returned value disagrees with the linearization"));
            }
        }
        Ok(())
    }

    //
    // Statement walk
    //

    fn visit_scope(&mut self, scope: &Scope) -> EngineResult<()> {
        // Scope entry: bind the declared variables to fresh symbols.
        for var in &scope.vars {
            let sort = self.program.types.sort(self.program.var(*var).ty);
            let value = {
                let mut factory = SymbolFactory::new(&mut self.pool);
                factory.fresh_value(sort)
            };
            self.current.now.push(Axiom::EqualsTo { var: *var, value });
        }

        self.visit_stmt(&scope.body)?;

        // Scope exit: the bindings die with the scope.
        for var in &scope.vars {
            self.current.now.conjuncts.retain(|c| {
                !matches!(c, Conjunct::Axiom(Axiom::EqualsTo { var: v, .. }) if v == var)
            });
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> EngineResult<()> {
        if self.current.is_bottom() {
            // Unreachable code; nothing to verify.
            return Ok(());
        }
        match stmt {
            Stmt::Seq(stmts) => {
                for s in stmts {
                    self.visit_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Scope(scope) => self.visit_scope(scope),
            Stmt::Atomic(scope) => {
                // The whole block is one step: stabilize at its borders,
                // never inside.
                self.apply_interference()?;
                self.atomic_depth += 1;
                let result = self.visit_scope(scope);
                self.atomic_depth -= 1;
                result?;
                self.apply_interference()
            }
            Stmt::Choice(branches) => {
                let pre = std::mem::replace(&mut self.current, Annotation::bottom());
                let mut outcomes = Vec::with_capacity(branches.len());
                for branch in branches {
                    self.current = pre.clone();
                    self.visit_scope(branch)?;
                    outcomes.push(std::mem::replace(&mut self.current, Annotation::bottom()));
                }
                self.current = self.solver.join(&self.pool, outcomes)?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let pre = std::mem::replace(&mut self.current, Annotation::bottom());

                self.current = pre.clone();
                self.visit_stmt(&Stmt::Assume(cond.clone()))?;
                self.visit_scope(then_branch)?;
                let after_then = std::mem::replace(&mut self.current, Annotation::bottom());

                self.current = pre;
                self.visit_stmt(&Stmt::Assume(cond.clone().negate()))?;
                self.visit_scope(else_branch)?;
                let after_else = std::mem::replace(&mut self.current, Annotation::bottom());

                self.current = self.solver.join(&self.pool, vec![after_then, after_else])?;
                Ok(())
            }
            Stmt::Loop(scope) => self.visit_loop(scope),
            Stmt::While { cond, body } => match cond {
                Expr::Bool(true) => self.visit_loop(body),
                _ => Err(EngineError::unsupported(
                    "conditional loop (the simplifier rewrites these)",
                )),
            },
            Stmt::DoWhile { .. } => Err(EngineError::unsupported(
                "do-while loop (the simplifier rewrites these)",
            )),
            Stmt::Skip => Ok(()),
            Stmt::Break => {
                let ann = std::mem::replace(&mut self.current, Annotation::bottom());
                self.breaking.push(ann);
                Ok(())
            }
            Stmt::Continue => Err(EngineError::unsupported("continue")),
            Stmt::Assume(cond) => {
                if self.touches_shared(cond) {
                    self.apply_interference()?;
                }
                self.step(PostCommand::Assume(cond))
            }
            Stmt::Assert(cond) => {
                if self.touches_shared(cond) {
                    self.apply_interference()?;
                }
                if !self.solver.entails(&self.pool, &self.current, cond)? {
                    let printer = keyflow_language::Printer::new(self.program);
                    return Err(EngineError::assertion_failure(printer.expr(cond)));
                }
                Ok(())
            }
            Stmt::Return(values) => {
                let ann = std::mem::replace(&mut self.current, Annotation::bottom());
                self.returning.push((ann, values.clone()));
                Ok(())
            }
            Stmt::Malloc(var) => self.step(PostCommand::Malloc(*var)),
            Stmt::Assign { lhs, rhs } => {
                if self.touches_shared(lhs) || self.touches_shared(rhs) {
                    self.apply_interference()?;
                }
                self.step(PostCommand::Assign { lhs, rhs })
            }
            Stmt::Call {
                targets,
                callee,
                args,
            } => self.visit_call(targets, *callee, args),
            Stmt::Cas(_) => Err(EngineError::unsupported(
                "compare-and-swap (the simplifier rewrites these)",
            )),
        }
    }

    /// One engine step: post-image plus effect collection.
    fn step(&mut self, command: PostCommand<'_>) -> EngineResult<()> {
        let pre = std::mem::replace(&mut self.current, Annotation::bottom());
        let image = self.solver.post(&mut self.pool, pre, command)?;
        self.current = image.post;
        self.new_effects.extend(image.effects);
        Ok(())
    }

    /// Loop analysis: iterate the body and join with the entry state
    /// until the annotation stabilizes modulo normalization. Break
    /// annotations accumulate per loop and merge at the exit.
    fn visit_loop(&mut self, body: &Scope) -> EngineResult<()> {
        let outer_breaking = std::mem::take(&mut self.breaking);

        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > MAX_LOOP_ROUNDS {
                return Err(EngineError::solver_unknown()
                    .because("loop analysis did not stabilize within the iteration bound"));
            }
            trace!(rounds, "loop iteration");

            let entry = self.current.clone();
            self.breaking.clear();
            self.visit_scope(body)?;

            let joined = self
                .solver
                .join(&self.pool, vec![self.current.clone(), entry.clone()])?;
            let joined_canon = normalize::normalize(joined.clone(), &mut self.pool);
            let entry_canon = normalize::normalize(entry, &mut self.pool);
            let stable = equal::alpha_equivalent(&joined_canon, &entry_canon);
            self.current = joined;
            if stable {
                break;
            }
        }

        let exits = std::mem::take(&mut self.breaking);
        self.current = self.solver.join(&self.pool, exits)?;
        self.breaking = outer_breaking;
        debug!(rounds, "loop stabilized");
        Ok(())
    }

    /// Macro inlining: parallel parameter assignment, body execution with
    /// fresh break/return queues, then assignment of the return slots.
    fn visit_call(
        &mut self,
        targets: &[VarId],
        callee: FuncId,
        args: &[Expr],
    ) -> EngineResult<()> {
        let function = self.program.func(callee).clone();
        trace!(callee = %function.name, "inlining macro");

        for (param, arg) in function.params.iter().zip(args) {
            self.step(PostCommand::Assign {
                lhs: &Expr::Var(*param),
                rhs: arg,
            })?;
        }

        let outer_breaking = std::mem::take(&mut self.breaking);
        let outer_returning = std::mem::take(&mut self.returning);

        let result = self.visit_scope(&function.body);
        let mut exits = std::mem::take(&mut self.returning);
        self.breaking = outer_breaking;
        self.returning = outer_returning;
        result?;

        // Merge explicit returns with the fall-through state, assigning
        // returned expressions to the macro's return slots.
        let mut merged = Vec::new();
        if !self.current.is_bottom() {
            merged.push(std::mem::replace(&mut self.current, Annotation::bottom()));
        }
        for (annotation, values) in exits.drain(..) {
            self.current = annotation;
            for (slot, value) in function.returns.iter().zip(&values) {
                self.step(PostCommand::Assign {
                    lhs: &Expr::Var(*slot),
                    rhs: value,
                })?;
            }
            merged.push(std::mem::replace(&mut self.current, Annotation::bottom()));
        }
        self.current = self.solver.join(&self.pool, merged)?;

        for (target, slot) in targets.iter().zip(&function.returns) {
            self.step(PostCommand::Assign {
                lhs: &Expr::Var(*target),
                rhs: &Expr::Var(*slot),
            })?;
        }
        Ok(())
    }

    //
    // Interference
    //

    /// Stabilizes the current annotation against the interference set.
    ///
    /// Suppressed inside atomic blocks: their body is a single step.
    fn apply_interference(&mut self) -> EngineResult<()> {
        if self.atomic_depth > 0 || self.interference.is_empty() {
            return Ok(());
        }
        let annotation = std::mem::replace(&mut self.current, Annotation::bottom());
        self.current =
            self.solver
                .make_stable(&mut self.pool, annotation, self.interference.effects())?;
        Ok(())
    }

    /// The right-mover test: does the expression read or write state
    /// other threads can see?
    fn touches_shared(&self, expr: &Expr) -> bool {
        let mut shared = false;
        expr.visit(&mut |e| match e {
            Expr::Var(v) if self.program.var(*v).shared => shared = true,
            Expr::Deref { .. } => shared = true,
            _ => {}
        });
        shared
    }

    //
    // Initializer
    //

    /// Runs the initializer from an empty heap and checks that it
    /// establishes the shared invariants.
    ///
    /// Cells the initializer publishes (reachable from shared variables)
    /// must satisfy the shared-node invariant; flow facts are granted at
    /// publication — the root's inflow is the flow domain's boundary
    /// condition, not derivable from an empty heap.
    fn check_initializer(&mut self) -> EngineResult<()> {
        let Some(init) = self.program.initializer.clone() else {
            return Ok(());
        };
        info!("checking the initializer");

        let mut now = Conjunction::new();
        let shared: Vec<(VarId, Sort)> = self
            .program
            .shared_vars()
            .map(|(id, decl)| (id, self.program.types.sort(decl.ty)))
            .collect();
        for (var, sort) in shared {
            let value = {
                let mut factory = SymbolFactory::new(&mut self.pool);
                factory.fresh_value(sort)
            };
            now.push(Axiom::EqualsTo { var, value });
        }
        self.current = Annotation::from_now(now);

        // The initializer runs before any thread exists; interference is
        // off for its whole body.
        self.atomic_depth += 1;
        let result = self.visit_scope(&init.body);
        self.atomic_depth -= 1;
        result?;

        let mut finals: Vec<Annotation> = Vec::new();
        if !self.current.is_bottom() {
            finals.push(std::mem::replace(&mut self.current, Annotation::bottom()));
        }
        for (annotation, _) in self.returning.drain(..) {
            finals.push(annotation);
        }

        for annotation in finals {
            self.check_established(&annotation)?;
        }
        Ok(())
    }

    /// Published cells satisfy the value part of the shared invariant.
    fn check_established(&mut self, annotation: &Annotation) -> EngineResult<()> {
        // Reachable set: shared variable targets, closed under fields.
        let mut reachable: Vec<keyflow_logic::SymbolId> = Vec::new();
        for (var, decl) in self.program.shared_vars() {
            if self.program.types.sort(decl.ty) != Sort::Ptr {
                continue;
            }
            if let Some(value) = annotation.now.value_of(var) {
                reachable.push(value);
            }
        }
        let mut index = 0;
        while index < reachable.len() {
            let node = reachable[index];
            index += 1;
            if let Some(mem) = annotation.now.memory_at(node) {
                for (_, value) in mem.fields() {
                    if self.pool.sort(*value) == Some(Sort::Ptr)
                        && !reachable.contains(value)
                    {
                        reachable.push(*value);
                    }
                }
            }
        }

        let invariant = self.solver.config().shared_node_invariant.clone();
        for node in reachable {
            let Some(mem) = annotation.now.memory_at(node).cloned() else {
                continue;
            };
            let instance = invariant.on_memory(&mem, None, &self.pool)?;
            // Flow facts are granted at publication; the value facts must
            // be established.
            let value_facts: Vec<Conjunct> = instance
                .into_iter()
                .filter(|c| !mentions_flow(c))
                .collect();
            if value_facts.is_empty() {
                continue;
            }
            let formula = Conjunction {
                conjuncts: value_facts,
            };
            if !self
                .solver
                .entails_formula_raw(&self.pool, &annotation.now, &formula)?
            {
                return Err(EngineError::invariant_violation(format!(
                    "published cell {}",
                    mem.node
                ))
                .at("initializer")
                .because("the initializer does not establish the shared-node invariant"));
            }
        }
        Ok(())
    }
}

fn mentions_flow(conjunct: &Conjunct) -> bool {
    let flowish = |axiom: &Axiom| {
        matches!(
            axiom,
            Axiom::InflowEmpty { .. }
                | Axiom::InflowHasValue { .. }
                | Axiom::InflowHasRange { .. }
        )
    };
    match conjunct {
        Conjunct::Axiom(axiom) => flowish(axiom),
        Conjunct::Implication(implication) => implication
            .premise
            .iter()
            .chain(&implication.conclusion)
            .any(flowish),
    }
}
