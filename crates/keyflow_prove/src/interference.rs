//! Interference consolidation.
//!
//! Effects observed while verifying one function become interference for
//! every thread. Before joining the set, a new effect is renamed apart
//! from everything already there, then checked for subsumption in both
//! directions: an effect already covered by the set is dropped, and
//! effects the newcomer covers are evicted. The set never shrinks within
//! an iteration, and the outer fixed point ends when an iteration adds
//! nothing.

use tracing::{debug, trace};

use keyflow_logic::{collect, rename, Effect, SymbolFactory, SymbolPool};
use keyflow_solve::{EngineResult, Solver};

/// The interference set.
#[derive(Default)]
pub struct Interference {
    effects: Vec<Effect>,
}

impl Interference {
    pub fn new() -> Self {
        Interference {
            effects: Vec::new(),
        }
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Consolidates a batch of new effects into the set.
    ///
    /// Returns `true` if the set grew.
    pub fn consolidate(
        &mut self,
        solver: &Solver<'_>,
        pool: &mut SymbolPool,
        new_effects: Vec<Effect>,
    ) -> EngineResult<bool> {
        let mut grew = false;
        for mut effect in new_effects {
            // Rename apart from everything already in the set.
            {
                let existing: Vec<_> = self
                    .effects
                    .iter()
                    .flat_map(collect::effect_symbols)
                    .collect();
                let mut factory = SymbolFactory::avoiding(pool, existing);
                rename::rename_effect_to_avoid(&mut effect, &mut factory);
            }

            // Already covered?
            let mut covered = false;
            for known in &self.effects {
                if solver.effect_subsumes(pool, known, &effect)? {
                    covered = true;
                    break;
                }
            }
            if covered {
                trace!("new effect subsumed by the interference set");
                continue;
            }

            // Evict effects the newcomer covers.
            let mut kept = Vec::with_capacity(self.effects.len());
            for known in std::mem::take(&mut self.effects) {
                if solver.effect_subsumes(pool, &effect, &known)? {
                    trace!("existing effect evicted by a more general one");
                } else {
                    kept.push(known);
                }
            }
            self.effects = kept;
            self.effects.push(effect);
            grew = true;
        }
        debug!(size = self.effects.len(), grew, "interference consolidated");
        Ok(grew)
    }
}
