use alloc::{collections::BTreeMap, vec::Vec};

use arrayflow_core::{Base, BaseId, Instruction, Opcode, Owner, View};

// LIFECYCLE MANAGER
// ================================================================================================

/// Rewrites handle-lifecycle instructions according to base ownership before emission.
///
/// The base table distinguishes three owners of a base's live contents: the upstream caller,
/// this layer (`Local`), and the downstream executor. During flush preparation each lifecycle
/// instruction is rewritten per the ownership state machine; compute instructions move their
/// write operand's base downstream and claim upstream read operands locally.
///
/// All owner transitions and reference-count decrements are staged in a [`PendingEffects`] and
/// take effect only once the executor has accepted the batch, so a failed flush leaves no
/// speculative update behind. Within one batch, later instructions observe the staged state.
pub struct LifecycleManager;

impl LifecycleManager {
    /// Rewrites `instructions` in place and returns the staged effects.
    pub fn prepare(
        instructions: &mut [Instruction],
        bases: &BTreeMap<BaseId, Base>,
    ) -> PendingEffects {
        let mut effects = PendingEffects::default();
        for instruction in instructions.iter_mut() {
            let Some(output) = instruction.output() else {
                continue;
            };
            let base = output.base();
            match instruction.opcode() {
                // Destroying a handle drops one reference; the last reference out tells the
                // executor to discard the base, unless upstream still holds the live copy.
                Opcode::Discard | Opcode::Free => {
                    if effects.release_one(base, bases) == 0 {
                        effects.destroyed.push(base);
                        if effects.owner(base, bases) != Owner::Upstream {
                            *instruction =
                                Instruction::lifecycle(Opcode::Discard, full_view(base, bases));
                        } else {
                            *instruction = Instruction::nop();
                        }
                    } else {
                        *instruction = Instruction::nop();
                    }
                },
                Opcode::Release => match effects.owner(base, bases) {
                    Owner::Upstream => *instruction = Instruction::nop(),
                    Owner::Local => {
                        *instruction =
                            Instruction::lifecycle(Opcode::Discard, full_view(base, bases));
                        effects.owners.insert(base, Owner::Upstream);
                    },
                    Owner::Downstream => {
                        *instruction =
                            Instruction::lifecycle(Opcode::Release, full_view(base, bases));
                        effects.owners.insert(base, Owner::Upstream);
                    },
                },
                Opcode::Sync => match effects.owner(base, bases) {
                    Owner::Upstream | Owner::Local => *instruction = Instruction::nop(),
                    Owner::Downstream => {
                        *instruction =
                            Instruction::lifecycle(Opcode::Sync, full_view(base, bases));
                        effects.owners.insert(base, Owner::Local);
                    },
                },
                Opcode::None => {},
                // A compute instruction: its result materializes downstream, and reading a base
                // that upstream owns pulls the live copy into this layer.
                _ => {
                    effects.owners.insert(base, Owner::Downstream);
                    for operand in instruction.reads() {
                        let Some(view) = operand.as_view() else {
                            continue;
                        };
                        if effects.owner(view.base(), bases) == Owner::Upstream {
                            effects.owners.insert(view.base(), Owner::Local);
                        }
                    }
                },
            }
        }
        effects.valid_instructions =
            instructions.iter().filter(|i| i.opcode() != Opcode::None).count();
        effects
    }
}

// PENDING EFFECTS
// ================================================================================================

/// Owner transitions and reference drops staged by flush preparation.
#[derive(Debug, Default)]
pub struct PendingEffects {
    owners: BTreeMap<BaseId, Owner>,
    releases: BTreeMap<BaseId, u64>,
    destroyed: Vec<BaseId>,
    valid_instructions: usize,
}

impl PendingEffects {
    /// Returns the number of instructions that survived rewriting.
    pub fn valid_instructions(&self) -> usize {
        self.valid_instructions
    }

    /// Returns the bases whose reference count reached zero in this batch.
    pub fn destroyed(&self) -> &[BaseId] {
        &self.destroyed
    }

    /// Applies the staged effects to the base table.
    ///
    /// Called after the executor has accepted the batch; dropping the effects instead rolls the
    /// whole preparation back.
    pub fn commit(self, bases: &mut BTreeMap<BaseId, Base>) {
        for (id, owner) in self.owners {
            if let Some(base) = bases.get_mut(&id) {
                base.set_owner(owner);
            }
        }
        for (id, count) in self.releases {
            if let Some(base) = bases.get_mut(&id) {
                for _ in 0..count {
                    base.release();
                }
            }
        }
        for id in self.destroyed {
            bases.remove(&id);
        }
    }

    /// Stages one reference drop on `base` and returns the count that remains.
    fn release_one(&mut self, base: BaseId, bases: &BTreeMap<BaseId, Base>) -> u64 {
        let staged = self.releases.entry(base).or_insert(0);
        *staged += 1;
        let live = bases.get(&base).map(Base::refcount).unwrap_or(0);
        live.saturating_sub(*staged)
    }

    /// Returns the owner of `base` as later instructions in this batch observe it.
    fn owner(&self, base: BaseId, bases: &BTreeMap<BaseId, Base>) -> Owner {
        self.owners
            .get(&base)
            .copied()
            .or_else(|| bases.get(&base).map(Base::owner))
            .unwrap_or_default()
    }
}

// HELPER FUNCTIONS
// ================================================================================================

/// Returns a flat view covering the whole of `base`, the operand shape lifecycle instructions
/// are forwarded with.
fn full_view(base: BaseId, bases: &BTreeMap<BaseId, Base>) -> View {
    match bases.get(&base) {
        Some(entry) => View::flat(base, entry.element_type(), entry.num_elements()),
        None => View::flat(base, arrayflow_core::ElementType::UInt8, 0),
    }
}

// TESTS
// ================================================================================================
