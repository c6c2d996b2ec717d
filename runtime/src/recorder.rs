use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    string::String,
    vec::Vec,
};
use core::fmt;

use arrayflow_core::{
    AllocState, Base, BaseId, Constant, ElementType, ExtensionId, Instruction, Opcode, Operand,
    View, ViewModifier,
};

use crate::{
    alias::{AliasOracle, PreciseOracle},
    config::RuntimeOptions,
    errors::{FlushError, RecordError},
    executor::{Batch, Executor, ExecutorError},
    flow::FlowGraph,
    lifecycle::LifecycleManager,
};

// VIEW ID
// ================================================================================================

/// Handle identifying a view registered with the recorder.
///
/// The handle exists for the API boundary only; the view descriptor itself is copied into each
/// instruction at record time and is immutable from then on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u64);

impl ViewId {
    /// Returns the raw integer backing this id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// OPERAND REF
// ================================================================================================

/// An operand as passed to [`Recorder::record`]: a view handle or an inlined constant.
#[derive(Clone, Copy, Debug)]
pub enum OperandRef {
    View(ViewId),
    Constant(Constant),
}

impl From<ViewId> for OperandRef {
    fn from(view: ViewId) -> Self {
        Self::View(view)
    }
}

impl From<Constant> for OperandRef {
    fn from(constant: Constant) -> Self {
        Self::Constant(constant)
    }
}

// PENDING MODIFIER
// ================================================================================================

/// A sliding-iterator modifier waiting for the next instruction that references its view.
enum PendingModifier {
    Slide { dim: usize, step: i64 },
    Reset { dim: usize, max: u64 },
}

impl PendingModifier {
    fn into_view_modifier(self, slot: usize) -> ViewModifier {
        match self {
            Self::Slide { dim, step } => ViewModifier::Slide { slot, dim, step },
            Self::Reset { dim, max } => ViewModifier::Reset { slot, dim, max },
        }
    }
}

// RECORDER
// ================================================================================================

/// Append-only log of instructions produced by the array façade between flushes.
///
/// The recorder owns the base and view handle tables and defers every recorded operation until a
/// flush point: an explicit [`flush`](Self::flush), the configured batch threshold, or a data
/// access that forces materialization. At a flush point the buffered instructions are rewritten
/// by the lifecycle manager, arranged into a dependency-respecting batch by the flow-graph
/// builder, and handed to the executor.
///
/// Record-time errors reject the single offending operation and leave the recorder unchanged;
/// flush-time errors abort the batch, roll back all staged ownership updates, and keep the
/// instructions buffered so an idempotent caller may retry.
pub struct Recorder {
    options: RuntimeOptions,
    oracle: Box<dyn AliasOracle>,
    bases: BTreeMap<BaseId, Base>,
    views: BTreeMap<ViewId, View>,
    instructions: Vec<Instruction>,
    pending_modifiers: Vec<(ViewId, PendingModifier)>,
    extensions: BTreeSet<ExtensionId>,
    next_base: u64,
    next_view: u64,
    flush_count: u64,
}

impl Recorder {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Returns a new recorder using the precise alias oracle.
    pub fn new(options: RuntimeOptions) -> Self {
        Self::with_oracle(options, Box::new(PreciseOracle))
    }

    /// Returns a new recorder using the provided alias oracle.
    pub fn with_oracle(options: RuntimeOptions, oracle: Box<dyn AliasOracle>) -> Self {
        Self {
            options,
            oracle,
            bases: BTreeMap::new(),
            views: BTreeMap::new(),
            instructions: Vec::new(),
            pending_modifiers: Vec::new(),
            extensions: BTreeSet::new(),
            next_base: 0,
            next_view: 0,
            flush_count: 0,
        }
    }

    // HANDLE MANAGEMENT
    // --------------------------------------------------------------------------------------------

    /// Allocates a new base holding `count` elements of type `etype` and returns its handle.
    ///
    /// The base starts unallocated; the executor allocates storage on first write.
    pub fn new_base(&mut self, etype: ElementType, count: u64) -> BaseId {
        let id = BaseId::new(self.next_base);
        self.next_base += 1;
        self.bases.insert(id, Base::new(etype, count));
        id
    }

    /// Registers a strided view into `base` and returns its handle.
    ///
    /// Each live view holds one reference on its base.
    ///
    /// # Errors
    /// Returns an error if the base is unknown, the shape is malformed, or the view addresses
    /// elements outside the base.
    pub fn new_view(
        &mut self,
        base: BaseId,
        start: u64,
        shape: &[u64],
        stride: &[i64],
    ) -> Result<ViewId, RecordError> {
        let entry = self.bases.get_mut(&base).ok_or(RecordError::UnknownBase(base))?;
        let view = View::new(base, entry.element_type(), start, shape, stride)?;
        if !view.fits_within(entry.num_elements()) {
            return Err(RecordError::ViewOutOfBounds {
                base,
                lowest: view.lowest_offset(),
                highest: view.highest_offset(),
                num_elements: entry.num_elements(),
            });
        }
        entry.acquire();
        let id = ViewId(self.next_view);
        self.next_view += 1;
        self.views.insert(id, view);
        Ok(id)
    }

    /// Returns the base registered under `id`, if any.
    pub fn base(&self, id: BaseId) -> Option<&Base> {
        self.bases.get(&id)
    }

    /// Returns the view registered under `id`, if any.
    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    // RECORDING
    // --------------------------------------------------------------------------------------------

    /// Appends an instruction to the log.
    ///
    /// Operand slot 0 is the output and must be a view handle. Lifecycle opcodes are rejected
    /// here; they are recorded through [`sync`](Self::sync), [`discard`](Self::discard),
    /// [`free`](Self::free) and [`release`](Self::release).
    ///
    /// # Errors
    /// Returns an error if a handle is unknown, the opcode is not recordable, or the operands
    /// violate the opcode's shape or type rules. The log is unchanged on error.
    pub fn record(
        &mut self,
        executor: &mut dyn Executor,
        opcode: Opcode,
        operands: &[OperandRef],
    ) -> Result<(), RecordError> {
        if opcode.is_lifecycle() {
            return Err(RecordError::UnsupportedOpcode(opcode));
        }
        if let Opcode::Extension(id) = opcode
            && !self.extensions.contains(&id)
        {
            return Err(RecordError::UnsupportedExtensionFunction(id));
        }

        let mut resolved: Vec<Operand> = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                OperandRef::View(id) => {
                    let view = self.views.get(id).ok_or(RecordError::UnknownView(*id))?;
                    resolved.push(Operand::View(view.clone()));
                },
                OperandRef::Constant(constant) => resolved.push(Operand::Constant(*constant)),
            }
        }
        self.check_shapes(opcode, &resolved)?;

        let mut instruction = Instruction::new(opcode, resolved)?;
        self.attach_pending_modifiers(&mut instruction, operands);
        self.instructions.push(instruction);

        if self.options.batch_size() > 0 && self.instructions.len() >= self.options.batch_size() {
            self.flush(executor)?;
        }
        Ok(())
    }

    /// Records a synchronization point: after the next flush the caller may observe the data
    /// selected by `view`.
    pub fn sync(&mut self, view: ViewId) -> Result<(), RecordError> {
        let view = self.views.get(&view).ok_or(RecordError::UnknownView(view))?.clone();
        self.instructions.push(Instruction::lifecycle(Opcode::Sync, view));
        Ok(())
    }

    /// Destroys a view handle.
    ///
    /// The handle becomes unusable immediately; the reference it held on its base is dropped
    /// when the buffered instruction reaches a successful flush.
    pub fn discard(&mut self, view: ViewId) -> Result<(), RecordError> {
        let descriptor = self.views.remove(&view).ok_or(RecordError::UnknownView(view))?;
        self.pending_modifiers.retain(|(pending, _)| *pending != view);
        self.instructions.push(Instruction::lifecycle(Opcode::Discard, descriptor));
        Ok(())
    }

    /// Destroys a base handle, releasing the creation reference.
    pub fn free(&mut self, base: BaseId) -> Result<(), RecordError> {
        let entry = self.bases.get(&base).ok_or(RecordError::UnknownBase(base))?;
        let view = View::flat(base, entry.element_type(), entry.num_elements());
        self.instructions.push(Instruction::lifecycle(Opcode::Free, view));
        Ok(())
    }

    /// Hands the live copy of `base` back to the upstream caller.
    pub fn release(&mut self, base: BaseId) -> Result<(), RecordError> {
        let entry = self.bases.get(&base).ok_or(RecordError::UnknownBase(base))?;
        let view = View::flat(base, entry.element_type(), entry.num_elements());
        self.instructions.push(Instruction::lifecycle(Opcode::Release, view));
        Ok(())
    }

    // SLIDING VIEWS
    // --------------------------------------------------------------------------------------------

    /// Slides `view` by `step` elements along `dim` on every iteration of a repeated batch.
    ///
    /// The modifier is tagged onto the next recorded instruction that references the view. A
    /// slid view is treated as conflicting with every view of its base from here on.
    pub fn slide_view(
        &mut self,
        view: ViewId,
        dim: usize,
        step: i64,
    ) -> Result<(), RecordError> {
        self.mark_dynamic(view, dim)?;
        self.pending_modifiers.push((view, PendingModifier::Slide { dim, step }));
        Ok(())
    }

    /// Resets the sliding offset of `view` along `dim` after `max` iterations.
    pub fn add_reset(&mut self, view: ViewId, dim: usize, max: u64) -> Result<(), RecordError> {
        self.mark_dynamic(view, dim)?;
        self.pending_modifiers.push((view, PendingModifier::Reset { dim, max }));
        Ok(())
    }

    fn mark_dynamic(&mut self, view: ViewId, dim: usize) -> Result<(), RecordError> {
        let entry = self.views.get_mut(&view).ok_or(RecordError::UnknownView(view))?;
        if dim >= entry.rank() {
            return Err(RecordError::ModifierDimOutOfRange { dim, rank: entry.rank() });
        }
        entry.mark_dynamic();
        Ok(())
    }

    fn attach_pending_modifiers(
        &mut self,
        instruction: &mut Instruction,
        operands: &[OperandRef],
    ) {
        if self.pending_modifiers.is_empty() {
            return;
        }
        let mut remaining = Vec::new();
        for (view, modifier) in self.pending_modifiers.drain(..) {
            let slot = operands
                .iter()
                .position(|operand| matches!(operand, OperandRef::View(id) if *id == view));
            match slot {
                Some(slot) => instruction.attach_modifier(modifier.into_view_modifier(slot)),
                None => remaining.push((view, modifier)),
            }
        }
        self.pending_modifiers = remaining;
    }

    // FLUSHING
    // --------------------------------------------------------------------------------------------

    /// Drains the recorded instructions into the executor and awaits completion.
    ///
    /// Flushing an empty recorder is a no-op and returns success.
    pub fn flush(&mut self, executor: &mut dyn Executor) -> Result<(), FlushError> {
        self.flush_inner(executor, 1, None)
    }

    /// Flushes, instructing the executor to run the batch `repeats` times.
    pub fn flush_and_repeat(
        &mut self,
        executor: &mut dyn Executor,
        repeats: u64,
    ) -> Result<(), FlushError> {
        self.flush_inner(executor, repeats, None)
    }

    /// Flushes, instructing the executor to run the batch until `condition` reads false or
    /// `repeats` iterations have run.
    pub fn flush_and_repeat_while(
        &mut self,
        executor: &mut dyn Executor,
        repeats: u64,
        condition: ViewId,
    ) -> Result<(), FlushError> {
        let view =
            self.views.get(&condition).ok_or(FlushError::UnknownView(condition))?.clone();
        if view.element_type() != ElementType::Bool {
            return Err(FlushError::ConditionNotBoolean(condition));
        }
        self.flush_inner(executor, repeats, Some(view))
    }

    /// Returns the number of times flush has been called.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Returns the number of instructions currently buffered.
    pub fn num_recorded(&self) -> usize {
        self.instructions.len()
    }

    #[tracing::instrument(skip_all, fields(instructions = self.instructions.len(), repeats))]
    fn flush_inner(
        &mut self,
        executor: &mut dyn Executor,
        repeats: u64,
        condition: Option<View>,
    ) -> Result<(), FlushError> {
        self.flush_count += 1;
        if self.instructions.is_empty() {
            return Ok(());
        }

        // Rewrite a working copy so a failed flush leaves the log untouched for retry.
        let mut work = self.instructions.clone();
        let effects = LifecycleManager::prepare(&mut work, &self.bases);
        if effects.valid_instructions() == 0 {
            effects.commit(&mut self.bases);
            self.instructions.clear();
            return Ok(());
        }

        let graph = FlowGraph::build(&work, self.oracle.as_ref())?;
        #[cfg(feature = "std")]
        if let Some(path) = self.options.debug_graph_path()
            && let Err(err) = graph.dump_to_file(path)
        {
            tracing::warn!(path = %path.display(), %err, "failed to dump flow graph");
        }

        // Emission order: sub-DAGs by id (a topological order, since sub-DAGs share no data),
        // recording order within each sub-DAG.
        let mut ordered = Vec::with_capacity(work.len());
        let mut segments = Vec::with_capacity(graph.num_sub_dags());
        for group in graph.schedule() {
            let start = ordered.len();
            for index in group {
                ordered.push(work[index].clone());
            }
            segments.push(start..ordered.len());
        }

        let batch = Batch::new(ordered, segments, repeats, condition);
        tracing::debug!(
            instructions = batch.instructions().len(),
            sub_dags = batch.num_segments(),
            "executing batch"
        );
        executor.execute(&batch).map_err(FlushError::ExecutorFailure)?;

        effects.commit(&mut self.bases);
        self.instructions.clear();
        Ok(())
    }

    // DATA ACCESS
    // --------------------------------------------------------------------------------------------

    /// Materializes and returns a raw pointer to the data selected by `view`.
    ///
    /// This records a `Sync` on the view, flushes, and then fetches the pointer from the
    /// executor. See [`Executor::data_get`] for the flag semantics.
    pub fn data_get(
        &mut self,
        executor: &mut dyn Executor,
        view: ViewId,
        copy_to_host: bool,
        force_alloc: bool,
        nullify: bool,
    ) -> Result<*mut u8, FlushError> {
        let descriptor = self.views.get(&view).ok_or(FlushError::UnknownView(view))?.clone();
        self.instructions.push(Instruction::lifecycle(Opcode::Sync, descriptor.clone()));
        self.flush_inner(executor, 1, None)?;

        let ptr = executor
            .data_get(&descriptor, copy_to_host, force_alloc, nullify)
            .map_err(FlushError::ExecutorFailure)?;
        if let Some(base) = self.bases.get_mut(&descriptor.base()) {
            if nullify {
                base.set_state(AllocState::Unallocated);
            } else if copy_to_host {
                base.set_state(AllocState::Host);
            }
        }
        Ok(ptr)
    }

    /// Hands a caller-allocated buffer to the executor as the backing store of `view`'s base.
    pub fn data_set(
        &mut self,
        executor: &mut dyn Executor,
        view: ViewId,
        host_ptr: bool,
        ptr: *mut u8,
    ) -> Result<(), FlushError> {
        let descriptor = self.views.get(&view).ok_or(FlushError::UnknownView(view))?.clone();
        executor.data_set(&descriptor, host_ptr, ptr).map_err(FlushError::ExecutorFailure)?;
        if let Some(base) = self.bases.get_mut(&descriptor.base()) {
            base.set_state(if host_ptr { AllocState::Host } else { AllocState::Device });
        }
        Ok(())
    }

    // EXECUTOR PASS-THROUGHS
    // --------------------------------------------------------------------------------------------

    /// Sends an opaque message through the executor stack and returns its reply.
    pub fn message(&mut self, executor: &mut dyn Executor, msg: &str) -> String {
        executor.message(msg)
    }

    /// Registers a user-defined extension function with the executor.
    ///
    /// The returned id becomes recordable as [`Opcode::Extension`].
    pub fn register_user_function(
        &mut self,
        executor: &mut dyn Executor,
        name: &str,
    ) -> Result<ExtensionId, ExecutorError> {
        let id = executor.register_user_function(name)?;
        self.extensions.insert(id);
        Ok(id)
    }

    // SHAPE CHECKS
    // --------------------------------------------------------------------------------------------

    /// Re-raises façade-level shape errors at record time.
    ///
    /// Element-wise instructions require every view operand to share the output's shape
    /// (broadcasting is expressed upstream with stride-0 views); reductions require their axis
    /// immediate to address an existing input dimension.
    fn check_shapes(&self, opcode: Opcode, operands: &[Operand]) -> Result<(), RecordError> {
        let Some(Operand::View(output)) = operands.first() else {
            return Ok(());
        };
        if opcode.is_elementwise() {
            for operand in &operands[1..] {
                if let Operand::View(view) = operand
                    && view.shape() != output.shape()
                {
                    return Err(RecordError::ShapeMismatch {
                        expected: output.shape().into(),
                        actual: view.shape().into(),
                    });
                }
            }
        }
        if opcode.is_reduction()
            && let (Some(Operand::View(input)), Some(Operand::Constant(Constant::Int64(axis)))) =
                (operands.get(1), operands.get(2))
            && (*axis < 0 || *axis as usize >= input.rank())
        {
            return Err(RecordError::ReductionAxisOutOfRange { axis: *axis, rank: input.rank() });
        }
        Ok(())
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use arrayflow_core::Owner;

    use super::*;
    use crate::test_utils::CapturingExecutor;

    fn recorder() -> Recorder {
        Recorder::new(RuntimeOptions::default())
    }

    /// Records `out = out + constant` over a fresh flat view of `base`.
    fn record_add(
        recorder: &mut Recorder,
        executor: &mut CapturingExecutor,
        base: BaseId,
        len: u64,
        constant: i32,
    ) -> ViewId {
        let view = recorder.new_view(base, 0, &[len], &[1]).unwrap();
        recorder
            .record(
                executor,
                Opcode::Add,
                &[view.into(), view.into(), Constant::Int32(constant).into()],
            )
            .unwrap();
        view
    }

    #[test]
    fn flush_of_empty_recorder_is_a_noop() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        recorder.flush(&mut executor).unwrap();
        recorder.flush(&mut executor).unwrap();
        assert!(executor.batches().is_empty());
        assert_eq!(recorder.flush_count(), 2);
    }

    #[test]
    fn batch_threshold_triggers_flush() {
        let mut recorder = Recorder::new(RuntimeOptions::new(10, 2).unwrap());
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);

        record_add(&mut recorder, &mut executor, base, 8, 1);
        assert!(executor.batches().is_empty());
        record_add(&mut recorder, &mut executor, base, 8, 2);

        assert_eq!(executor.batches().len(), 1);
        assert_eq!(recorder.num_recorded(), 0);
    }

    #[test]
    fn record_error_leaves_the_log_unchanged() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let ints = recorder.new_base(ElementType::Int32, 8);
        let floats = recorder.new_base(ElementType::Float32, 8);
        let out = recorder.new_view(ints, 0, &[8], &[1]).unwrap();
        let input = recorder.new_view(floats, 0, &[8], &[1]).unwrap();

        let err = recorder
            .record(
                &mut executor,
                Opcode::Add,
                &[out.into(), input.into(), Constant::Int32(1).into()],
            )
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidInstruction(_)));
        assert_eq!(recorder.num_recorded(), 0);
    }

    #[test]
    fn shape_mismatch_is_raised_at_record_time() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);
        let out = recorder.new_view(base, 0, &[8], &[1]).unwrap();
        let narrow = recorder.new_view(base, 0, &[4], &[1]).unwrap();

        let err = recorder
            .record(
                &mut executor,
                Opcode::Add,
                &[out.into(), narrow.into(), Constant::Int32(1).into()],
            )
            .unwrap_err();
        assert!(matches!(err, RecordError::ShapeMismatch { .. }));
    }

    #[test]
    fn lifecycle_opcodes_are_not_directly_recordable() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);
        let view = recorder.new_view(base, 0, &[8], &[1]).unwrap();

        let err = recorder.record(&mut executor, Opcode::Sync, &[view.into()]).unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedOpcode(Opcode::Sync)));
    }

    #[test]
    fn view_bounds_are_validated() {
        let mut recorder = recorder();
        let base = recorder.new_base(ElementType::Int32, 8);
        let err = recorder.new_view(base, 4, &[8], &[1]).unwrap_err();
        assert!(matches!(err, RecordError::ViewOutOfBounds { .. }));
        // A failed view registration holds no reference.
        assert_eq!(recorder.base(base).unwrap().refcount(), 1);
    }

    #[test]
    fn executor_failure_keeps_the_batch_for_retry() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);
        record_add(&mut recorder, &mut executor, base, 8, 1);

        executor.fail_next();
        let err = recorder.flush(&mut executor).unwrap_err();
        assert!(matches!(err, FlushError::ExecutorFailure(_)));

        // No speculative ownership update persisted, and the log is intact.
        assert_eq!(recorder.base(base).unwrap().owner(), Owner::Upstream);
        assert_eq!(recorder.num_recorded(), 1);

        // The caller may retry; the batch then goes through.
        recorder.flush(&mut executor).unwrap();
        assert_eq!(executor.batches().len(), 1);
        assert_eq!(recorder.base(base).unwrap().owner(), Owner::Downstream);
    }

    #[test]
    fn extension_functions_must_be_registered() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);
        let view = recorder.new_view(base, 0, &[8], &[1]).unwrap();

        let unregistered = Opcode::Extension(ExtensionId::new(9));
        let err = recorder.record(&mut executor, unregistered, &[view.into()]).unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedExtensionFunction(_)));

        let id = recorder.register_user_function(&mut executor, "matmul").unwrap();
        recorder
            .record(&mut executor, Opcode::Extension(id), &[view.into(), view.into()])
            .unwrap();
        assert_eq!(recorder.num_recorded(), 1);
    }

    #[test]
    fn repeat_condition_must_be_a_boolean_view() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let ints = recorder.new_base(ElementType::Int32, 1);
        let cond = recorder.new_view(ints, 0, &[1], &[1]).unwrap();

        let err = recorder.flush_and_repeat_while(&mut executor, 10, cond).unwrap_err();
        assert!(matches!(err, FlushError::ConditionNotBoolean(_)));
    }

    #[test]
    fn repeated_flush_annotates_the_batch() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let flags = recorder.new_base(ElementType::Bool, 1);
        let cond = recorder.new_view(flags, 0, &[1], &[1]).unwrap();
        let base = recorder.new_base(ElementType::Int32, 8);
        record_add(&mut recorder, &mut executor, base, 8, 1);

        recorder.flush_and_repeat_while(&mut executor, 10, cond).unwrap();
        let batch = executor.only_batch();
        assert_eq!(batch.repeats(), 10);
        assert_eq!(batch.condition().unwrap().base(), flags);
    }

    #[test]
    fn slide_modifier_attaches_to_the_next_use() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 16);
        let window = recorder.new_view(base, 0, &[4], &[1]).unwrap();
        let out = recorder.new_view(base, 8, &[4], &[1]).unwrap();

        recorder.slide_view(window, 0, 4).unwrap();
        assert!(recorder.view(window).unwrap().is_dynamic());

        recorder
            .record(
                &mut executor,
                Opcode::Add,
                &[out.into(), window.into(), Constant::Int32(1).into()],
            )
            .unwrap();
        recorder.flush_and_repeat(&mut executor, 3).unwrap();

        let batch = executor.only_batch();
        assert_eq!(batch.repeats(), 3);
        let modifiers = batch.instructions()[0].modifiers();
        assert_eq!(modifiers, &[ViewModifier::Slide { slot: 1, dim: 0, step: 4 }]);
        // The slid window serializes the batch into a single segment despite disjoint slices.
        assert_eq!(batch.num_segments(), 1);
    }

    #[test]
    fn data_get_forces_materialization() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        let base = recorder.new_base(ElementType::Int32, 8);
        let view = record_add(&mut recorder, &mut executor, base, 8, 1);

        let ptr = recorder.data_get(&mut executor, view, true, true, false).unwrap();
        assert!(ptr.is_null());

        // The add and the implicit sync flushed as one batch.
        let batch = executor.only_batch();
        assert_eq!(batch.instructions().len(), 2);
        assert_eq!(batch.instructions().last().unwrap().opcode(), Opcode::Sync);
        assert_eq!(recorder.base(base).unwrap().state(), AllocState::Host);
    }

    #[test]
    fn message_passes_through() {
        let mut recorder = recorder();
        let mut executor = CapturingExecutor::new();
        assert_eq!(recorder.message(&mut executor, "statistics"), "statistics");
    }
}
