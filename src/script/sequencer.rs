use tracing::{info, warn};

use super::{ActionArena, ActionContext, ActionKind, PayloadHandle, ScriptError};

/// Inclusive range of step ids; `end` is never below `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    start: i32,
    end: i32,
}

impl StepRange {
    /// An `end` below `start` collapses the range to the single step `start`.
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn single(step: i32) -> Self {
        Self { start: step, end: step }
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn contains(&self, step: i32) -> bool {
        (self.start..=self.end).contains(&step)
    }
}

/// View of the sequencer's step state handed to actions during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCursor {
    current: i32,
    next: i32,
}

impl StepCursor {
    pub fn new(current: i32) -> Self {
        Self { current, next: current }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn next(&self) -> i32 {
        self.next
    }

    /// Requests `step` for the following pass. Later writes in the same pass win.
    pub fn jump_to(&mut self, step: i32) {
        self.next = step;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptAction {
    pub range: StepRange,
    pub payload: PayloadHandle,
}

#[derive(Debug)]
pub struct StepSequencer {
    actions: Vec<ScriptAction>,
    max_actions: usize,
    arena: ActionArena,
    current_step: i32,
}

impl StepSequencer {
    pub fn new(max_actions: usize, arena_capacity: usize) -> Self {
        Self {
            actions: Vec::with_capacity(max_actions),
            max_actions,
            arena: ActionArena::with_capacity(arena_capacity),
            current_step: 0,
        }
    }

    /// Appends an action evaluated whenever the current step lies in `range`.
    pub fn register(&mut self, range: StepRange, payload: ActionKind) -> Result<PayloadHandle, ScriptError> {
        if self.actions.len() >= self.max_actions {
            return Err(ScriptError::TooManyActions { capacity: self.max_actions });
        }
        let handle = self.arena.allocate(payload)?;
        self.actions.push(ScriptAction { range, payload: handle });
        Ok(handle)
    }

    /// Like [`register`](Self::register), but logs and drops the action on failure.
    pub fn register_or_warn(&mut self, range: StepRange, payload: ActionKind) -> Option<PayloadHandle> {
        let label = payload.label();
        match self.register(range, payload) {
            Ok(handle) => Some(handle),
            Err(err) => {
                let (start, end) = (range.start(), range.end());
                warn!(action = label, start, end, error = %err, "action_dropped");
                None
            }
        }
    }

    /// Runs every action whose range contains the current step, then applies the pending step.
    ///
    /// Membership is decided against the step at the start of the pass; navigation writes only
    /// become visible on the next call.
    pub fn evaluate(&mut self, ctx: &mut ActionContext<'_>) -> i32 {
        let mut cursor = StepCursor::new(self.current_step);
        for action in &self.actions {
            if !action.range.contains(cursor.current()) {
                continue;
            }
            if let Some(payload) = self.arena.get(action.payload) {
                payload.run(&mut cursor, ctx);
            }
        }
        if cursor.next() != self.current_step {
            info!(from = self.current_step, to = cursor.next(), "step_changed");
        }
        self.current_step = cursor.next();
        self.current_step
    }

    pub fn current_step(&self) -> i32 {
        self.current_step
    }

    pub fn set_current_step(&mut self, step: i32) {
        self.current_step = step;
    }

    pub fn active_actions(&self) -> impl Iterator<Item = &ScriptAction> + '_ {
        let step = self.current_step;
        self.actions.iter().filter(move |action| action.range.contains(step))
    }

    pub fn actions(&self) -> &[ScriptAction] {
        &self.actions
    }

    pub fn payload(&self, handle: PayloadHandle) -> Option<&ActionKind> {
        self.arena.get(handle)
    }

    /// Highest step covered by any registered action.
    pub fn last_step(&self) -> Option<i32> {
        self.actions.iter().map(|action| action.range.end()).max()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_actions
    }

    pub fn arena(&self) -> &ActionArena {
        &self.arena
    }
}
