use crate::broker::{Action, Step};

/// Cursor over the actions of one broker step.
pub struct ActionsHandler<'a> {
    actions: &'a [Action],
    position: usize,
}

impl<'a> ActionsHandler<'a> {
    pub fn new(step: &'a Step) -> Self {
        Self {
            actions: &step.actions,
            position: 0,
        }
    }

    /// Next action to run, or `None` once the script is exhausted.
    pub fn next_action(&mut self) -> Option<&'a Action> {
        let action = self.actions.get(self.position)?;
        self.position += 1;
        Some(action)
    }

    pub fn remaining(&self) -> usize {
        self.actions.len().saturating_sub(self.position)
    }
}
