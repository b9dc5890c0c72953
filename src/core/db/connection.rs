/// Connection Slots Module
///
/// Ordered storage for the links a facade has opened, plus the pointer to the
/// active one. A link's index is its identity: slots are never removed, a
/// closed link leaves an empty slot behind.

use crate::core::{DbError, Result};

/// Links opened by one facade, in connection order.
#[derive(Debug)]
pub struct ConnectionSet<L> {
    slots: Vec<Option<L>>,
    active: Option<usize>,
}

impl<L> Default for ConnectionSet<L> {
    fn default() -> Self {
        ConnectionSet {
            slots: Vec::new(),
            active: None,
        }
    }
}

impl<L> ConnectionSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a link and makes it active. Returns its index.
    pub fn push(&mut self, link: L) -> usize {
        self.slots.push(Some(link));
        let index = self.slots.len() - 1;
        self.active = Some(index);
        index
    }

    /// Points the active pointer at an open link
    pub fn select(&mut self, index: usize) -> Result<()> {
        match self.slots.get(index) {
            Some(Some(_)) => {
                self.active = Some(index);
                Ok(())
            }
            Some(None) => Err(DbError::State(format!("connection {} is closed", index))),
            None => Err(DbError::State(format!(
                "no connection with index {} ({} open)",
                index,
                self.slots.len()
            ))),
        }
    }

    /// Number of links ever opened, closed ones included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_open(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn active(&self) -> Result<&L> {
        let index = self.require_active()?;
        self.slots[index]
            .as_ref()
            .ok_or_else(|| DbError::State(format!("active connection {} is closed", index)))
    }

    pub fn active_mut(&mut self) -> Result<&mut L> {
        let index = self.require_active()?;
        self.slots[index]
            .as_mut()
            .ok_or_else(|| DbError::State(format!("active connection {} is closed", index)))
    }

    /// Removes the active link from its slot, leaving the slot empty.
    pub fn take_active(&mut self) -> Option<L> {
        let index = self.active?;
        self.slots.get_mut(index)?.take()
    }

    /// Removes every open link, leaving all slots empty.
    pub fn take_all(&mut self) -> Vec<L> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    fn require_active(&self) -> Result<usize> {
        match self.active {
            Some(index) if index < self.slots.len() => Ok(index),
            _ => Err(DbError::State("no active connection".to_string())),
        }
    }
}
