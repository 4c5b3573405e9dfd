//! Position planning for drag-and-drop moves.
//!
//! A move removes one item and reinserts it elsewhere; the planner then
//! renumbers the whole list 0..N-1 so the batch sent to the store is a total
//! order matching the new sequence, regardless of duplicates or gaps in the
//! positions it started from.

use std::cmp::Ordering;

use crate::error::StoreError;
use crate::types::{PositionUpdate, Todo, TodoId};

/// Array move: the item at `from` ends up at index `to`.
pub fn move_item<T: Clone>(items: &[T], from: usize, to: usize) -> Result<Vec<T>, StoreError> {
    let len = items.len();
    if from >= len || to >= len {
        return Err(StoreError::Validation(format!(
            "move {from} -> {to} out of bounds for {len} items"
        )));
    }
    let mut moved = items.to_vec();
    let item = moved.remove(from);
    moved.insert(to, item);
    Ok(moved)
}

/// One update per id, numbered by index.
pub fn assign_positions(ids: &[TodoId]) -> Vec<PositionUpdate> {
    ids.iter()
        .enumerate()
        .map(|(index, &id)| PositionUpdate {
            id,
            new_position: index as i64,
        })
        .collect()
}

/// Plan the batch for moving `ids[from]` to index `to`.
///
/// Returns `Ok(None)` when the move changes nothing, in which case no request
/// should be sent.
pub fn plan_move(
    ids: &[TodoId],
    from: usize,
    to: usize,
) -> Result<Option<Vec<PositionUpdate>>, StoreError> {
    let moved = move_item(ids, from, to)?;
    if from == to {
        return Ok(None);
    }
    Ok(Some(assign_positions(&moved)))
}

/// Plan a drop of `active` onto the slot currently held by `over`.
pub fn plan_move_by_id(
    ids: &[TodoId],
    active: TodoId,
    over: TodoId,
) -> Result<Option<Vec<PositionUpdate>>, StoreError> {
    if active == over {
        return Ok(None);
    }
    let from = index_of(ids, active)?;
    let to = index_of(ids, over)?;
    plan_move(ids, from, to)
}

fn index_of(ids: &[TodoId], id: TodoId) -> Result<usize, StoreError> {
    ids.iter()
        .position(|candidate| *candidate == id)
        .ok_or(StoreError::not_found(id))
}

/// Rewrite positions on a local snapshot. Todos absent from the batch keep
/// their position.
pub fn apply_positions(todos: &mut [Todo], updates: &[PositionUpdate]) {
    for update in updates {
        if let Some(todo) = todos.iter_mut().find(|t| t.id == update.id) {
            todo.position = update.new_position;
        }
    }
}

/// Sort into display order. Ties on `position` fall back to creation time,
/// then id, so the order is total.
pub fn display_order(todos: &mut [Todo]) {
    todos.sort_by(compare_for_display);
}

fn compare_for_display(a: &Todo, b: &Todo) -> Ordering {
    a.position
        .cmp(&b.position)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}
