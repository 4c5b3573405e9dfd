//! Per-record debouncing of text edits.
//!
//! Each record id owns a slot holding at most one armed timer and the value
//! it will send. Re-arming aborts the old timer and bumps the slot's
//! generation; a timer only sends if its generation is still current, so a
//! timer that woke up just as it was being replaced sends nothing. Once a
//! timer has fired its send is never cancelled. Sends for the same id queue
//! on a per-slot lock so an older value cannot land after a newer one.
//!
//! `edit` spawns onto the current tokio runtime and must be called from
//! inside one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;

use crate::error::StoreError;
use crate::types::TodoId;

/// Receives the settled value of an edit stream.
#[async_trait]
pub trait EditSink: Send + Sync + 'static {
    async fn send(&self, id: TodoId, value: String) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    /// A timer is armed; the record has unsent input.
    Pending,
    /// The timer fired and the send has not answered yet.
    Sending,
}

struct Armed {
    value: String,
    timer: AbortHandle,
}

struct Slot {
    generation: u64,
    armed: Option<Armed>,
    in_flight: usize,
    /// Newest value handed to the sink and not yet answered.
    sending: Option<String>,
    send_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: 0,
            armed: None,
            in_flight: 0,
            sending: None,
            send_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Disarm and count the value as in flight.
    fn take_armed(&mut self) -> Option<Armed> {
        let armed = self.armed.take()?;
        self.in_flight += 1;
        self.sending = Some(armed.value.clone());
        Some(armed)
    }

    fn is_idle(&self) -> bool {
        self.armed.is_none() && self.in_flight == 0
    }
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    by_id: HashMap<TodoId, Slot>,
}

struct Inner<S> {
    window: Duration,
    sink: S,
    slots: Mutex<Slots>,
}

pub struct Debouncer<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Debouncer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EditSink> Debouncer<S> {
    pub fn new(window: Duration, sink: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                sink,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// Record a keystroke: (re)arm the timer for `id` with `value`.
    pub fn edit(&self, id: TodoId, value: impl Into<String>) {
        let mut slots = self.inner.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let slot = slots.by_id.entry(id).or_insert_with(Slot::new);
        if let Some(previous) = slot.armed.take() {
            previous.timer.abort();
        }
        slot.generation = generation;

        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.fire(id, generation).await;
        });
        slot.armed = Some(Armed {
            value: value.into(),
            timer: timer.abort_handle(),
        });
    }

    /// Drop the armed timer for `id`, if any. Sends already in flight run to
    /// completion.
    pub fn cancel(&self, id: TodoId) {
        let mut slots = self.inner.lock();
        if let Some(slot) = slots.by_id.get_mut(&id) {
            if let Some(armed) = slot.armed.take() {
                armed.timer.abort();
                tracing::debug!(%id, "cancelled pending edit");
            }
            if slot.is_idle() {
                slots.by_id.remove(&id);
            }
        }
    }

    /// Send every armed value now instead of waiting out its window.
    pub async fn flush(&self) {
        let due: Vec<(TodoId, String, Arc<tokio::sync::Mutex<()>>)> = {
            let mut slots = self.inner.lock();
            slots
                .by_id
                .iter_mut()
                .filter_map(|(id, slot)| {
                    let armed = slot.take_armed()?;
                    armed.timer.abort();
                    Some((*id, armed.value, Arc::clone(&slot.send_lock)))
                })
                .collect()
        };
        for (id, value, send_lock) in due {
            self.inner.deliver(id, value, send_lock).await;
        }
    }

    pub fn state(&self, id: TodoId) -> EditState {
        let slots = self.inner.lock();
        match slots.by_id.get(&id) {
            Some(slot) if slot.armed.is_some() => EditState::Pending,
            Some(slot) if slot.in_flight > 0 => EditState::Sending,
            _ => EditState::Idle,
        }
    }

    /// The value waiting for its timer, if any.
    pub fn pending_value(&self, id: TodoId) -> Option<String> {
        let slots = self.inner.lock();
        slots
            .by_id
            .get(&id)
            .and_then(|slot| slot.armed.as_ref())
            .map(|armed| armed.value.clone())
    }

    /// Latest value per id that the sink has not acknowledged yet: the armed
    /// value if there is one, otherwise the newest one in flight.
    pub fn unsettled_values(&self) -> HashMap<TodoId, String> {
        let slots = self.inner.lock();
        slots
            .by_id
            .iter()
            .filter_map(|(id, slot)| {
                let value = match &slot.armed {
                    Some(armed) => Some(&armed.value),
                    None => slot.sending.as_ref(),
                };
                value.map(|value| (*id, value.clone()))
            })
            .collect()
    }
}

impl<S: EditSink> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(&self, id: TodoId, generation: u64) {
        let due = {
            let mut slots = self.lock();
            slots
                .by_id
                .get_mut(&id)
                .filter(|slot| slot.generation == generation)
                .and_then(|slot| {
                    let armed = slot.take_armed()?;
                    Some((armed.value, Arc::clone(&slot.send_lock)))
                })
        };
        if let Some((value, send_lock)) = due {
            self.deliver(id, value, send_lock).await;
        }
    }

    /// The slot was moved to Sending by `take_armed`; this sends and moves it
    /// back to Idle.
    async fn deliver(&self, id: TodoId, value: String, send_lock: Arc<tokio::sync::Mutex<()>>) {
        let result = {
            let _turn = send_lock.lock().await;
            tracing::debug!(%id, "sending debounced edit");
            self.sink.send(id, value).await
        };

        {
            let mut slots = self.lock();
            if let Some(slot) = slots.by_id.get_mut(&id) {
                slot.in_flight -= 1;
                if slot.in_flight == 0 {
                    slot.sending = None;
                }
                if slot.is_idle() {
                    slots.by_id.remove(&id);
                }
            }
        }

        if let Err(err) = result {
            tracing::warn!(%id, error = %err, "debounced edit failed");
        }
    }
}
