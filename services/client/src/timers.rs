//! Named Timer Scheduler
//!
//! The interaction loop juggles four independent timers. Instead of ad
//! hoc handles, the scheduler keys every timer by purpose: arming a
//! purpose aborts whatever was pending under it, so there is at most one
//! live timer per purpose by construction. Every fire carries a
//! generation stamp; a fire whose stamp no longer matches the armed slot
//! is stale and must be discarded. Both layers exist because an abort
//! can race a send: the stamp catches what the abort misses.

use crate::event::Event;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The four client-side timers, keyed by what they are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Delay between the alarm trigger and the session start call.
    Countdown,
    /// Re-prompt the server for a fresh AWAKENING line on user idleness.
    IdleNudge,
    /// Grace delay before hands-free audio capture begins.
    AutoRecord,
    /// Grace window after a failure before auto-submitting an empty
    /// attempt to force a fresh prompt.
    SilentRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub purpose: TimerPurpose,
    pub generation: u64,
}

struct Slot {
    handle: JoinHandle<()>,
    generation: u64,
}

pub struct Scheduler {
    events: mpsc::UnboundedSender<Event>,
    slots: HashMap<TimerPurpose, Slot>,
    next_generation: u64,
}

impl Scheduler {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            slots: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arms `purpose` to fire after `delay`, superseding any pending
    /// timer of the same purpose.
    pub fn arm(&mut self, purpose: TimerPurpose, delay: Duration) {
        self.cancel(purpose);
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Timer(TimerFired {
                purpose,
                generation,
            }));
        });
        self.slots.insert(
            purpose,
            Slot {
                handle,
                generation,
            },
        );
    }

    pub fn cancel(&mut self, purpose: TimerPurpose) {
        if let Some(slot) = self.slots.remove(&purpose) {
            slot.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }

    /// Consumes a fire event. Returns true when the fire matches the
    /// currently armed slot (which it then clears); a stale fire returns
    /// false and must be ignored by the caller.
    pub fn acknowledge(&mut self, fired: TimerFired) -> bool {
        match self.slots.get(&fired.purpose) {
            Some(slot) if slot.generation == fired.generation => {
                self.slots.remove(&fired.purpose);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, purpose: TimerPurpose) -> bool {
        self.slots.contains_key(&purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (Scheduler, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Scheduler::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<TimerFired> {
        let mut fired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::Timer(f) = event {
                fired.push(f);
            }
        }
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_fires_after_delay() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::IdleNudge, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        let fired = drain(&mut rx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].purpose, TimerPurpose::IdleNudge);
        assert!(scheduler.acknowledge(fired[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_supersedes_previous_timer() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::IdleNudge, Duration::from_secs(30));
        scheduler.arm(TimerPurpose::IdleNudge, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let fired = drain(&mut rx);
        // Exactly one pending timer survived the double arm.
        assert_eq!(fired.len(), 1);
        assert!(scheduler.acknowledge(fired[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::SilentRetry, Duration::from_secs(8));
        scheduler.cancel(TimerPurpose::SilentRetry);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!scheduler.is_armed(TimerPurpose::SilentRetry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_is_rejected() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::AutoRecord, Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(3)).await;
        let fired = drain(&mut rx);
        assert_eq!(fired.len(), 1);

        // Re-armed after the fire was queued but before it was handled:
        // the queued fire is now stale.
        scheduler.arm(TimerPurpose::AutoRecord, Duration::from_secs(2));
        assert!(!scheduler.acknowledge(fired[0]));
        assert!(scheduler.is_armed(TimerPurpose::AutoRecord));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_every_purpose() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::Countdown, Duration::from_secs(3));
        scheduler.arm(TimerPurpose::IdleNudge, Duration::from_secs(30));
        scheduler.arm(TimerPurpose::AutoRecord, Duration::from_secs(2));
        scheduler.arm(TimerPurpose::SilentRetry, Duration::from_secs(8));

        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purposes_are_independent() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.arm(TimerPurpose::IdleNudge, Duration::from_secs(30));
        scheduler.arm(TimerPurpose::AutoRecord, Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let fired = drain(&mut rx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].purpose, TimerPurpose::AutoRecord);
        assert!(scheduler.is_armed(TimerPurpose::IdleNudge));
    }
}
