//! Event scheduler.
//!
//! Grounded on `examples/original_source/trunk/nes/clock.h` / `clock.cpp`
//! (`CClock`, `SEvent`, the doubly-linked active-event list with a
//! `SafeNext` pointer so a callback can disable the event after itself
//! without corrupting iteration, and `Reset` rebasing all event times when
//! the clock wraps). The raw `Previous`/`Next` pointers don't translate
//! safely, so the active list here is index-linked into a `Vec<EventSlot>`
//! instead — same shape, no unsafe.
//!
//! `register`/`enable`/`disable`/`set_time`/`run`/`reset_base` name the same
//! operations spec.md §4.1 lists for the scheduler. Events dispatch to a
//! small closed `EventKind` enum rather than the original's type-erased
//! `std::function`, since every event this core needs is known up front.

/// The recurring events the scheduler drives. Kept as a flat enum (rather
/// than a boxed callback) because spec.md's scope only names these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// APU frame sequencer half-step.
    FrameIrqSequencer,
    /// DMC sample byte due to be fetched.
    DmcFetch,
    /// Mapper scanline IRQ counter (MMC3-style A12 counter).
    MapperIrqCounter,
    /// PPU scanline/frame boundary housekeeping.
    PpuFrameBoundary,
}

struct EventSlot {
    kind: EventKind,
    enabled: bool,
    time: i64,
    next: Option<usize>,
}

/// A scheduler over a shared master-cycle timeline.
///
/// Unlike the original's `Start(WaitFunc)` loop (which drove the whole
/// emulator from inside the clock), this crate's [`crate::nes::Nes`] owns
/// its own step loop and only asks the clock "what's due" each master
/// cycle, matching the cooperative single-threaded model spec.md §5
/// describes.
pub struct Clock {
    slots: Vec<EventSlot>,
    head: Option<usize>,
    time: i64,
}

impl Clock {
    pub fn new() -> Self {
        Clock { slots: Vec::new(), head: None, time: 0 }
    }

    /// Register a new event, disabled, with no scheduled time. Returns a
    /// handle to use with `enable`/`disable`/`set_time`.
    pub fn register(&mut self, kind: EventKind) -> usize {
        self.slots.push(EventSlot { kind, enabled: false, time: i64::MAX, next: None });
        self.slots.len() - 1
    }

    /// Activate an event, inserting it into the active list in time order.
    pub fn enable(&mut self, handle: usize) {
        if self.slots[handle].enabled {
            return;
        }
        self.slots[handle].enabled = true;
        self.relink(handle);
    }

    /// Deactivate an event, removing it from the active list.
    pub fn disable(&mut self, handle: usize) {
        self.slots[handle].enabled = false;
        self.unlink(handle);
    }

    /// Set an event's next firing time (absolute, on the clock's timeline)
    /// and re-sort it into the active list.
    pub fn set_time(&mut self, handle: usize, time: i64) {
        self.slots[handle].time = time;
        if self.slots[handle].enabled {
            self.unlink(handle);
            self.relink(handle);
        }
    }

    fn unlink(&mut self, handle: usize) {
        let mut cursor = self.head;
        let mut prev: Option<usize> = None;
        while let Some(idx) = cursor {
            if idx == handle {
                let next = self.slots[idx].next;
                match prev {
                    Some(p) => self.slots[p].next = next,
                    None => self.head = next,
                }
                self.slots[idx].next = None;
                return;
            }
            prev = Some(idx);
            cursor = self.slots[idx].next;
        }
    }

    fn relink(&mut self, handle: usize) {
        let time = self.slots[handle].time;
        let mut cursor = self.head;
        let mut prev: Option<usize> = None;
        while let Some(idx) = cursor {
            if self.slots[idx].time > time {
                break;
            }
            prev = Some(idx);
            cursor = self.slots[idx].next;
        }
        self.slots[handle].next = cursor;
        match prev {
            Some(p) => self.slots[p].next = Some(handle),
            None => self.head = Some(handle),
        }
    }

    /// Time of the next active event, or `None` if nothing is scheduled.
    pub fn next_event_time(&self) -> Option<i64> {
        self.head.map(|idx| self.slots[idx].time)
    }

    /// Advance the clock to `time` and drain (firing via the callback) every
    /// active event whose time has arrived, earliest first. The callback
    /// may call `set_time`/`disable` on the fired handle (matching the
    /// original's pattern of a one-shot event rescheduling itself).
    pub fn run(&mut self, time: i64, mut on_fire: impl FnMut(&mut Clock, usize, EventKind)) {
        self.time = time;
        loop {
            let Some(idx) = self.head else { break };
            if self.slots[idx].time > self.time {
                break;
            }
            let kind = self.slots[idx].kind;
            self.unlink(idx);
            self.slots[idx].enabled = false;
            on_fire(self, idx, kind);
        }
    }

    /// Rebase every scheduled time against a new zero point, the way the
    /// original's `Reset` keeps relative firing order when the master
    /// counter wraps or a component resets mid-run.
    pub fn reset_base(&mut self) {
        for slot in &mut self.slots {
            if slot.enabled {
                slot.time -= self.time;
            }
        }
        self.time = 0;
    }

    pub fn time(&self) -> i64 {
        self.time
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_events_in_time_order() {
        let mut clock = Clock::new();
        let a = clock.register(EventKind::FrameIrqSequencer);
        let b = clock.register(EventKind::DmcFetch);
        clock.set_time(a, 100);
        clock.set_time(b, 50);
        clock.enable(a);
        clock.enable(b);

        let mut fired = Vec::new();
        clock.run(100, |_clock, _handle, kind| fired.push(kind));

        assert_eq!(fired, vec![EventKind::DmcFetch, EventKind::FrameIrqSequencer]);
    }

    #[test]
    fn disabled_events_never_fire() {
        let mut clock = Clock::new();
        let a = clock.register(EventKind::MapperIrqCounter);
        clock.set_time(a, 10);
        let mut fired = 0;
        clock.run(100, |_c, _h, _k| fired += 1);
        assert_eq!(fired, 0);
    }

    #[test]
    fn event_can_reschedule_itself() {
        let mut clock = Clock::new();
        let a = clock.register(EventKind::PpuFrameBoundary);
        clock.set_time(a, 10);
        clock.enable(a);

        let mut count = 0;
        clock.run(10, |c, h, _k| {
            count += 1;
            if count < 3 {
                c.set_time(h, c.time() + 10);
                c.enable(h);
            }
        });
        assert_eq!(count, 1);

        clock.run(20, |c, h, _k| {
            count += 1;
            if count < 3 {
                c.set_time(h, c.time() + 10);
                c.enable(h);
            }
        });
        assert_eq!(count, 2);
    }
}
