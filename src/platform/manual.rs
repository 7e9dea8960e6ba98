//! Hand-stepped scheduler for tests and the native simulation

use std::cell::RefCell;
use std::collections::VecDeque;

use super::{Scheduler, Task};

struct Timer {
    due_ms: u64,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct Queue {
    now_ms: u64,
    seq: u64,
    frames: VecDeque<Task>,
    timers: Vec<Timer>,
    refuse_frames: bool,
}

/// Queues tasks until the caller runs frames or advances the clock
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<Queue>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.queue.borrow().now_ms
    }

    pub fn pending_frames(&self) -> usize {
        self.queue.borrow().frames.len()
    }

    /// Make `next_frame` fail, as a throttled or detached window might
    pub fn set_refuse_frames(&self, refuse: bool) {
        self.queue.borrow_mut().refuse_frames = refuse;
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.borrow().timers.len()
    }

    /// Run every frame task queued before this call; tasks they queue wait
    /// for the next frame. Returns the number run.
    pub fn run_frame(&self) -> usize {
        let tasks: Vec<Task> = self.queue.borrow_mut().frames.drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Move the clock forward, firing due timers in order (including timers
    /// scheduled by earlier ones that fall inside the window)
    pub fn advance(&self, ms: u64) -> usize {
        let target = self.now_ms() + ms;
        let mut fired = 0;
        while let Some(task) = self.pop_due(target) {
            task();
            fired += 1;
        }
        self.queue.borrow_mut().now_ms = target;
        fired
    }

    /// Alternate frames and timers until nothing is queued or `max_steps`
    /// tasks ran. Returns the number of tasks run.
    pub fn run_until_idle(&self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            if self.pending_frames() > 0 {
                steps += self.run_frame();
                continue;
            }
            let next_due = self.queue.borrow().timers.iter().map(|t| t.due_ms).min();
            match next_due {
                Some(due) => {
                    let now = self.now_ms();
                    steps += self.advance(due.saturating_sub(now));
                }
                None => break,
            }
        }
        steps
    }

    fn pop_due(&self, target: u64) -> Option<Task> {
        let mut queue = self.queue.borrow_mut();
        let index = queue
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= target)
            .min_by_key(|(_, t)| (t.due_ms, t.seq))
            .map(|(i, _)| i)?;
        let timer = queue.timers.swap_remove(index);
        queue.now_ms = queue.now_ms.max(timer.due_ms);
        Some(timer.task)
    }
}

impl Scheduler for ManualScheduler {
    fn next_frame(&self, task: Task) -> bool {
        let mut queue = self.queue.borrow_mut();
        if queue.refuse_frames {
            return false;
        }
        queue.frames.push_back(task);
        true
    }

    fn after(&self, delay_ms: u32, task: Task) {
        let mut queue = self.queue.borrow_mut();
        let due_ms = queue.now_ms + u64::from(delay_ms);
        let seq = queue.seq;
        queue.seq += 1;
        queue.timers.push(Timer { due_ms, seq, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let make = move |name: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (seen, make)
    }

    #[test]
    fn test_frames_run_one_generation_at_a_time() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (seen, make) = log();
        let inner = scheduler.clone();
        let second = make("second");
        scheduler.next_frame(Box::new(move || {
            inner.next_frame(second);
        }));
        scheduler.next_frame(make("first"));

        assert_eq!(scheduler.run_frame(), 2);
        assert_eq!(*seen.borrow(), vec!["first"]);
        assert_eq!(scheduler.pending_frames(), 1);
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let scheduler = ManualScheduler::new();
        let (seen, make) = log();
        scheduler.after(300, make("c"));
        scheduler.after(100, make("a"));
        scheduler.after(100, make("b"));

        assert_eq!(scheduler.advance(99), 0);
        assert_eq!(scheduler.advance(1), 2);
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.now_ms(), 100);
        assert_eq!(scheduler.advance(500), 1);
        assert_eq!(scheduler.now_ms(), 600);
    }

    #[test]
    fn test_chained_timers_inside_window() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (seen, make) = log();
        let inner = scheduler.clone();
        let tail = make("tail");
        scheduler.after(100, Box::new(move || inner.after(50, tail)));

        assert_eq!(scheduler.advance(200), 2);
        assert_eq!(*seen.borrow(), vec!["tail"]);
    }

    #[test]
    fn test_run_until_idle() {
        let scheduler = ManualScheduler::new();
        let (seen, make) = log();
        scheduler.after(1_000, make("timer"));
        scheduler.next_frame(make("frame"));
        assert_eq!(scheduler.run_until_idle(10), 2);
        assert_eq!(*seen.borrow(), vec!["frame", "timer"]);
        assert_eq!(scheduler.now_ms(), 1_000);
        assert_eq!(scheduler.run_until_idle(10), 0);
    }

    #[test]
    fn test_refused_frames_drop_the_task() {
        let scheduler = ManualScheduler::new();
        let (seen, make) = log();
        scheduler.set_refuse_frames(true);
        assert!(!scheduler.next_frame(make("dropped")));
        assert_eq!(scheduler.pending_frames(), 0);

        scheduler.set_refuse_frames(false);
        assert!(scheduler.next_frame(make("kept")));
        scheduler.run_frame();
        assert_eq!(*seen.borrow(), vec!["kept"]);
    }
}
