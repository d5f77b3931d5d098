//! HostScheduler - cooperative virtual-time scheduler owned by the host.
//!
//! Tasks run to completion, one at a time. Ordering is fully determined by
//! `(due time, priority, registration sequence)`:
//!
//! ```text
//! t=0.000  ┬─ task A (Normal, seq 3)
//!          ├─ task B (Normal, seq 7)
//!          └─ pump   (Late,   seq 2)   <- runs after every Normal task at t
//! t=0.033  ┬─ ...
//! ```
//!
//! The scheduler is the only component that steps the shared clock.

use crate::error::CoreError;
use lockstep_env::{duration_from_secs, SteppableClock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Body of a scheduled task.
pub type Task = Box<dyn FnMut() -> Result<(), CoreError> + Send>;

/// Handle identifying a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// Relative order of tasks that fall due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskPriority {
    /// Ordinary host work
    Normal,
    /// Runs after all `Normal` tasks due at the same time
    Late,
}

struct ScheduledTask {
    name: String,
    task: Task,
    interval: Option<Duration>,
    priority: TaskPriority,
}

/// Cooperative scheduler driving the host in virtual time.
pub struct HostScheduler<C: SteppableClock> {
    clock: Arc<C>,
    queue: BTreeMap<(Duration, TaskPriority, u64), TaskHandle>,
    tasks: HashMap<TaskHandle, ScheduledTask>,
    next_seq: u64,
    next_handle: u64,
    tasks_run: u64,
}

impl<C: SteppableClock> HostScheduler<C> {
    /// Creates a scheduler that steps `clock`.
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            clock,
            queue: BTreeMap::new(),
            tasks: HashMap::new(),
            next_seq: 0,
            next_handle: 0,
            tasks_run: 0,
        }
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Returns the clock this scheduler steps.
    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    /// Registers a task that first runs after `interval` and then every `interval`.
    pub fn schedule_interval(
        &mut self,
        name: &str,
        interval: Duration,
        priority: TaskPriority,
        task: impl FnMut() -> Result<(), CoreError> + Send + 'static,
    ) -> Result<TaskHandle, CoreError> {
        if interval.is_zero() {
            return Err(CoreError::InvalidInterval(interval));
        }
        Ok(self.insert(name, interval, Some(interval), priority, Box::new(task)))
    }

    /// Registers a task that runs once, `delay` from now.
    pub fn schedule_once(
        &mut self,
        name: &str,
        delay: Duration,
        task: impl FnMut() -> Result<(), CoreError> + Send + 'static,
    ) -> TaskHandle {
        self.insert(name, delay, None, TaskPriority::Normal, Box::new(task))
    }

    fn insert(
        &mut self,
        name: &str,
        delay: Duration,
        interval: Option<Duration>,
        priority: TaskPriority,
        task: Task,
    ) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;

        // A due time past the end of representable time never falls due.
        let due = self.clock.now().saturating_add(delay);
        self.enqueue(due, priority, handle);
        self.tasks.insert(
            handle,
            ScheduledTask {
                name: name.to_string(),
                task,
                interval,
                priority,
            },
        );

        debug!("Scheduled '{}' ({:?}) at t={:.3}s", name, handle, due.as_secs_f64());
        handle
    }

    fn enqueue(&mut self, due: Duration, priority: TaskPriority, handle: TaskHandle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due, priority, seq), handle);
    }

    /// Removes a task. Returns false if it was not scheduled.
    ///
    /// Queue entries of removed tasks are skipped lazily.
    pub fn unschedule(&mut self, handle: TaskHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some(task) => {
                debug!("Unscheduled '{}' ({:?})", task.name, handle);
                true
            }
            None => false,
        }
    }

    /// Returns true if the task is still registered.
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle)
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Total task executions since creation.
    pub fn tasks_run(&self) -> u64 {
        self.tasks_run
    }

    /// Runs every task due at the current time without moving the clock.
    pub fn run_pending(&mut self) -> Result<usize, CoreError> {
        self.advance(Duration::ZERO)
    }

    /// Advances virtual time by `delta`, running every task that falls due.
    ///
    /// The clock is stepped to each task's due time before the task runs,
    /// and to `now + delta` at the end.
    ///
    /// # Returns
    /// Number of task executions, or the first task failure. A failing
    /// periodic task stays scheduled. A `delta` the clock cannot represent
    /// is rejected before anything runs.
    pub fn advance(&mut self, delta: Duration) -> Result<usize, CoreError> {
        let target = self.clock.time_after(delta)?;
        let mut executed = 0;

        while let Some((key, handle)) = self.queue.first_key_value().map(|(k, h)| (*k, *h)) {
            let (due, _, _) = key;
            if due > target {
                break;
            }
            self.queue.remove(&key);

            let Some(mut entry) = self.tasks.remove(&handle) else {
                continue;
            };

            let now = self.clock.now();
            if due > now {
                self.clock.step(due - now);
            }

            let result = (entry.task)();
            executed += 1;
            self.tasks_run += 1;

            let name = entry.name.clone();
            if let Some(interval) = entry.interval {
                self.enqueue(due.saturating_add(interval), entry.priority, handle);
                self.tasks.insert(handle, entry);
            }

            if let Err(source) = result {
                return Err(CoreError::TaskFailed {
                    task: name,
                    source: Box::new(source),
                });
            }
        }

        let now = self.clock.now();
        if target > now {
            self.clock.step(target - now);
        }

        Ok(executed)
    }

    /// Advances virtual time by a number of seconds.
    ///
    /// Negative, non-finite or overflowing input is rejected before
    /// anything runs.
    pub fn advance_secs(&mut self, secs: f64) -> Result<usize, CoreError> {
        self.advance(duration_from_secs(secs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_env::{Clock, EnvError};
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Default)]
    struct TestClock(Mutex<Duration>);

    impl Clock for TestClock {
        fn now(&self) -> Duration {
            *self.0.lock().unwrap()
        }
        fn system_time(&self) -> SystemTime {
            UNIX_EPOCH + self.now()
        }
    }

    impl SteppableClock for TestClock {
        fn step(&self, delta: Duration) {
            *self.0.lock().unwrap() += delta;
        }
    }

    fn scheduler() -> HostScheduler<TestClock> {
        HostScheduler::new(Arc::new(TestClock::default()))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl FnMut() -> Result<(), CoreError> {
        let log = Arc::clone(log);
        let label = label.to_string();
        move || {
            log.lock().unwrap().push(label.clone());
            Ok(())
        }
    }

    #[test]
    fn test_interval_fires_on_cadence() {
        let mut sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        sched
            .schedule_interval("tick", Duration::from_millis(100), TaskPriority::Normal, recorder(&log, "tick"))
            .unwrap();

        let ran = sched.advance(Duration::from_millis(350)).unwrap();

        assert_eq!(ran, 3);
        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(sched.now(), Duration::from_millis(350));
    }

    #[test]
    fn test_same_instant_runs_in_registration_order_then_late() {
        let mut sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let period = Duration::from_millis(100);

        sched
            .schedule_interval("pump", period, TaskPriority::Late, recorder(&log, "pump"))
            .unwrap();
        sched.schedule_once("a", period, recorder(&log, "a"));
        sched.schedule_once("b", period, recorder(&log, "b"));

        sched.advance(period).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "pump"]);
    }

    #[test]
    fn test_earlier_time_runs_first() {
        let mut sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));

        sched.schedule_once("late", Duration::from_millis(200), recorder(&log, "late"));
        sched.schedule_once("early", Duration::from_millis(100), recorder(&log, "early"));

        sched.advance(Duration::from_secs(1)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn test_unschedule_stops_interval() {
        let mut sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = sched
            .schedule_interval("tick", Duration::from_millis(100), TaskPriority::Normal, recorder(&log, "tick"))
            .unwrap();

        sched.advance(Duration::from_millis(100)).unwrap();
        assert!(sched.unschedule(handle));
        assert!(!sched.unschedule(handle));
        sched.advance(Duration::from_secs(1)).unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(!sched.is_scheduled(handle));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut sched = scheduler();
        let err = sched
            .schedule_interval("spin", Duration::ZERO, TaskPriority::Normal, || Ok(()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInterval(_)));
    }

    #[test]
    fn test_negative_advance_rejected() {
        let mut sched = scheduler();
        let err = sched.advance_secs(-1.0).unwrap_err();
        assert!(matches!(err, CoreError::Env(EnvError::NegativeStep(_))));
        assert_eq!(sched.now(), Duration::ZERO);
    }

    #[test]
    fn test_overflowing_advance_rejected() {
        let mut sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        sched.schedule_once("soon", Duration::from_millis(10), recorder(&log, "soon"));
        sched.schedule_once("never", Duration::MAX, recorder(&log, "never"));

        let err = sched.advance_secs(1e20).unwrap_err();
        assert!(matches!(err, CoreError::Env(EnvError::StepOverflow(_))));
        let err = sched.advance(Duration::MAX).unwrap_err();
        assert!(matches!(err, CoreError::Env(EnvError::StepOverflow(_))));

        assert_eq!(sched.now(), Duration::ZERO);
        assert!(log.lock().unwrap().is_empty());

        sched.advance(Duration::from_secs(1)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["soon"]);
    }

    #[test]
    fn test_task_failure_propagates() {
        let mut sched = scheduler();
        sched.schedule_once("boom", Duration::from_millis(10), || Err(CoreError::task("exploded")));

        let err = sched.advance(Duration::from_secs(1)).unwrap_err();
        match err {
            CoreError::TaskFailed { task, .. } => assert_eq!(task, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_clock_at_due_time_inside_task() {
        let clock = Arc::new(TestClock::default());
        let mut sched = HostScheduler::new(Arc::clone(&clock));
        let seen = Arc::new(Mutex::new(None));
        let seen_in_task = Arc::clone(&seen);
        let clock_in_task = Arc::clone(&clock);

        sched.schedule_once("sample", Duration::from_millis(250), move || {
            *seen_in_task.lock().unwrap() = Some(clock_in_task.now());
            Ok(())
        });
        sched.advance(Duration::from_secs(1)).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(Duration::from_millis(250)));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }
}
